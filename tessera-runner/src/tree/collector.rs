// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    arena::{CaseData, NodeData, NodeId, SuiteData, TestArena, TestNode},
    hooks::{Cleanup, Hook, HookHandle, SuiteHooks},
};
use crate::executor::{SuiteContext, TestContext};
use camino::Utf8PathBuf;
use debug_ignore::DebugIgnore;
use futures::FutureExt;
use std::{future::Future, time::Duration};
use tessera_metadata::{RunMode, RuntimeConfig, TestError};

/// Declaration options for a suite or case.
///
/// ```
/// use std::time::Duration;
/// use tessera_runner::tree::Declare;
///
/// let declare = Declare::new().only().concurrent().timeout(Duration::from_secs(1));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Declare {
    mode: RunMode,
    concurrent: Option<bool>,
    fails: bool,
    timeout: Option<Duration>,
    retry: Option<u32>,
}

impl Declare {
    /// Creates a declaration with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips the node.
    pub fn skip(mut self) -> Self {
        self.mode = RunMode::Skip;
        self
    }

    /// Runs only this node (and other `only` nodes) within the file.
    pub fn only(mut self) -> Self {
        self.mode = RunMode::Only;
        self
    }

    /// Marks the node as a placeholder.
    pub fn todo(mut self) -> Self {
        self.mode = RunMode::Todo;
        self
    }

    /// Runs the node concurrently with its concurrent siblings.
    pub fn concurrent(mut self) -> Self {
        self.concurrent = Some(true);
        self
    }

    /// Runs the node sequentially, even if an enclosing suite is concurrent.
    pub fn sequential(mut self) -> Self {
        self.concurrent = Some(false);
        self
    }

    /// Expects the case to fail. Has no effect on suites.
    pub fn fails(mut self) -> Self {
        self.fails = true;
        self
    }

    /// Sets the case timeout. On a suite, sets the default for every case inside it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of retries. On a suite, sets the default for every case inside it.
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}

#[derive(Debug)]
struct Frame {
    id: NodeId,
    timeout: Option<Duration>,
    retry: Option<u32>,
}

/// Builds a [`TestArena`] from declarations.
///
/// The collector keeps an explicit stack of open suites: `describe` pushes a suite, runs the body
/// against the collector, and pops it again. Declarations always land in the suite on top of the
/// stack.
#[derive(Debug)]
pub struct Collector {
    test_path: Utf8PathBuf,
    nodes: Vec<TestNode>,
    stack: Vec<Frame>,
}

impl Collector {
    /// Creates a collector for the given file.
    ///
    /// If `runtime_config.sequence_concurrent` is set, nodes are concurrent unless they opt out.
    pub fn new(test_path: impl Into<Utf8PathBuf>, runtime_config: &RuntimeConfig) -> Self {
        let test_path = test_path.into();
        let root = TestNode {
            id: NodeId::ROOT,
            name: test_path.to_string(),
            parent: None,
            parent_names: Vec::new(),
            mode: RunMode::Run,
            concurrent: runtime_config.sequence_concurrent,
            data: NodeData::Suite(SuiteData::default()),
        };
        Self {
            test_path,
            nodes: vec![root],
            stack: vec![Frame {
                id: NodeId::ROOT,
                timeout: None,
                retry: None,
            }],
        }
    }

    /// Declares a suite.
    pub fn describe(&mut self, name: impl Into<String>, body: impl FnOnce(&mut Self)) {
        self.describe_with(Declare::new(), name, body)
    }

    /// Declares a suite with options.
    pub fn describe_with(
        &mut self,
        declare: Declare,
        name: impl Into<String>,
        body: impl FnOnce(&mut Self),
    ) {
        let parent = self.current();
        let frame = Frame {
            id: NodeId::new(self.nodes.len()),
            timeout: declare.timeout.or(parent.timeout),
            retry: declare.retry.or(parent.retry),
        };
        self.push_node(
            name.into(),
            &declare,
            NodeData::Suite(SuiteData::default()),
        );

        self.stack.push(frame);
        body(self);
        self.stack.pop();
    }

    /// Declares a case.
    pub fn test<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        self.test_with(Declare::new(), name, f)
    }

    /// Declares a case with options.
    pub fn test_with<F, Fut>(&mut self, declare: Declare, name: impl Into<String>, f: F)
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        let parent = self.current();
        let data = CaseData {
            body: DebugIgnore(Box::new(move |cx| f(cx).boxed())),
            timeout: declare.timeout.or(parent.timeout),
            retry: declare.retry.or(parent.retry),
            fails: declare.fails,
        };
        self.push_node(name.into(), &declare, NodeData::Case(data));
    }

    /// Declares a placeholder case.
    pub fn todo(&mut self, name: impl Into<String>) {
        self.test_with(Declare::new().todo(), name, |_| async { Ok(()) })
    }

    /// Registers a hook that runs once before the current suite's children.
    ///
    /// The hook may return a [`Cleanup`] that runs after the suite's `after_all` hooks.
    pub fn before_all<F, Fut>(&mut self, f: F) -> HookHandle<'_>
    where
        F: Fn(SuiteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Cleanup>, TestError>> + Send + 'static,
    {
        let hooks = self.current_hooks();
        hooks
            .before_all
            .push(Hook::new(Box::new(move |cx| f(cx).boxed())));
        let hook = hooks.before_all.last_mut().expect("just pushed");
        HookHandle::new(&mut hook.timeout)
    }

    /// Registers a hook that runs once after the current suite's children.
    pub fn after_all<F, Fut>(&mut self, f: F) -> HookHandle<'_>
    where
        F: Fn(SuiteContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        let hooks = self.current_hooks();
        hooks
            .after_all
            .push(Hook::new(Box::new(move |cx| f(cx).boxed())));
        let hook = hooks.after_all.last_mut().expect("just pushed");
        HookHandle::new(&mut hook.timeout)
    }

    /// Registers a hook that runs before every case in the current suite, including nested
    /// suites.
    ///
    /// The hook may return a [`Cleanup`] that runs after the case's `after_each` hooks.
    pub fn before_each<F, Fut>(&mut self, f: F) -> HookHandle<'_>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Cleanup>, TestError>> + Send + 'static,
    {
        let hooks = self.current_hooks();
        hooks
            .before_each
            .push(Hook::new(Box::new(move |cx| f(cx).boxed())));
        let hook = hooks.before_each.last_mut().expect("just pushed");
        HookHandle::new(&mut hook.timeout)
    }

    /// Registers a hook that runs after every case in the current suite, including nested
    /// suites.
    pub fn after_each<F, Fut>(&mut self, f: F) -> HookHandle<'_>
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        let hooks = self.current_hooks();
        hooks
            .after_each
            .push(Hook::new(Box::new(move |cx| f(cx).boxed())));
        let hook = hooks.after_each.last_mut().expect("just pushed");
        HookHandle::new(&mut hook.timeout)
    }

    /// Finishes collection.
    pub fn finish(self) -> TestArena {
        TestArena::new(self.test_path, self.nodes)
    }

    // ---
    // Helper methods
    // ---

    fn current(&self) -> &Frame {
        self.stack.last().expect("the root frame is never popped")
    }

    fn current_hooks(&mut self) -> &mut SuiteHooks {
        let id = self.current().id;
        match &mut self.nodes[id.test_id() as usize].data {
            NodeData::Suite(suite) => &mut suite.hooks,
            NodeData::Case(_) => unreachable!("only suites are pushed onto the stack"),
        }
    }

    fn push_node(&mut self, name: String, declare: &Declare, data: NodeData) {
        let parent_id = self.current().id;
        let id = NodeId::new(self.nodes.len());
        let parent = &mut self.nodes[parent_id.test_id() as usize];

        let mut parent_names = parent.parent_names.clone();
        if parent_id != NodeId::ROOT {
            parent_names.push(parent.name.clone());
        }
        let concurrent = declare.concurrent.unwrap_or(parent.concurrent);
        match &mut parent.data {
            NodeData::Suite(suite) => suite.children.push(id),
            NodeData::Case(_) => unreachable!("only suites are pushed onto the stack"),
        }

        self.nodes.push(TestNode {
            id,
            name,
            parent: Some(parent_id),
            parent_names,
            mode: declare.mode,
            concurrent,
            data,
        });
    }
}
