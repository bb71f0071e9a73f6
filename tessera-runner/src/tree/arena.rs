// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::hooks::{CaseFn, SuiteHooks};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use std::{fmt, time::Duration};
use tessera_metadata::{CollectedNode, NodeKind, RunMode, TestError, TestResult, TestStatus};

/// The index of a node within a [`TestArena`].
///
/// IDs are assigned in declaration order and double as the node's `test_id`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(u32);

impl NodeId {
    /// The file root suite.
    pub const ROOT: Self = Self(0);

    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("fewer than 2^32 nodes in a test file"))
    }

    /// Returns the collection-time identifier for this node.
    #[inline]
    pub fn test_id(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A suite or case in a [`TestArena`].
#[derive(Debug)]
pub struct TestNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) parent_names: Vec<String>,
    pub(crate) mode: RunMode,
    pub(crate) concurrent: bool,
    pub(crate) data: NodeData,
}

#[derive(Debug)]
pub(crate) enum NodeData {
    Suite(SuiteData),
    Case(CaseData),
}

#[derive(Debug, Default)]
pub(crate) struct SuiteData {
    pub(crate) children: Vec<NodeId>,
    pub(crate) hooks: SuiteHooks,
    /// Set by mode resolution when a suite that would otherwise run has no children.
    pub(crate) no_tests: bool,
}

#[derive(Debug)]
pub(crate) struct CaseData {
    pub(crate) body: DebugIgnore<CaseFn>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry: Option<u32>,
    pub(crate) fails: bool,
}

impl TestNode {
    /// Returns the ID of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the name of this node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent of this node, or `None` for the file root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the names of the enclosing suites, outermost first, not including the file.
    pub fn parent_names(&self) -> &[String] {
        &self.parent_names
    }

    /// Returns the current run mode of this node.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns true if this node runs concurrently with its siblings.
    pub fn concurrent(&self) -> bool {
        self.concurrent
    }

    /// Returns whether this node is a suite or a case.
    pub fn kind(&self) -> NodeKind {
        match &self.data {
            NodeData::Suite(_) => NodeKind::Suite,
            NodeData::Case(_) => NodeKind::Case,
        }
    }

    /// Returns the children of this node. Cases have no children.
    pub fn children(&self) -> &[NodeId] {
        match &self.data {
            NodeData::Suite(suite) => &suite.children,
            NodeData::Case(_) => &[],
        }
    }

    /// Returns the full name of this node: parent names and own name joined by spaces.
    pub fn full_name(&self) -> String {
        tessera_metadata::full_name(&self.parent_names, &self.name)
    }
}

/// Every suite and case declared by one test file, addressed by [`NodeId`].
///
/// Node 0 is the file root suite, named after the test path. Nodes are built once by the
/// [`Collector`](super::Collector); afterwards only their run modes change, during mode
/// resolution.
#[derive(Debug)]
pub struct TestArena {
    test_path: Utf8PathBuf,
    nodes: Vec<TestNode>,
}

impl TestArena {
    pub(crate) fn new(test_path: Utf8PathBuf, nodes: Vec<TestNode>) -> Self {
        debug_assert!(
            matches!(nodes.first().map(|n| &n.data), Some(NodeData::Suite(_))),
            "node 0 is the root suite"
        );
        Self { test_path, nodes }
    }

    /// Returns the test file this arena was collected from.
    pub fn test_path(&self) -> &Utf8Path {
        &self.test_path
    }

    /// Returns the node with this ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID did not come from this arena.
    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TestNode {
        &mut self.nodes[id.index()]
    }

    /// Returns the file root suite.
    pub fn root(&self) -> &TestNode {
        self.node(NodeId::ROOT)
    }

    /// Iterates over every node, in declaration order, including the root.
    pub fn iter(&self) -> impl Iterator<Item = &TestNode> + '_ {
        self.nodes.iter()
    }

    /// Returns the number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena has nothing but a root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Returns the number of cases in the file.
    pub fn case_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.kind() == NodeKind::Case)
            .count()
    }

    /// Returns every descendant of `id` in declaration order, not including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children().iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next).children().iter().rev().copied());
        }
        out
    }

    /// Returns the nodes as reported by a collect task: everything except the root.
    pub fn collected_nodes(&self) -> Vec<CollectedNode> {
        self.nodes
            .iter()
            .skip(1)
            .map(|node| CollectedNode {
                test_id: node.id.test_id(),
                kind: node.kind(),
                name: node.name.clone(),
                parent_names: node.parent_names.clone(),
                mode: node.mode,
                concurrent: node.concurrent,
            })
            .collect()
    }

    pub(crate) fn result_for(
        &self,
        id: NodeId,
        status: TestStatus,
        duration: Duration,
        retry_count: u32,
        errors: Vec<TestError>,
    ) -> TestResult {
        let node = self.node(id);
        TestResult {
            test_id: id.test_id(),
            kind: node.kind(),
            test_path: self.test_path.clone(),
            name: node.name.clone(),
            parent_names: node.parent_names.clone(),
            status,
            duration,
            retry_count,
            errors,
        }
    }
}
