// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::worker::ModuleCache;
use camino::{Utf8Path, Utf8PathBuf};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tessera_metadata::{ConsoleLog, LogStream, RuntimeConfig, WorkerEvent};
use tokio::sync::mpsc;

/// Receives events as execution progresses.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(WorkerEvent) + Send + Sync>);

impl EventSink {
    /// Creates a sink that calls `f` for every event.
    pub fn new(f: impl Fn(WorkerEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Creates a sink that drops every event.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Creates a sink that forwards events to a channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| {
            // The receiver going away means nobody is listening any more.
            let _ = sender.send(event);
        });
        (sink, receiver)
    }

    /// Emits an event.
    pub fn emit(&self, event: WorkerEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Execution state for one test file, shared by every hook and case in it.
///
/// This replaces any global runner state: everything a test needs from its surroundings is
/// reachable from here.
#[derive(Clone, Debug)]
pub struct RunContext {
    test_path: Utf8PathBuf,
    runtime_config: Arc<RuntimeConfig>,
    assets: Arc<BTreeMap<Utf8PathBuf, String>>,
    modules: ModuleCache,
    events: EventSink,
}

impl RunContext {
    /// Creates a new context with no assets and a fresh module cache.
    pub fn new(
        test_path: impl Into<Utf8PathBuf>,
        runtime_config: RuntimeConfig,
        events: EventSink,
    ) -> Self {
        Self {
            test_path: test_path.into(),
            runtime_config: Arc::new(runtime_config),
            assets: Arc::new(BTreeMap::new()),
            modules: ModuleCache::new(),
            events,
        }
    }

    /// Sets the preloaded artifacts available to tests.
    pub fn with_assets(mut self, assets: BTreeMap<Utf8PathBuf, String>) -> Self {
        self.assets = Arc::new(assets);
        self
    }

    /// Sets the module cache.
    pub fn with_modules(mut self, modules: ModuleCache) -> Self {
        self.modules = modules;
        self
    }

    /// Returns the test file being executed.
    pub fn test_path(&self) -> &Utf8Path {
        &self.test_path
    }

    /// Returns the runtime configuration.
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Returns the preloaded contents of an artifact.
    pub fn asset(&self, path: &Utf8Path) -> Option<&str> {
        self.assets.get(path).map(String::as_str)
    }

    /// Returns the worker's module cache.
    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    /// Returns the event sink.
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub(crate) fn log(&self, test_id: Option<u32>, stream: LogStream, content: String) {
        self.events.emit(WorkerEvent::ConsoleLog(ConsoleLog {
            test_path: self.test_path.clone(),
            test_id,
            stream,
            content,
        }));
    }
}

/// Handed to case bodies and to `before_each`/`after_each` hooks.
#[derive(Clone, Debug)]
pub struct TestContext {
    run: RunContext,
    test_id: u32,
    name: Arc<str>,
    attempt: u32,
}

impl TestContext {
    pub(crate) fn new(run: RunContext, test_id: u32, name: Arc<str>, attempt: u32) -> Self {
        Self {
            run,
            test_id,
            name,
            attempt,
        }
    }

    /// Returns the name of the case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the collection-time ID of the case.
    pub fn test_id(&self) -> u32 {
        self.test_id
    }

    /// Returns the attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the test file.
    pub fn test_path(&self) -> &Utf8Path {
        self.run.test_path()
    }

    /// Returns the preloaded contents of an artifact.
    pub fn asset(&self, path: &Utf8Path) -> Option<&str> {
        self.run.asset(path)
    }

    /// Returns the worker's module cache.
    pub fn modules(&self) -> &ModuleCache {
        self.run.modules()
    }

    /// Writes a line of output attributed to this case.
    pub fn log(&self, content: impl Into<String>) {
        self.run
            .log(Some(self.test_id), LogStream::Stdout, content.into());
    }

    /// Writes a line of error output attributed to this case.
    pub fn log_stderr(&self, content: impl Into<String>) {
        self.run
            .log(Some(self.test_id), LogStream::Stderr, content.into());
    }
}

/// Handed to `before_all`/`after_all` hooks.
#[derive(Clone, Debug)]
pub struct SuiteContext {
    run: RunContext,
    test_id: u32,
    name: Arc<str>,
}

impl SuiteContext {
    pub(crate) fn new(run: RunContext, test_id: u32, name: Arc<str>) -> Self {
        Self { run, test_id, name }
    }

    /// Returns the name of the suite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the test file.
    pub fn test_path(&self) -> &Utf8Path {
        self.run.test_path()
    }

    /// Returns the preloaded contents of an artifact.
    pub fn asset(&self, path: &Utf8Path) -> Option<&str> {
        self.run.asset(path)
    }

    /// Returns the worker's module cache.
    pub fn modules(&self) -> &ModuleCache {
        self.run.modules()
    }

    /// Writes a line of output attributed to this suite.
    pub fn log(&self, content: impl Into<String>) {
        self.run
            .log(Some(self.test_id), LogStream::Stdout, content.into());
    }
}
