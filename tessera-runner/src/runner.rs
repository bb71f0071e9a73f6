// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`].

use crate::{
    cancel::RunCancellation,
    config::TesseraConfig,
    errors::TestRunnerBuildError,
    pipeline::TestFiles,
    pool::{PoolEvent, PoolEventSink, PoolMode, PoolRun, WorkerCommand, WorkerPool},
    reporter::{CancelReason, RunAggregator, RunSummary, TestEvent},
    signal::{SignalHandler, SignalHandlerKind},
};
use tessera_metadata::{CollectedFile, RunId, RuntimeConfig};
use tokio::{runtime::Runtime, sync::mpsc};
use tracing::{debug, info};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    bail: Option<usize>,
    mode: Option<PoolMode>,
    worker_command: Option<WorkerCommand>,
    project: Option<String>,
}

impl TestRunnerBuilder {
    /// Stops dispatching files once this many have failed. Overrides the config.
    pub fn set_bail(&mut self, bail: usize) -> &mut Self {
        self.bail = Some(bail);
        self
    }

    /// Sets what the pool is sized for. Defaults to [`PoolMode::Run`].
    pub fn set_mode(&mut self, mode: PoolMode) -> &mut Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the command used to start workers. Defaults to
    /// [`WorkerCommand::current_exe`].
    pub fn set_worker_command(&mut self, command: WorkerCommand) -> &mut Self {
        self.worker_command = Some(command);
        self
    }

    /// Sets the project name sent to workers. Defaults to the name of the project root.
    pub fn set_project(&mut self, project: impl Into<String>) -> &mut Self {
        self.project = Some(project.into());
        self
    }

    /// Creates a new test runner.
    pub fn build(
        self,
        config: &TesseraConfig,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner, TestRunnerBuildError> {
        let command = match self.worker_command {
            Some(command) => command,
            None => WorkerCommand::current_exe()?,
        };
        let project = self
            .project
            .or_else(|| config.root().file_name().map(ToOwned::to_owned))
            .unwrap_or_default();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tessera-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        let pool = WorkerPool::new(
            command,
            config.pool_options().clone(),
            self.mode.unwrap_or(PoolMode::Run),
        )?
        .with_rpc_timeout(config.rpc_timeout())
        .with_project(project, config.root());

        Ok(TestRunner {
            pool,
            runtime_config: config.runtime_config(),
            bail: self.bail.or_else(|| config.bail()),
            signal_handler,
            runtime,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`]. A runner may execute any number of runs; with
/// `isolate` off, workers stay warm between them.
#[derive(Debug)]
pub struct TestRunner {
    pool: WorkerPool,
    runtime_config: RuntimeConfig,
    bail: Option<usize>,
    signal_handler: SignalHandler,
    // Dropped last: idle workers are killed while the runtime is still alive.
    runtime: Runtime,
}

impl TestRunner {
    /// Returns the configuration sent to workers.
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    /// Executes `files`, each one in a worker process, under a fresh [`RunId`].
    ///
    /// The callback is called with every event as it happens.
    pub fn execute<F>(&mut self, files: &TestFiles, callback: F) -> RunSummary
    where
        F: FnMut(TestEvent) + Send,
    {
        self.execute_with_id(RunId::new_v4(), files, callback)
    }

    /// Executes `files` under `run_id`.
    pub fn execute_with_id<F>(
        &mut self,
        run_id: RunId,
        files: &TestFiles,
        mut callback: F,
    ) -> RunSummary
    where
        F: FnMut(TestEvent) + Send,
    {
        let Self {
            pool,
            runtime_config,
            bail,
            signal_handler,
            runtime,
        } = self;
        runtime.block_on(run_files(
            pool,
            runtime_config,
            *bail,
            signal_handler,
            run_id,
            files,
            &mut callback,
        ))
    }

    /// Collects `files` without running them.
    pub fn collect(&mut self, files: &TestFiles) -> Vec<CollectedFile> {
        let Self {
            pool,
            runtime_config,
            runtime,
            ..
        } = self;
        runtime.block_on(pool.collect_tests(
            files.entries(),
            files.setup_entries(),
            runtime_config,
            RunId::new_v4(),
        ))
    }

    /// Stops every idle worker.
    pub fn close(&mut self) {
        let Self { pool, runtime, .. } = self;
        runtime.block_on(pool.close());
    }
}

async fn run_files(
    pool: &WorkerPool,
    runtime_config: &RuntimeConfig,
    bail: Option<usize>,
    signal_handler: &mut SignalHandler,
    run_id: RunId,
    files: &TestFiles,
    callback: &mut (dyn FnMut(TestEvent) + Send),
) -> RunSummary {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let cancel = RunCancellation::new();
    let run = PoolRun::new(run_id)
        .with_cancel(cancel.clone())
        .with_bail(bail)
        .with_assets(files.assets().clone())
        .with_events(PoolEventSink::new(move |event| {
            // Failure to send means the receiver was dropped.
            let _ = event_tx.send(event);
        }));

    let mut aggregator = RunAggregator::new(run_id, files.entries().len());
    callback(aggregator.run_started());

    let run_fut = pool.run_tests(files.entries(), files.setup_entries(), runtime_config, &run);
    tokio::pin!(run_fut);
    let output = loop {
        tokio::select! {
            output = &mut run_fut => break output,
            Some(event) = event_rx.recv() => on_event(&mut aggregator, bail, callback, event),
            Some(signal) = signal_handler.recv() => {
                info!(signal = signal.as_str(), "received shutdown signal, cancelling run");
                cancel.cancel();
                if let Some(event) = aggregator.begin_cancel(CancelReason::Signal) {
                    callback(event);
                }
            }
        }
    };

    // Every event was sent before the run future completed.
    while let Ok(event) = event_rx.try_recv() {
        on_event(&mut aggregator, bail, callback, event);
    }
    debug!(%run_id, files = output.results.len(), "run finished");

    let (event, summary) = aggregator.finish(
        output.results,
        output.test_results,
        runtime_config.pass_with_no_tests,
    );
    callback(event);
    summary
}

fn on_event(
    aggregator: &mut RunAggregator,
    bail: Option<usize>,
    callback: &mut (dyn FnMut(TestEvent) + Send),
    event: PoolEvent,
) {
    callback(aggregator.on_pool_event(event));
    if let Some(bail) = bail
        && aggregator.stats().files_failed >= bail
        && let Some(event) = aggregator.begin_cancel(CancelReason::Bail)
    {
        info!(bail, "bail threshold reached");
        callback(event);
    }
}
