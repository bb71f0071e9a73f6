// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    PoolEvent, PoolEventSink, PoolMode, PoolSize, WorkerCommand, running::RunningTests,
    worker::WorkerProcess,
};
use crate::{
    cancel::RunCancellation,
    config::{PoolOptions, RpcTimeout},
    errors::{PoolOptionsError, RpcError, WorkerSpawnError},
    helpers::{get_num_cpus, plural},
    time::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use future_queue::{FutureQueueContext, StreamExt as _};
use futures::StreamExt as _;
use itertools::Itertools;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use swrite::{SWrite, swrite};
use tessera_metadata::{
    CollectedFile, EntryInfo, FileRunOutput, ResetModules, RpcMethod, RunId, RuntimeConfig,
    TaskContext, TaskKind, TestError, TestFileResult, TestResult, TestStatus, WireError,
    WorkerTask,
};
use tracing::{debug, info, instrument, warn};

/// How long to wait for a worker whose channel closed to report its exit status.
const EXIT_STATUS_GRACE: Duration = Duration::from_secs(1);

/// Per-dispatch parameters for [`WorkerPool::run_tests`].
#[derive(Clone, Debug)]
pub struct PoolRun {
    run_id: RunId,
    cancel: RunCancellation,
    bail: Option<usize>,
    events: PoolEventSink,
    assets: BTreeMap<Utf8PathBuf, BTreeMap<Utf8PathBuf, String>>,
}

impl PoolRun {
    /// Creates parameters for a run tagged with `run_id`.
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            cancel: RunCancellation::new(),
            bail: None,
            events: PoolEventSink::discard(),
            assets: BTreeMap::new(),
        }
    }

    /// Sets the cancellation token for the run.
    pub fn with_cancel(mut self, cancel: RunCancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stops dispatching new files once this many files have failed.
    pub fn with_bail(mut self, bail: Option<usize>) -> Self {
        self.bail = bail;
        self
    }

    /// Sets where events are delivered.
    pub fn with_events(mut self, events: PoolEventSink) -> Self {
        self.events = events;
        self
    }

    /// Sets the preloaded assets for each test path.
    pub fn with_assets(
        mut self,
        assets: BTreeMap<Utf8PathBuf, BTreeMap<Utf8PathBuf, String>>,
    ) -> Self {
        self.assets = assets;
        self
    }

    /// Returns the run ID.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    fn should_stop(&self, failed: usize) -> bool {
        self.cancel.is_cancelled() || self.bail.is_some_and(|bail| failed >= bail)
    }
}

/// The output of [`WorkerPool::run_tests`].
#[derive(Clone, Debug, Default)]
pub struct RunTestsOutput {
    /// One result per entry, in entry order.
    pub results: Vec<TestFileResult>,

    /// Every suite and case result, grouped by file in entry order.
    pub test_results: Vec<TestResult>,
}

/// A pool of worker processes that run test files.
///
/// Each worker runs at most one file at a time. Workers are reused across files only when
/// `isolate` is off, in which case the worker's module cache is reset before every reuse.
#[derive(Debug)]
pub struct WorkerPool {
    command: WorkerCommand,
    options: PoolOptions,
    mode: PoolMode,
    rpc_timeout: RpcTimeout,
    project: String,
    root: Utf8PathBuf,
    num_cpus: usize,
    idle: Mutex<Vec<WorkerProcess>>,
    next_worker_id: AtomicUsize,
    next_task_id: AtomicU64,
}

impl WorkerPool {
    /// Creates a new pool. No processes are started until work is dispatched.
    pub fn new(
        command: WorkerCommand,
        options: PoolOptions,
        mode: PoolMode,
    ) -> Result<Self, PoolOptionsError> {
        let num_cpus = get_num_cpus();
        options.validate(num_cpus)?;
        Ok(Self {
            command,
            options,
            mode,
            rpc_timeout: RpcTimeout::DEFAULT,
            project: String::new(),
            root: Utf8PathBuf::new(),
            num_cpus,
            idle: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
            next_task_id: AtomicU64::new(0),
        })
    }

    /// Sets the timeout for control calls (`resetModules`, `collect`). File runs never time out.
    pub fn with_rpc_timeout(mut self, rpc_timeout: RpcTimeout) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    /// Sets the project name and root sent to workers with every task.
    pub fn with_project(
        mut self,
        project: impl Into<String>,
        root: impl Into<Utf8PathBuf>,
    ) -> Self {
        self.project = project.into();
        self.root = root.into();
        self
    }

    /// Returns the pool size that would be used for `pending` files.
    pub fn size_for(&self, pending: usize) -> PoolSize {
        PoolSize::compute(&self.options, self.mode, self.num_cpus, pending)
    }

    /// Returns the number of idle workers currently kept alive.
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    /// Runs every entry, one file per worker, and returns the results in entry order.
    ///
    /// A file whose worker fails does not affect any other file. Once the run is cancelled, or
    /// the bail threshold is reached, files not yet dispatched are reported as skipped.
    #[instrument(level = "debug", skip_all, fields(run_id = %run.run_id, files = entries.len()))]
    pub async fn run_tests(
        &self,
        entries: &[EntryInfo],
        setup_entries: &[EntryInfo],
        runtime_config: &RuntimeConfig,
        run: &PoolRun,
    ) -> RunTestsOutput {
        let size = self.size_for(entries.len());
        debug!(
            min = size.min,
            max = size.max,
            "running {} {} on up to {} {}",
            entries.len(),
            plural::files_str(entries.len()),
            size.max,
            plural::workers_str(size.max),
        );
        self.warm_up(size.min);

        let running = Arc::new(RunningTests::default());
        let failed = AtomicUsize::new(0);
        let failed = &failed;

        let files = entries.iter().enumerate().map(|(index, entry)| {
            let running = running.clone();
            let fut = move |_cx: FutureQueueContext| async move {
                let output = if run.should_stop(failed.load(Ordering::Acquire)) {
                    debug!(test_path = %entry.test_path, "not dispatching file");
                    FileRunOutput {
                        file: skipped_file(&entry.test_path, Duration::ZERO),
                        test_results: Vec::new(),
                    }
                } else {
                    self.run_file(entry, setup_entries, runtime_config, run, &running)
                        .await
                };

                if output.file.status.is_fail() {
                    let failed = failed.fetch_add(1, Ordering::AcqRel) + 1;
                    if run.bail.is_some_and(|bail| failed == bail) {
                        info!(failed, "bail threshold reached, not dispatching further files");
                    }
                }
                run.events.emit(PoolEvent::FileFinished(output.file.clone()));
                (index, output)
            };
            (1, fut)
        });
        let outputs: Vec<(usize, FileRunOutput)> = futures::stream::iter(files)
            // future_queue means files are dispatched in order but finish in any order.
            .future_queue(size.max)
            .collect()
            .await;

        let mut out = RunTestsOutput::default();
        for (_, output) in outputs.into_iter().sorted_by_key(|(index, _)| *index) {
            out.results.push(output.file);
            out.test_results.extend(output.test_results);
        }
        out
    }

    /// Collects every entry without running anything, and returns the collected trees in entry
    /// order.
    #[instrument(level = "debug", skip_all, fields(run_id = %run_id, files = entries.len()))]
    pub async fn collect_tests(
        &self,
        entries: &[EntryInfo],
        setup_entries: &[EntryInfo],
        runtime_config: &RuntimeConfig,
        run_id: RunId,
    ) -> Vec<CollectedFile> {
        let size = self.size_for(entries.len());
        self.warm_up(size.min);

        let files = entries.iter().enumerate().map(|(index, entry)| {
            let fut = move |_cx: FutureQueueContext| async move {
                let collected = self
                    .collect_file(entry, setup_entries, runtime_config, run_id)
                    .await;
                (index, collected)
            };
            (1, fut)
        });
        let outputs: Vec<(usize, CollectedFile)> = futures::stream::iter(files)
            .future_queue(size.max)
            .collect()
            .await;

        outputs
            .into_iter()
            .sorted_by_key(|(index, _)| *index)
            .map(|(_, collected)| collected)
            .collect()
    }

    /// Stops every idle worker.
    pub async fn close(&self) {
        let idle = std::mem::take(&mut *self.lock_idle());
        for worker in idle {
            worker.kill().await;
        }
    }

    #[instrument(level = "debug", skip_all, fields(test_path = %entry.test_path))]
    async fn run_file(
        &self,
        entry: &EntryInfo,
        setup_entries: &[EntryInfo],
        runtime_config: &RuntimeConfig,
        run: &PoolRun,
        running: &Arc<RunningTests>,
    ) -> FileRunOutput {
        let stopwatch = stopwatch();
        let mut worker = match self.acquire(entry, run.run_id).await {
            Ok(worker) => worker,
            Err(error) => {
                return FileRunOutput {
                    file: TestFileResult::failed(
                        entry.test_path.clone(),
                        stopwatch.elapsed(),
                        TestError::from_error(&error).with_name("WorkerError"),
                    ),
                    test_results: Vec::new(),
                };
            }
        };

        let task = self.task(TaskKind::Run, entry, setup_entries, runtime_config, run);
        let args = match serde_json::to_value(&task) {
            Ok(args) => args,
            Err(error) => {
                self.release(worker).await;
                return FileRunOutput {
                    file: TestFileResult::failed(
                        entry.test_path.clone(),
                        stopwatch.elapsed(),
                        TestError::from_error(&error),
                    ),
                    test_results: Vec::new(),
                };
            }
        };

        worker.bind(&entry.test_path, run.events.clone(), running.clone());
        let res = tokio::select! {
            res = worker.channel.call_with_timeout(
                run.run_id,
                RpcMethod::RUN,
                args,
                RpcTimeout::Disabled,
            ) => Some(res),
            () = run.cancel.cancelled() => None,
        };
        worker.tasks_run += 1;
        worker.unbind();
        let snapshot = running.finish_file(&entry.test_path);

        let res = match res {
            Some(res) => res,
            None => {
                debug!(worker = worker.id, "run cancelled, stopping worker");
                worker.kill().await;
                return FileRunOutput {
                    file: skipped_file(&entry.test_path, stopwatch.elapsed()),
                    test_results: snapshot.finished,
                };
            }
        };

        match res {
            Ok(value) => match serde_json::from_value::<FileRunOutput>(value) {
                Ok(output) => {
                    self.release(worker).await;
                    output
                }
                Err(error) => {
                    warn!(worker = worker.id, %error, "worker returned a malformed result");
                    worker.kill().await;
                    FileRunOutput {
                        file: TestFileResult::failed(
                            entry.test_path.clone(),
                            stopwatch.elapsed(),
                            TestError::from_error(&error).with_name("WorkerError"),
                        ),
                        test_results: snapshot.finished,
                    }
                }
            },
            Err(RpcError::Closed { .. }) => {
                let status = tokio::time::timeout(EXIT_STATUS_GRACE, worker.wait())
                    .await
                    .ok()
                    .flatten();
                warn!(
                    worker = worker.id,
                    test_path = %entry.test_path,
                    ?status,
                    "worker exited unexpectedly",
                );
                worker.kill().await;

                let mut message = "Worker exited unexpectedly".to_owned();
                if let Some(status) = status {
                    swrite!(message, " ({status})");
                }
                if !snapshot.running.is_empty() {
                    message.push_str("\nTests running at the time:");
                    for name in &snapshot.running {
                        swrite!(message, "\n  - {name}");
                    }
                }
                // No stack: it would point into the channel rather than at any test.
                FileRunOutput {
                    file: TestFileResult::failed(
                        entry.test_path.clone(),
                        stopwatch.elapsed(),
                        TestError::new(message).with_name("WorkerError"),
                    ),
                    test_results: snapshot.finished,
                }
            }
            Err(RpcError::Superseded { .. }) => {
                debug!(worker = worker.id, "dropping result from a superseded run");
                self.release(worker).await;
                FileRunOutput {
                    file: skipped_file(&entry.test_path, stopwatch.elapsed()),
                    test_results: Vec::new(),
                }
            }
            Err(error) => {
                warn!(worker = worker.id, %error, "worker failed to run file");
                worker.kill().await;
                FileRunOutput {
                    file: TestFileResult::failed(
                        entry.test_path.clone(),
                        stopwatch.elapsed(),
                        TestError::from_error(&error).with_name("WorkerError"),
                    ),
                    test_results: snapshot.finished,
                }
            }
        }
    }

    async fn collect_file(
        &self,
        entry: &EntryInfo,
        setup_entries: &[EntryInfo],
        runtime_config: &RuntimeConfig,
        run_id: RunId,
    ) -> CollectedFile {
        let failed = |error: TestError| CollectedFile {
            test_path: entry.test_path.clone(),
            nodes: Vec::new(),
            errors: vec![error],
        };

        let worker = match self.acquire(entry, run_id).await {
            Ok(worker) => worker,
            Err(error) => return failed(TestError::from_error(&error).with_name("WorkerError")),
        };
        let run = PoolRun::new(run_id);
        let task = self.task(TaskKind::Collect, entry, setup_entries, runtime_config, &run);
        let res = match serde_json::to_value(&task) {
            Ok(args) => {
                worker
                    .channel
                    .call_with_timeout(run_id, RpcMethod::COLLECT, args, self.rpc_timeout)
                    .await
            }
            Err(error) => {
                self.release(worker).await;
                return failed(TestError::from_error(&error));
            }
        };

        match res.map(serde_json::from_value::<CollectedFile>) {
            Ok(Ok(collected)) => {
                self.release(worker).await;
                collected
            }
            Ok(Err(error)) => {
                worker.kill().await;
                failed(TestError::from_error(&error).with_name("WorkerError"))
            }
            Err(error) => {
                worker.kill().await;
                failed(TestError::from_error(&error).with_name("WorkerError"))
            }
        }
    }

    fn task(
        &self,
        kind: TaskKind,
        entry: &EntryInfo,
        setup_entries: &[EntryInfo],
        runtime_config: &RuntimeConfig,
        run: &PoolRun,
    ) -> WorkerTask {
        WorkerTask {
            kind,
            entry_info: entry.clone(),
            context: TaskContext {
                task_id: self.next_task_id.fetch_add(1, Ordering::Relaxed),
                project: self.project.clone(),
                root_path: self.root.clone(),
                runtime_config: runtime_config.clone(),
            },
            setup_entries: setup_entries.to_vec(),
            assets: run.assets.get(&entry.test_path).cloned(),
        }
    }

    /// Returns a worker ready to run `entry` under `run_id`.
    ///
    /// Reused workers have their module cache reset first. A worker that fails the reset is
    /// replaced.
    async fn acquire(
        &self,
        entry: &EntryInfo,
        run_id: RunId,
    ) -> Result<WorkerProcess, WorkerSpawnError> {
        while let Some(mut worker) = self.pop_idle() {
            if worker.has_exited() {
                debug!(worker = worker.id, "discarding exited idle worker");
                continue;
            }
            worker.channel.set_run(Some(run_id));
            if worker.tasks_run == 0 {
                return Ok(worker);
            }

            let reset = ResetModules {
                setup_ids: entry.setup_ids.clone(),
            };
            let res = match serde_json::to_value(&reset) {
                Ok(args) => worker
                    .channel
                    .call_with_timeout(run_id, RpcMethod::RESET_MODULES, args, self.rpc_timeout)
                    .await
                    .map(|_| ()),
                Err(error) => Err(RpcError::Wire {
                    method: RpcMethod::RESET_MODULES.to_owned(),
                    error: WireError::Serialize(error),
                }),
            };
            match res {
                Ok(()) => return Ok(worker),
                Err(error) => {
                    warn!(worker = worker.id, %error, "failed to reset worker, replacing it");
                    worker.kill().await;
                }
            }
        }

        let worker = self.spawn_worker()?;
        worker.channel.set_run(Some(run_id));
        Ok(worker)
    }

    /// Returns a worker to the idle list, or stops it if it may not be reused.
    async fn release(&self, mut worker: WorkerProcess) {
        if self.options.isolate || worker.has_exited() {
            worker.kill().await;
        } else {
            worker.channel.set_run(None);
            self.lock_idle().push(worker);
        }
    }

    fn warm_up(&self, min: usize) {
        let missing = min.saturating_sub(self.idle_count());
        for _ in 0..missing {
            match self.spawn_worker() {
                Ok(worker) => self.lock_idle().push(worker),
                Err(error) => {
                    // Dispatch will try again and report the failure against a file.
                    warn!(%error, "failed to start warm worker");
                    break;
                }
            }
        }
    }

    fn spawn_worker(&self) -> Result<WorkerProcess, WorkerSpawnError> {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        WorkerProcess::spawn(id, &self.command, &self.options, self.rpc_timeout)
    }

    fn pop_idle(&self) -> Option<WorkerProcess> {
        self.lock_idle().pop()
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<WorkerProcess>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn skipped_file(test_path: &Utf8Path, duration: Duration) -> TestFileResult {
    TestFileResult {
        test_path: test_path.to_owned(),
        status: TestStatus::Skip,
        duration,
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unspawnable_worker_fails_each_file() {
        let pool = WorkerPool::new(
            WorkerCommand::new("/nonexistent/tessera-worker"),
            PoolOptions::default(),
            PoolMode::Run,
        )
        .unwrap();
        let entries = vec![
            EntryInfo::new("a.test", "dist/a.js"),
            EntryInfo::new("b.test", "dist/b.js"),
        ];

        let output = pool
            .run_tests(
                &entries,
                &[],
                &RuntimeConfig::default(),
                &PoolRun::new(RunId::new_v4()),
            )
            .await;
        let paths: Vec<_> = output.results.iter().map(|r| r.test_path.as_str()).collect();
        assert_eq!(paths, vec!["a.test", "b.test"]);
        for result in &output.results {
            assert_eq!(result.status, TestStatus::Fail);
            assert_eq!(
                result.errors[0].message,
                "failed to spawn worker `/nonexistent/tessera-worker`"
            );
            assert_eq!(result.errors[0].name.as_deref(), Some("WorkerError"));
        }
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn bail_skips_undispatched_files() {
        let options = PoolOptions {
            max_workers: Some(crate::config::WorkerCount::Count(1)),
            ..PoolOptions::default()
        };
        let pool = WorkerPool::new(
            WorkerCommand::new("/nonexistent/tessera-worker"),
            options,
            PoolMode::Run,
        )
        .unwrap();
        let entries: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| EntryInfo::new(format!("{name}.test"), format!("dist/{name}.js")))
            .collect();

        let finished = Arc::new(Mutex::new(Vec::new()));
        let run = PoolRun::new(RunId::new_v4())
            .with_bail(Some(1))
            .with_events({
                let finished = finished.clone();
                PoolEventSink::new(move |event| {
                    if let PoolEvent::FileFinished(file) = event {
                        finished.lock().unwrap().push(file.status);
                    }
                })
            });
        let output = pool
            .run_tests(&entries, &[], &RuntimeConfig::default(), &run)
            .await;

        let statuses: Vec<_> = output.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![TestStatus::Fail, TestStatus::Skip, TestStatus::Skip]
        );
        assert_eq!(*finished.lock().unwrap(), statuses);
    }

    #[tokio::test]
    async fn cancelled_run_dispatches_nothing() {
        let pool = WorkerPool::new(
            WorkerCommand::new("/nonexistent/tessera-worker"),
            PoolOptions::default(),
            PoolMode::Watch,
        )
        .unwrap();
        let cancel = RunCancellation::new();
        cancel.cancel();
        let run = PoolRun::new(RunId::new_v4()).with_cancel(cancel);

        let output = pool
            .run_tests(
                &[EntryInfo::new("a.test", "dist/a.js")],
                &[],
                &RuntimeConfig::default(),
                &run,
            )
            .await;
        assert_eq!(output.results[0].status, TestStatus::Skip);
        assert!(output.results[0].errors.is_empty());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = PoolOptions {
            min_workers: Some(crate::config::WorkerCount::Count(4)),
            max_workers: Some(crate::config::WorkerCount::Count(2)),
            ..PoolOptions::default()
        };
        let error = WorkerPool::new(WorkerCommand::new("worker"), options, PoolMode::Run)
            .unwrap_err();
        assert_eq!(error, PoolOptionsError::MinExceedsMax { min: 4, max: 2 });
    }
}
