// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolEvent, PoolEventSink, running::RunningTests};
use crate::{
    config::{PoolOptions, RpcTimeout},
    errors::WorkerSpawnError,
    rpc::{RpcChannel, RpcHandler},
    worker::WORKER_SUBCOMMAND,
};
use camino::{Utf8Path, Utf8PathBuf};
use futures::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use serde_json::Value;
use std::{
    process::{ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tessera_metadata::{ConsoleLog, LogStream, RpcErrorPayload, RunId, WorkerEvent};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// The command used to start worker processes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerCommand {
    program: Utf8PathBuf,
    args: Vec<String>,
    env: IndexMap<String, String>,
}

impl WorkerCommand {
    /// Creates a command that runs `program` with no arguments.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: IndexMap::new(),
        }
    }

    /// Re-invokes the current executable with the worker subcommand.
    ///
    /// The binary must call [`worker_main`](crate::worker::worker_main) when it sees
    /// [`WORKER_SUBCOMMAND`].
    pub fn current_exe() -> Result<Self, WorkerSpawnError> {
        let exe = std::env::current_exe()
            .map_err(|error| WorkerSpawnError::new("<current exe>", error))?;
        let exe = Utf8PathBuf::from_path_buf(exe).map_err(|path| {
            WorkerSpawnError::new(
                path.to_string_lossy().into_owned(),
                std::io::Error::other("current exe is not valid UTF-8"),
            )
        })?;
        Ok(Self::new(exe).arg(WORKER_SUBCOMMAND))
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Returns the program run by this command.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    fn to_command(&self, options: &PoolOptions) -> Command {
        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(&self.args)
            .args(&options.exec_args)
            .envs(&self.env)
            .envs(&options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Worker logs and anything written straight to fd 2 pass through.
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

/// A spawned worker process and the channel to it.
#[derive(Debug)]
pub(super) struct WorkerProcess {
    pub(super) id: usize,
    child: Child,
    pub(super) channel: RpcChannel,
    events: Arc<WorkerEvents>,
    pub(super) tasks_run: usize,
}

impl WorkerProcess {
    pub(super) fn spawn(
        id: usize,
        command: &WorkerCommand,
        options: &PoolOptions,
        rpc_timeout: RpcTimeout,
    ) -> Result<Self, WorkerSpawnError> {
        let mut child = command
            .to_command(options)
            .spawn()
            .map_err(|error| WorkerSpawnError::new(command.program(), error))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(WorkerSpawnError::new(
                command.program(),
                std::io::Error::other("worker stdio was not captured"),
            ));
        };

        let events = Arc::new(WorkerEvents::default());
        let channel = RpcChannel::spawn(stdout, stdin, events.clone(), rpc_timeout);
        debug!(id, pid = child.id(), "spawned worker");

        Ok(Self {
            id,
            child,
            channel,
            events,
            tasks_run: 0,
        })
    }

    /// Routes this worker's events for `test_path` to `sink`.
    pub(super) fn bind(
        &self,
        test_path: &Utf8Path,
        sink: PoolEventSink,
        running: Arc<RunningTests>,
    ) {
        running.start_file(test_path);
        *self.events.lock() = Some(FileBinding {
            test_path: test_path.to_owned(),
            sink,
            running,
        });
    }

    pub(super) fn unbind(&self) {
        *self.events.lock() = None;
    }

    /// Returns true if the process has already exited.
    pub(super) fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Waits for the process to exit on its own.
    pub(super) async fn wait(&mut self) -> Option<ExitStatus> {
        self.child.wait().await.ok()
    }

    /// Kills the process and waits for it to exit.
    pub(super) async fn kill(mut self) {
        if let Err(error) = self.child.start_kill() {
            // The process has most likely already exited.
            debug!(id = self.id, %error, "failed to kill worker");
        }
        let _ = self.child.wait().await;
        debug!(id = self.id, tasks_run = self.tasks_run, "worker stopped");
    }
}

/// Receives notifications from one worker and forwards them to the file it is bound to.
#[derive(Debug, Default)]
struct WorkerEvents {
    binding: Mutex<Option<FileBinding>>,
}

#[derive(Debug)]
struct FileBinding {
    test_path: Utf8PathBuf,
    sink: PoolEventSink,
    running: Arc<RunningTests>,
}

impl WorkerEvents {
    fn lock(&self) -> MutexGuard<'_, Option<FileBinding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RpcHandler for WorkerEvents {
    fn handle_request(
        &self,
        _channel: &RpcChannel,
        _run_id: RunId,
        method: &str,
        _args: Value,
    ) -> BoxFuture<'static, Result<Value, RpcErrorPayload>> {
        let message = format!("the orchestrator does not serve `{method}`");
        async move { Err(RpcErrorPayload::new(message)) }.boxed()
    }

    fn handle_notification(&self, _run_id: RunId, method: &str, args: Value) {
        let event = match WorkerEvent::from_notification(method, args) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(method, "ignoring unknown notification");
                return;
            }
            Err(error) => {
                warn!(method, %error, "dropping malformed notification");
                return;
            }
        };

        let binding = self.lock();
        let Some(binding) = binding.as_ref() else {
            debug!(method, "dropping notification from an idle worker");
            return;
        };
        match &event {
            WorkerEvent::TestCaseStart(start) => binding.running.case_started(start),
            WorkerEvent::TestCaseResult(result) | WorkerEvent::TestSuiteResult(result) => {
                binding.running.unit_finished(result)
            }
            _ => {}
        }
        binding.sink.emit(PoolEvent::Worker(event));
    }

    fn handle_stray_output(&self, line: &str) {
        let binding = self.lock();
        match binding.as_ref() {
            Some(binding) => binding
                .sink
                .emit(PoolEvent::Worker(WorkerEvent::ConsoleLog(ConsoleLog {
                    test_path: binding.test_path.clone(),
                    test_id: None,
                    stream: LogStream::Stdout,
                    content: format!("{line}\n"),
                }))),
            None => debug!(line, "stray output from an idle worker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::ffi::OsStr;
    use tessera_metadata::UnitStart;

    fn recording_sink() -> (PoolEventSink, Arc<Mutex<Vec<PoolEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = events.clone();
            PoolEventSink::new(move |event| events.lock().unwrap().push(event))
        };
        (sink, events)
    }

    #[test]
    fn command_applies_pool_options() {
        let options = PoolOptions {
            exec_args: vec!["--inspect".to_owned()],
            env: [("NODE_ENV".to_owned(), "test".to_owned())].into_iter().collect(),
            ..PoolOptions::default()
        };
        let command = WorkerCommand::new("/bin/worker").arg(WORKER_SUBCOMMAND);
        let cmd = command.to_command(&options);
        let std = cmd.as_std();

        assert_eq!(std.get_program(), "/bin/worker");
        let args: Vec<_> = std.get_args().collect();
        assert_eq!(args, vec![WORKER_SUBCOMMAND, "--inspect"]);
        let envs: Vec<_> = std.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("NODE_ENV"), Some(OsStr::new("test")))));
    }

    #[test]
    fn events_are_routed_to_the_bound_file() {
        let handler = WorkerEvents::default();
        let (sink, received) = recording_sink();
        let running = Arc::new(RunningTests::default());

        handler.handle_stray_output("before binding");
        *handler.lock() = Some(FileBinding {
            test_path: "a.test".into(),
            sink,
            running: running.clone(),
        });
        running.start_file("a.test".into());

        let start = UnitStart {
            test_path: "a.test".into(),
            test_id: 1,
            name: "works".to_owned(),
            parent_names: Vec::new(),
        };
        handler.handle_notification(
            RunId::new_v4(),
            tessera_metadata::RpcMethod::ON_TEST_CASE_START,
            serde_json::to_value(&start).unwrap(),
        );
        handler.handle_stray_output("hello");

        let received = received.lock().unwrap();
        assert_eq!(
            *received,
            vec![
                PoolEvent::Worker(WorkerEvent::TestCaseStart(start)),
                PoolEvent::Worker(WorkerEvent::ConsoleLog(ConsoleLog {
                    test_path: "a.test".into(),
                    test_id: None,
                    stream: LogStream::Stdout,
                    content: "hello\n".to_owned(),
                })),
            ]
        );
        assert_eq!(running.finish_file("a.test".into()).running, vec!["works"]);
    }
}
