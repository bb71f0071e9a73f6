// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{ModuleCache, TestFileRegistry};
use crate::{
    executor::{EventSink, RunContext, run_file},
    rpc::{RpcChannel, RpcHandler},
    run_mode::RunModeResolver,
    time::stopwatch,
    tree::TestArena,
};
use futures::{FutureExt, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use tessera_metadata::{
    CollectedFile, FileRunOutput, ResetModules, RpcErrorPayload, RpcMethod, RunId, TestError,
    TestFileReady, TestFileResult, TestFileStart, WorkerEvent, WorkerTask,
};
use tracing::{debug, warn};

/// Serves requests from the orchestrator inside a worker process.
#[derive(Debug)]
pub(crate) struct WorkerHandler {
    registry: Arc<TestFileRegistry>,
    modules: ModuleCache,
}

impl WorkerHandler {
    pub(crate) fn new(registry: TestFileRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            modules: ModuleCache::new(),
        }
    }
}

impl RpcHandler for WorkerHandler {
    fn handle_request(
        &self,
        channel: &RpcChannel,
        run_id: RunId,
        method: &str,
        args: Value,
    ) -> BoxFuture<'static, Result<Value, RpcErrorPayload>> {
        match method {
            RpcMethod::RUN => {
                let registry = self.registry.clone();
                let modules = self.modules.clone();
                let events = notify_sink(channel.clone(), run_id);
                async move {
                    let task: WorkerTask = from_args(args)?;
                    let output = run_task(&registry, modules, events, task).await;
                    to_value(&output)
                }
                .boxed()
            }
            RpcMethod::COLLECT => {
                let registry = self.registry.clone();
                async move {
                    let task: WorkerTask = from_args(args)?;
                    to_value(&collect_task(&registry, &task))
                }
                .boxed()
            }
            RpcMethod::RESET_MODULES => {
                let modules = self.modules.clone();
                async move {
                    let reset: ResetModules = from_args(args)?;
                    let evicted = modules.reset(&reset.setup_ids);
                    debug!(evicted, "reset module cache");
                    Ok::<_, RpcErrorPayload>(Value::from(evicted))
                }
                .boxed()
            }
            other => {
                let message = format!("unknown method `{other}`");
                async move { Err(RpcErrorPayload::new(message)) }.boxed()
            }
        }
    }

    fn handle_notification(&self, _run_id: RunId, method: &str, _args: Value) {
        debug!(method, "worker ignoring notification");
    }
}

/// Returns a sink that forwards events to the orchestrator as notifications.
fn notify_sink(channel: RpcChannel, run_id: RunId) -> EventSink {
    EventSink::new(move |event: WorkerEvent| {
        let res = event
            .to_args()
            .map_err(|error| error.to_string())
            .and_then(|args| {
                channel
                    .notify(run_id, event.method(), args)
                    .map_err(|error| error.to_string())
            });
        if let Err(error) = res {
            warn!(method = event.method(), %error, "failed to send event");
        }
    })
}

async fn run_task(
    registry: &TestFileRegistry,
    modules: ModuleCache,
    events: EventSink,
    task: WorkerTask,
) -> FileRunOutput {
    let stopwatch = stopwatch();
    let test_path = task.entry_info.test_path.clone();
    events.emit(WorkerEvent::TestFileStart(TestFileStart {
        test_path: test_path.clone(),
        task_id: task.context.task_id,
    }));

    let arena = match prepare(registry, &task) {
        Ok(arena) => arena,
        Err(error) => {
            return FileRunOutput {
                file: TestFileResult::failed(test_path, stopwatch.elapsed(), error),
                test_results: Vec::new(),
            };
        }
    };
    events.emit(WorkerEvent::TestFileReady(TestFileReady {
        test_path: test_path.clone(),
        case_count: arena.case_count(),
    }));

    let cx = RunContext::new(test_path, task.context.runtime_config, events)
        .with_assets(task.assets.unwrap_or_default())
        .with_modules(modules);
    let mut output = run_file(&arena, &cx).await;
    // Collection counts toward the file's duration.
    output.file.duration = stopwatch.elapsed();
    output
}

fn collect_task(registry: &TestFileRegistry, task: &WorkerTask) -> CollectedFile {
    let test_path = task.entry_info.test_path.clone();
    match prepare(registry, task) {
        Ok(arena) => CollectedFile {
            test_path,
            nodes: arena.collected_nodes(),
            errors: Vec::new(),
        },
        Err(error) => CollectedFile {
            test_path,
            nodes: Vec::new(),
            errors: vec![error],
        },
    }
}

/// Collects a task's file and resolves run modes.
fn prepare(registry: &TestFileRegistry, task: &WorkerTask) -> Result<TestArena, TestError> {
    let config = &task.context.runtime_config;
    let resolver = RunModeResolver::new(config)
        .map_err(|error| TestError::from_error(&error).with_name("CollectionError"))?;
    let mut arena = registry.collect(&task.entry_info, &task.setup_entries, config)?;
    resolver.resolve(&mut arena);
    Ok(arena)
}

fn from_args<T: DeserializeOwned>(args: Value) -> Result<T, RpcErrorPayload> {
    serde_json::from_value(args)
        .map_err(|error| RpcErrorPayload::new(format!("invalid arguments: {error}")))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RpcErrorPayload> {
    serde_json::to_value(value)
        .map_err(|error| RpcErrorPayload::new(format!("failed to serialize result: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcTimeout;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;
    use tessera_metadata::{
        EntryInfo, RunMode, RuntimeConfig, TaskContext, TaskKind, TestStatus,
    };

    /// Records notifications on the orchestrator side.
    #[derive(Default)]
    struct Events(Mutex<Vec<WorkerEvent>>);

    impl RpcHandler for Events {
        fn handle_request(
            &self,
            _channel: &RpcChannel,
            _run_id: RunId,
            _method: &str,
            _args: Value,
        ) -> BoxFuture<'static, Result<Value, RpcErrorPayload>> {
            async { Err(RpcErrorPayload::new("unexpected")) }.boxed()
        }

        fn handle_notification(&self, _run_id: RunId, method: &str, args: Value) {
            if let Some(event) = WorkerEvent::from_notification(method, args).unwrap() {
                self.0.lock().unwrap().push(event);
            }
        }
    }

    fn connect(registry: TestFileRegistry) -> (RpcChannel, Arc<Events>) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(theirs);
        // Kept alive by its reader task.
        RpcChannel::spawn(
            reader,
            writer,
            Arc::new(WorkerHandler::new(registry)),
            RpcTimeout::Disabled,
        );

        let events = Arc::new(Events::default());
        let (reader, writer) = tokio::io::split(ours);
        let channel = RpcChannel::spawn(reader, writer, events.clone(), RpcTimeout::Disabled);
        (channel, events)
    }

    fn task(kind: TaskKind, test_path: &str) -> WorkerTask {
        WorkerTask {
            kind,
            entry_info: EntryInfo::new(test_path, format!("dist/{test_path}")),
            context: TaskContext {
                task_id: 7,
                project: "tessera".to_owned(),
                root_path: "/project".into(),
                runtime_config: RuntimeConfig::default(),
            },
            setup_entries: Vec::new(),
            assets: None,
        }
    }

    fn registry() -> TestFileRegistry {
        let mut registry = TestFileRegistry::new();
        registry.register("math.test", |cx| {
            cx.test("adds", |cx| async move {
                let counter = cx.modules().get_or_init("counter", || Mutex::new(0));
                *counter.lock().unwrap() += 1;
                Ok(())
            });
            cx.todo("divides");
        });
        registry
    }

    #[tokio::test]
    async fn run_streams_events_before_response() {
        let (channel, events) = connect(registry());
        let run_id = RunId::new_v4();

        let value = channel
            .call(
                run_id,
                RpcMethod::RUN,
                serde_json::to_value(task(TaskKind::Run, "math.test")).unwrap(),
            )
            .await
            .unwrap();
        let output: FileRunOutput = serde_json::from_value(value).unwrap();
        assert_eq!(output.file.status, TestStatus::Pass);
        assert_eq!(output.test_results.len(), 2);

        let methods: Vec<_> = events
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.method())
            .collect();
        assert_eq!(methods.first(), Some(&RpcMethod::ON_TEST_FILE_START));
        assert_eq!(methods.get(1), Some(&RpcMethod::ON_TEST_FILE_READY));
        assert!(methods.contains(&RpcMethod::ON_TEST_CASE_RESULT));
    }

    #[tokio::test]
    async fn collect_resolves_without_running() {
        let (channel, events) = connect(registry());
        let value = channel
            .call(
                RunId::new_v4(),
                RpcMethod::COLLECT,
                serde_json::to_value(task(TaskKind::Collect, "math.test")).unwrap(),
            )
            .await
            .unwrap();
        let collected: CollectedFile = serde_json::from_value(value).unwrap();
        let modes: Vec<_> = collected
            .nodes
            .iter()
            .map(|node| (node.name.as_str(), node.mode))
            .collect();
        assert_eq!(modes, vec![("adds", RunMode::Run), ("divides", RunMode::Todo)]);
        assert!(events.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_a_file_failure() {
        let (channel, _) = connect(registry());
        let value = channel
            .call(
                RunId::new_v4(),
                RpcMethod::RUN,
                serde_json::to_value(task(TaskKind::Run, "missing.test")).unwrap(),
            )
            .await
            .unwrap();
        let output: FileRunOutput = serde_json::from_value(value).unwrap();
        assert_eq!(output.file.status, TestStatus::Fail);
        assert_eq!(
            output.file.errors[0].message,
            "no test file registered for `missing.test`"
        );
        assert!(output.test_results.is_empty());
    }

    #[tokio::test]
    async fn reset_modules_evicts_file_state() {
        let (channel, _) = connect(registry());
        let run_id = RunId::new_v4();
        let args = serde_json::to_value(task(TaskKind::Run, "math.test")).unwrap();
        channel
            .call(run_id, RpcMethod::RUN, args.clone())
            .await
            .unwrap();

        let evicted = channel
            .call(run_id, RpcMethod::RESET_MODULES, json!({ "setupIds": [] }))
            .await
            .unwrap();
        assert_eq!(evicted, json!(1));

        let evicted = channel
            .call(run_id, RpcMethod::RESET_MODULES, json!({ "setupIds": [] }))
            .await
            .unwrap();
        assert_eq!(evicted, json!(0));
    }

    #[tokio::test]
    async fn bad_arguments_are_remote_errors() {
        let (channel, _) = connect(registry());
        let error = channel
            .call(RunId::new_v4(), RpcMethod::RUN, json!({ "nope": true }))
            .await
            .unwrap_err();
        assert!(
            error.to_string().starts_with("rpc call `run` failed: invalid arguments"),
            "{error}"
        );
    }
}
