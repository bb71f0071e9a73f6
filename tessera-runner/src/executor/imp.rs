// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    RunContext, SuiteContext, TestContext,
    gate::ConcurrencyGate,
    timeout::{case_timeout_message, guard, hook_timeout_message},
};
use crate::{
    time::stopwatch,
    tree::{
        AfterEachFn, BeforeEachFn, CaseData, Cleanup, Hook, HookKind, NodeData, NodeId,
        SuiteHooks, TestArena,
    },
};
use futures::{FutureExt, future::BoxFuture};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tessera_metadata::{
    FileRunOutput, NodeKind, RunMode, TestError, TestFileResult, TestResult, TestStatus, UnitStart,
    WorkerEvent,
};
use tracing::{debug, instrument};

/// Executes a resolved arena and returns the results for the file.
///
/// Modes must already have been resolved with
/// [`RunModeResolver`](crate::run_mode::RunModeResolver). Results are streamed to the context's
/// event sink as each suite and case settles, and also returned in completion order.
#[instrument(level = "debug", skip_all, fields(test_path = %cx.test_path()))]
pub async fn run_file(arena: &TestArena, cx: &RunContext) -> FileRunOutput {
    let executor = Executor {
        arena,
        cx,
        gate: ConcurrencyGate::new(cx.runtime_config().max_concurrency),
        results: Mutex::new(Vec::new()),
    };

    let root = executor
        .run_suite(NodeId::ROOT, Arc::new(EachHooks::default()))
        .await;
    let test_results = executor
        .results
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    debug!(
        status = %root.status,
        results = test_results.len(),
        "file finished"
    );

    FileRunOutput {
        file: TestFileResult {
            test_path: arena.test_path().to_owned(),
            status: root.status,
            duration: root.duration,
            errors: root.errors,
        },
        test_results,
    }
}

/// The `before_each` and `after_each` listeners accumulated from every ancestor, outermost first.
///
/// Children receive a new concatenated list; the parent's list is never modified.
#[derive(Default)]
struct EachHooks<'a> {
    before: Vec<&'a Hook<BeforeEachFn>>,
    after: Vec<&'a Hook<AfterEachFn>>,
}

impl<'a> EachHooks<'a> {
    fn extend(&self, hooks: &'a SuiteHooks) -> Self {
        Self {
            before: self.before.iter().copied().chain(&hooks.before_each).collect(),
            after: self.after.iter().copied().chain(&hooks.after_each).collect(),
        }
    }
}

struct SuiteOutcome {
    status: TestStatus,
    duration: Duration,
    errors: Vec<TestError>,
}

struct PendingCleanup {
    kind: HookKind,
    limit: Duration,
    cleanup: Cleanup,
}

struct Executor<'a> {
    arena: &'a TestArena,
    cx: &'a RunContext,
    gate: ConcurrencyGate,
    results: Mutex<Vec<TestResult>>,
}

impl<'a> Executor<'a> {
    fn run_node(&'a self, id: NodeId, hooks: Arc<EachHooks<'a>>) -> BoxFuture<'a, TestStatus> {
        match &self.arena.node(id).data {
            NodeData::Suite(_) => async move { self.run_suite(id, hooks).await.status }.boxed(),
            NodeData::Case(_) => self.run_case(id, hooks).boxed(),
        }
    }

    fn run_suite(&'a self, id: NodeId, hooks: Arc<EachHooks<'a>>) -> BoxFuture<'a, SuiteOutcome> {
        async move {
            let node = self.arena.node(id);
            let NodeData::Suite(suite) = &node.data else {
                unreachable!("run_suite called on a case");
            };

            if suite.no_tests {
                let outcome = if self.cx.runtime_config().pass_with_no_tests {
                    SuiteOutcome {
                        status: TestStatus::Skip,
                        duration: Duration::ZERO,
                        errors: Vec::new(),
                    }
                } else {
                    SuiteOutcome {
                        status: TestStatus::Fail,
                        duration: Duration::ZERO,
                        errors: vec![TestError::new(format!(
                            "No test found in suite: `{}`",
                            node.name()
                        ))],
                    }
                };
                return self.finish_suite(id, outcome);
            }

            match node.mode() {
                RunMode::Skip | RunMode::Todo => {
                    let status = unrun_status(node.mode());
                    self.report_subtree(id, None);
                    let outcome = SuiteOutcome {
                        status,
                        duration: Duration::ZERO,
                        errors: Vec::new(),
                    };
                    return self.finish_suite(id, outcome);
                }
                RunMode::Run | RunMode::Only => {}
            }

            if id != NodeId::ROOT {
                self.cx
                    .events()
                    .emit(WorkerEvent::TestSuiteStart(self.unit_start(id)));
            }

            let start = stopwatch();
            let name: Arc<str> = node.name().into();
            let suite_cx = SuiteContext::new(self.cx.clone(), id.test_id(), name);
            let hook_timeout = self.cx.runtime_config().hook_timeout;
            let mut errors = Vec::new();
            let mut cleanups = Vec::new();

            // 1. before_all hooks, in declaration order.
            let mut before_all_failed = false;
            for hook in &suite.hooks.before_all {
                let limit = hook.timeout.unwrap_or(hook_timeout);
                let res = guard(|| (hook.f)(suite_cx.clone()), limit, || {
                    hook_timeout_message(HookKind::BeforeAll, limit)
                })
                .await;
                match res {
                    Ok(Some(cleanup)) => cleanups.push(PendingCleanup {
                        kind: HookKind::BeforeAll,
                        limit,
                        cleanup,
                    }),
                    Ok(None) => {}
                    Err(error) => {
                        errors.push(error);
                        before_all_failed = true;
                        break;
                    }
                }
            }

            let mut children_failed = false;
            if before_all_failed {
                // 2. The whole subtree is skipped and the error is recorded once, here.
                debug!(suite = node.name(), "beforeAll failed, skipping subtree");
                self.report_subtree(id, Some(TestStatus::Skip));
            } else {
                // 3. Children, gated by concurrency.
                let child_hooks = Arc::new(hooks.extend(&suite.hooks));
                let statuses = self
                    .gate
                    .run(
                        &suite.children,
                        |&child| self.arena.node(child).concurrent(),
                        |&child| self.run_node(child, child_hooks.clone()),
                    )
                    .await;
                children_failed = statuses.iter().any(|status| status.is_fail());

                // 4. after_all hooks, in reverse declaration order.
                for hook in suite.hooks.after_all.iter().rev() {
                    let limit = hook.timeout.unwrap_or(hook_timeout);
                    let res = guard(|| (hook.f)(suite_cx.clone()), limit, || {
                        hook_timeout_message(HookKind::AfterAll, limit)
                    })
                    .await;
                    if let Err(error) = res {
                        errors.push(error);
                    }
                }
            }

            // Cleanups from before_all run in both cases, in reverse acquisition order.
            errors.extend(run_cleanups(cleanups).await);

            let status = if children_failed || !errors.is_empty() {
                TestStatus::Fail
            } else {
                TestStatus::Pass
            };
            self.finish_suite(
                id,
                SuiteOutcome {
                    status,
                    duration: start.elapsed(),
                    errors,
                },
            )
        }
        .boxed()
    }

    async fn run_case(&'a self, id: NodeId, hooks: Arc<EachHooks<'a>>) -> TestStatus {
        let node = self.arena.node(id);
        let NodeData::Case(case) = &node.data else {
            unreachable!("run_case called on a suite");
        };

        if !node.mode().is_runnable() {
            let status = unrun_status(node.mode());
            self.report(self.arena.result_for(id, status, Duration::ZERO, 0, Vec::new()));
            return status;
        }

        self.cx
            .events()
            .emit(WorkerEvent::TestCaseStart(self.unit_start(id)));

        let config = self.cx.runtime_config();
        let retry = case.retry.unwrap_or(config.retry);
        let limit = case.timeout.unwrap_or(config.test_timeout);
        let name: Arc<str> = node.name().into();

        let mut duration = Duration::ZERO;
        let mut errors = Vec::new();
        let mut status = TestStatus::Fail;
        let mut retry_count = 0;

        for attempt in 0..=retry {
            retry_count = attempt;
            let test_cx =
                TestContext::new(self.cx.clone(), id.test_id(), name.clone(), attempt + 1);
            let start = stopwatch();
            let attempt_errors = self.run_attempt(case, &test_cx, &hooks, limit).await;
            duration += start.elapsed();

            if attempt_errors.is_empty() {
                status = TestStatus::Pass;
                break;
            }
            debug!(
                case = %node.full_name(),
                attempt = attempt + 1,
                total = retry + 1,
                "attempt failed"
            );
            errors.extend(attempt_errors);
        }

        self.report(
            self.arena
                .result_for(id, status, duration, retry_count, errors),
        );
        status
    }

    /// Runs one attempt of a case and returns its errors. An empty list means the attempt passed.
    async fn run_attempt(
        &self,
        case: &CaseData,
        test_cx: &TestContext,
        hooks: &EachHooks<'a>,
        limit: Duration,
    ) -> Vec<TestError> {
        let hook_timeout = self.cx.runtime_config().hook_timeout;
        let mut errors = Vec::new();
        let mut cleanups = Vec::new();

        // 1. before_each, root ancestor first.
        let mut before_each_failed = false;
        for hook in &hooks.before {
            let hook_limit = hook.timeout.unwrap_or(hook_timeout);
            let res = guard(|| (hook.f)(test_cx.clone()), hook_limit, || {
                hook_timeout_message(HookKind::BeforeEach, hook_limit)
            })
            .await;
            match res {
                Ok(Some(cleanup)) => cleanups.push(PendingCleanup {
                    kind: HookKind::BeforeEach,
                    limit: hook_limit,
                    cleanup,
                }),
                Ok(None) => {}
                Err(error) => {
                    errors.push(error);
                    before_each_failed = true;
                    break;
                }
            }
        }

        // 2 and 3. The body, under its own timeout, with expect-to-fail inversion.
        if !before_each_failed {
            let res = guard(|| (case.body)(test_cx.clone()), limit, || {
                case_timeout_message(test_cx.name(), limit)
            })
            .await;
            match (res, case.fails) {
                (Ok(()), false) | (Err(_), true) => {}
                (Err(error), false) => errors.push(error),
                (Ok(()), true) => errors.push(TestError::new("Expect test to fail")),
            }
        }

        // 4. after_each innermost first, then cleanups in reverse acquisition order.
        for hook in hooks.after.iter().rev() {
            let hook_limit = hook.timeout.unwrap_or(hook_timeout);
            let res = guard(|| (hook.f)(test_cx.clone()), hook_limit, || {
                hook_timeout_message(HookKind::AfterEach, hook_limit)
            })
            .await;
            if let Err(error) = res {
                errors.push(error);
            }
        }
        errors.extend(run_cleanups(cleanups).await);

        errors
    }

    fn finish_suite(&self, id: NodeId, outcome: SuiteOutcome) -> SuiteOutcome {
        if id != NodeId::ROOT {
            let result = self.arena.result_for(
                id,
                outcome.status,
                outcome.duration,
                0,
                outcome.errors.clone(),
            );
            self.report(result);
        }
        outcome
    }

    /// Reports every descendant of `id` without running it.
    ///
    /// With `force` unset, each node reports the status its own mode implies.
    fn report_subtree(&self, id: NodeId, force: Option<TestStatus>) {
        for descendant in self.arena.descendants(id) {
            let status = force.unwrap_or_else(|| unrun_status(self.arena.node(descendant).mode()));
            self.report(
                self.arena
                    .result_for(descendant, status, Duration::ZERO, 0, Vec::new()),
            );
        }
    }

    fn report(&self, result: TestResult) {
        let event = match result.kind {
            NodeKind::Suite => WorkerEvent::TestSuiteResult(result.clone()),
            NodeKind::Case => WorkerEvent::TestCaseResult(result.clone()),
        };
        self.cx.events().emit(event);
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    fn unit_start(&self, id: NodeId) -> UnitStart {
        let node = self.arena.node(id);
        UnitStart {
            test_path: self.arena.test_path().to_owned(),
            test_id: id.test_id(),
            name: node.name().to_owned(),
            parent_names: node.parent_names().to_vec(),
        }
    }
}

fn unrun_status(mode: RunMode) -> TestStatus {
    match mode {
        RunMode::Todo => TestStatus::Todo,
        RunMode::Skip | RunMode::Run | RunMode::Only => TestStatus::Skip,
    }
}

async fn run_cleanups(cleanups: Vec<PendingCleanup>) -> Vec<TestError> {
    let mut errors = Vec::new();
    for PendingCleanup {
        kind,
        limit,
        cleanup,
    } in cleanups.into_iter().rev()
    {
        let res = guard(|| cleanup.call(), limit, || hook_timeout_message(kind, limit)).await;
        if let Err(error) = res {
            errors.push(error);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::EventSink,
        run_mode::RunModeResolver,
        tree::{Collector, Declare},
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tessera_metadata::RuntimeConfig;
    use tokio::time::Instant;

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, entry: &str) {
        log.lock().unwrap().push(entry.to_owned());
    }

    fn collect(config: &RuntimeConfig, f: impl FnOnce(&mut Collector)) -> TestArena {
        let mut c = Collector::new("f.test", config);
        f(&mut c);
        let mut arena = c.finish();
        RunModeResolver::new(config).unwrap().resolve(&mut arena);
        arena
    }

    async fn run(arena: &TestArena, config: &RuntimeConfig) -> FileRunOutput {
        let cx = RunContext::new("f.test", config.clone(), EventSink::discard());
        run_file(arena, &cx).await
    }

    fn result<'o>(output: &'o FileRunOutput, full_name: &str) -> &'o TestResult {
        output
            .test_results
            .iter()
            .find(|result| result.full_name() == full_name)
            .unwrap_or_else(|| panic!("no result for {full_name}"))
    }

    fn messages(result: &TestResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn each_hooks_nest_around_the_case() {
        let config = RuntimeConfig::default();
        let log = Log::default();
        let arena = collect(&config, |c| {
            let l = log.clone();
            c.before_each(move |_| {
                let l = l.clone();
                async move {
                    push(&l, "before root");
                    Ok(None)
                }
            });
            let l = log.clone();
            c.after_each(move |_| {
                let l = l.clone();
                async move {
                    push(&l, "after root");
                    Ok(())
                }
            });
            c.describe("s", |c| {
                let l = log.clone();
                c.before_each(move |_| {
                    let l = l.clone();
                    async move {
                        push(&l, "before s");
                        let cleanup_log = l.clone();
                        Ok(Some(Cleanup::new(move || async move {
                            push(&cleanup_log, "cleanup s");
                            Ok(())
                        })))
                    }
                });
                let l = log.clone();
                c.after_each(move |_| {
                    let l = l.clone();
                    async move {
                        push(&l, "after s");
                        Ok(())
                    }
                });
                let l = log.clone();
                c.test("case", move |_| {
                    let l = l.clone();
                    async move {
                        push(&l, "case");
                        Ok(())
                    }
                });
            });
        });

        let output = run(&arena, &config).await;
        assert_eq!(output.file.status, TestStatus::Pass);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "before root",
                "before s",
                "case",
                "after s",
                "after root",
                "cleanup s"
            ]
        );
    }

    #[tokio::test]
    async fn before_all_failure_skips_subtree() {
        let config = RuntimeConfig::default();
        let log = Log::default();
        let arena = collect(&config, |c| {
            c.describe("db", |c| {
                let l = log.clone();
                c.before_all(move |_| {
                    let l = l.clone();
                    async move {
                        let cleanup_log = l.clone();
                        Ok(Some(Cleanup::new(move || async move {
                            push(&cleanup_log, "first cleanup");
                            Ok(())
                        })))
                    }
                });
                c.before_all(|_| async { Err(TestError::new("db down")) });
                let l = log.clone();
                c.after_all(move |_| {
                    let l = l.clone();
                    async move {
                        push(&l, "after all");
                        Ok(())
                    }
                });
                c.test("reads", |_| async { Err(TestError::new("never runs")) });
                c.describe("nested", |c| {
                    c.test("writes", |_| async { Err(TestError::new("never runs")) });
                });
            });
            c.test("sibling", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;

        let db = result(&output, "db");
        assert_eq!(db.status, TestStatus::Fail);
        assert_eq!(messages(db), vec!["db down"]);
        for name in ["db reads", "db nested", "db nested writes"] {
            let skipped = result(&output, name);
            assert_eq!(skipped.status, TestStatus::Skip, "{name} is skipped");
            assert!(skipped.errors.is_empty());
        }
        assert_eq!(result(&output, "sibling").status, TestStatus::Pass);

        let fails = output
            .test_results
            .iter()
            .filter(|r| r.status == TestStatus::Fail)
            .count();
        assert_eq!(fails, 1, "exactly one failure, recorded at the suite");
        assert_eq!(*log.lock().unwrap(), vec!["first cleanup"]);
    }

    #[tokio::test]
    async fn retry_keeps_errors_from_every_failed_attempt() {
        let config = RuntimeConfig::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let arena = collect(&config, |c| {
            let attempts = attempts.clone();
            c.test_with(Declare::new().retry(3), "flaky", move |cx| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if cx.attempt() < 3 {
                        Err(TestError::new(format!("attempt {}", cx.attempt())))
                    } else {
                        Ok(())
                    }
                }
            });
        });

        let output = run(&arena, &config).await;
        let flaky = result(&output, "flaky");
        assert_eq!(flaky.status, TestStatus::Pass);
        assert_eq!(flaky.retry_count, 2);
        assert_eq!(messages(flaky), vec!["attempt 1", "attempt 2"]);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_run_out() {
        let config = RuntimeConfig {
            retry: 1,
            ..RuntimeConfig::default()
        };
        let arena = collect(&config, |c| {
            c.test("broken", |cx| async move {
                Err(TestError::new(format!("attempt {}", cx.attempt())))
            });
        });

        let output = run(&arena, &config).await;
        let broken = result(&output, "broken");
        assert_eq!(broken.status, TestStatus::Fail);
        assert_eq!(broken.retry_count, 1);
        assert_eq!(messages(broken), vec!["attempt 1", "attempt 2"]);
        assert_eq!(output.file.status, TestStatus::Pass, "no file-level errors");
    }

    #[tokio::test]
    async fn expect_to_fail_inverts_status() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.test_with(Declare::new().fails(), "throws", |_| async {
                Err(TestError::new("boom"))
            });
            c.test_with(Declare::new().fails(), "passes", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;
        assert_eq!(result(&output, "throws").status, TestStatus::Pass);
        let passes = result(&output, "passes");
        assert_eq!(passes.status, TestStatus::Fail);
        assert_eq!(messages(passes), vec!["Expect test to fail"]);
    }

    #[tokio::test(start_paused = true)]
    async fn case_timeout() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.test_with(
                Declare::new().timeout(Duration::from_millis(10)),
                "slow",
                |_| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                },
            );
        });

        let output = run(&arena, &config).await;
        let slow = result(&output, "slow");
        assert_eq!(slow.status, TestStatus::Fail);
        assert_eq!(messages(slow), vec!["slow timed out in 10ms"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hook_timeout_fails_the_case() {
        let config = RuntimeConfig {
            hook_timeout: Duration::from_millis(20),
            ..RuntimeConfig::default()
        };
        let log = Log::default();
        let arena = collect(&config, |c| {
            c.before_each(|_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(None)
            });
            let l = log.clone();
            c.after_each(move |_| {
                let l = l.clone();
                async move {
                    push(&l, "after each");
                    Ok(())
                }
            });
            let l = log.clone();
            c.test("case", move |_| {
                let l = l.clone();
                async move {
                    push(&l, "body");
                    Ok(())
                }
            });
        });

        let output = run(&arena, &config).await;
        let case = result(&output, "case");
        assert_eq!(case.status, TestStatus::Fail);
        assert_eq!(messages(case), vec!["beforeEach hook timed out in 20ms"]);
        assert_eq!(*log.lock().unwrap(), vec!["after each"], "body skipped");
    }

    #[tokio::test]
    async fn after_each_failure_fails_a_passing_case() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.after_each(|_| async { Err(TestError::new("teardown broke")) });
            c.test("fine", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;
        let fine = result(&output, "fine");
        assert_eq!(fine.status, TestStatus::Fail);
        assert_eq!(messages(fine), vec!["teardown broke"]);
    }

    #[tokio::test]
    async fn panicking_case_is_a_failure() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.test("asserts", |_| async {
                let sum = 1 + 1;
                assert_eq!(sum, 3, "math is broken");
                Ok(())
            });
            c.test("after", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;
        let asserts = result(&output, "asserts");
        assert_eq!(asserts.status, TestStatus::Fail);
        assert!(asserts.errors[0].message.contains("math is broken"));
        assert_eq!(result(&output, "after").status, TestStatus::Pass);
    }

    #[tokio::test]
    async fn panic_before_the_future_is_returned_is_a_failure() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.test("indexes", |_| {
                let bytes: Vec<u8> = Vec::new();
                let _byte = bytes[3];
                async { Ok(()) }
            });
            c.test("after", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;
        let indexes = result(&output, "indexes");
        assert_eq!(indexes.status, TestStatus::Fail);
        assert_eq!(indexes.errors[0].name.as_deref(), Some("Panic"));
        assert!(indexes.errors[0].message.contains("index out of bounds"));
        assert_eq!(result(&output, "after").status, TestStatus::Pass);
    }

    #[tokio::test]
    async fn panicking_hook_closure_fails_the_suite() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.describe("s", |c| {
                c.before_all(|_| -> crate::tree::TestFuture<Option<Cleanup>> {
                    panic!("could not connect");
                });
                c.test("a", |_| async { Ok(()) });
            });
        });

        let output = run(&arena, &config).await;
        let suite = result(&output, "s");
        assert_eq!(suite.status, TestStatus::Fail);
        assert_eq!(messages(suite), vec!["could not connect"]);
        assert_eq!(result(&output, "s a").status, TestStatus::Skip);
    }

    #[tokio::test]
    async fn empty_file() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |_| {});
        let output = run(&arena, &config).await;
        assert_eq!(output.file.status, TestStatus::Fail);
        assert_eq!(
            output.file.errors[0].message,
            "No test found in suite: `f.test`"
        );

        let config = RuntimeConfig {
            pass_with_no_tests: true,
            ..RuntimeConfig::default()
        };
        let arena = collect(&config, |_| {});
        let output = run(&arena, &config).await;
        assert_eq!(output.file.status, TestStatus::Skip);
        assert!(output.file.errors.is_empty());
    }

    #[tokio::test]
    async fn file_with_only_an_empty_suite_fails() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| c.describe("only empty", |_| {}));

        let output = run(&arena, &config).await;
        let suite = result(&output, "only empty");
        assert_eq!(suite.status, TestStatus::Fail);
        assert_eq!(messages(suite), vec!["No test found in suite: `only empty`"]);
        assert_eq!(output.file.status, TestStatus::Fail);
    }

    #[tokio::test]
    async fn nested_empty_suite_fails_its_ancestors() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.describe("outer", |c| c.describe("inner", |_| {}));
            c.test("passes", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;
        let inner = result(&output, "outer inner");
        assert_eq!(inner.status, TestStatus::Fail);
        assert_eq!(messages(inner), vec!["No test found in suite: `inner`"]);
        assert_eq!(result(&output, "outer").status, TestStatus::Fail);
        assert_eq!(result(&output, "passes").status, TestStatus::Pass);
        assert_eq!(output.file.status, TestStatus::Fail);

        let config = RuntimeConfig {
            pass_with_no_tests: true,
            ..RuntimeConfig::default()
        };
        let arena = collect(&config, |c| c.describe("outer", |c| c.describe("inner", |_| {})));
        let output = run(&arena, &config).await;
        assert_eq!(result(&output, "outer inner").status, TestStatus::Skip);
        assert_eq!(output.file.status, TestStatus::Pass);
    }

    #[tokio::test]
    async fn skipped_and_todo_cases_are_reported() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.test_with(Declare::new().skip(), "skipped", |_| async { Ok(()) });
            c.todo("planned");
            c.test("runs", |_| async { Ok(()) });
        });

        let output = run(&arena, &config).await;
        assert_eq!(result(&output, "skipped").status, TestStatus::Skip);
        assert_eq!(result(&output, "planned").status, TestStatus::Todo);
        assert_eq!(result(&output, "runs").status, TestStatus::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_cases_respect_max_concurrency() {
        let config = RuntimeConfig {
            max_concurrency: 2,
            ..RuntimeConfig::default()
        };
        let arena = collect(&config, |c| {
            c.describe_with(Declare::new().concurrent(), "parallel", |c| {
                for index in 0..5 {
                    c.test(format!("sleeps {index}"), |_| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    });
                }
            });
        });

        let start = Instant::now();
        let output = run(&arena, &config).await;
        assert_eq!(output.file.status, TestStatus::Pass);
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn events_stream_starts_before_results() {
        let config = RuntimeConfig::default();
        let arena = collect(&config, |c| {
            c.describe("s", |c| {
                c.test("a", |cx| async move {
                    cx.log("hello");
                    Ok(())
                });
            });
        });

        let (sink, mut receiver) = EventSink::channel();
        let cx = RunContext::new("f.test", config.clone(), sink);
        run_file(&arena, &cx).await;
        drop(cx);

        let mut methods = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            methods.push(event.method());
        }
        assert_eq!(
            methods,
            vec![
                "onTestSuiteStart",
                "onTestCaseStart",
                "onConsoleLog",
                "onTestCaseResult",
                "onTestSuiteResult",
            ]
        );
    }
}
