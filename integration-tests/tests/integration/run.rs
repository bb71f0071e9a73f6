// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::*;
use indoc::indoc;
use integration_tests::fixtures::entry;
use pretty_assertions::assert_eq;
use tessera_metadata::{LogStream, TesseraExitCode};
use tessera_runner::{
    pipeline::TestFiles,
    reporter::{CancelReason, RunStats, TestEventKind},
};

#[test]
fn run_reports_results_and_events() -> color_eyre::Result<()> {
    let config = TesseraConfig::default_config("/fixtures");
    let mut runner = build_runner(&config, PoolMode::Run, None)?;
    let files = TestFiles::new(vec![entry("pass"), entry("fail")], Vec::new());

    let mut events = Vec::new();
    let summary = runner.execute(&files, |event| events.push(event.kind));

    assert_eq!(
        file_statuses(&summary),
        vec![("pass.test", TestStatus::Pass), ("fail.test", TestStatus::Fail)]
    );
    assert_eq!(
        summary.stats,
        RunStats {
            initial_file_count: 2,
            files_finished: 2,
            files_passed: 1,
            files_failed: 1,
            files_skipped: 0,
            passed: 3,
            failed: 1,
            skipped: 1,
            todo: 1,
        }
    );
    assert_eq!(summary.exit_code(), TesseraExitCode::TEST_RUN_FAILED);

    let failed: Vec<_> = summary.failed_cases().map(|r| r.full_name()).collect();
    assert_eq!(failed, vec!["fails"]);
    let fails = find_case(&summary, "fail.test", "fails");
    assert_eq!(fails.errors[0].message, "expected 1 to be 2");

    assert!(
        matches!(events.first(), Some(TestEventKind::RunStarted { file_count: 2, .. })),
        "first event is RunStarted"
    );
    assert!(
        matches!(
            events.last(),
            Some(TestEventKind::RunFinished { run_id, .. }) if *run_id == summary.run_id
        ),
        "last event is RunFinished"
    );
    let finished = events
        .iter()
        .filter(|kind| matches!(kind, TestEventKind::FileFinished(_)))
        .count();
    assert_eq!(finished, 2);
    assert!(
        events.iter().any(|kind| matches!(
            kind,
            TestEventKind::ConsoleLog(log)
                if log.stream == LogStream::Stdout && log.content == "adding"
        )),
        "console output from `math adds` is forwarded"
    );

    runner.close();
    Ok(())
}

#[test]
fn crashed_worker_fails_only_its_file() -> color_eyre::Result<()> {
    let config = TesseraConfig::default_config("/fixtures");
    let mut runner = build_runner(&config, PoolMode::Run, None)?;
    let files = TestFiles::new(vec![entry("crash"), entry("pass")], Vec::new());

    let summary = runner.execute(&files, |_| {});

    assert_eq!(
        file_statuses(&summary),
        vec![("crash.test", TestStatus::Fail), ("pass.test", TestStatus::Pass)]
    );
    let error = &summary.results[0].errors[0];
    assert_eq!(error.name.as_deref(), Some("WorkerError"));
    assert!(
        error.message.starts_with("Worker exited unexpectedly"),
        "unexpected message: {}",
        error.message
    );
    assert!(
        error
            .message
            .ends_with("\nTests running at the time:\n  - crashes aborts"),
        "crash names the case that was running: {}",
        error.message
    );
    assert_eq!(error.stack, None);

    // Results that settled before the crash are kept.
    let before = find_case(&summary, "crash.test", "crashes before the crash");
    assert_eq!(before.status, TestStatus::Pass);
    Ok(())
}

#[test]
fn bail_cancels_remaining_files() -> color_eyre::Result<()> {
    let (_dir, config) = config_with(indoc! {r#"
        [pool]
        max-workers = 1
    "#})?;
    let mut runner = build_runner(&config, PoolMode::Run, Some(1))?;
    let files = TestFiles::new(
        vec![entry("fail"), entry("pass"), entry("state-a")],
        Vec::new(),
    );

    let mut events = Vec::new();
    let summary = runner.execute(&files, |event| events.push(event.kind));

    assert_eq!(
        file_statuses(&summary),
        vec![
            ("fail.test", TestStatus::Fail),
            ("pass.test", TestStatus::Skip),
            ("state-a.test", TestStatus::Skip),
        ]
    );
    assert_eq!(summary.cancel_reason, Some(CancelReason::Bail));
    let cancels: Vec<_> = events
        .iter()
        .filter_map(|kind| match kind {
            TestEventKind::RunBeginCancel { reason } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(cancels, vec![CancelReason::Bail]);
    Ok(())
}

#[test]
fn reused_workers_reset_file_modules() -> color_eyre::Result<()> {
    let (_dir, config) = config_with(indoc! {r#"
        [pool]
        isolate = false
        max-workers = 1
    "#})?;
    let mut runner = build_runner(&config, PoolMode::Run, None)?;
    let files = TestFiles::new(vec![entry("state-a"), entry("state-b")], Vec::new());

    let summary = runner.execute(&files, |_| {});

    assert_eq!(
        file_statuses(&summary),
        vec![
            ("state-a.test", TestStatus::Pass),
            ("state-b.test", TestStatus::Pass),
        ],
        "errors: {:?}",
        summary.failed_cases().collect::<Vec<_>>()
    );
    assert_eq!(summary.exit_code(), TesseraExitCode::OK);
    runner.close();
    Ok(())
}

#[test]
fn name_pattern_skips_other_cases() -> color_eyre::Result<()> {
    let (_dir, config) = config_with(indoc! {r#"
        [test]
        name-pattern = "^math adds$"
    "#})?;
    let mut runner = build_runner(&config, PoolMode::Run, None)?;
    let files = TestFiles::new(vec![entry("pass")], Vec::new());

    let summary = runner.execute(&files, |_| {});

    assert_eq!(
        find_case(&summary, "pass.test", "math adds").status,
        TestStatus::Pass
    );
    assert_eq!(
        find_case(&summary, "pass.test", "math subtracts").status,
        TestStatus::Skip
    );
    assert_eq!(summary.exit_code(), TesseraExitCode::OK);
    Ok(())
}

#[test]
fn collect_lists_cases_without_running_them() -> color_eyre::Result<()> {
    let config = TesseraConfig::default_config("/fixtures");
    let mut runner = build_runner(&config, PoolMode::Run, None)?;
    let files = TestFiles::new(vec![entry("pass"), entry("missing")], Vec::new());

    let collected = runner.collect(&files);

    assert_eq!(collected.len(), 2);
    let names: Vec<_> = collected[0]
        .nodes
        .iter()
        .map(|node| node.name.as_str())
        .collect();
    for name in ["math", "adds", "subtracts", "divides"] {
        assert!(names.contains(&name), "`{name}` collected: {names:?}");
    }
    assert!(collected[0].errors.is_empty(), "{:?}", collected[0].errors);

    assert_eq!(collected[1].test_path.as_str(), "missing.test");
    assert_eq!(collected[1].errors.len(), 1);
    assert_eq!(collected[1].errors[0].name.as_deref(), Some("CollectionError"));
    assert_eq!(
        collected[1].errors[0].message,
        "no test file registered for `missing.test`"
    );
    Ok(())
}
