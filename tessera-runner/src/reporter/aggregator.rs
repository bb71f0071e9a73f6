// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{CancelReason, TestEvent, TestEventKind};
use crate::{
    pool::PoolEvent,
    time::{StopwatchStart, stopwatch},
};
use chrono::Local;
use std::time::Duration;
use tessera_metadata::{
    NodeKind, RunId, TesseraExitCode, TestFileResult, TestResult, TestStatus, WorkerEvent,
};

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The number of files that were expected to be run at the beginning.
    pub initial_file_count: usize,

    /// The number of files that settled, including files skipped by cancellation.
    pub files_finished: usize,

    /// The number of files that passed.
    pub files_passed: usize,

    /// The number of files that failed.
    pub files_failed: usize,

    /// The number of files that were skipped, either entirely or because the run was cancelled.
    pub files_skipped: usize,

    /// The number of cases that passed.
    pub passed: usize,

    /// The number of cases that failed.
    pub failed: usize,

    /// The number of cases that were skipped.
    pub skipped: usize,

    /// The number of placeholder cases.
    pub todo: usize,
}

impl RunStats {
    /// Returns true if no file or case failed.
    pub fn is_success(&self) -> bool {
        !self.any_failed()
    }

    /// Returns true if any file or case failed.
    #[inline]
    pub fn any_failed(&self) -> bool {
        self.files_failed > 0 || self.failed > 0
    }

    /// Returns the number of cases that settled.
    pub fn case_count(&self) -> usize {
        self.passed + self.failed + self.skipped + self.todo
    }

    pub(crate) fn on_file_finished(&mut self, file: &TestFileResult) {
        self.files_finished += 1;
        match file.status {
            TestStatus::Pass => self.files_passed += 1,
            TestStatus::Fail => self.files_failed += 1,
            TestStatus::Skip | TestStatus::Todo => self.files_skipped += 1,
        }
    }

    pub(crate) fn on_case_finished(&mut self, result: &TestResult) {
        if result.kind != NodeKind::Case {
            return;
        }
        match result.status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Todo => self.todo += 1,
        }
    }
}

/// The final outcome of a test run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// The unique ID for this run.
    pub run_id: RunId,

    /// One result per file, in dispatch order.
    pub results: Vec<TestFileResult>,

    /// Every suite and case result.
    pub test_results: Vec<TestResult>,

    /// Statistics for the run.
    pub stats: RunStats,

    /// The amount of time the run took.
    pub elapsed: Duration,

    /// Why the run was cancelled, if it was.
    pub cancel_reason: Option<CancelReason>,

    pass_with_no_tests: bool,
}

impl RunSummary {
    /// Returns the process exit code for this run.
    ///
    /// A run fails if any file or case failed, if it was interrupted by a signal, or if nothing
    /// ran at all and `pass_with_no_tests` is off.
    pub fn exit_code(&self) -> i32 {
        if self.stats.any_failed() || self.cancel_reason == Some(CancelReason::Signal) {
            return TesseraExitCode::TEST_RUN_FAILED;
        }
        if self.stats.initial_file_count == 0 && !self.pass_with_no_tests {
            return TesseraExitCode::TEST_RUN_FAILED;
        }
        TesseraExitCode::OK
    }

    /// Returns the results of every failed case, with their full names.
    pub fn failed_cases(&self) -> impl Iterator<Item = &TestResult> + '_ {
        self.test_results
            .iter()
            .filter(|result| result.kind == NodeKind::Case && result.status.is_fail())
    }
}

/// Converts pool events into [`TestEvent`]s and keeps run statistics up to date.
#[derive(Debug)]
pub(crate) struct RunAggregator {
    run_id: RunId,
    stopwatch: StopwatchStart,
    stats: RunStats,
    cancel_reason: Option<CancelReason>,
}

impl RunAggregator {
    pub(crate) fn new(run_id: RunId, file_count: usize) -> Self {
        Self {
            run_id,
            stopwatch: stopwatch(),
            stats: RunStats {
                initial_file_count: file_count,
                ..RunStats::default()
            },
            cancel_reason: None,
        }
    }

    pub(crate) fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub(crate) fn run_started(&self) -> TestEvent {
        self.event(TestEventKind::RunStarted {
            run_id: self.run_id,
            file_count: self.stats.initial_file_count,
        })
    }

    pub(crate) fn on_pool_event(&mut self, event: PoolEvent) -> TestEvent {
        let kind = match event {
            PoolEvent::Worker(WorkerEvent::TestFileStart(start)) => TestEventKind::FileStarted {
                test_path: start.test_path,
            },
            PoolEvent::Worker(WorkerEvent::TestFileReady(ready)) => TestEventKind::FileReady {
                test_path: ready.test_path,
                case_count: ready.case_count,
            },
            PoolEvent::Worker(WorkerEvent::TestSuiteStart(start)) => {
                TestEventKind::SuiteStarted(start)
            }
            PoolEvent::Worker(WorkerEvent::TestSuiteResult(result)) => {
                TestEventKind::SuiteFinished(result)
            }
            PoolEvent::Worker(WorkerEvent::TestCaseStart(start)) => {
                TestEventKind::CaseStarted(start)
            }
            PoolEvent::Worker(WorkerEvent::TestCaseResult(result)) => {
                TestEventKind::CaseFinished(result)
            }
            PoolEvent::Worker(WorkerEvent::ConsoleLog(log)) => TestEventKind::ConsoleLog(log),
            PoolEvent::FileFinished(file) => {
                self.stats.on_file_finished(&file);
                TestEventKind::FileFinished(file)
            }
        };
        self.event(kind)
    }

    /// Records a cancellation. Returns an event only for the first one.
    pub(crate) fn begin_cancel(&mut self, reason: CancelReason) -> Option<TestEvent> {
        if self.cancel_reason.is_some() {
            return None;
        }
        self.cancel_reason = Some(reason);
        Some(self.event(TestEventKind::RunBeginCancel { reason }))
    }

    /// Finishes the run.
    ///
    /// Case statistics are computed from the final results rather than from streamed events, so
    /// results that were never streamed (for example from a crashed worker) are still counted.
    pub(crate) fn finish(
        mut self,
        results: Vec<TestFileResult>,
        test_results: Vec<TestResult>,
        pass_with_no_tests: bool,
    ) -> (TestEvent, RunSummary) {
        for result in &test_results {
            self.stats.on_case_finished(result);
        }
        let snapshot = self.stopwatch.snapshot();
        let event = self.event(TestEventKind::RunFinished {
            run_id: self.run_id,
            start_time: snapshot.start_time.fixed_offset(),
            elapsed: snapshot.duration,
            run_stats: self.stats,
        });
        let summary = RunSummary {
            run_id: self.run_id,
            results,
            test_results,
            stats: self.stats,
            elapsed: snapshot.duration,
            cancel_reason: self.cancel_reason,
            pass_with_no_tests,
        };
        (event, summary)
    }

    fn event(&self, kind: TestEventKind) -> TestEvent {
        TestEvent {
            timestamp: Local::now().fixed_offset(),
            elapsed: self.stopwatch.elapsed(),
            kind,
        }
    }
}
