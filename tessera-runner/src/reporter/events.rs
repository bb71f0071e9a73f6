// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::RunStats;
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use std::time::Duration;
use tessera_metadata::{ConsoleLog, RunId, TestFileResult, TestResult, UnitStart};

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and delivered to the
/// callback passed to [`TestRunner::execute`](crate::runner::TestRunner::execute).
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated, including the offset from UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the start of the test run.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

/// The kind of test event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// The test run started.
    RunStarted {
        /// The unique ID for this run.
        run_id: RunId,

        /// The number of files that will be run.
        file_count: usize,
    },

    /// A worker started working on a file.
    FileStarted {
        /// The test file.
        test_path: Utf8PathBuf,
    },

    /// A file finished collecting.
    FileReady {
        /// The test file.
        test_path: Utf8PathBuf,

        /// The number of cases collected.
        case_count: usize,
    },

    /// A suite started.
    SuiteStarted(UnitStart),

    /// A suite settled.
    SuiteFinished(TestResult),

    /// A case started.
    CaseStarted(UnitStart),

    /// A case settled.
    CaseFinished(TestResult),

    /// A test produced console output.
    ConsoleLog(ConsoleLog),

    /// A file settled.
    FileFinished(TestFileResult),

    /// A cancellation notice was received.
    RunBeginCancel {
        /// The reason this run was cancelled.
        reason: CancelReason,
    },

    /// The test run finished.
    RunFinished {
        /// The unique ID for this run.
        run_id: RunId,

        /// The time at which the run was started.
        start_time: DateTime<FixedOffset>,

        /// The amount of time it took for the files to run.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

/// The reason why a test run is being cancelled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CancelReason {
    /// The number of failed files reached the bail threshold.
    Bail,

    /// A termination signal was received.
    Signal,
}

impl CancelReason {
    /// Returns a short description of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bail => "bail threshold reached",
            Self::Signal => "signal",
        }
    }
}
