// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tessera_metadata::{TestResult, UnitStart, full_name};

/// Tracks the cases currently executing in each file, from the events workers stream back.
///
/// If a worker dies mid-file, this is the only record of what it was doing: the cases it had
/// started but not finished, and the results it had already reported.
#[derive(Debug, Default)]
pub(crate) struct RunningTests {
    files: Mutex<HashMap<Utf8PathBuf, FileProgress>>,
}

#[derive(Debug, Default)]
struct FileProgress {
    // Keyed by test ID so names come out in declaration order.
    running: BTreeMap<u32, String>,
    finished: Vec<TestResult>,
}

/// What was known about a file when it stopped being tracked.
#[derive(Debug, Default)]
pub(crate) struct FileSnapshot {
    /// Full names of cases that had started but not finished.
    pub(crate) running: Vec<String>,

    /// Results reported before tracking stopped, in arrival order.
    pub(crate) finished: Vec<TestResult>,
}

impl RunningTests {
    pub(crate) fn start_file(&self, test_path: &Utf8Path) {
        self.lock()
            .insert(test_path.to_owned(), FileProgress::default());
    }

    pub(crate) fn case_started(&self, start: &UnitStart) {
        if let Some(progress) = self.lock().get_mut(&start.test_path) {
            progress
                .running
                .insert(start.test_id, full_name(&start.parent_names, &start.name));
        }
    }

    pub(crate) fn unit_finished(&self, result: &TestResult) {
        if let Some(progress) = self.lock().get_mut(&result.test_path) {
            progress.running.remove(&result.test_id);
            progress.finished.push(result.clone());
        }
    }

    /// Stops tracking a file and returns what was known about it.
    pub(crate) fn finish_file(&self, test_path: &Utf8Path) -> FileSnapshot {
        match self.lock().remove(test_path) {
            Some(progress) => FileSnapshot {
                running: progress.running.into_values().collect(),
                finished: progress.finished,
            },
            None => FileSnapshot::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Utf8PathBuf, FileProgress>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
