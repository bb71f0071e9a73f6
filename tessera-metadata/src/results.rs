// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, time::Duration};

/// The final status of a suite, case or test file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The unit passed.
    Pass,

    /// The unit failed.
    Fail,

    /// The unit was skipped.
    Skip,

    /// The unit is a placeholder.
    Todo,
}

impl TestStatus {
    /// Returns true if this status counts as a failure.
    #[inline]
    pub fn is_fail(self) -> bool {
        self == Self::Fail
    }

    /// Returns the string representation of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Todo => "todo",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a node is a suite or a case.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A suite (a `describe` block, or the file itself).
    Suite,

    /// A test case.
    Case,
}

/// A user-visible failure attached to a test result.
///
/// This is data rather than a Rust error: it describes why a test failed, and it is serialized
/// across the worker boundary as is.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestError {
    /// The error message.
    pub message: String,

    /// A short name for the class of error, e.g. `"TimeoutError"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// A structural diff between the expected and actual values, if one was computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,

    /// A stack trace or source chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl TestError {
    /// Creates a new error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            diff: None,
            stack: None,
        }
    }

    /// Creates an error describing a unit that ran out of time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_name("TimeoutError")
    }

    /// Creates an error out of a Rust error, recording its source chain as the stack.
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(next) = source {
            chain.push(format!("caused by: {next}"));
            source = next.source();
        }
        let mut this = Self::new(error.to_string());
        if !chain.is_empty() {
            this.stack = Some(chain.join("\n"));
        }
        this
    }

    /// Sets the error name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the structural diff.
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    /// Sets the stack.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<String> for TestError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TestError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// The result of running a single suite or case.
///
/// A result is created once per execution and never mutated after it has been reported.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The collection-time identifier of the node, unique within its file.
    pub test_id: u32,

    /// Whether this is a suite or a case.
    pub kind: NodeKind,

    /// The test file this node was declared in.
    pub test_path: Utf8PathBuf,

    /// The name of the node.
    pub name: String,

    /// The names of every enclosing suite, outermost first. Does not include the file.
    pub parent_names: Vec<String>,

    /// The final status.
    pub status: TestStatus,

    /// Cumulative duration across every attempt.
    pub duration: Duration,

    /// The number of retries performed (0 if the first attempt was final).
    #[serde(default)]
    pub retry_count: u32,

    /// Errors from every failed attempt, in attempt order.
    #[serde(default)]
    pub errors: Vec<TestError>,
}

impl TestResult {
    /// Returns the parent names and the node name joined by spaces.
    pub fn full_name(&self) -> String {
        full_name(&self.parent_names, &self.name)
    }
}

/// Joins parent names and a node name the way test names are displayed and filtered.
pub fn full_name(parent_names: &[String], name: &str) -> String {
    let mut out = String::new();
    for parent in parent_names {
        out.push_str(parent);
        out.push(' ');
    }
    out.push_str(name);
    out
}

/// The result of running one test file.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileResult {
    /// The test file.
    pub test_path: Utf8PathBuf,

    /// The aggregate status of the file.
    pub status: TestStatus,

    /// Wall time spent on the file, including collection.
    pub duration: Duration,

    /// File-level errors: collection failures, worker crashes, and suite-level hook errors
    /// recorded against the file root.
    #[serde(default)]
    pub errors: Vec<TestError>,
}

impl TestFileResult {
    /// Creates a failed file result with a single error.
    pub fn failed(test_path: impl Into<Utf8PathBuf>, duration: Duration, error: TestError) -> Self {
        Self {
            test_path: test_path.into(),
            status: TestStatus::Fail,
            duration,
            errors: vec![error],
        }
    }
}

/// Everything a worker reports back after running a file.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRunOutput {
    /// The file-level result.
    pub file: TestFileResult,

    /// Results for every suite and case in the file, in completion order.
    pub test_results: Vec<TestResult>,
}
