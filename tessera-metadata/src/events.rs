// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{RpcMethod, TestResult, WireError};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A progress event pushed from a worker to the orchestrator.
///
/// Each variant corresponds to one notification method in [`RpcMethod`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WorkerEvent {
    /// A worker started working on a file.
    TestFileStart(TestFileStart),

    /// A file finished collecting and is about to execute.
    TestFileReady(TestFileReady),

    /// A suite started.
    TestSuiteStart(UnitStart),

    /// A suite settled.
    TestSuiteResult(TestResult),

    /// A case started.
    TestCaseStart(UnitStart),

    /// A case settled.
    TestCaseResult(TestResult),

    /// A test produced console output.
    ConsoleLog(ConsoleLog),
}

impl WorkerEvent {
    /// Returns the RPC method name this event is sent under.
    pub fn method(&self) -> &'static str {
        match self {
            Self::TestFileStart(_) => RpcMethod::ON_TEST_FILE_START,
            Self::TestFileReady(_) => RpcMethod::ON_TEST_FILE_READY,
            Self::TestSuiteStart(_) => RpcMethod::ON_TEST_SUITE_START,
            Self::TestSuiteResult(_) => RpcMethod::ON_TEST_SUITE_RESULT,
            Self::TestCaseStart(_) => RpcMethod::ON_TEST_CASE_START,
            Self::TestCaseResult(_) => RpcMethod::ON_TEST_CASE_RESULT,
            Self::ConsoleLog(_) => RpcMethod::ON_CONSOLE_LOG,
        }
    }

    /// Returns the test file this event is about.
    pub fn test_path(&self) -> &Utf8PathBuf {
        match self {
            Self::TestFileStart(event) => &event.test_path,
            Self::TestFileReady(event) => &event.test_path,
            Self::TestSuiteStart(start) | Self::TestCaseStart(start) => &start.test_path,
            Self::TestSuiteResult(result) | Self::TestCaseResult(result) => &result.test_path,
            Self::ConsoleLog(log) => &log.test_path,
        }
    }

    /// Serializes the payload of this event.
    pub fn to_args(&self) -> Result<serde_json::Value, WireError> {
        let value = match self {
            Self::TestFileStart(event) => serde_json::to_value(event),
            Self::TestFileReady(event) => serde_json::to_value(event),
            Self::TestSuiteStart(start) | Self::TestCaseStart(start) => serde_json::to_value(start),
            Self::TestSuiteResult(result) | Self::TestCaseResult(result) => {
                serde_json::to_value(result)
            }
            Self::ConsoleLog(log) => serde_json::to_value(log),
        };
        value.map_err(WireError::serialize)
    }

    /// Reconstructs an event from a notification. Returns `Ok(None)` for unknown methods.
    pub fn from_notification(
        method: &str,
        args: serde_json::Value,
    ) -> Result<Option<Self>, WireError> {
        let event = match method {
            RpcMethod::ON_TEST_FILE_START => Self::TestFileStart(from_args(args)?),
            RpcMethod::ON_TEST_FILE_READY => Self::TestFileReady(from_args(args)?),
            RpcMethod::ON_TEST_SUITE_START => Self::TestSuiteStart(from_args(args)?),
            RpcMethod::ON_TEST_SUITE_RESULT => Self::TestSuiteResult(from_args(args)?),
            RpcMethod::ON_TEST_CASE_START => Self::TestCaseStart(from_args(args)?),
            RpcMethod::ON_TEST_CASE_RESULT => Self::TestCaseResult(from_args(args)?),
            RpcMethod::ON_CONSOLE_LOG => Self::ConsoleLog(from_args(args)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn from_args<T: serde::de::DeserializeOwned>(args: serde_json::Value) -> Result<T, WireError> {
    serde_json::from_value(args).map_err(WireError::deserialize)
}

/// Payload of [`RpcMethod::ON_TEST_FILE_START`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileStart {
    /// The test file.
    pub test_path: Utf8PathBuf,

    /// The task the file is running under.
    pub task_id: u64,
}

/// Payload of [`RpcMethod::ON_TEST_FILE_READY`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileReady {
    /// The test file.
    pub test_path: Utf8PathBuf,

    /// The number of cases collected.
    pub case_count: usize,
}

/// Payload of the suite and case start notifications.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStart {
    /// The test file.
    pub test_path: Utf8PathBuf,

    /// The collection-time ID of the node.
    pub test_id: u32,

    /// The name of the node.
    pub name: String,

    /// The names of every enclosing suite.
    pub parent_names: Vec<String>,
}

/// Which stream a console log came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output.
    Stdout,

    /// Standard error.
    Stderr,
}

/// Payload of [`RpcMethod::ON_CONSOLE_LOG`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLog {
    /// The test file the output is attributed to.
    pub test_path: Utf8PathBuf,

    /// The case that produced the output, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<u32>,

    /// The stream the output was written to.
    pub stream: LogStream,

    /// The output itself.
    pub content: String,
}
