// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The kind marker for [`RunId`].
pub enum RunKind {}

impl TypedUuidKind for RunKind {
    #[inline]
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("run");
        TAG
    }
}

/// Identifies one logical test run (a single run or watch-mode trigger).
///
/// Messages tagged with a run ID other than the current one are stale and are dropped.
pub type RunId = TypedUuid<RunKind>;

/// A single message on an RPC channel.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RpcMessage {
    /// A request or notification.
    Request(RpcRequest),

    /// A response to a request.
    Response(RpcResponse),
}

impl RpcMessage {
    /// Returns the run this message belongs to.
    pub fn run_id(&self) -> RunId {
        match self {
            Self::Request(request) => request.run_id,
            Self::Response(response) => response.run_id,
        }
    }
}

/// A request envelope.
///
/// A request without an `id` is a notification: the receiver does not respond to it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// The request ID, or `None` for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// The run this request belongs to.
    pub run_id: RunId,

    /// The method to invoke.
    pub method: SmolStr,

    /// Method arguments.
    #[serde(default)]
    pub args: serde_json::Value,
}

/// A response envelope. Exactly one of `result` and `error` is set.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponse {
    /// The ID of the request being answered.
    pub id: u64,

    /// The run the request belonged to.
    pub run_id: RunId,

    /// The result, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// The error, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorPayload>,
}

/// An error returned by the remote end of an RPC channel.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorPayload {
    /// The error message.
    pub message: String,

    /// Additional context, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RpcErrorPayload {
    /// Creates a new payload with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }
}

/// Names of the RPC methods exchanged between the orchestrator and workers.
pub enum RpcMethod {}

impl RpcMethod {
    /// Orchestrator to worker: run a test file.
    pub const RUN: &'static str = "run";

    /// Orchestrator to worker: collect a test file without running it.
    pub const COLLECT: &'static str = "collect";

    /// Orchestrator to worker: evict module identities before reusing the worker.
    pub const RESET_MODULES: &'static str = "resetModules";

    /// Worker to orchestrator: a file started.
    pub const ON_TEST_FILE_START: &'static str = "onTestFileStart";

    /// Worker to orchestrator: a file finished collecting.
    pub const ON_TEST_FILE_READY: &'static str = "onTestFileReady";

    /// Worker to orchestrator: a suite started.
    pub const ON_TEST_SUITE_START: &'static str = "onTestSuiteStart";

    /// Worker to orchestrator: a suite settled.
    pub const ON_TEST_SUITE_RESULT: &'static str = "onTestSuiteResult";

    /// Worker to orchestrator: a case started.
    pub const ON_TEST_CASE_START: &'static str = "onTestCaseStart";

    /// Worker to orchestrator: a case settled.
    pub const ON_TEST_CASE_RESULT: &'static str = "onTestCaseResult";

    /// Worker to orchestrator: console output.
    pub const ON_CONSOLE_LOG: &'static str = "onConsoleLog";
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn notification_omits_id() {
        let run_id = RunId::new_v4();
        let message = RpcMessage::Request(RpcRequest {
            id: None,
            run_id,
            method: RpcMethod::ON_CONSOLE_LOG.into(),
            args: json!({}),
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value.get("id"), None);
        assert_eq!(value["kind"], json!("request"));
        assert_eq!(value["runId"], json!(run_id.to_string()));
    }

    #[test]
    fn response_parses() {
        let run_id = RunId::new_v4();
        let text = format!(r#"{{"kind":"response","id":7,"runId":"{run_id}","result":[1,2]}}"#);
        let message: RpcMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(
            message,
            RpcMessage::Response(RpcResponse {
                id: 7,
                run_id,
                result: Some(json!([1, 2])),
                error: None,
            })
        );
    }
}
