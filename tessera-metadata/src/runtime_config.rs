// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::WireError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration a worker needs to execute a test file.
///
/// This is an explicit, closed set of fields: it is the only configuration that crosses the
/// process boundary. Unknown fields are rejected on the receiving side.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeConfig {
    /// The default timeout for a test case body.
    #[serde(with = "humantime_serde")]
    pub test_timeout: Duration,

    /// The default timeout for a lifecycle hook.
    #[serde(with = "humantime_serde")]
    pub hook_timeout: Duration,

    /// The default number of retries for a failing case.
    pub retry: u32,

    /// The maximum number of concurrent siblings in flight at once.
    pub max_concurrency: usize,

    /// If true, a suite or file without any tests is not an error.
    pub pass_with_no_tests: bool,

    /// If true, every node is concurrent unless it opts out.
    pub sequence_concurrent: bool,

    /// A regex that full test names must match to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name_pattern: Option<String>,
}

impl RuntimeConfig {
    /// The default timeout for test case bodies.
    pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// The default timeout for lifecycle hooks.
    pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

    /// The default maximum concurrency.
    pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.max_concurrency == 0 {
            return Err(WireError::invalid("maxConcurrency", "must be at least 1"));
        }
        Ok(())
    }

    /// Converts this config into a JSON value for the wire.
    pub fn to_wire(&self) -> Result<serde_json::Value, WireError> {
        self.validate()?;
        serde_json::to_value(self).map_err(WireError::serialize)
    }

    /// Reads a config from a JSON value received over the wire.
    pub fn from_wire(value: serde_json::Value) -> Result<Self, WireError> {
        let config: Self = serde_json::from_value(value).map_err(WireError::deserialize)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            test_timeout: Self::DEFAULT_TEST_TIMEOUT,
            hook_timeout: Self::DEFAULT_HOOK_TIMEOUT,
            retry: 0,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            pass_with_no_tests: false,
            sequence_concurrent: false,
            test_name_pattern: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_wire_rejects_unknown_fields() {
        let mut value = RuntimeConfig::default().to_wire().unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("callback".to_owned(), json!({ "fn": "() => {}" }));
        let error = RuntimeConfig::from_wire(value).unwrap_err();
        assert!(
            error.to_string().contains("callback"),
            "error mentions the unknown field: {error}"
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = RuntimeConfig {
            max_concurrency: 0,
            ..RuntimeConfig::default()
        };
        assert!(config.to_wire().is_err());
    }

    #[test]
    fn durations_use_humantime() {
        let value = RuntimeConfig::default().to_wire().unwrap();
        assert_eq!(value["testTimeout"], json!("5s"));
    }
}
