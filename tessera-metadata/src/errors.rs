// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::borrow::Cow;
use thiserror::Error;

/// An error converting a value to or from its wire representation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WireError {
    /// Serializing a value failed.
    #[error("failed to serialize value for the wire")]
    Serialize(#[source] serde_json::Error),

    /// Deserializing a value failed.
    #[error("failed to deserialize value from the wire: {0}")]
    Deserialize(#[source] serde_json::Error),

    /// A value deserialized correctly but violates an invariant.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// The field name on the wire.
        field: &'static str,

        /// Why the value is invalid.
        reason: Cow<'static, str>,
    },
}

impl WireError {
    pub(crate) fn serialize(error: serde_json::Error) -> Self {
        Self::Serialize(error)
    }

    pub(crate) fn deserialize(error: serde_json::Error) -> Self {
        Self::Deserialize(error)
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
