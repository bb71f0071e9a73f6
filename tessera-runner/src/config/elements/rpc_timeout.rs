// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::Deserialize;
use std::{fmt, time::Duration};

/// Type for the `rpc.timeout` config key.
///
/// In config files this is either a duration string (`"60s"`) or `-1`, which disables the
/// timeout. Pool channels run with the timeout disabled since task duration is unbounded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RpcTimeout {
    /// Calls never time out.
    Disabled,

    /// Calls fail after this duration.
    After(Duration),
}

impl RpcTimeout {
    /// The default timeout for RPC calls.
    pub const DEFAULT: Self = Self::After(Duration::from_secs(60));

    /// Returns the timeout as a duration, if enabled.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::After(duration) => Some(duration),
        }
    }

    /// Interprets a millisecond value where `-1` disables the timeout.
    pub fn from_millis(millis: i64) -> Option<Self> {
        match millis {
            -1 => Some(Self::Disabled),
            millis if millis >= 0 => Some(Self::After(Duration::from_millis(millis as u64))),
            _ => None,
        }
    }
}

impl Default for RpcTimeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for RpcTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::After(duration) => write!(f, "{}ms", duration.as_millis()),
        }
    }
}

impl<'de> Deserialize<'de> for RpcTimeout {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = RpcTimeout;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a duration string like \"60s\", a number of milliseconds, or -1 to disable"
                )
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.trim() == "-1" {
                    return Ok(RpcTimeout::Disabled);
                }
                humantime_serde::re::humantime::parse_duration(v)
                    .map(RpcTimeout::After)
                    .map_err(E::custom)
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                RpcTimeout::from_millis(v).ok_or_else(|| {
                    serde::de::Error::invalid_value(serde::de::Unexpected::Signed(v), &self)
                })
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(RpcTimeout::After(Duration::from_millis(v)))
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-1, Some(RpcTimeout::Disabled) ; "disabled")]
    #[test_case(0, Some(RpcTimeout::After(Duration::ZERO)) ; "zero")]
    #[test_case(1500, Some(RpcTimeout::After(Duration::from_millis(1500))) ; "millis")]
    #[test_case(-2, None ; "other negative")]
    fn from_millis(millis: i64, expected: Option<RpcTimeout>) {
        assert_eq!(RpcTimeout::from_millis(millis), expected);
    }

    #[test]
    fn deserialize_string_and_number() {
        let timeout: RpcTimeout = serde_json::from_str(r#""2m""#).unwrap();
        assert_eq!(timeout, RpcTimeout::After(Duration::from_secs(120)));

        let timeout: RpcTimeout = serde_json::from_str("-1").unwrap();
        assert_eq!(timeout, RpcTimeout::Disabled);
        assert_eq!(timeout.as_duration(), None);
    }
}
