// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::WorkerCountParseError, helpers::get_num_cpus};
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Type for the `min-workers` and `max-workers` config keys.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WorkerCount {
    /// An absolute number of workers.
    Count(usize),

    /// A percentage of the logical CPU count, rounded down but never below 1.
    Percent(u32),
}

impl WorkerCount {
    /// Gets the number of workers for this machine.
    pub fn compute(self) -> usize {
        self.compute_with_cpus(get_num_cpus())
    }

    /// Gets the number of workers for a machine with `num_cpus` logical CPUs.
    pub fn compute_with_cpus(self, num_cpus: usize) -> usize {
        match self {
            Self::Count(count) => count,
            Self::Percent(percent) => (num_cpus * percent as usize / 100).max(1),
        }
    }
}

impl FromStr for WorkerCount {
    type Err = WorkerCountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(percent) = s.strip_suffix('%') {
            return match percent.trim().parse::<u32>() {
                Ok(0) => Err(WorkerCountParseError::new(s, "percentage may not be 0")),
                Ok(percent) => Ok(Self::Percent(percent)),
                Err(error) => Err(WorkerCountParseError::new(s, error.to_string())),
            };
        }

        match s.trim().parse::<usize>() {
            Ok(0) => Err(WorkerCountParseError::new(s, "worker count may not be 0")),
            Ok(count) => Ok(Self::Count(count)),
            Err(error) => Err(WorkerCountParseError::new(s, error.to_string())),
        }
    }
}

impl fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Percent(percent) => write!(f, "{percent}%"),
        }
    }
}

impl<'de> Deserialize<'de> for WorkerCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = WorkerCount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a positive integer or a percentage string like \"50%\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse().map_err(E::custom)
            }

            // Note that TOML uses i64, not u64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v > 0 {
                    Ok(WorkerCount::Count(v as usize))
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    ))
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v > 0 {
                    Ok(WorkerCount::Count(v as usize))
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    ))
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
