// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::WorkerCount;
use crate::errors::PoolOptionsError;
use indexmap::IndexMap;
use serde::Deserialize;

/// Options for the worker pool.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PoolOptions {
    /// The number of workers to keep warm. Defaults to none.
    #[serde(default)]
    pub min_workers: Option<WorkerCount>,

    /// The maximum number of workers. Defaults to a value based on the CPU count and run kind.
    #[serde(default)]
    pub max_workers: Option<WorkerCount>,

    /// If true, every test file gets a fresh worker process.
    #[serde(default = "default_isolate")]
    pub isolate: bool,

    /// Extra environment variables for worker processes.
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Extra arguments passed to worker processes.
    #[serde(default)]
    pub exec_args: Vec<String>,
}

fn default_isolate() -> bool {
    true
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_workers: None,
            max_workers: None,
            isolate: true,
            env: IndexMap::new(),
            exec_args: Vec::new(),
        }
    }
}

impl PoolOptions {
    /// Checks that `min_workers <= max_workers` on a machine with `num_cpus` logical CPUs.
    ///
    /// Only explicitly set bounds are compared; automatic sizing never violates the invariant.
    pub fn validate(&self, num_cpus: usize) -> Result<(), PoolOptionsError> {
        if let (Some(min), Some(max)) = (self.min_workers, self.max_workers) {
            let min = min.compute_with_cpus(num_cpus);
            let max = max.compute_with_cpus(num_cpus);
            if min > max {
                return Err(PoolOptionsError::MinExceedsMax { min, max });
            }
        }
        Ok(())
    }
}
