// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::config::PoolOptions;

/// What the pool is being used for. Determines the default number of workers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolMode {
    /// A one-shot run: use every CPU but one.
    Run,

    /// Watch mode: use half the CPUs, leaving headroom for the watcher and the editor.
    Watch,
}

/// The resolved number of workers for one dispatch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolSize {
    /// Workers spawned ahead of time and kept warm.
    pub min: usize,

    /// The maximum number of workers alive at once.
    pub max: usize,
}

impl PoolSize {
    /// Computes the pool size for `pending` files.
    ///
    /// Explicit `min_workers`/`max_workers` options take precedence over the defaults for `mode`.
    /// The maximum is clamped to the number of pending files (but never below 1), and the minimum
    /// to the maximum. Options are expected to have been validated.
    pub fn compute(options: &PoolOptions, mode: PoolMode, num_cpus: usize, pending: usize) -> Self {
        let default_max = match mode {
            PoolMode::Run => num_cpus.saturating_sub(1),
            PoolMode::Watch => num_cpus / 2,
        }
        .max(1);

        let max = options
            .max_workers
            .map_or(default_max, |count| count.compute_with_cpus(num_cpus))
            .min(pending.max(1));
        let min = options
            .min_workers
            .map_or(1, |count| count.compute_with_cpus(num_cpus))
            .min(max);

        Self { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerCount;
    use test_case::test_case;

    #[test_case(PoolMode::Run, 8, 100, 7 ; "run uses all but one cpu")]
    #[test_case(PoolMode::Run, 1, 100, 1 ; "run on a single cpu")]
    #[test_case(PoolMode::Watch, 8, 100, 4 ; "watch uses half")]
    #[test_case(PoolMode::Watch, 1, 100, 1 ; "watch on a single cpu")]
    #[test_case(PoolMode::Run, 16, 3, 3 ; "clamped to pending files")]
    #[test_case(PoolMode::Run, 16, 0, 1 ; "at least one")]
    fn default_max(mode: PoolMode, num_cpus: usize, pending: usize, expected: usize) {
        let size = PoolSize::compute(&PoolOptions::default(), mode, num_cpus, pending);
        assert_eq!(size.max, expected);
        assert_eq!(size.min, 1);
    }

    #[test]
    fn overrides_take_precedence() {
        let options = PoolOptions {
            min_workers: Some(WorkerCount::Count(2)),
            max_workers: Some(WorkerCount::Percent(50)),
            ..PoolOptions::default()
        };
        assert_eq!(
            PoolSize::compute(&options, PoolMode::Run, 16, 100),
            PoolSize { min: 2, max: 8 }
        );
        assert_eq!(
            PoolSize::compute(&options, PoolMode::Watch, 16, 1),
            PoolSize { min: 1, max: 1 },
            "both bounds are clamped to the work available"
        );
    }
}
