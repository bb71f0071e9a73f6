// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for tessera-runner.

use std::sync::LazyLock;
use tracing::warn;

/// Gets the number of available CPUs and caches the value.
pub(crate) fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

pub(crate) mod plural {
    /// Returns "file" if `count` is 1, otherwise "files".
    pub(crate) fn files_str(count: usize) -> &'static str {
        if count == 1 { "file" } else { "files" }
    }

    /// Returns "worker" if `count` is 1, otherwise "workers".
    pub(crate) fn workers_str(count: usize) -> &'static str {
        if count == 1 { "worker" } else { "workers" }
    }
}
