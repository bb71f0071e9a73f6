// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced during a test run, and the summary at its end.

mod aggregator;
mod events;

pub(crate) use aggregator::RunAggregator;
pub use aggregator::{RunStats, RunSummary};
pub use events::*;
