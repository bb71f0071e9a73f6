// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use debug_ignore::DebugIgnore;
use std::sync::Arc;
use tessera_metadata::{TestFileResult, WorkerEvent};

/// An event produced while the pool runs files.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PoolEvent {
    /// A worker streamed an event.
    Worker(WorkerEvent),

    /// A file settled. Emitted once per dispatched file, including files that were cancelled or
    /// whose worker crashed.
    FileFinished(TestFileResult),
}

/// Where the pool delivers [`PoolEvent`]s.
///
/// Events for a single file arrive in order. Events for different files may interleave.
#[derive(Clone, Debug)]
pub struct PoolEventSink {
    callback: DebugIgnore<Arc<dyn Fn(PoolEvent) + Send + Sync>>,
}

impl PoolEventSink {
    /// Creates a sink that calls `callback` for every event.
    pub fn new(callback: impl Fn(PoolEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: DebugIgnore(Arc::new(callback)),
        }
    }

    /// Creates a sink that drops every event.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        (self.callback)(event)
    }
}
