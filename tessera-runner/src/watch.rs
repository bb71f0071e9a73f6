// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watch mode: re-running only the files a rebuild affected.
//!
//! Each call to [`WatchSession::rerun`] asks the [`BuildPipeline`] for a fresh build, compares
//! its chunk hashes against the previous build, and runs the affected files under a new run ID.
//! Responses still in flight from the previous run carry the old run ID and are rejected by the
//! RPC channel.

use crate::{
    entry_diff::{ChunkHashCache, ChunkSnapshot, EntryDiff},
    errors::PipelineError,
    pipeline::{BuildPipeline, TestFiles},
    reporter::{RunSummary, TestEvent},
    runner::TestRunner,
};
use tracing::{debug, info};

/// The outcome of one watch-mode iteration.
#[derive(Debug)]
pub struct WatchOutcome {
    /// The files the rebuild affected or removed.
    pub diff: EntryDiff,

    /// The summary of the run, or `None` if nothing was affected.
    pub summary: Option<RunSummary>,
}

/// A long-lived watch-mode session.
///
/// The runner is typically built with [`PoolMode::Watch`](crate::pool::PoolMode::Watch) so that
/// the pool leaves CPU headroom for the build.
#[derive(Debug)]
pub struct WatchSession<P> {
    pipeline: P,
    runner: TestRunner,
    cache: ChunkHashCache,
    filters: Vec<String>,
}

impl<P: BuildPipeline> WatchSession<P> {
    /// Creates a new session. The first call to [`rerun`](Self::rerun) runs every file.
    pub fn new(pipeline: P, runner: TestRunner) -> Self {
        Self {
            pipeline,
            runner,
            cache: ChunkHashCache::new(),
            filters: Vec::new(),
        }
    }

    /// Restricts builds to test files matching `filters`.
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    /// Returns the chunk hashes of the most recent successful build.
    pub fn cache(&self) -> &ChunkHashCache {
        &self.cache
    }

    /// Returns the runner.
    pub fn runner_mut(&mut self) -> &mut TestRunner {
        &mut self.runner
    }

    /// Rebuilds, then runs the files whose chunks changed.
    ///
    /// If the build fails, the previous snapshot is kept so that the next successful build is
    /// compared against the last one that ran.
    pub fn rerun<F>(&mut self, callback: F) -> Result<WatchOutcome, PipelineError>
    where
        F: FnMut(TestEvent) + Send,
    {
        let built = self
            .pipeline
            .build_entries(&self.filters)
            .map_err(PipelineError::Build)?;
        let snapshot =
            ChunkSnapshot::from_build(&built.entries, &built.setup_entries, &built.chunk_meta);
        let diff = snapshot.diff(&self.cache.snapshot());
        debug!(
            affected = diff.affected.len(),
            deleted = diff.deleted.len(),
            "compared chunk hashes"
        );

        if diff.affected.is_empty() {
            self.cache.replace(snapshot);
            info!("no test files affected, skipping run");
            return Ok(WatchOutcome {
                diff,
                summary: None,
            });
        }

        let files = TestFiles::load(&self.pipeline, &built.retain_paths(&diff.affected))?;
        self.cache.replace(snapshot);
        let summary = self.runner.execute(&files, callback);
        Ok(WatchOutcome {
            diff,
            summary: Some(summary),
        })
    }

    /// Stops the session's idle workers and returns the pipeline.
    pub fn close(mut self) -> P {
        self.runner.close();
        self.pipeline
    }
}
