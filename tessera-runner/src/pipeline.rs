// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The boundary between tessera and the build that produces test entries.
//!
//! Building (bundling, transpiling, hashing chunks) is not tessera's job. A [`BuildPipeline`]
//! does it, and hands back [`EntryInfo`]s that reference the artifacts it produced.

use crate::errors::PipelineError;
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, BTreeSet},
    error::Error,
};
use tessera_metadata::{ChunkMeta, EntryInfo};
use tracing::debug;

/// A boxed error returned by a [`BuildPipeline`].
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Produces test entries and serves the artifacts they reference.
pub trait BuildPipeline {
    /// Builds every test file matching `filters` (or every test file, if `filters` is empty).
    fn build_entries(&mut self, filters: &[String]) -> Result<BuiltEntries, BoxError>;

    /// Reads an artifact produced by the most recent build.
    fn read_artifact(&self, path: &Utf8Path) -> Result<String, BoxError>;
}

/// The output of one build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuiltEntries {
    /// One entry per test file.
    pub entries: Vec<EntryInfo>,

    /// Setup files, loaded before every test file.
    pub setup_entries: Vec<EntryInfo>,

    /// Build-wide chunk information.
    pub chunk_meta: ChunkMeta,
}

impl BuiltEntries {
    /// Returns a copy containing only the entries whose test path is in `test_paths`. Setup
    /// entries are kept.
    pub fn retain_paths(&self, test_paths: &BTreeSet<Utf8PathBuf>) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|entry| test_paths.contains(&entry.test_path))
                .cloned()
                .collect(),
            setup_entries: self.setup_entries.clone(),
            chunk_meta: self.chunk_meta.clone(),
        }
    }
}

/// Assets keyed by test path, then by artifact path.
pub type AssetMap = BTreeMap<Utf8PathBuf, BTreeMap<Utf8PathBuf, String>>;

/// The files a [`TestRunner`](crate::runner::TestRunner) runs, with their assets preloaded.
#[derive(Clone, Debug, Default)]
pub struct TestFiles {
    entries: Vec<EntryInfo>,
    setup_entries: Vec<EntryInfo>,
    assets: AssetMap,
}

impl TestFiles {
    /// Creates a set of files with no preloaded assets.
    pub fn new(entries: Vec<EntryInfo>, setup_entries: Vec<EntryInfo>) -> Self {
        Self {
            entries,
            setup_entries,
            assets: AssetMap::new(),
        }
    }

    /// Creates a set of files from a build, reading every auxiliary artifact through `pipeline`.
    ///
    /// Each entry's assets include the auxiliary artifacts of the setup files, so that a worker
    /// never needs to read from disk.
    pub fn load(
        pipeline: &dyn BuildPipeline,
        built: &BuiltEntries,
    ) -> Result<Self, PipelineError> {
        let mut cache: BTreeMap<&Utf8Path, String> = BTreeMap::new();
        let mut assets = AssetMap::new();
        for entry in &built.entries {
            let mut entry_assets = BTreeMap::new();
            let files = built
                .setup_entries
                .iter()
                .flat_map(|setup| setup.auxiliary_files())
                .chain(entry.auxiliary_files());
            for path in files {
                let contents = match cache.get(path) {
                    Some(contents) => contents.clone(),
                    None => {
                        let contents = pipeline.read_artifact(path).map_err(|error| {
                            PipelineError::ReadArtifact {
                                path: path.to_owned(),
                                error,
                            }
                        })?;
                        cache.insert(path, contents.clone());
                        contents
                    }
                };
                entry_assets.insert(path.to_owned(), contents);
            }
            if !entry_assets.is_empty() {
                assets.insert(entry.test_path.clone(), entry_assets);
            }
        }
        debug!(
            entries = built.entries.len(),
            artifacts = cache.len(),
            "preloaded assets"
        );

        Ok(Self {
            entries: built.entries.clone(),
            setup_entries: built.setup_entries.clone(),
            assets,
        })
    }

    /// Returns the test entries.
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    /// Returns the setup entries.
    pub fn setup_entries(&self) -> &[EntryInfo] {
        &self.setup_entries
    }

    /// Returns the preloaded assets.
    pub fn assets(&self) -> &AssetMap {
        &self.assets
    }

    /// Returns true if there are no test entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
