// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One compiled test file, ready to execute.
///
/// Entries are produced by the build pipeline and consumed by the worker pool and the entry
/// differ.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    /// The source test file this entry was built from. Results are keyed by this path.
    pub test_path: Utf8PathBuf,

    /// The entry artifact the worker executes.
    pub dist_path: Utf8PathBuf,

    /// Every artifact the build produced for this entry, including `dist_path`.
    #[serde(default)]
    pub files: BTreeSet<Utf8PathBuf>,

    /// Chunk name to content hash, for every chunk this entry depends on.
    #[serde(default)]
    pub chunk_hashes: BTreeMap<String, String>,

    /// Module identities the build pipeline tagged for eviction when a worker process is
    /// reused for another file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup_ids: Vec<String>,
}

impl EntryInfo {
    /// Creates an entry whose only artifact is `dist_path`.
    pub fn new(test_path: impl Into<Utf8PathBuf>, dist_path: impl Into<Utf8PathBuf>) -> Self {
        let dist_path = dist_path.into();
        Self {
            test_path: test_path.into(),
            files: BTreeSet::from([dist_path.clone()]),
            dist_path,
            chunk_hashes: BTreeMap::new(),
            setup_ids: Vec::new(),
        }
    }

    /// Adds a chunk hash to this entry.
    pub fn with_chunk(mut self, name: impl Into<String>, hash: impl Into<String>) -> Self {
        self.chunk_hashes.insert(name.into(), hash.into());
        self
    }

    /// Returns the artifacts of this entry other than the entry artifact itself.
    pub fn auxiliary_files(&self) -> impl Iterator<Item = &Utf8Path> + '_ {
        self.files
            .iter()
            .map(|f| f.as_path())
            .filter(move |f| *f != self.dist_path)
    }
}

/// Build-wide information about chunks.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    /// The name of the shared runtime chunk. Its hash changes on every build regardless of
    /// content, so it never participates in change detection.
    pub runtime_chunk: String,
}

impl ChunkMeta {
    /// The runtime chunk name used when a build does not specify one.
    pub const DEFAULT_RUNTIME_CHUNK: &'static str = "runtime";
}

impl Default for ChunkMeta {
    fn default() -> Self {
        Self {
            runtime_chunk: Self::DEFAULT_RUNTIME_CHUNK.to_owned(),
        }
    }
}
