// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change detection between builds.
//!
//! Each build produces a chunk hash map per test file. Comparing the current map against the
//! previous one yields the minimal set of files to re-run. The comparison over-approximates:
//! unnecessary re-runs are acceptable, missed ones are not.

use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, PoisonError},
};
use tessera_metadata::{ChunkMeta, EntryInfo};
use tracing::debug;

/// Chunk name to hash, for one test file.
pub type ChunkHashes = BTreeMap<String, String>;

/// The chunk hashes of every entry in one build, with the runtime chunk removed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChunkSnapshot {
    entries: BTreeMap<Utf8PathBuf, ChunkHashes>,
    setup_paths: BTreeSet<Utf8PathBuf>,
}

impl ChunkSnapshot {
    /// Builds a snapshot from the output of a build.
    ///
    /// The runtime chunk named by `chunk_meta` is excluded since its hash changes on every build
    /// regardless of content.
    pub fn from_build(
        entries: &[EntryInfo],
        setup_entries: &[EntryInfo],
        chunk_meta: &ChunkMeta,
    ) -> Self {
        let hashes_for = |entry: &EntryInfo| {
            let hashes: ChunkHashes = entry
                .chunk_hashes
                .iter()
                .filter(|(name, _)| **name != chunk_meta.runtime_chunk)
                .map(|(name, hash)| (name.clone(), hash.clone()))
                .collect();
            (entry.test_path.clone(), hashes)
        };

        Self {
            entries: entries
                .iter()
                .chain(setup_entries)
                .map(hashes_for)
                .collect(),
            setup_paths: setup_entries
                .iter()
                .map(|entry| entry.test_path.clone())
                .collect(),
        }
    }

    /// Returns the chunk hashes recorded for a file.
    pub fn get(&self, test_path: &Utf8Path) -> Option<&ChunkHashes> {
        self.entries.get(test_path)
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the test files in this snapshot, excluding setup files.
    pub fn test_paths(&self) -> impl Iterator<Item = &Utf8Path> + '_ {
        self.entries
            .keys()
            .filter(|path| !self.setup_paths.contains(*path))
            .map(|path| path.as_path())
    }

    /// Computes the files affected by the change from `previous` to `self`.
    pub fn diff(&self, previous: &ChunkSnapshot) -> EntryDiff {
        let mut affected = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        let mut setup_changed = false;

        for (path, hashes) in &self.entries {
            let changed = previous.entries.get(path) != Some(hashes);
            if !changed {
                continue;
            }
            if self.setup_paths.contains(path) {
                debug!(%path, "setup file changed");
                setup_changed = true;
            } else {
                affected.insert(path.clone());
            }
        }

        for path in previous.entries.keys() {
            if self.entries.contains_key(path) {
                continue;
            }
            if previous.setup_paths.contains(path) {
                debug!(%path, "setup file deleted");
                setup_changed = true;
            } else {
                deleted.insert(path.clone());
            }
        }

        if setup_changed {
            // Setup files are imported by every test file.
            affected = self.test_paths().map(ToOwned::to_owned).collect();
        }

        EntryDiff { affected, deleted }
    }
}

/// The result of comparing two builds.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EntryDiff {
    /// Test files that are new or whose chunks changed.
    pub affected: BTreeSet<Utf8PathBuf>,

    /// Test files present previously but not anymore.
    pub deleted: BTreeSet<Utf8PathBuf>,
}

impl EntryDiff {
    /// Returns true if nothing needs to re-run.
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty() && self.deleted.is_empty()
    }
}

/// Holds the chunk snapshot of the most recent build, shared across watch-mode iterations.
///
/// Readers get an immutable snapshot; a new build replaces it wholesale.
#[derive(Debug, Default)]
pub struct ChunkHashCache {
    current: Mutex<Arc<ChunkSnapshot>>,
}

impl ChunkHashCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<ChunkSnapshot> {
        self.lock().clone()
    }

    /// Replaces the current snapshot and returns the previous one.
    pub fn replace(&self, snapshot: ChunkSnapshot) -> Arc<ChunkSnapshot> {
        std::mem::replace(&mut *self.lock(), Arc::new(snapshot))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<ChunkSnapshot>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hashes chunk contents, for build pipelines that do not provide hashes of their own.
pub fn chunk_hash(contents: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    fn entry(path: &str, hashes: &[(&str, &str)]) -> EntryInfo {
        hashes
            .iter()
            .fold(EntryInfo::new(path, format!("dist/{path}")), |e, (n, h)| {
                e.with_chunk(*n, *h)
            })
    }

    fn snapshot(entries: &[EntryInfo], setup: &[EntryInfo]) -> ChunkSnapshot {
        ChunkSnapshot::from_build(entries, setup, &ChunkMeta::default())
    }

    #[test]
    fn new_file_is_affected() {
        let previous = snapshot(&[entry("a", &[("chunk1", "h1")])], &[]);
        let current = snapshot(
            &[entry("a", &[("chunk1", "h1")]), entry("b", &[("chunk1", "h2")])],
            &[],
        );
        assert_eq!(
            current.diff(&previous),
            EntryDiff {
                affected: btreeset! {"b".into()},
                deleted: btreeset! {},
            }
        );
    }

    #[test]
    fn changed_hash_is_affected() {
        let previous = snapshot(&[entry("a", &[("chunk1", "h1")])], &[]);
        let current = snapshot(&[entry("a", &[("chunk1", "h9")])], &[]);
        assert_eq!(current.diff(&previous).affected, btreeset! {"a".into()});
    }

    #[test]
    fn removed_file_is_deleted() {
        let previous = snapshot(
            &[entry("a", &[("chunk1", "h1")]), entry("b", &[("chunk1", "h2")])],
            &[],
        );
        let current = snapshot(&[entry("b", &[("chunk1", "h2")])], &[]);
        assert_eq!(
            current.diff(&previous),
            EntryDiff {
                affected: btreeset! {},
                deleted: btreeset! {"a".into()},
            }
        );
    }

    #[test]
    fn runtime_chunk_is_ignored() {
        let previous = snapshot(&[entry("a", &[("chunk1", "h1"), ("runtime", "r1")])], &[]);
        let current = snapshot(&[entry("a", &[("chunk1", "h1"), ("runtime", "r2")])], &[]);
        assert!(current.diff(&previous).is_empty());

        let meta = ChunkMeta {
            runtime_chunk: "vendor".to_owned(),
        };
        let previous =
            ChunkSnapshot::from_build(&[entry("a", &[("vendor", "v1")])], &[], &meta);
        let current = ChunkSnapshot::from_build(&[entry("a", &[("vendor", "v2")])], &[], &meta);
        assert!(current.diff(&previous).is_empty());
    }

    #[test]
    fn setup_change_affects_everything() {
        let tests = [entry("a", &[("c", "1")]), entry("b", &[("c", "2")])];
        let previous = snapshot(&tests, &[entry("setup", &[("c", "s1")])]);
        let current = snapshot(&tests, &[entry("setup", &[("c", "s2")])]);
        assert_eq!(
            current.diff(&previous).affected,
            btreeset! {"a".into(), "b".into()}
        );

        let without_setup = snapshot(&tests, &[]);
        assert_eq!(
            without_setup.diff(&previous),
            EntryDiff {
                affected: btreeset! {"a".into(), "b".into()},
                deleted: btreeset! {},
            },
            "deleting a setup file affects everything but is not itself a deleted test"
        );
    }

    #[test]
    fn first_build_affects_everything() {
        let current = snapshot(&[entry("a", &[("c", "1")])], &[]);
        assert_eq!(
            current.diff(&ChunkSnapshot::default()).affected,
            btreeset! {"a".into()}
        );
    }

    #[test]
    fn cache_replaces_atomically() {
        let cache = ChunkHashCache::new();
        let before = cache.snapshot();
        assert!(before.is_empty());

        let next = snapshot(&[entry("a", &[("c", "1")])], &[]);
        let previous = cache.replace(next.clone());
        assert!(Arc::ptr_eq(&previous, &before));
        assert_eq!(*cache.snapshot(), next);
        assert!(before.is_empty(), "earlier snapshots are unaffected");
    }

    #[test]
    fn chunk_hash_is_stable() {
        assert_eq!(chunk_hash(b"export const x = 1;"), chunk_hash(b"export const x = 1;"));
        assert_ne!(chunk_hash(b"a"), chunk_hash(b"b"));
        assert_eq!(chunk_hash(b"").len(), 16);
    }
}
