// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{executor::panic_message, tree::Collector, tree::TestArena};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::{fmt, panic::AssertUnwindSafe, sync::Arc};
use tessera_metadata::{EntryInfo, RuntimeConfig, TestError};

/// A function that declares the contents of a test file against a [`Collector`].
pub type CollectFn = Arc<dyn Fn(&mut Collector) + Send + Sync>;

/// The test files a worker binary knows how to load.
///
/// Entries are looked up by test path first, then by dist path, so a build pipeline may key its
/// artifacts either way.
#[derive(Clone, Default)]
pub struct TestFileRegistry {
    files: IndexMap<Utf8PathBuf, CollectFn>,
}

impl TestFileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file. A later registration for the same path replaces the earlier one.
    pub fn register(
        &mut self,
        path: impl Into<Utf8PathBuf>,
        collect: impl Fn(&mut Collector) + Send + Sync + 'static,
    ) -> &mut Self {
        self.files.insert(path.into(), Arc::new(collect));
        self
    }

    /// Returns the registered paths, in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &Utf8Path> + '_ {
        self.files.keys().map(|path| path.as_path())
    }

    /// Returns the number of registered files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn lookup(&self, entry: &EntryInfo) -> Option<&CollectFn> {
        self.files
            .get(&entry.test_path)
            .or_else(|| self.files.get(&entry.dist_path))
    }

    /// Collects `entry` into a new arena, after running every setup file into the same root.
    ///
    /// A missing file or a panic during collection is a collection error.
    pub fn collect(
        &self,
        entry: &EntryInfo,
        setup_entries: &[EntryInfo],
        runtime_config: &RuntimeConfig,
    ) -> Result<TestArena, TestError> {
        let mut collector = Collector::new(entry.test_path.clone(), runtime_config);
        for file in setup_entries.iter().chain(std::iter::once(entry)) {
            let collect = self.lookup(file).ok_or_else(|| {
                collection_error(format!("no test file registered for `{}`", file.test_path))
            })?;
            std::panic::catch_unwind(AssertUnwindSafe(|| collect(&mut collector))).map_err(
                |payload| {
                    collection_error(format!(
                        "failed to collect `{}`: {}",
                        file.test_path,
                        panic_message(&*payload)
                    ))
                },
            )?;
        }
        Ok(collector.finish())
    }
}

impl fmt::Debug for TestFileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.files.keys()).finish()
    }
}

fn collection_error(message: String) -> TestError {
    TestError::new(message).with_name("CollectionError")
}
