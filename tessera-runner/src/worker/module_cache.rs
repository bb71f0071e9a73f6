// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// How long a cached module survives when a worker is reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ModuleScope {
    /// Evicted whenever the worker moves on to another file.
    File,

    /// Kept across files unless a reset names it explicitly.
    Shared,
}

struct CachedModule {
    scope: ModuleScope,
    value: Arc<dyn Any + Send + Sync>,
}

/// The process-local module cache.
///
/// Test files and setup files store module-level state here instead of in globals. A worker
/// that is reused for another file resets the cache first, so no file observes another's state.
#[derive(Clone, Default)]
pub struct ModuleCache {
    modules: Arc<Mutex<HashMap<String, CachedModule>>>,
}

impl ModuleCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the file-scoped module `id`, initializing it if necessary.
    ///
    /// If a module with this id exists with a different type, it is replaced.
    pub fn get_or_init<T, F>(&self, id: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        self.get_or_init_scoped(id, ModuleScope::File, init)
    }

    /// Returns the module `id` with the given scope, initializing it if necessary.
    pub fn get_or_init_scoped<T, F>(&self, id: &str, scope: ModuleScope, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut modules = self.lock();
        if let Some(existing) = modules.get(id)
            && let Ok(value) = existing.value.clone().downcast::<T>()
        {
            return value;
        }

        let value = Arc::new(init());
        modules.insert(
            id.to_owned(),
            CachedModule {
                scope,
                value: value.clone(),
            },
        );
        value
    }

    /// Returns the module `id` if it is cached with type `T`.
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        let modules = self.lock();
        modules.get(id)?.value.clone().downcast::<T>().ok()
    }

    /// Returns true if a module named `id` is cached.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Returns the number of cached modules.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Evicts every file-scoped module, plus the shared modules named in `setup_ids`.
    ///
    /// Returns the number of modules evicted.
    pub fn reset(&self, setup_ids: &[String]) -> usize {
        let mut modules = self.lock();
        let before = modules.len();
        modules.retain(|id, module| {
            module.scope == ModuleScope::Shared && !setup_ids.iter().any(|setup| setup == id)
        });
        before - modules.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedModule>> {
        // A panic while initializing a module leaves the map itself intact.
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modules = self.lock();
        let mut ids: Vec<_> = modules
            .iter()
            .map(|(id, module)| (id.as_str(), module.scope))
            .collect();
        ids.sort_unstable_by_key(|(id, _)| *id);
        f.debug_struct("ModuleCache").field("modules", &ids).finish()
    }
}
