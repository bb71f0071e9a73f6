// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run-mode resolution.
//!
//! Before a file executes, the modes declared on its nodes are resolved in a single pass:
//!
//! * If any node in the file is `only`, nodes outside every `only` path are skipped.
//! * A `skip` or `todo` suite forces its mode onto every descendant.
//! * Cases whose full name does not match the name pattern are skipped.
//! * Finally each suite's own mode is recomputed from its children.

use crate::tree::{NodeData, NodeId, TestArena};
use regex::Regex;
use tessera_metadata::{NodeKind, RunMode, RuntimeConfig};
use tracing::debug;

/// Resolves the run modes of a [`TestArena`] in place.
#[derive(Clone, Debug, Default)]
pub struct RunModeResolver {
    name_pattern: Option<Regex>,
}

impl RunModeResolver {
    /// Creates a resolver for this runtime configuration.
    ///
    /// Returns an error if `test_name_pattern` is not a valid regex.
    pub fn new(runtime_config: &RuntimeConfig) -> Result<Self, regex::Error> {
        let name_pattern = runtime_config
            .test_name_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        Ok(Self { name_pattern })
    }

    /// Creates a resolver that filters case names by `pattern`.
    pub fn with_name_pattern(pattern: Regex) -> Self {
        Self {
            name_pattern: Some(pattern),
        }
    }

    /// Resolves every node's mode.
    pub fn resolve(&self, arena: &mut TestArena) {
        // Children are always declared after their parents, so walking the arena backwards visits
        // every child before its parent.
        let mut contains_only = vec![false; arena.len()];
        for index in (0..arena.len()).rev() {
            let node = arena.node(NodeId::new(index));
            contains_only[index] = node.children().iter().any(|child| {
                let child_index = child.test_id() as usize;
                contains_only[child_index] || arena.node(*child).mode() == RunMode::Only
            });
        }
        let has_only = contains_only[0];
        debug!(test_path = %arena.test_path(), has_only, "resolving run modes");

        let mut cx = ResolveContext {
            arena,
            contains_only: &contains_only,
            has_only,
            name_pattern: self.name_pattern.as_ref(),
        };
        cx.traverse(NodeId::ROOT, false);
    }
}

struct ResolveContext<'a> {
    arena: &'a mut TestArena,
    contains_only: &'a [bool],
    has_only: bool,
    name_pattern: Option<&'a Regex>,
}

impl ResolveContext<'_> {
    fn traverse(&mut self, suite_id: NodeId, parent_is_only: bool) {
        let suite_is_only = parent_is_only || self.arena.node(suite_id).mode() == RunMode::Only;
        let children = self.arena.node(suite_id).children().to_vec();

        for &child in &children {
            let node = self.arena.node(child);
            let include = suite_is_only || node.mode() == RunMode::Only;
            let is_suite = node.kind() == NodeKind::Suite;

            if self.has_only {
                let keep = is_suite && (include || self.contains_only[child.test_id() as usize]);
                if !keep && node.mode() == RunMode::Run && !include {
                    self.arena.node_mut(child).mode = RunMode::Skip;
                }
            }

            let node = self.arena.node(child);
            if is_suite {
                match node.mode() {
                    mode @ (RunMode::Skip | RunMode::Todo) => self.force_subtree(child, mode),
                    RunMode::Run | RunMode::Only => self.traverse(child, include),
                }
            } else if node.mode().is_runnable()
                && let Some(pattern) = self.name_pattern
                && !pattern.is_match(&node.full_name())
            {
                self.arena.node_mut(child).mode = RunMode::Skip;
            }
        }

        // Recompute the suite's own mode from its children. An empty suite keeps its parent
        // running so that it can be reported as a failure.
        if !self.arena.node(suite_id).mode().is_runnable() {
            return;
        }
        let mode = if children.is_empty() {
            RunMode::Skip
        } else if children.iter().any(|&child| {
            self.arena.node(child).mode().is_runnable() || self.is_empty_suite(child)
        }) {
            RunMode::Run
        } else if children
            .iter()
            .all(|&child| self.arena.node(child).mode() == RunMode::Todo)
        {
            RunMode::Todo
        } else {
            RunMode::Skip
        };

        let suite = self.arena.node_mut(suite_id);
        suite.mode = mode;
        if children.is_empty()
            && let NodeData::Suite(data) = &mut suite.data
        {
            data.no_tests = true;
        }
    }

    fn is_empty_suite(&self, id: NodeId) -> bool {
        matches!(&self.arena.node(id).data, NodeData::Suite(suite) if suite.no_tests)
    }

    fn force_subtree(&mut self, id: NodeId, mode: RunMode) {
        for descendant in self.arena.descendants(id) {
            self.arena.node_mut(descendant).mode = mode;
        }
    }
}
