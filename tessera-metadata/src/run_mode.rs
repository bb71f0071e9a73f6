// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Governs whether a suite or case executes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Execute normally.
    #[default]
    Run,

    /// Do not execute. Reported as skipped.
    Skip,

    /// Execute exclusively: once any node in a file is marked `only`, every node outside an
    /// `only` path is skipped.
    Only,

    /// A placeholder for a test that has not been written yet. Never executed.
    Todo,
}

impl RunMode {
    /// Returns true if a node with this mode will execute.
    #[inline]
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Run | Self::Only)
    }

    /// Returns the string representation of this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Skip => "skip",
            Self::Only => "only",
            Self::Todo => "todo",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
