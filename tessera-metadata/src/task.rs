// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{EntryInfo, NodeKind, RunMode, RuntimeConfig, TestError};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a worker should do with a task.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Collect and execute the file.
    Run,

    /// Collect the file and resolve run modes, without executing anything.
    Collect,
}

/// The full payload a worker needs to execute one test file without further I/O.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTask {
    /// Whether to run or only collect.
    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// The entry to execute.
    pub entry_info: EntryInfo,

    /// Per-task context.
    pub context: TaskContext,

    /// Setup files, executed before the entry in declaration order.
    #[serde(default)]
    pub setup_entries: Vec<EntryInfo>,

    /// Preloaded artifact contents, keyed by artifact path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<BTreeMap<Utf8PathBuf, String>>,
}

/// Per-task context sent alongside a [`WorkerTask`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    /// A pool-unique task identifier.
    pub task_id: u64,

    /// The project name.
    pub project: String,

    /// The project root.
    pub root_path: Utf8PathBuf,

    /// Runtime configuration.
    pub runtime_config: RuntimeConfig,
}

/// Arguments for [`RpcMethod::RESET_MODULES`](crate::RpcMethod::RESET_MODULES).
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetModules {
    /// Module identities to evict in addition to every file-scoped module.
    pub setup_ids: Vec<String>,
}

/// The result of a [`TaskKind::Collect`] task.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedFile {
    /// The test file.
    pub test_path: Utf8PathBuf,

    /// Every node in the file other than the file root, in declaration order.
    pub nodes: Vec<CollectedNode>,

    /// Collection errors, if the file failed to load.
    #[serde(default)]
    pub errors: Vec<TestError>,
}

/// A node reported by a collect task.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedNode {
    /// The collection-time ID.
    pub test_id: u32,

    /// Suite or case.
    pub kind: NodeKind,

    /// The node name.
    pub name: String,

    /// Names of enclosing suites.
    pub parent_names: Vec<String>,

    /// The resolved run mode.
    pub mode: RunMode,

    /// Whether the node runs concurrently with its siblings.
    pub concurrent: bool,
}
