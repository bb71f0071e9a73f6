// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests dispatch real test files to real worker processes. Workers are instances of the
//! `tessera-fixture-worker` binary, which serves the files declared in
//! `integration_tests::fixtures`.

use camino_tempfile::Utf8TempDir;
use tessera_metadata::{TestResult, TestStatus};
use tessera_runner::{
    config::TesseraConfig,
    pool::{PoolMode, WorkerCommand},
    reporter::RunSummary,
    runner::{TestRunner, TestRunnerBuilder},
    signal::SignalHandlerKind,
    worker::WORKER_SUBCOMMAND,
};

mod run;
mod watch;

fn worker_command() -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_tessera-fixture-worker")).arg(WORKER_SUBCOMMAND)
}

/// Loads a config with `contents` layered over the defaults.
fn config_with(contents: &str) -> color_eyre::Result<(Utf8TempDir, TesseraConfig)> {
    let dir = camino_tempfile::tempdir()?;
    let config_file = dir.path().join("tessera.toml");
    std::fs::write(&config_file, contents)?;
    let config = TesseraConfig::from_sources(dir.path(), Some(&config_file), |path, unknown| {
        panic!("unknown keys in {path}: {unknown:?}")
    })?;
    Ok((dir, config))
}

fn build_runner(
    config: &TesseraConfig,
    mode: PoolMode,
    bail: Option<usize>,
) -> color_eyre::Result<TestRunner> {
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_mode(mode)
        .set_worker_command(worker_command())
        .set_project("fixtures");
    if let Some(bail) = bail {
        builder.set_bail(bail);
    }
    Ok(builder.build(config, SignalHandlerKind::Noop)?)
}

fn file_statuses(summary: &RunSummary) -> Vec<(&str, TestStatus)> {
    summary
        .results
        .iter()
        .map(|result| (result.test_path.as_str(), result.status))
        .collect()
}

fn find_case<'a>(summary: &'a RunSummary, test_path: &str, full_name: &str) -> &'a TestResult {
    summary
        .test_results
        .iter()
        .find(|result| result.test_path.as_str() == test_path && result.full_name() == full_name)
        .unwrap_or_else(|| panic!("no result for `{full_name}` in {test_path}"))
}
