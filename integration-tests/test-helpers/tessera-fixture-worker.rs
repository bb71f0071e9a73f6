// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A worker binary serving the integration test fixtures.

use tessera_metadata::TesseraExitCode;
use tessera_runner::worker::{WORKER_SUBCOMMAND, is_worker_invocation, worker_main};

fn main() {
    if is_worker_invocation() {
        std::process::exit(worker_main(integration_tests::fixtures::registry()));
    }
    eprintln!("tessera-fixture-worker: expected `{WORKER_SUBCOMMAND}` as the first argument");
    std::process::exit(TesseraExitCode::TEST_RUN_FAILED);
}
