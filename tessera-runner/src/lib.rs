// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for tessera, a test runner that executes each test file in an isolated
//! worker process.
//!
//! The basic flow: a [`BuildPipeline`](pipeline::BuildPipeline) produces entries, a
//! [`TestRunner`](runner::TestRunner) dispatches them to a [`WorkerPool`](pool::WorkerPool), and
//! each worker collects the file into a [test tree](tree) and walks it with the
//! [executor](executor). Workers talk to the orchestrator over the [RPC channel](rpc).

pub mod cancel;
pub mod config;
pub mod entry_diff;
pub mod errors;
pub mod executor;
mod helpers;
pub mod pipeline;
pub mod poll;
pub mod pool;
pub mod reporter;
pub mod rpc;
pub mod run_mode;
pub mod runner;
pub mod signal;
mod time;
pub mod tree;
pub mod watch;
pub mod worker;
