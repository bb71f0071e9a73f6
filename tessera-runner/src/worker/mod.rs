// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker side of the pool.
//!
//! A worker is a process that serves [`WorkerTask`](tessera_metadata::WorkerTask)s over an RPC
//! channel on its stdin and stdout. By default the pool re-invokes the current executable with
//! [`WORKER_SUBCOMMAND`] as its first argument, so a binary that hosts tests should check
//! [`is_worker_invocation`] early in `main`:
//!
//! ```no_run
//! use tessera_runner::worker::{TestFileRegistry, is_worker_invocation, worker_main};
//!
//! fn main() {
//!     if is_worker_invocation() {
//!         let mut registry = TestFileRegistry::new();
//!         registry.register("src/math.test.ts", |cx| {
//!             cx.test("adds", |_| async { Ok(()) });
//!         });
//!         std::process::exit(worker_main(registry));
//!     }
//!
//!     // ... orchestrator ...
//! }
//! ```

mod handler;
mod module_cache;
mod registry;

pub(crate) use handler::WorkerHandler;
pub use module_cache::*;
pub use registry::*;

use crate::{config::RpcTimeout, rpc::RpcChannel};
use std::{sync::Arc, time::Duration};
use tessera_metadata::TesseraExitCode;
use tracing::{debug, error, level_filters::LevelFilter};
use tracing_subscriber::{Layer, filter::Targets, layer::SubscriberExt, util::SubscriberInitExt};

/// The hidden subcommand that turns the current executable into a worker.
pub const WORKER_SUBCOMMAND: &str = "__tessera-worker";

/// The environment variable that controls worker log output.
///
/// The value uses `tracing-subscriber`'s `Targets` syntax, e.g. `tessera_runner=debug`.
pub const WORKER_LOG_ENV: &str = "TESSERA_LOG";

/// Returns true if the current process was started as a worker.
pub fn is_worker_invocation() -> bool {
    std::env::args_os()
        .nth(1)
        .is_some_and(|arg| arg == WORKER_SUBCOMMAND)
}

/// Serves tasks for `registry` over stdin and stdout until the orchestrator closes the channel.
///
/// Returns the process exit code.
pub fn worker_main(registry: TestFileRegistry) -> i32 {
    init_logging();

    // Each worker runs a single-threaded event loop.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("error creating worker runtime: {err}");
            return TesseraExitCode::TEST_RUN_FAILED;
        }
    };

    runtime.block_on(async move {
        let channel = RpcChannel::spawn(
            tokio::io::stdin(),
            tokio::io::stdout(),
            Arc::new(WorkerHandler::new(registry)),
            RpcTimeout::Disabled,
        );
        channel.closed().await;
        debug!("orchestrator closed the channel, exiting");
    });
    runtime.shutdown_timeout(Duration::from_millis(100));

    TesseraExitCode::OK
}

/// Logs go to stderr: stdout carries the RPC channel.
fn init_logging() {
    let targets = std::env::var(WORKER_LOG_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .and_then(|value| match value.parse::<Targets>() {
            Ok(targets) => Some(targets),
            Err(err) => {
                eprintln!("tessera worker: ignoring invalid {WORKER_LOG_ENV} ({err})");
                None
            }
        })
        .unwrap_or_else(|| Targets::new().with_default(LevelFilter::WARN));

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(targets);

    // A subscriber may already be installed if the worker runs inside a test harness.
    let _ = tracing_subscriber::registry().with(layer).try_init();
}
