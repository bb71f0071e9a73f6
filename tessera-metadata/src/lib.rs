// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Data shared between the tessera orchestrator and its worker processes.
//!
//! Everything in this crate crosses a process boundary at some point, so every type here is
//! serializable with [`serde`] and carries no behavior beyond small helpers. The orchestrator and
//! workers agree on this crate's shapes and nothing else.

mod entry;
mod errors;
mod events;
mod exit_codes;
mod results;
mod rpc;
mod run_mode;
mod runtime_config;
mod task;

pub use entry::*;
pub use errors::*;
pub use events::*;
pub use exit_codes::*;
pub use results::*;
pub use rpc::*;
pub use run_mode::*;
pub use runtime_config::*;
pub use task::*;
