// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The pool of worker processes that test files run in.
//!
//! The main structure in this module is [`WorkerPool`]. Each test file is sent to a worker as a
//! single task, and the worker streams progress back over its RPC channel while it runs.

mod events;
mod imp;
mod running;
mod sizing;
mod worker;

pub use events::*;
pub use imp::*;
pub use sizing::*;
pub use worker::WorkerCommand;
