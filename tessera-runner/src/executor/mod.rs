// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Executes a collected test file.
//!
//! The executor walks a resolved [`TestArena`](crate::tree::TestArena) depth-first. For each suite
//! it runs `before_all` hooks, then its children (sequentially, or in bounded batches for
//! concurrent siblings), then `after_all` hooks in reverse and the collected cleanups. For each
//! case it runs the accumulated `before_each` hooks outermost first, the body under its timeout,
//! then `after_each` hooks innermost first, retrying failed attempts.

mod context;
mod gate;
mod imp;
mod timeout;

pub use context::*;
pub use imp::run_file;
pub(crate) use timeout::panic_message;
