// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The RPC channel between the orchestrator and its workers.
//!
//! Messages are JSON envelopes from [`tessera_metadata`], one per line, each prefixed with
//! [`FRAME_MARKER`]. The transport is any pair of async byte streams: worker processes use their
//! stdin and stdout.

mod channel;
mod framing;
mod reconnect;

pub use channel::*;
pub use framing::*;
pub use reconnect::*;
