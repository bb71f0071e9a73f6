// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Individual configuration elements.

mod pool_options;
mod rpc_timeout;
mod worker_count;

pub use pool_options::*;
pub use rpc_timeout::*;
pub use worker_count::*;
