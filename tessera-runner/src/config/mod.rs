// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tessera configuration.
//!
//! Configuration is layered with the [`config`] crate: the embedded default config comes first,
//! followed by the project's `.config/tessera.toml` (or an explicitly provided file).

mod elements;
mod imp;

pub use elements::*;
pub use imp::*;
