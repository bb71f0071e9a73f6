// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for tessera's integration tests.
//!
//! The `tessera-fixture-worker` binary serves [`fixtures::registry`] as a worker, and the tests in
//! `tests/integration` dispatch entries from [`fixtures`] to it.

pub mod fixtures;
