// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The collected test tree.
//!
//! Collection is the first of two phases: a [`Collector`] runs a file's declarations and
//! produces a [`TestArena`], which addresses every suite and case by [`NodeId`]. The arena is
//! then resolved by [`RunModeResolver`](crate::run_mode::RunModeResolver) and executed by the
//! [`executor`](crate::executor).

mod arena;
mod collector;
mod hooks;

pub use arena::*;
pub use collector::*;
pub use hooks::{Cleanup, HookHandle, HookKind, TestFuture};
pub(crate) use hooks::{AfterEachFn, BeforeEachFn, Hook, SuiteHooks};
