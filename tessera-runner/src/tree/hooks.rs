// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::executor::{SuiteContext, TestContext};
use debug_ignore::DebugIgnore;
use futures::{FutureExt, future::BoxFuture};
use std::{fmt, future::Future, time::Duration};
use tessera_metadata::TestError;

/// The future returned by case bodies, hooks and cleanups.
pub type TestFuture<T = ()> = BoxFuture<'static, Result<T, TestError>>;

pub(crate) type CaseFn = Box<dyn Fn(TestContext) -> TestFuture + Send + Sync>;
pub(crate) type BeforeAllFn =
    Box<dyn Fn(SuiteContext) -> TestFuture<Option<Cleanup>> + Send + Sync>;
pub(crate) type AfterAllFn = Box<dyn Fn(SuiteContext) -> TestFuture + Send + Sync>;
pub(crate) type BeforeEachFn =
    Box<dyn Fn(TestContext) -> TestFuture<Option<Cleanup>> + Send + Sync>;
pub(crate) type AfterEachFn = Box<dyn Fn(TestContext) -> TestFuture + Send + Sync>;

/// A teardown closure returned by a `before_all` or `before_each` hook.
///
/// Cleanups run after the matching `after_*` hooks, in reverse acquisition order.
pub struct Cleanup(Box<dyn FnOnce() -> TestFuture + Send>);

impl Cleanup {
    /// Creates a new cleanup from an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TestError>> + Send + 'static,
    {
        Self(Box::new(move || f().boxed()))
    }

    pub(crate) fn call(self) -> TestFuture {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// The kind of a lifecycle hook.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HookKind {
    /// Runs once before any child of the suite.
    BeforeAll,

    /// Runs once after every child of the suite.
    AfterAll,

    /// Runs before each case in the suite, including nested ones.
    BeforeEach,

    /// Runs after each case in the suite, including nested ones.
    AfterEach,
}

impl HookKind {
    /// Returns the name used for this hook in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeAll => "beforeAll",
            Self::AfterAll => "afterAll",
            Self::BeforeEach => "beforeEach",
            Self::AfterEach => "afterEach",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct Hook<F> {
    pub(crate) f: DebugIgnore<F>,
    pub(crate) timeout: Option<Duration>,
}

impl<F> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<F> Hook<F> {
    pub(crate) fn new(f: F) -> Self {
        Self {
            f: DebugIgnore(f),
            timeout: None,
        }
    }
}

/// The listeners a suite declares, in declaration order.
#[derive(Debug, Default)]
pub(crate) struct SuiteHooks {
    pub(crate) before_all: Vec<Hook<BeforeAllFn>>,
    pub(crate) after_all: Vec<Hook<AfterAllFn>>,
    pub(crate) before_each: Vec<Hook<BeforeEachFn>>,
    pub(crate) after_each: Vec<Hook<AfterEachFn>>,
}

/// Returned by hook registration to override the hook timeout.
#[derive(Debug)]
pub struct HookHandle<'a> {
    timeout: &'a mut Option<Duration>,
}

impl<'a> HookHandle<'a> {
    pub(crate) fn new(timeout: &'a mut Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Sets the timeout for this hook. A zero duration disables the timeout.
    pub fn timeout(self, timeout: Duration) {
        *self.timeout = Some(timeout);
    }
}
