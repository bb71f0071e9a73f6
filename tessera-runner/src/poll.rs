// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polling assertions.
//!
//! [`poll_until`] repeatedly produces a value and checks it against a [`Matcher`] until the check
//! passes or time runs out. [`wait_for`] does the same for a fallible async closure.

use std::{fmt, future::Future, time::Duration};
use tessera_metadata::TestError;
use tokio::time::Instant;

/// Checks a value, returning an error that describes the mismatch.
pub trait Matcher<T: ?Sized> {
    /// Checks `actual`.
    fn check(&self, actual: &T) -> Result<(), TestError>;
}

impl<T: ?Sized, F> Matcher<T> for F
where
    F: Fn(&T) -> Result<(), TestError>,
{
    fn check(&self, actual: &T) -> Result<(), TestError> {
        self(actual)
    }
}

/// A matcher that checks for equality.
#[derive(Clone, Debug)]
pub struct Equals<T>(T);

/// Returns a matcher that passes when the actual value equals `expected`.
pub fn eq<T>(expected: T) -> Equals<T> {
    Equals(expected)
}

impl<T: PartialEq + fmt::Debug> Matcher<T> for Equals<T> {
    fn check(&self, actual: &T) -> Result<(), TestError> {
        if *actual == self.0 {
            return Ok(());
        }
        Err(TestError::new(format!("expected {:?}, got {:?}", self.0, actual))
            .with_name("AssertionError")
            .with_diff(format!("- {:?}\n+ {:?}", self.0, actual)))
    }
}

/// How often and for how long to poll.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollOptions {
    /// The delay between attempts.
    pub interval: Duration,

    /// The total time allowed, including the time spent producing values.
    pub timeout: Duration,
}

impl PollOptions {
    /// The default interval between attempts.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

    /// The default total timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Produces values until one passes `matcher`, and returns it.
///
/// On timeout, the most recent matcher error is returned, annotated with the timeout.
pub async fn poll_until<T, F, Fut, M>(
    mut produce: F,
    matcher: &M,
    options: PollOptions,
) -> Result<T, TestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    M: Matcher<T> + ?Sized,
{
    wait_for(
        || {
            let fut = produce();
            async move {
                let value = fut.await;
                matcher.check(&value).map(|()| value)
            }
        },
        options,
    )
    .await
}

/// Calls `f` until it succeeds, and returns its output.
///
/// On timeout, the most recent error is returned, annotated with the timeout.
pub async fn wait_for<T, F, Fut>(mut f: F, options: PollOptions) -> Result<T, TestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TestError>>,
{
    let deadline = Instant::now() + options.timeout;
    let mut last_error = None;

    loop {
        match tokio::time::timeout_at(deadline, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) => last_error = Some(error),
            Err(_) => break,
        }
        if Instant::now() + options.interval >= deadline {
            break;
        }
        tokio::time::sleep(options.interval).await;
    }

    let timeout_ms = options.timeout.as_millis();
    Err(match last_error {
        Some(mut error) => {
            error.message = format!("{} (polled for {timeout_ms}ms)", error.message);
            error
        }
        None => TestError::timeout(format!("polling timed out in {timeout_ms}ms")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    #[tokio::test(start_paused = true)]
    async fn polls_until_match() {
        let counter = Arc::new(AtomicU32::new(0));
        let value = poll_until(
            || {
                let counter = counter.clone();
                async move { counter.fetch_add(1, Ordering::SeqCst) + 1 }
            },
            &eq(3),
            PollOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_last_mismatch() {
        let options = PollOptions {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let error = poll_until(|| async { "pending" }, &eq("ready"), options)
            .await
            .unwrap_err();

        assert_eq!(
            error.message,
            r#"expected "ready", got "pending" (polled for 100ms)"#
        );
        assert_eq!(error.name.as_deref(), Some("AssertionError"));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_producer_times_out() {
        let options = PollOptions {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let error = wait_for(
            || async {
                std::future::pending::<()>().await;
                Ok(())
            },
            options,
        )
        .await
        .unwrap_err();
        assert_eq!(error.message, "polling timed out in 100ms");
    }

    #[tokio::test(start_paused = true)]
    async fn closures_are_matchers() {
        let is_even = |n: &u32| {
            if n % 2 == 0 {
                Ok(())
            } else {
                Err(TestError::new(format!("{n} is odd")))
            }
        };
        let mut next = 0;
        let value = poll_until(
            || {
                next += 1;
                std::future::ready(next)
            },
            &is_even,
            PollOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(value, 2);
    }
}
