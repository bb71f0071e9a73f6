// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::tree::HookKind;
use futures::FutureExt;
use std::{any::Any, future::Future, panic::AssertUnwindSafe, time::Duration};
use tessera_metadata::TestError;

/// Calls a user function and awaits its future under a timeout, converting panics into errors.
///
/// Panics raised while `f` builds its future are caught the same way as panics raised while the
/// future is polled. A zero `limit` disables the timeout.
pub(crate) async fn guard<T, F, Fut>(
    f: F,
    limit: Duration,
    timeout_message: impl FnOnce() -> String,
) -> Result<T, TestError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, TestError>>,
{
    let fut = AssertUnwindSafe(async move { f().await }).catch_unwind();
    let res = if limit.is_zero() {
        fut.await
    } else {
        match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => return Err(TestError::timeout(timeout_message())),
        }
    };

    match res {
        Ok(res) => res,
        Err(payload) => Err(panic_error(payload)),
    }
}

pub(crate) fn case_timeout_message(name: &str, limit: Duration) -> String {
    format!("{name} timed out in {}ms", limit.as_millis())
}

pub(crate) fn hook_timeout_message(kind: HookKind, limit: Duration) -> String {
    format!("{kind} hook timed out in {}ms", limit.as_millis())
}

fn panic_error(payload: Box<dyn Any + Send>) -> TestError {
    TestError::new(panic_message(&*payload)).with_name("Panic")
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_owned()
    }
}
