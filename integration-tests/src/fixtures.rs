// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tessera_metadata::{EntryInfo, TestError};
use tessera_runner::{
    tree::Declare,
    worker::{ModuleScope, TestFileRegistry},
};

/// The artifact read by `asset.test`.
pub const FIXTURE_ASSET: &str = "dist/fixture.json";

/// Returns the entry for the fixture file `name`.
pub fn entry(name: &str) -> EntryInfo {
    EntryInfo::new(format!("{name}.test"), format!("dist/{name}.js"))
}

/// Returns every fixture file.
pub fn registry() -> TestFileRegistry {
    let mut registry = TestFileRegistry::new();
    registry
        .register("pass.test", |cx| {
            cx.describe("math", |cx| {
                cx.test("adds", |cx| async move {
                    cx.log("adding");
                    Ok(())
                });
                cx.test("subtracts", |_| async { Ok(()) });
            });
            cx.todo("divides");
        })
        .register("fail.test", |cx| {
            cx.test("passes", |_| async { Ok(()) });
            cx.test("fails", |_| async { Err(TestError::new("expected 1 to be 2")) });
            cx.test_with(Declare::new().skip(), "skipped", |_| async { Ok(()) });
        })
        .register("crash.test", |cx| {
            cx.describe("crashes", |cx| {
                cx.test("before the crash", |_| async { Ok(()) });
                cx.test("aborts", |_| abort_after(Duration::from_millis(200)));
            });
        })
        .register("asset.test", |cx| {
            cx.test("reads fixture", |cx| async move {
                match cx.asset(Utf8Path::new(FIXTURE_ASSET)) {
                    Some(contents) if contents.contains("fixture") => Ok(()),
                    Some(contents) => Err(TestError::new(format!("unexpected asset: {contents}"))),
                    None => Err(TestError::new(format!("asset `{FIXTURE_ASSET}` missing"))),
                }
            });
        })
        .register("state-a.test", |cx| {
            cx.test("writes modules", |cx| async move {
                let counter = cx.modules().get_or_init("counter", || AtomicUsize::new(0));
                counter.fetch_add(1, Ordering::SeqCst);
                cx.modules()
                    .get_or_init_scoped("shared", ModuleScope::Shared, || AtomicUsize::new(0));
                Ok(())
            });
        })
        .register("state-b.test", |cx| {
            cx.test("starts clean", |cx| async move {
                if cx.modules().contains("counter") {
                    return Err(TestError::new("file-scoped module leaked across files"));
                }
                Ok(())
            });
            cx.test("keeps shared modules", |cx| async move {
                match cx.modules().get::<AtomicUsize>("shared") {
                    Some(_) => Ok(()),
                    None => Err(TestError::new("shared module was evicted")),
                }
            });
        });
    registry
}

async fn abort_after(delay: Duration) -> Result<(), TestError> {
    // Give the worker's writer time to flush the case-start notification.
    tokio::time::sleep(delay).await;
    std::process::abort()
}
