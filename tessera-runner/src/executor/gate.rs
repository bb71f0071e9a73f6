// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use futures::{StreamExt, stream};
use std::future::Future;

/// Limits how many concurrent siblings are in flight at once.
///
/// Consecutive concurrent siblings form a batch that runs with at most `max_concurrency` members
/// in flight. A sequential sibling is a barrier: it starts once the preceding batch has settled,
/// and the siblings after it start once it completes. Grouping is local to one sibling list.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConcurrencyGate {
    max_concurrency: usize,
}

impl ConcurrencyGate {
    pub(crate) fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Runs `items` in declaration order and returns their outputs in completion order.
    pub(crate) async fn run<I, T, Fut>(
        &self,
        items: &[I],
        is_concurrent: impl Fn(&I) -> bool,
        mut run: impl FnMut(&I) -> Fut,
    ) -> Vec<T>
    where
        Fut: Future<Output = T>,
    {
        let mut out = Vec::with_capacity(items.len());
        let mut rest = items;

        while let Some(first) = rest.first() {
            if !is_concurrent(first) {
                out.push(run(first).await);
                rest = &rest[1..];
                continue;
            }

            let batch_len = rest
                .iter()
                .position(|item| !is_concurrent(item))
                .unwrap_or(rest.len());
            let (batch, after) = rest.split_at(batch_len);

            // buffer_unordered dispatches in order but yields in completion order.
            let outputs: Vec<T> = stream::iter(batch.iter().map(&mut run))
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
            out.extend(outputs);
            rest = after;
        }

        out
    }
}
