// Copyright (c) The tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt, future::Future, num::NonZeroUsize, time::Duration};
use tracing::{debug, warn};

/// Delays between reconnect attempts, capped at the last entry.
#[derive(Clone, Debug)]
pub struct ReconnectSchedule {
    delays: Vec<Duration>,
    next_index: usize,
}

impl ReconnectSchedule {
    /// The default delays, in milliseconds.
    pub const DEFAULT_DELAYS_MS: [u64; 6] = [1000, 2000, 4000, 8000, 16000, 30000];

    /// Creates a schedule with the given delays.
    ///
    /// An empty list falls back to the default delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        if delays.is_empty() {
            return Self::default();
        }
        Self {
            delays,
            next_index: 0,
        }
    }

    /// Returns the delay before the next attempt and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let index = self.next_index.min(self.delays.len() - 1);
        self.next_index = self.next_index.saturating_add(1);
        self.delays[index]
    }

    /// Starts over from the first delay. Called after a successful connection.
    pub fn reset(&mut self) {
        self.next_index = 0;
    }

    /// Returns the number of delays handed out since the last reset.
    pub fn attempts(&self) -> usize {
        self.next_index
    }
}

impl Default for ReconnectSchedule {
    fn default() -> Self {
        Self {
            delays: Self::DEFAULT_DELAYS_MS
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
            next_index: 0,
        }
    }
}

/// Calls `connect` until it succeeds, sleeping between attempts according to `schedule`.
///
/// With `max_attempts`, the error from the last attempt is returned once that many attempts have
/// failed. On success the schedule is reset so the next disconnect starts from the first delay.
pub async fn connect_with_backoff<T, E, F, Fut>(
    schedule: &mut ReconnectSchedule,
    max_attempts: Option<NonZeroUsize>,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match connect().await {
            Ok(connection) => {
                debug!(attempt, "connected");
                schedule.reset();
                return Ok(connection);
            }
            Err(error) => {
                if max_attempts.is_some_and(|max| attempt >= max.get()) {
                    warn!(attempt, %error, "giving up on connecting");
                    return Err(error);
                }
                let delay = schedule.next_delay();
                warn!(
                    attempt,
                    %error,
                    "connection failed, retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    #[test]
    fn delays_are_capped_at_the_last_entry() {
        let mut schedule = ReconnectSchedule::default();
        let delays: Vec<u128> = (0..8).map(|_| schedule.next_delay().as_millis()).collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );

        schedule.reset();
        assert_eq!(schedule.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn empty_schedule_uses_defaults() {
        let mut schedule = ReconnectSchedule::new(Vec::new());
        assert_eq!(schedule.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected() {
        let mut schedule = ReconnectSchedule::default();
        let mut failures_left = 3;
        let start = Instant::now();

        let connection = connect_with_backoff(&mut schedule, None, || {
            let result = if failures_left > 0 {
                failures_left -= 1;
                Err("refused")
            } else {
                Ok("connected")
            };
            std::future::ready(result)
        })
        .await
        .unwrap();

        assert_eq!(connection, "connected");
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(7000) && elapsed < Duration::from_millis(8000),
            "slept 1s + 2s + 4s, took {elapsed:?}"
        );
        assert_eq!(schedule.attempts(), 0, "schedule is reset after connecting");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let mut schedule = ReconnectSchedule::new(vec![Duration::from_millis(10)]);
        let mut calls = 0;

        let error = connect_with_backoff(&mut schedule, NonZeroUsize::new(3), || {
            calls += 1;
            std::future::ready(Err::<(), _>(format!("attempt {calls} refused")))
        })
        .await
        .unwrap_err();

        assert_eq!(error, "attempt 3 refused");
        assert_eq!(calls, 3);
    }
}
