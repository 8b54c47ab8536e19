//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::{Duration, Instant};

/// Exponential backoff tracker for retryable operations.
///
/// Every reported error doubles the wait time, up to the configured maximum.
/// A reported success resets the tracker to its initial state.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    initial_backoff: Duration,
    max_backoff: Duration,
    current_backoff: Duration,
    last_error_time: Option<Instant>,
}

// ===== impl ExponentialBackoff =====

impl ExponentialBackoff {
    pub fn new(
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_backoff,
            max_backoff,
            current_backoff: Duration::ZERO,
            last_error_time: None,
        }
    }

    /// Registers a failed attempt, doubling the backoff period.
    pub fn report_error(&mut self) {
        self.current_backoff = if self.current_backoff.is_zero() {
            self.initial_backoff
        } else {
            std::cmp::min(self.current_backoff * 2, self.max_backoff)
        };
        self.last_error_time = Some(Instant::now());
    }

    /// Registers a successful attempt, resetting the backoff period.
    pub fn report_success(&mut self) {
        self.current_backoff = Duration::ZERO;
        self.last_error_time = None;
    }

    /// Returns whether a new attempt may be made now.
    pub fn can_try_now(&self) -> bool {
        self.time_remaining_until_retry().is_zero()
    }

    /// Returns how long to wait before the next attempt is allowed.
    pub fn time_remaining_until_retry(&self) -> Duration {
        match self.last_error_time {
            Some(last_error_time) => self
                .current_backoff
                .saturating_sub(last_error_time.elapsed()),
            None => Duration::ZERO,
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(8),
            Duration::from_secs(3600),
        );
        assert!(backoff.can_try_now());

        backoff.report_error();
        assert!(!backoff.can_try_now());
        assert!(backoff.time_remaining_until_retry() <= Duration::from_secs(8));

        // Each consecutive error doubles the wait, capped at the maximum.
        for _ in 0..16 {
            backoff.report_error();
        }
        assert!(
            backoff.time_remaining_until_retry() <= Duration::from_secs(3600)
        );

        backoff.report_success();
        assert!(backoff.can_try_now());
    }
}
