// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry for transient step failures.

use sqlflow_core::{ErrorKind, StepExecutionResult};
use std::time::Duration;

/// Retry policy for transient connector errors. Backoff is linear and
/// deterministic: `base_delay * attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum total attempts (1 = no retries).
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Whether a failed result is retriable at the given attempt number
    /// (1-based).
    pub fn should_retry(&self, result: &StepExecutionResult, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        matches!(
            result.error.as_ref().map(|e| e.kind),
            Some(ErrorKind::ConnectorTransient)
        )
    }

    /// Delay before the next attempt (1-based attempt number just
    /// completed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}
