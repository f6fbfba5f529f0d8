// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime task state machine for plan steps.
//!
//! The only legal transitions are:
//!
//! ```text
//! PENDING ──(unmet_dependencies == 0)──► RUNNABLE ──► RUNNING ──► SUCCESS
//!                                                        │
//!                                                        └──► FAILED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raised when a caller attempts a transition the state machine forbids.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal task transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// Runtime state of a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Runnable,
    Running,
    Success,
    Failed,
}

impl TaskState {
    /// Whether the state machine permits moving to `next`.
    pub fn can_transition(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Runnable)
                | (TaskState::Runnable, TaskState::Running)
                | (TaskState::Running, TaskState::Success)
                | (TaskState::Running, TaskState::Failed)
        )
    }

    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Runnable => "RUNNABLE",
            TaskState::Running => "RUNNING",
            TaskState::Success => "SUCCESS",
            TaskState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Scheduler bookkeeping for one plan step during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub unmet_dependencies: usize,
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time_ms: Option<u64>,
}

impl TaskStatus {
    /// Initial status: `PENDING` with one unmet count per dependency, or
    /// immediately `RUNNABLE` when there are none.
    pub fn new(dependencies: Vec<String>) -> Self {
        let unmet = dependencies.len();
        Self {
            state: if unmet == 0 {
                TaskState::Runnable
            } else {
                TaskState::Pending
            },
            unmet_dependencies: unmet,
            dependencies,
            attempts: 0,
            error: None,
            start_time_ms: None,
            end_time_ms: None,
        }
    }

    /// Apply a transition, enforcing legality.
    pub fn transition(&mut self, next: TaskState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record the completion of one dependency. Returns true when the step
    /// just became runnable.
    pub fn satisfy_dependency(&mut self) -> Result<bool, IllegalTransition> {
        self.unmet_dependencies = self.unmet_dependencies.saturating_sub(1);
        if self.unmet_dependencies == 0 && self.state == TaskState::Pending {
            self.transition(TaskState::Runnable)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Reset a failed step back to pending for resume. Prior output is
    /// assumed invalid; dependency counts are rebuilt by the caller.
    pub fn reset_for_resume(&mut self) {
        self.state = TaskState::Pending;
        self.unmet_dependencies = self.dependencies.len();
        self.error = None;
        self.start_time_ms = None;
        self.end_time_ms = None;
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
