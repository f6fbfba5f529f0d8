// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor error type and process exit codes.

use sqlflow_plan::PlanningError;
use sqlflow_storage::StorageError;
use thiserror::Error;

/// Errors that abort a run before or outside step execution. Failures
/// *inside* a step become `FAILED` step results, not `ExecuteError`s.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("planning error: {0}")]
    Planning(#[from] PlanningError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("run cancelled before completion")]
    Cancelled,
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

impl ExecuteError {
    /// Process exit code when surfaced through a CLI: 1 planning,
    /// 2 execution, 3 validation, 4 I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecuteError::Planning(_) => 1,
            ExecuteError::Cancelled | ExecuteError::Scheduler(_) => 2,
            ExecuteError::Validation(_) => 3,
            ExecuteError::Storage(_) => 4,
        }
    }
}
