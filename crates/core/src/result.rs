// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable step results and durable run records.

use crate::plan::StepKind;
use crate::RunId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final status of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Error taxonomy carried on failed steps and run results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    VariableSubstitution,
    Planning,
    Evaluation,
    ConnectorTransient,
    ConnectorPermanent,
    Database,
    StepExecution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::VariableSubstitution => "variable_substitution",
            ErrorKind::Planning => "planning",
            ErrorKind::Evaluation => "evaluation",
            ErrorKind::ConnectorTransient => "connector_transient",
            ErrorKind::ConnectorPermanent => "connector_permanent",
            ErrorKind::Database => "database",
            ErrorKind::StepExecution => "step_execution",
        };
        f.write_str(s)
    }
}

/// Structured error attached to a failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub context: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

impl StepError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: IndexMap::new(),
            suggested_actions: Vec::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_suggestion(mut self, action: impl Into<String>) -> Self {
        self.suggested_actions.push(action.into());
        self
    }
}

/// A column of an input or output schema snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

/// Immutable record of one step execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub step_id: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Vec<ColumnSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Vec<ColumnSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Tables this step read from, for lineage tracking.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reads: Vec<String>,
    /// Table this step wrote, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writes: Option<String>,
}

impl StepExecutionResult {
    pub fn success(
        step_id: impl Into<String>,
        kind: StepKind,
        started_at_ms: u64,
        finished_at_ms: u64,
    ) -> Self {
        Self::finished(step_id, kind, StepStatus::Success, started_at_ms, finished_at_ms)
    }

    pub fn failure(
        step_id: impl Into<String>,
        kind: StepKind,
        started_at_ms: u64,
        finished_at_ms: u64,
        error: StepError,
    ) -> Self {
        let mut result = Self::finished(
            step_id,
            kind,
            StepStatus::Failed,
            started_at_ms,
            finished_at_ms,
        );
        result.error = Some(error);
        result
    }

    fn finished(
        step_id: impl Into<String>,
        kind: StepKind,
        status: StepStatus,
        started_at_ms: u64,
        finished_at_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            kind,
            status,
            started_at_ms,
            finished_at_ms,
            duration_ms: finished_at_ms.saturating_sub(started_at_ms),
            rows_affected: None,
            bytes_processed: None,
            input_schema: None,
            output_schema: None,
            error: None,
            warnings: Vec::new(),
            reads: Vec::new(),
            writes: None,
        }
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows_affected = Some(rows);
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes_processed = Some(bytes);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_lineage(mut self, reads: Vec<String>, writes: Option<String>) -> Self {
        self.reads = reads;
        self.writes = writes;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
    PartialSuccess,
}

/// Durable record of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    pub status: RunStatus,
    #[serde(default)]
    pub step_results: Vec<StepExecutionResult>,
    /// Aggregated metrics snapshot taken at run end.
    #[serde(default)]
    pub metrics: IndexMap<String, serde_json::Value>,
}

impl RunRecord {
    pub fn new(run_id: RunId, started_at_ms: u64) -> Self {
        Self {
            run_id,
            started_at_ms,
            finished_at_ms: None,
            status: RunStatus::Failed,
            step_results: Vec::new(),
            metrics: IndexMap::new(),
        }
    }

    /// Result for a specific step, if recorded.
    pub fn step_result(&self, step_id: &str) -> Option<&StepExecutionResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
