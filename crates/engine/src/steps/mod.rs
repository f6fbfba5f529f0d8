// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kind-specific step handlers.
//!
//! One handler per plan-step kind behind a closed dispatch; registering
//! a new step kind means adding an arm here. Handlers are synchronous
//! (they block on I/O) and run on blocking-capable workers; they check
//! the cancellation token between subtasks and never touch shared
//! mutable state outside the SQL engine and the context's source map.

pub mod export;
pub mod load;
pub mod source;
pub mod transform;

use crate::context::{CancelToken, ExecutionContext};
use sqlflow_connectors::{ConnectorError, EngineError};
use sqlflow_core::{
    ColumnSchema, ErrorKind, PlanStep, StepError, StepExecutionResult, StepKind,
};

/// What a successful handler reports back.
#[derive(Debug, Default)]
pub(crate) struct StepOutput {
    pub rows: Option<u64>,
    pub bytes: Option<u64>,
    pub warnings: Vec<String>,
    pub reads: Vec<String>,
    pub writes: Option<String>,
    pub output_schema: Option<Vec<ColumnSchema>>,
}

/// Dispatch a plan step to its handler and shape the result.
pub fn handle_step(
    step: &PlanStep,
    ctx: &ExecutionContext,
    cancel: &CancelToken,
) -> StepExecutionResult {
    let started_at = ctx.clock.epoch_ms();
    let span = tracing::info_span!("step", step_id = step.id.as_str(), kind = %step.kind);
    let _guard = span.enter();

    let outcome = match step.kind {
        StepKind::SourceDefinition => source::handle(step, ctx, cancel),
        StepKind::Load => load::handle(step, ctx, cancel),
        StepKind::Transform => transform::handle(step, ctx, cancel),
        StepKind::Export => export::handle(step, ctx, cancel),
    };
    let finished_at = ctx.clock.epoch_ms();

    match outcome {
        Ok(output) => {
            let mut result =
                StepExecutionResult::success(&step.id, step.kind, started_at, finished_at)
                    .with_lineage(output.reads, output.writes);
            result.rows_affected = output.rows;
            result.bytes_processed = output.bytes;
            result.output_schema = output.output_schema;
            result.warnings = output.warnings;
            result
        }
        Err(error) => {
            let error = error
                .with_context("step_id", serde_json::json!(step.id))
                .with_context("step_kind", serde_json::json!(step.kind.as_str()))
                .with_context(
                    "duration_ms",
                    serde_json::json!(finished_at.saturating_sub(started_at)),
                );
            StepExecutionResult::failure(&step.id, step.kind, started_at, finished_at, error)
        }
    }
}

/// Bail out if cancellation was requested.
pub(crate) fn check_cancel(cancel: &CancelToken) -> Result<(), StepError> {
    if cancel.is_cancelled() {
        return Err(StepError::new(
            ErrorKind::StepExecution,
            "step cancelled before completion",
        ));
    }
    Ok(())
}

/// Map an engine failure onto the step error taxonomy.
pub(crate) fn engine_error(error: EngineError) -> StepError {
    let mut step_error = StepError::new(ErrorKind::Database, error.to_string());
    if matches!(error, EngineError::UnknownTable(_)) {
        step_error = step_error
            .with_suggestion("ensure an upstream step defines the table, or create it manually");
    }
    step_error
}

/// Map a connector failure onto the step error taxonomy, preserving
/// transience for the retry policy.
pub(crate) fn connector_error(error: ConnectorError) -> StepError {
    let kind = if error.is_transient() {
        ErrorKind::ConnectorTransient
    } else {
        ErrorKind::ConnectorPermanent
    };
    let mut step_error = StepError::new(kind, error.to_string());
    match error {
        ConnectorError::MissingParam { param } => {
            step_error =
                step_error.with_suggestion(format!("add '{}' to the connector PARAMS", param));
        }
        ConnectorError::UnknownConnector { kind } => {
            step_error = step_error
                .with_suggestion(format!("register a connector for type '{}'", kind));
        }
        _ => {}
    }
    step_error
}

/// The step's payload as a JSON object, when it is one.
pub(crate) fn query_object(step: &PlanStep) -> Option<&serde_json::Map<String, serde_json::Value>> {
    step.query.as_ref().and_then(|q| q.as_object())
}

/// A required string field of the payload object.
pub(crate) fn payload_str<'a>(step: &'a PlanStep, key: &str) -> Result<&'a str, StepError> {
    query_object(step)
        .and_then(|o| o.get(key))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            StepError::new(
                ErrorKind::StepExecution,
                format!("step payload is missing '{}'", key),
            )
        })
}

/// Table names this step reads, derived from its dependency ids.
pub(crate) fn lineage_reads(step: &PlanStep) -> Vec<String> {
    step.depends_on
        .iter()
        .filter_map(|dep| {
            dep.strip_prefix("load_")
                .or_else(|| dep.strip_prefix("transform_"))
                .map(str::to_string)
        })
        .collect()
}
