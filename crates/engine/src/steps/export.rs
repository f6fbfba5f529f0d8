// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `export` handler.
//!
//! Prefers the engine's direct `COPY ... TO` path for CSV destinations;
//! otherwise materializes the source (table or inline query) and writes
//! through the connector. A missing source table for a CSV destination
//! degrades to an empty file rather than failing the run.

use super::{check_cancel, connector_error, engine_error, lineage_reads, query_object, StepOutput};
use crate::context::{CancelToken, ExecutionContext};
use indexmap::IndexMap;
use sqlflow_connectors::{csv, EngineError, Frame};
use sqlflow_core::{ErrorKind, PlanStep, StepError};
use sqlflow_vars::SubstOptions;
use std::path::Path;

pub(crate) fn handle(
    step: &PlanStep,
    ctx: &ExecutionContext,
    cancel: &CancelToken,
) -> Result<StepOutput, StepError> {
    check_cancel(cancel)?;

    let connector_type = step
        .source_connector_type
        .clone()
        .unwrap_or_else(|| "CSV".to_string());
    let destination = query_object(step)
        .and_then(|o| o.get("destination_uri"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            StepError::new(ErrorKind::StepExecution, "export step has no destination")
        })?
        .to_string();
    let options: IndexMap<String, serde_json::Value> = query_object(step)
        .and_then(|o| o.get("options"))
        .and_then(|v| v.as_object())
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let inline_sql = query_object(step)
        .and_then(|o| o.get("sql_query"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);
    let query = match (&inline_sql, &step.source_table) {
        (Some(sql), _) => sql.clone(),
        (None, Some(table)) => format!("SELECT * FROM {}", table),
        (None, None) => {
            return Err(StepError::new(
                ErrorKind::StepExecution,
                "export step has neither a source table nor an inline query",
            ));
        }
    };
    let substituted = ctx
        .substituter
        .substitute(&query, &ctx.variables, SubstOptions::sql())
        .map_err(|substitution_error| {
            StepError::new(ErrorKind::VariableSubstitution, substitution_error.to_string())
        })?;

    let mut output = StepOutput {
        warnings: substituted.warnings,
        reads: lineage_reads(step),
        ..StepOutput::default()
    };
    let query = substituted.text;
    let is_csv = connector_type.eq_ignore_ascii_case("csv");

    check_cancel(cancel)?;

    // Fast path: let the engine write the file directly.
    if is_csv {
        let copied = ctx.engine.statement(|engine| {
            if !engine.supports_copy() {
                return None;
            }
            Some(engine.copy_to_file(&query, Path::new(&destination), &options))
        });
        match copied {
            Some(Ok(rows)) => {
                tracing::debug!(rows, destination = destination.as_str(), "exported via COPY");
                output.rows = Some(rows);
                return Ok(output);
            }
            Some(Err(EngineError::UnknownTable(table))) => {
                return write_empty_csv(&destination, &table, output);
            }
            Some(Err(copy_error)) => {
                tracing::warn!(
                    error = %copy_error,
                    "COPY export failed; falling back to connector write"
                );
                output.warnings.push(format!(
                    "direct COPY failed, exported through connector instead: {}",
                    copy_error
                ));
            }
            None => {}
        }
    }

    // Materialize and hand the frame to the connector.
    let materialized = ctx.engine.statement(|engine| engine.execute(&query));
    let frame = match materialized {
        Ok(result) => result.frame,
        Err(EngineError::UnknownTable(table)) if is_csv => {
            return write_empty_csv(&destination, &table, output);
        }
        Err(other) => return Err(engine_error(other)),
    };

    check_cancel(cancel)?;

    let mut connector = ctx
        .registry
        .create(&connector_type)
        .map_err(connector_error)?;
    output.bytes = Some(frame.approx_bytes());
    let written = connector
        .write(&destination, &frame, &options)
        .map_err(connector_error)?;
    output.rows = Some(written);
    Ok(output)
}

/// CSV degradation for a missing source: an empty file, not an error.
fn write_empty_csv(
    destination: &str,
    missing_table: &str,
    mut output: StepOutput,
) -> Result<StepOutput, StepError> {
    tracing::warn!(
        destination,
        table = missing_table,
        "export source missing; writing empty file"
    );
    csv::write_csv(Path::new(destination), &Frame::default(), true, ',').map_err(|write_error| {
        StepError::new(
            ErrorKind::StepExecution,
            format!("failed to write empty export file: {}", write_error),
        )
    })?;
    output.warnings.push(format!(
        "source table '{}' does not exist; wrote an empty file",
        missing_table
    ));
    output.rows = Some(0);
    Ok(output)
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
