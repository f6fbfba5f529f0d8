// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `load` handler.
//!
//! Resolves the source (named definition or direct file path), reads
//! through the connector (optionally incrementally against a persisted
//! watermark), stages the rows in the engine, and applies the load mode.
//! Watermarks advance only after the load succeeds.

use super::{check_cancel, connector_error, engine_error, payload_str, query_object, StepOutput};
use crate::context::{CancelToken, ExecutionContext};
use indexmap::IndexMap;
use sqlflow_connectors::{Connector, DataChunk, Frame, SqlEngine};
use sqlflow_core::{ErrorKind, PlanStep, StepError};
use std::path::PathBuf;

/// File-backed reads at or above this row count prefer the engine's
/// native COPY path.
const COPY_ROW_THRESHOLD: usize = 100;

struct ResolvedSource {
    connector_type: String,
    params: IndexMap<String, serde_json::Value>,
    object: String,
}

pub(crate) fn handle(
    step: &PlanStep,
    ctx: &ExecutionContext,
    cancel: &CancelToken,
) -> Result<StepOutput, StepError> {
    check_cancel(cancel)?;

    let source_name = payload_str(step, "source_name")?.to_string();
    let table = payload_str(step, "table_name")?.to_string();
    let mode = query_object(step)
        .and_then(|o| o.get("mode"))
        .and_then(|v| v.as_str())
        .unwrap_or("REPLACE")
        .to_uppercase();
    let upsert_keys: Vec<String> = query_object(step)
        .and_then(|o| o.get("upsert_keys"))
        .and_then(|v| v.as_array())
        .map(|keys| {
            keys.iter()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let incremental = query_object(step)
        .and_then(|o| o.get("sync_mode"))
        .and_then(|v| v.as_str())
        .is_some_and(|m| m.eq_ignore_ascii_case("incremental"));
    let cursor_field = query_object(step)
        .and_then(|o| o.get("cursor_field"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let resolved = resolve_source(step, ctx, &source_name);
    let mut connector = ctx
        .registry
        .create(&resolved.connector_type)
        .map_err(connector_error)?;
    let config_errors = connector.configure(&resolved.params);
    if !config_errors.is_empty() {
        return Err(StepError::new(
            ErrorKind::ConnectorPermanent,
            format!(
                "cannot configure connector for source '{}': {}",
                source_name,
                config_errors.join("; ")
            ),
        ));
    }

    let mut output = StepOutput {
        reads: vec![source_name.clone()],
        writes: Some(table.clone()),
        ..StepOutput::default()
    };

    // Read, honoring the watermark for incremental syncs.
    let (staged, file_path, new_cursor) = read_source(
        ctx,
        connector.as_mut(),
        &resolved,
        &source_name,
        incremental,
        cursor_field.as_deref(),
        cancel,
        &mut output.warnings,
    )?;

    check_cancel(cancel)?;

    let staged_rows = staged.row_count();
    output.bytes = Some(staged.approx_bytes());
    output.output_schema = Some(staged.schema());

    let stage_table = format!("__sqlflow_stage_{}", table);
    let rows_applied = ctx.engine.session(|engine| {
        stage_frame(
            engine,
            &stage_table,
            staged,
            file_path.as_deref().map(PathBuf::from),
            staged_rows,
            &mut output.warnings,
        )?;
        let applied = apply_mode(engine, &table, &stage_table, &mode, &upsert_keys, &mut output);
        let _ = engine.execute(&format!("DROP TABLE IF EXISTS {}", stage_table));
        applied
    })?;
    output.rows = Some(rows_applied);

    // Persist the watermark only now, after the load committed.
    if let (true, Some(cursor_field)) = (incremental, cursor_field.as_deref()) {
        let cursor = new_cursor.or_else(|| connector.cursor_value());
        if let Some(cursor) = cursor {
            if let Err(watermark_error) =
                ctx.watermarks
                    .set(&ctx.pipeline, &source_name, cursor_field, &cursor)
            {
                tracing::warn!(
                    source = source_name.as_str(),
                    cursor_field,
                    error = %watermark_error,
                    "load succeeded but watermark write failed; next run may re-read rows"
                );
                output.warnings.push(format!(
                    "watermark write failed after successful load: {}",
                    watermark_error
                ));
            }
        }
    }

    Ok(output)
}

/// A named source definition wins; otherwise the source name is a
/// direct file path for the step's connector type.
fn resolve_source(step: &PlanStep, ctx: &ExecutionContext, source_name: &str) -> ResolvedSource {
    if let Some(record) = ctx.source(source_name) {
        let object = record
            .params
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(source_name)
            .to_string();
        return ResolvedSource {
            connector_type: record.connector_type,
            params: record.params,
            object,
        };
    }
    let connector_type = step
        .source_connector_type
        .clone()
        .unwrap_or_else(|| "CSV".to_string());
    let mut params = IndexMap::new();
    params.insert(
        "path".to_string(),
        serde_json::Value::String(source_name.to_string()),
    );
    ResolvedSource {
        connector_type,
        params,
        object: source_name.to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn read_source(
    ctx: &ExecutionContext,
    connector: &mut dyn Connector,
    resolved: &ResolvedSource,
    source_name: &str,
    incremental: bool,
    cursor_field: Option<&str>,
    cancel: &CancelToken,
    warnings: &mut Vec<String>,
) -> Result<(Frame, Option<String>, Option<String>), StepError> {
    let chunks = if incremental {
        match cursor_field {
            Some(cursor_field) if connector.supports_incremental() => {
                let prior = ctx
                    .watermarks
                    .get(&ctx.pipeline, source_name, cursor_field)
                    .map_err(|e| {
                        StepError::new(
                            ErrorKind::StepExecution,
                            format!("failed to read watermark: {}", e),
                        )
                    })?;
                tracing::debug!(
                    source = source_name,
                    cursor_field,
                    prior = prior.as_deref().unwrap_or("<none>"),
                    "incremental read"
                );
                connector
                    .read_incremental(&resolved.object, cursor_field, prior.as_deref(), 1000)
                    .map_err(connector_error)?
            }
            Some(_) => {
                warnings.push(format!(
                    "source '{}' does not support incremental reads; falling back to full refresh",
                    source_name
                ));
                connector.read(&resolved.object).map_err(connector_error)?
            }
            None => {
                warnings.push(
                    "sync_mode is incremental but no cursor_field is set; full refresh used"
                        .to_string(),
                );
                connector.read(&resolved.object).map_err(connector_error)?
            }
        }
    } else {
        connector.read(&resolved.object).map_err(connector_error)?
    };

    let mut combined = Frame::default();
    let mut file_path: Option<String> = None;
    let mut single_chunk = true;
    for (index, chunk) in chunks.enumerate() {
        check_cancel(cancel)?;
        let DataChunk { frame, source_path } = chunk.map_err(connector_error)?;
        if index == 0 {
            combined.columns = frame.columns.clone();
            file_path = source_path.map(|p| p.display().to_string());
        } else {
            single_chunk = false;
        }
        combined.extend_rows(frame);
    }
    if !single_chunk {
        file_path = None;
    }
    let new_cursor = connector.cursor_value();
    Ok((combined, file_path, new_cursor))
}

/// Stage rows under a scratch table: bulk COPY for big file-backed
/// reads, in-memory registration otherwise (and as the COPY fallback).
fn stage_frame(
    engine: &mut dyn SqlEngine,
    stage_table: &str,
    staged: Frame,
    file_path: Option<PathBuf>,
    staged_rows: usize,
    warnings: &mut Vec<String>,
) -> Result<(), StepError> {
    if let Some(path) = file_path {
        if staged_rows >= COPY_ROW_THRESHOLD && engine.supports_copy() {
            match engine.copy_from_file(stage_table, &path, &IndexMap::new()) {
                Ok(copied) => {
                    tracing::debug!(rows = copied, "staged via native COPY");
                    return Ok(());
                }
                Err(copy_error) => {
                    tracing::warn!(
                        error = %copy_error,
                        "native COPY failed; falling back to row registration"
                    );
                    warnings.push(format!(
                        "bulk COPY failed, used row registration instead: {}",
                        copy_error
                    ));
                }
            }
        }
    }
    engine
        .register_frame(stage_table, staged)
        .map_err(engine_error)
}

fn apply_mode(
    engine: &mut dyn SqlEngine,
    table: &str,
    stage_table: &str,
    mode: &str,
    upsert_keys: &[String],
    output: &mut StepOutput,
) -> Result<u64, StepError> {
    match mode {
        "REPLACE" => {
            let result = engine
                .execute(&format!(
                    "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}",
                    table, stage_table
                ))
                .map_err(engine_error)?;
            Ok(result.rows_affected)
        }
        "APPEND" => {
            let exists = engine.table_exists(table).map_err(engine_error)?;
            let sql = if exists {
                format!("INSERT INTO {} SELECT * FROM {}", table, stage_table)
            } else {
                format!("CREATE TABLE {} AS SELECT * FROM {}", table, stage_table)
            };
            let result = engine.execute(&sql).map_err(engine_error)?;
            Ok(result.rows_affected)
        }
        "UPSERT" => {
            if upsert_keys.is_empty() {
                return Err(StepError::new(
                    ErrorKind::StepExecution,
                    "UPSERT requires at least one key column",
                )
                .with_suggestion("declare keys: LOAD t FROM s MODE UPSERT KEY (id)"));
            }
            let exists = engine.table_exists(table).map_err(engine_error)?;
            if !exists {
                let result = engine
                    .execute(&format!(
                        "CREATE TABLE {} AS SELECT * FROM {}",
                        table, stage_table
                    ))
                    .map_err(engine_error)?;
                return Ok(result.rows_affected);
            }
            let keys = upsert_keys.join(", ");
            let delete_sql = format!(
                "DELETE FROM {} WHERE ({}) IN (SELECT {} FROM {})",
                table, keys, keys, stage_table
            );
            let insert_sql = format!("INSERT INTO {} SELECT * FROM {}", table, stage_table);

            if engine.supports_transactions() {
                engine.execute("BEGIN").map_err(engine_error)?;
                let applied = engine
                    .execute(&delete_sql)
                    .and_then(|_| engine.execute(&insert_sql));
                match applied {
                    Ok(result) => {
                        engine.execute("COMMIT").map_err(engine_error)?;
                        Ok(result.rows_affected)
                    }
                    Err(upsert_error) => {
                        let _ = engine.execute("ROLLBACK");
                        Err(engine_error(upsert_error))
                    }
                }
            } else {
                // Best-effort on engines without transactions: a failure
                // between the two statements leaves deleted rows gone.
                output.warnings.push(
                    "engine lacks transactions; UPSERT ran as best-effort delete-then-insert"
                        .to_string(),
                );
                engine.execute(&delete_sql).map_err(engine_error)?;
                let result = engine.execute(&insert_sql).map_err(engine_error)?;
                Ok(result.rows_affected)
            }
        }
        other => Err(StepError::new(
            ErrorKind::StepExecution,
            format!("unknown load mode '{}'", other),
        )),
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
