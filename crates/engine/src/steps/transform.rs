// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `transform` handler.
//!
//! Substitutes variables into the SQL (quote-context aware), wraps it in
//! `CREATE OR REPLACE TABLE <target> AS ...` unless the text already
//! starts with a DDL/DML keyword, and executes it.

use super::{check_cancel, engine_error, lineage_reads, StepOutput};
use crate::context::{CancelToken, ExecutionContext};
use regex::Regex;
use sqlflow_core::{ErrorKind, PlanStep, StepError};
use sqlflow_vars::SubstOptions;
use std::sync::LazyLock;

// Allow expect here as the regex pattern is compile-time verified to be valid
#[allow(clippy::expect_used)]
static UDF_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)python_func\s*\(\s*['"]([A-Za-z0-9_.]+)['"]\s*,\s*"#)
        .expect("constant regex pattern is valid")
});

pub(crate) fn handle(
    step: &PlanStep,
    ctx: &ExecutionContext,
    cancel: &CancelToken,
) -> Result<StepOutput, StepError> {
    check_cancel(cancel)?;

    let table = step.name.clone().ok_or_else(|| {
        StepError::new(ErrorKind::StepExecution, "transform step has no target table")
    })?;
    let sql = step.sql_text().ok_or_else(|| {
        StepError::new(ErrorKind::StepExecution, "transform step has no SQL payload")
    })?;

    let substituted = ctx
        .substituter
        .substitute(sql, &ctx.variables, SubstOptions::sql())
        .map_err(|substitution_error| {
            StepError::new(ErrorKind::VariableSubstitution, substitution_error.to_string())
        })?;
    let mut output = StepOutput {
        warnings: substituted.warnings,
        reads: lineage_reads(step),
        writes: Some(table.clone()),
        ..StepOutput::default()
    };

    let statement = wrap_in_create(&table, &rewrite_udf_calls(&substituted.text));
    check_cancel(cancel)?;

    let result = ctx
        .engine
        .statement(|engine| engine.execute(&statement))
        .map_err(engine_error)?;
    output.rows = Some(result.rows_affected);
    if !result.frame.columns.is_empty() {
        output.output_schema = Some(result.frame.schema());
    }
    Ok(output)
}

/// Rewrite `PYTHON_FUNC('module.fn', ...)` table-UDF calls into direct
/// calls to the name the UDF was registered under (`module_fn(...)`).
fn rewrite_udf_calls(sql: &str) -> String {
    UDF_CALL_PATTERN
        .replace_all(sql, |caps: &regex::Captures| {
            format!("{}(", caps[1].replace('.', "_"))
        })
        .to_string()
}

/// Wrap bare queries in `CREATE OR REPLACE TABLE <t> AS ...`; SQL that
/// already starts with CREATE/INSERT/UPDATE runs as written.
fn wrap_in_create(table: &str, sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let lowered = trimmed.to_lowercase();
    if lowered.starts_with("create") || lowered.starts_with("insert") || lowered.starts_with("update")
    {
        return trimmed.to_string();
    }
    format!("CREATE OR REPLACE TABLE {} AS {}", table, trimmed)
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
