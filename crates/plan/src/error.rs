// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Planner error type

use sqlflow_vars::{EvaluationError, SubstitutionError};
use thiserror::Error;

/// Errors that abort plan construction.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// One or more referenced variables are neither defined nor defaulted.
    /// `details` lists every missing name with its reference locations.
    #[error("pipeline references undefined variables:\n{details}")]
    MissingVariables { details: String },

    /// Default values with unquoted whitespace, listed verbatim.
    #[error("invalid default values for variables (must not contain spaces unless quoted):\n{details}\nDefault values with spaces must be quoted, e.g. ${{var|\"us east\"}}")]
    InvalidDefaults { details: String },

    #[error("duplicate table definitions found: table '{table}' defined at line {line}, but already defined at line {previous_line}")]
    DuplicateTable {
        table: String,
        line: u32,
        previous_line: u32,
    },

    /// Dependency cycles, every cycle enumerated in human-readable form.
    #[error("circular dependencies detected in pipeline:\n{details}")]
    Cycles { details: String },

    #[error("error evaluating conditional block at line {line}: {source}")]
    Condition {
        line: u32,
        source: EvaluationError,
    },

    #[error("variable substitution failed during planning: {0}")]
    Substitution(#[from] SubstitutionError),

    /// A planning-stage invariant was violated; indicates a bug, not bad
    /// pipeline input.
    #[error("internal planning error: {0}")]
    Internal(String),
}
