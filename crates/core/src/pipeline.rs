// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsed pipeline AST consumed by the planner.
//!
//! The DSL parser (out of scope here) produces this structure; the planner
//! flattens conditionals, folds SET steps into the variable store, and
//! emits an [`crate::plan::ExecutionPlan`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a load writes into its target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadMode {
    Replace,
    Append,
    Upsert,
}

impl Default for LoadMode {
    fn default() -> Self {
        LoadMode::Replace
    }
}

/// Whether a load scans the whole source or only rows past a watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::FullRefresh
    }
}

/// A named, reusable handle to an external data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    pub connector_type: String,
    #[serde(default)]
    pub params: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub line: u32,
}

/// Load data from a source (or direct file path) into a target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadStep {
    pub table: String,
    pub source: String,
    #[serde(default)]
    pub mode: LoadMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upsert_keys: Vec<String>,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_field: Option<String>,
    #[serde(default)]
    pub line: u32,
}

/// A SQL block producing a target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub table: String,
    pub sql: String,
    #[serde(default)]
    pub line: u32,
}

/// Export a table or inline query to a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
    pub destination: String,
    pub connector_type: String,
    #[serde(default)]
    pub options: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub line: u32,
}

/// `SET name = value;` — a variable definition, folded into the store
/// before planning. Never appears in an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetStep {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub line: u32,
}

/// One `IF`/`ELSEIF` arm of a conditional block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranch {
    pub condition: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub line: u32,
}

/// `IF ... THEN ... ELSEIF ... ELSE ... END IF;`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBlock {
    pub branches: Vec<ConditionalBranch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub else_branch: Vec<Step>,
    #[serde(default)]
    pub line: u32,
}

/// A single pipeline statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Source(SourceDefinition),
    Load(LoadStep),
    Transform(TransformStep),
    Export(ExportStep),
    Set(SetStep),
    Conditional(ConditionalBlock),
}

impl Step {
    /// Source line of the statement, for diagnostics.
    pub fn line(&self) -> u32 {
        match self {
            Step::Source(s) => s.line,
            Step::Load(s) => s.line,
            Step::Transform(s) => s.line,
            Step::Export(s) => s.line,
            Step::Set(s) => s.line,
            Step::Conditional(s) => s.line,
        }
    }

    /// Statement kind as it appears in diagnostics (`SOURCE`, `LOAD`, ...).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::Source(_) => "SOURCE",
            Step::Load(_) => "LOAD",
            Step::Transform(_) => "CREATE TABLE",
            Step::Export(_) => "EXPORT",
            Step::Set(_) => "SET",
            Step::Conditional(_) => "IF",
        }
    }
}

/// An ordered sequence of pipeline statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
