// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plan: the linear, dependency-ordered output of the planner.
//!
//! The JSON form is an array of step objects; array order is execution
//! order. Unknown fields are preserved so externally-annotated plans
//! round-trip through persistence.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    SourceDefinition,
    Load,
    Transform,
    Export,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::SourceDefinition => "source_definition",
            StepKind::Load => "load",
            StepKind::Transform => "transform",
            StepKind::Export => "export",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single node of the execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_connector_type: Option<String>,
    /// Kind-dependent payload: a params object for sources, a
    /// `{source_name, table_name, ...}` object for loads, SQL text for
    /// transforms, a `{sql_query, destination_uri, options, type}` object
    /// for exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
    /// Fields this version does not know about, carried through round-trips.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            depends_on: Vec::new(),
            name: None,
            source_connector_type: None,
            query: None,
            source_table: None,
            extra: IndexMap::new(),
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_query(mut self, query: serde_json::Value) -> Self {
        self.query = Some(query);
        self
    }

    /// SQL payload text, when the payload is a bare string (transforms) or
    /// an object with a `sql_query` field (exports).
    pub fn sql_text(&self) -> Option<&str> {
        match &self.query {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Object(map)) => map.get("sql_query").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// The ordered sequence of plan steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Look up a step by id.
    pub fn get(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Position of a step in execution order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// Serialize to the persistence format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from the persistence format.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
