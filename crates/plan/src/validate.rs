// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable-reference validation over a whole pipeline.
//!
//! Every text-bearing field is scanned; a reference must be resolvable
//! from the store, defined by a `SET` statement somewhere in the
//! pipeline, or carry a valid default. Failures list each missing name
//! with every location (step kind + line number) where it occurs.

use crate::error::PlanningError;
use indexmap::IndexMap;
use sqlflow_core::{Pipeline, Step};
use sqlflow_vars::{scan_references, VariableStore};
use std::collections::HashSet;

/// A text blob to scan, tagged with its human-readable location.
#[derive(Debug, Clone)]
pub(crate) struct TextField {
    pub text: String,
    pub location: String,
}

/// Collect every text-bearing field of the pipeline, recursing into
/// conditional branches.
pub(crate) fn collect_text_fields(pipeline: &Pipeline) -> Vec<TextField> {
    let mut fields = Vec::new();
    collect_from_steps(&pipeline.steps, &mut fields);
    fields
}

fn collect_from_steps(steps: &[Step], fields: &mut Vec<TextField>) {
    for step in steps {
        match step {
            Step::Source(source) => {
                let params = serde_json::to_string(&source.params).unwrap_or_default();
                fields.push(TextField {
                    text: params,
                    location: format!("SOURCE params at line {}", source.line),
                });
            }
            Step::Load(_) => {}
            Step::Transform(transform) => {
                fields.push(TextField {
                    text: transform.sql.clone(),
                    location: format!("SQL query at line {}", transform.line),
                });
            }
            Step::Export(export) => {
                fields.push(TextField {
                    text: export.destination.clone(),
                    location: format!("EXPORT destination at line {}", export.line),
                });
                let options = serde_json::to_string(&export.options).unwrap_or_default();
                fields.push(TextField {
                    text: options,
                    location: format!("EXPORT options at line {}", export.line),
                });
                if let Some(sql) = &export.sql {
                    fields.push(TextField {
                        text: sql.clone(),
                        location: format!("EXPORT query at line {}", export.line),
                    });
                }
            }
            Step::Set(set) => {
                fields.push(TextField {
                    text: set.value.clone(),
                    location: format!("SET statement at line {}", set.line),
                });
            }
            Step::Conditional(block) => {
                for branch in &block.branches {
                    fields.push(TextField {
                        text: branch.condition.clone(),
                        location: format!("IF condition at line {}", branch.line),
                    });
                    collect_from_steps(&branch.steps, fields);
                }
                collect_from_steps(&block.else_branch, fields);
            }
        }
    }
}

/// Names defined by `SET` statements anywhere in the pipeline.
pub(crate) fn set_defined_names(pipeline: &Pipeline) -> HashSet<String> {
    let mut names = HashSet::new();
    collect_set_names(&pipeline.steps, &mut names);
    names
}

fn collect_set_names(steps: &[Step], names: &mut HashSet<String>) {
    for step in steps {
        match step {
            Step::Set(set) => {
                names.insert(set.name.clone());
            }
            Step::Conditional(block) => {
                for branch in &block.branches {
                    collect_set_names(&branch.steps, names);
                }
                collect_set_names(&block.else_branch, names);
            }
            _ => {}
        }
    }
}

/// Validate every variable reference in the pipeline against the store.
pub fn validate_variable_references(
    pipeline: &Pipeline,
    store: &VariableStore,
) -> Result<(), PlanningError> {
    let fields = collect_text_fields(pipeline);
    let set_defined = set_defined_names(pipeline);

    // name -> locations where it is referenced
    let mut locations: IndexMap<String, Vec<String>> = IndexMap::new();
    // names that carry a default anywhere in the pipeline
    let mut has_default: HashSet<String> = HashSet::new();
    // offending default expressions, verbatim, in scan order
    let mut invalid_defaults: Vec<String> = Vec::new();

    for field in &fields {
        let outcome = scan_references(&field.text);
        for warning in &outcome.warnings {
            tracing::warn!(
                location = field.location.as_str(),
                warning = warning.as_str(),
                "malformed variable reference"
            );
        }
        for reference in &outcome.refs {
            locations
                .entry(reference.name.clone())
                .or_default()
                .push(field.location.clone());
            if reference.default.is_some() {
                // Even an invalid default keeps the name out of the
                // missing-variable list; it is reported separately.
                has_default.insert(reference.name.clone());
                if reference.has_invalid_default() {
                    let raw = reference.raw(&field.text).to_string();
                    if !invalid_defaults.contains(&raw) {
                        invalid_defaults.push(raw);
                    }
                }
            }
        }
    }

    let mut missing: Vec<&String> = locations
        .keys()
        .filter(|name| {
            !store.contains(name) && !set_defined.contains(*name) && !has_default.contains(*name)
        })
        .collect();
    missing.sort();

    if !missing.is_empty() {
        let mut details = String::new();
        for name in &missing {
            details.push_str(&format!(
                "  - ${{{}}} is used but not defined (referenced at: {})\n",
                name,
                locations[name.as_str()].join(", ")
            ));
        }
        details.push_str(
            "Define these variables with SET statements or provide them when running the pipeline.",
        );
        return Err(PlanningError::MissingVariables { details });
    }

    if !invalid_defaults.is_empty() {
        let details = invalid_defaults
            .iter()
            .map(|expr| format!("  - {}", expr))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(PlanningError::InvalidDefaults { details });
    }

    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
