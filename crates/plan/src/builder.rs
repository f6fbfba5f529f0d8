// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan construction: runs the planning stages in order and emits the
//! execution plan.

use crate::error::PlanningError;
use crate::{flatten, graph, lint, validate};
use indexmap::IndexMap;
use sqlflow_core::{ExecutionPlan, LoadMode, Pipeline, PlanStep, Step, StepKind, SyncMode};
use sqlflow_vars::{substitute_in_value, SubstOptions, VariableStore};

/// A warn-only planning finding, attached to a step when one is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanWarning {
    pub step_id: Option<String>,
    pub message: String,
}

/// The emitted plan plus warn-only findings.
#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    pub plan: ExecutionPlan,
    pub warnings: Vec<PlanWarning>,
}

/// Builds execution plans from parsed pipelines.
#[derive(Debug, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Build a plan.
    ///
    /// Folds `SET` values into `store` (its `Set` tier) as a side effect,
    /// so the store handed to the executor already reflects the pipeline's
    /// variable definitions.
    pub fn plan(
        &self,
        pipeline: &Pipeline,
        store: &mut VariableStore,
    ) -> Result<PlanOutcome, PlanningError> {
        if pipeline.is_empty() {
            tracing::warn!("planning an empty pipeline");
            return Ok(PlanOutcome::default());
        }

        validate::validate_variable_references(pipeline, store)?;

        let flat = flatten::flatten(pipeline, store)?;
        let ids = graph::assign_step_ids(&flat);
        let dependency_graph = graph::build_dependency_graph(&flat, &ids)?;

        let cycles = graph::detect_cycles(&dependency_graph.deps);
        if !cycles.is_empty() {
            let details = graph::format_cycles(&cycles);
            tracing::error!(cycles = cycles.len(), "dependency cycles detected");
            return Err(PlanningError::Cycles { details });
        }

        let pipeline_order: Vec<String> = ids.iter().flatten().cloned().collect();
        let order = graph::topological_order(&pipeline_order, &dependency_graph.deps);

        let mut warnings: Vec<PlanWarning> = dependency_graph
            .warnings
            .iter()
            .map(|message| PlanWarning {
                step_id: None,
                message: message.clone(),
            })
            .collect();

        // id -> flattened step
        let by_id: IndexMap<&str, &Step> = flat
            .steps
            .iter()
            .zip(&ids)
            .filter_map(|(step, id)| id.as_deref().map(|id| (id, step)))
            .collect();

        // source name -> connector type, for load payloads
        let source_types: IndexMap<&str, &str> = flat
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::Source(source) => {
                    Some((source.name.as_str(), source.connector_type.as_str()))
                }
                _ => None,
            })
            .collect();

        let mut steps = Vec::with_capacity(order.len());
        for id in &order {
            let Some(step) = by_id.get(id.as_str()) else {
                continue;
            };
            let depends_on = dependency_graph
                .deps
                .get(id)
                .cloned()
                .unwrap_or_default();
            let plan_step =
                self.emit_step(step, id, depends_on, &source_types, store, &mut warnings)?;
            steps.push(plan_step);
        }

        tracing::info!(steps = steps.len(), "built execution plan");
        Ok(PlanOutcome {
            plan: ExecutionPlan::new(steps),
            warnings,
        })
    }

    fn emit_step(
        &self,
        step: &Step,
        id: &str,
        depends_on: Vec<String>,
        source_types: &IndexMap<&str, &str>,
        store: &VariableStore,
        warnings: &mut Vec<PlanWarning>,
    ) -> Result<PlanStep, PlanningError> {
        match step {
            Step::Source(source) => {
                let params = serde_json::to_value(&source.params).unwrap_or_default();
                let params = substitute_in_value(&params, store, SubstOptions::default())?;
                let mut plan_step = PlanStep::new(id, StepKind::SourceDefinition)
                    .with_name(&source.name)
                    .with_depends_on(depends_on)
                    .with_query(params);
                plan_step.source_connector_type = Some(source.connector_type.clone());
                Ok(plan_step)
            }
            Step::Load(load) => {
                let connector_type = source_types
                    .get(load.source.as_str())
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "CSV".to_string());
                let mut query = serde_json::Map::new();
                query.insert("source_name".to_string(), load.source.clone().into());
                query.insert("table_name".to_string(), load.table.clone().into());
                query.insert("mode".to_string(), mode_name(load.mode).into());
                if !load.upsert_keys.is_empty() {
                    query.insert(
                        "upsert_keys".to_string(),
                        serde_json::Value::Array(
                            load.upsert_keys.iter().cloned().map(Into::into).collect(),
                        ),
                    );
                }
                if load.sync_mode == SyncMode::Incremental {
                    query.insert("sync_mode".to_string(), "incremental".into());
                    if let Some(cursor_field) = &load.cursor_field {
                        query.insert("cursor_field".to_string(), cursor_field.clone().into());
                    }
                }
                let mut plan_step = PlanStep::new(id, StepKind::Load)
                    .with_name(&load.table)
                    .with_depends_on(depends_on)
                    .with_query(serde_json::Value::Object(query));
                plan_step.source_connector_type = Some(connector_type);
                Ok(plan_step)
            }
            Step::Transform(transform) => {
                for finding in lint::check_sql(&transform.sql) {
                    tracing::warn!(step_id = id, finding = finding.as_str(), "SQL sanity");
                    warnings.push(PlanWarning {
                        step_id: Some(id.to_string()),
                        message: finding,
                    });
                }
                Ok(PlanStep::new(id, StepKind::Transform)
                    .with_name(&transform.table)
                    .with_depends_on(depends_on)
                    .with_query(transform.sql.clone().into()))
            }
            Step::Export(export) => {
                if let Some(sql) = &export.sql {
                    for finding in lint::check_sql(sql) {
                        tracing::warn!(step_id = id, finding = finding.as_str(), "SQL sanity");
                        warnings.push(PlanWarning {
                            step_id: Some(id.to_string()),
                            message: finding,
                        });
                    }
                }
                let destination =
                    sqlflow_vars::substitute_text(&export.destination, store, SubstOptions::default())?;
                let options = serde_json::to_value(&export.options).unwrap_or_default();
                let options = substitute_in_value(&options, store, SubstOptions::default())?;

                let mut query = serde_json::Map::new();
                query.insert(
                    "sql_query".to_string(),
                    export.sql.clone().unwrap_or_default().into(),
                );
                query.insert("destination_uri".to_string(), destination.text.into());
                query.insert("options".to_string(), options);
                query.insert("type".to_string(), export.connector_type.clone().into());

                let mut plan_step = PlanStep::new(id, StepKind::Export)
                    .with_depends_on(depends_on)
                    .with_query(serde_json::Value::Object(query));
                plan_step.source_table = export
                    .source_table
                    .clone()
                    .or_else(|| export.sql.as_deref().and_then(graph::extract_principal_table));
                plan_step.source_connector_type = Some(export.connector_type.clone());
                Ok(plan_step)
            }
            // SET and conditional steps never reach emission: ids are not
            // assigned for them and flattening removed the conditionals.
            Step::Set(_) | Step::Conditional(_) => Err(PlanningError::Internal(format!(
                "unexpected step '{}' at emission",
                id
            ))),
        }
    }
}

fn mode_name(mode: LoadMode) -> &'static str {
    match mode {
        LoadMode::Replace => "REPLACE",
        LoadMode::Append => "APPEND",
        LoadMode::Upsert => "UPSERT",
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
