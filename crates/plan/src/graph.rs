// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency graph over flattened pipeline steps.
//!
//! Steps live in a flat arena (the flattened pipeline, in declaration
//! order) and every relationship is keyed on the string step id, so the
//! graph itself holds no step references.

use crate::error::PlanningError;
use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use sqlflow_core::{Pipeline, Step};
use std::collections::HashSet;
use std::sync::LazyLock;

// Allow expect here as the regex patterns are compile-time verified to be valid
#[allow(clippy::expect_used)]
static FROM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"from\s+([a-zA-Z0-9_]+(?:\s*,\s*[a-zA-Z0-9_]+)*)")
        .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static JOIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"join\s+([a-zA-Z0-9_]+)").expect("constant regex pattern is valid"));
#[allow(clippy::expect_used)]
static TABLE_UDF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"python_func\s*\(\s*['"][\w.]+['"]\s*,\s*([a-zA-Z0-9_]+)"#)
        .expect("constant regex pattern is valid")
});

/// Stable step id for each flattened step. `SET` steps get no id: they
/// never reach the plan.
pub(crate) fn assign_step_ids(pipeline: &Pipeline) -> Vec<Option<String>> {
    let mut used: HashSet<String> = HashSet::new();
    pipeline
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let id = match step {
                Step::Source(source) => format!("source_{}", source.name),
                Step::Load(load) => format!("load_{}", load.table),
                Step::Transform(transform) => format!("transform_{}", transform.table),
                Step::Export(export) => {
                    let connector = export.connector_type.to_lowercase();
                    let table = export
                        .source_table
                        .clone()
                        .or_else(|| export.sql.as_deref().and_then(extract_principal_table));
                    match table {
                        Some(table) => format!("export_{}_{}", connector, table),
                        None => format!("export_{}_{}", connector, index),
                    }
                }
                Step::Set(_) => return None,
                Step::Conditional(_) => return None,
            };
            // Guard against id collisions (two exports of one table).
            let id = if used.contains(&id) {
                format!("{}_{}", id, index)
            } else {
                id
            };
            used.insert(id.clone());
            Some(id)
        })
        .collect()
}

/// Principal table of an inline SQL query, for export step ids.
pub(crate) fn extract_principal_table(sql: &str) -> Option<String> {
    let lowered = sql.to_lowercase();
    FROM_PATTERN
        .captures(&lowered)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .next()
                .unwrap_or("")
                .trim()
                .to_string()
        })
        .filter(|t| !t.is_empty())
}

/// Tables referenced by a SQL query: `FROM` comma lists, `JOIN` targets,
/// and the table-UDF pattern `python_func('module.fn', table)`.
/// Matching is case-insensitive; order of first occurrence is kept.
pub(crate) fn extract_referenced_tables(sql: &str) -> Vec<String> {
    let lowered = sql.to_lowercase();
    let mut tables = IndexSet::new();
    for caps in FROM_PATTERN.captures_iter(&lowered) {
        if let Some(list) = caps.get(1) {
            for table in list.as_str().split(',') {
                let table = table.trim();
                if !table.is_empty() {
                    tables.insert(table.to_string());
                }
            }
        }
    }
    for caps in JOIN_PATTERN.captures_iter(&lowered) {
        if let Some(table) = caps.get(1) {
            tables.insert(table.as_str().to_string());
        }
    }
    for caps in TABLE_UDF_PATTERN.captures_iter(&lowered) {
        if let Some(table) = caps.get(1) {
            tables.insert(table.as_str().to_string());
        }
    }
    tables.into_iter().collect()
}

/// The inferred dependency graph plus warn-only findings.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    /// step id -> ids it depends on, insertion-ordered.
    pub deps: IndexMap<String, Vec<String>>,
    /// Undefined-table references (the engine may still resolve them).
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    fn add_edge(&mut self, dependent: &str, dependency: &str) {
        let entry = self.deps.entry(dependent.to_string()).or_default();
        if !entry.iter().any(|d| d == dependency) {
            entry.push(dependency.to_string());
        }
    }
}

/// Infer dependencies over the flattened pipeline.
///
/// Loads depend on their named source definition; transforms depend on
/// the producers of tables their SQL references; exports depend on the
/// producers of their inline query's tables or of their bare source
/// table. References to tables no step produces warn only.
pub(crate) fn build_dependency_graph(
    pipeline: &Pipeline,
    ids: &[Option<String>],
) -> Result<DependencyGraph, PlanningError> {
    let mut graph = DependencyGraph::default();

    // Every plan step gets an entry, even if it has no dependencies.
    for id in ids.iter().flatten() {
        graph.deps.entry(id.clone()).or_default();
    }

    let table_map = build_table_map(pipeline, ids)?;
    let source_map: IndexMap<&str, &str> = pipeline
        .steps
        .iter()
        .zip(ids)
        .filter_map(|(step, id)| match (step, id) {
            (Step::Source(source), Some(id)) => Some((source.name.as_str(), id.as_str())),
            _ => None,
        })
        .collect();

    for (step, id) in pipeline.steps.iter().zip(ids) {
        let Some(id) = id else { continue };
        match step {
            Step::Load(load) => {
                if let Some(source_id) = source_map.get(load.source.as_str()) {
                    graph.add_edge(id, source_id);
                }
            }
            Step::Transform(transform) => {
                link_sql_references(&mut graph, id, &transform.sql, &table_map);
            }
            Step::Export(export) => {
                if let Some(sql) = &export.sql {
                    link_sql_references(&mut graph, id, sql, &table_map);
                } else if let Some(table) = &export.source_table {
                    match table_map.get(table.to_lowercase().as_str()) {
                        Some(producer) if producer != id => graph.add_edge(id, producer),
                        Some(_) => {}
                        None => push_undefined_warning(&mut graph, id, table),
                    }
                }
            }
            _ => {}
        }
    }
    Ok(graph)
}

fn link_sql_references(
    graph: &mut DependencyGraph,
    id: &str,
    sql: &str,
    table_map: &IndexMap<String, String>,
) {
    for table in extract_referenced_tables(sql) {
        match table_map.get(&table) {
            Some(producer) if producer != id => graph.add_edge(id, producer),
            Some(_) => {}
            None => push_undefined_warning(graph, id, &table),
        }
    }
}

fn push_undefined_warning(graph: &mut DependencyGraph, id: &str, table: &str) {
    let warning = format!(
        "step {} references table '{}' that no pipeline step defines; assuming it exists in the engine",
        id, table
    );
    tracing::warn!(step_id = id, table, "undefined table reference");
    graph.warnings.push(warning);
}

/// Map every defined (lowercased) table name to its producing step id.
fn build_table_map(
    pipeline: &Pipeline,
    ids: &[Option<String>],
) -> Result<IndexMap<String, String>, PlanningError> {
    let mut map: IndexMap<String, String> = IndexMap::new();
    let mut lines: IndexMap<String, u32> = IndexMap::new();
    for (step, id) in pipeline.steps.iter().zip(ids) {
        let (table, line) = match step {
            Step::Load(load) => (load.table.as_str(), load.line),
            Step::Transform(transform) => (transform.table.as_str(), transform.line),
            _ => continue,
        };
        let Some(id) = id else { continue };
        let key = table.to_lowercase();
        if let Some(previous_line) = lines.get(&key) {
            return Err(PlanningError::DuplicateTable {
                table: table.to_string(),
                line,
                previous_line: *previous_line,
            });
        }
        lines.insert(key.clone(), line);
        map.insert(key, id.clone());
    }
    Ok(map)
}

/// Enumerate every dependency cycle via DFS over the edge map.
pub(crate) fn detect_cycles(deps: &IndexMap<String, Vec<String>>) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    for start in deps.keys() {
        if visited.contains(start.as_str()) {
            continue;
        }
        let mut path: Vec<&str> = Vec::new();
        dfs(start, deps, &mut visited, &mut path, &mut cycles);
    }
    cycles
}

fn dfs<'a>(
    node: &'a str,
    deps: &'a IndexMap<String, Vec<String>>,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    if let Some(start) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(node.to_string());
        cycles.push(cycle);
        return;
    }
    if visited.contains(node) {
        return;
    }
    visited.insert(node);
    path.push(node);
    if let Some(children) = deps.get(node) {
        for child in children {
            dfs(child, deps, visited, path, cycles);
        }
    }
    path.pop();
}

/// Human-readable cycle listing: `Cycle 1: CREATE TABLE a → LOAD b → ...`.
pub(crate) fn format_cycles(cycles: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(cycles.len());
    for (i, cycle) in cycles.iter().enumerate() {
        let readable: Vec<String> = cycle.iter().map(|id| readable_step(id)).collect();
        lines.push(format!("Cycle {}: {}", i + 1, readable.join(" → ")));
    }
    lines.join("\n")
}

fn readable_step(id: &str) -> String {
    if let Some(table) = id.strip_prefix("transform_") {
        return format!("CREATE TABLE {}", table);
    }
    if let Some(table) = id.strip_prefix("load_") {
        return format!("LOAD {}", table);
    }
    if let Some(name) = id.strip_prefix("source_") {
        return format!("SOURCE {}", name);
    }
    if let Some(rest) = id.strip_prefix("export_") {
        if let Some((connector, table)) = rest.split_once('_') {
            return format!("EXPORT {} to {}", table, connector);
        }
    }
    id.to_string()
}

/// Emit step ids in topological order.
///
/// Kahn-style: repeatedly take the earliest (pipeline-order) step whose
/// dependencies have all been emitted, so independent steps keep their
/// declaration order and plans are deterministic.
pub(crate) fn topological_order(
    pipeline_order: &[String],
    deps: &IndexMap<String, Vec<String>>,
) -> Vec<String> {
    let mut emitted: IndexSet<&str> = IndexSet::new();
    let mut order: Vec<String> = Vec::with_capacity(pipeline_order.len());

    while order.len() < pipeline_order.len() {
        let mut progressed = false;
        for id in pipeline_order {
            if emitted.contains(id.as_str()) {
                continue;
            }
            let ready = deps
                .get(id)
                .map(|d| {
                    d.iter()
                        .all(|dep| emitted.contains(dep.as_str()) || !deps.contains_key(dep))
                })
                .unwrap_or(true);
            if ready {
                emitted.insert(id.as_str());
                order.push(id.clone());
                progressed = true;
            }
        }
        // Unreachable once cycles are rejected upstream; keeps the loop
        // total if a caller skips cycle detection.
        if !progressed {
            for id in pipeline_order {
                if !emitted.contains(id.as_str()) {
                    order.push(id.clone());
                }
            }
            break;
        }
    }
    order
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
