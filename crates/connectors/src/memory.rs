// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory SQL engine for tests and local runs.
//!
//! Interprets exactly the statement shapes the execution core emits:
//! `CREATE [OR REPLACE] TABLE ... AS SELECT`, `INSERT INTO ... SELECT`,
//! the keyed `DELETE ... WHERE (...) IN (SELECT ... FROM ...)` used by
//! upserts, `DROP TABLE`, transactions, and a small SELECT subset
//! (projection, literals, single table, ANDed comparisons).

use crate::chunk::Frame;
use crate::csv;
use crate::engine::{EngineError, EngineResult, ScalarUdf, SqlEngine};
use indexmap::IndexMap;
use regex::Regex;
use sqlflow_core::Value;
use std::path::Path;
use std::sync::LazyLock;

// Allow expect here as the regex patterns are compile-time verified to be valid
#[allow(clippy::expect_used)]
static CREATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^create\s+(or\s+replace\s+)?table\s+([a-z0-9_]+)\s+as\s+(.+)$")
        .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static INSERT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^insert\s+into\s+([a-z0-9_]+)\s+(select\b.+)$")
        .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static DELETE_IN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^delete\s+from\s+([a-z0-9_]+)\s+where\s+\(?\s*([a-z0-9_,\s]+?)\s*\)?\s+in\s+\(\s*select\s+([a-z0-9_,\s]+?)\s+from\s+([a-z0-9_]+)\s*\)$",
    )
    .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static DROP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^drop\s+table\s+(if\s+exists\s+)?([a-z0-9_]+)$")
        .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static SELECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^select\s+(.+?)(?:\s+from\s+([a-z0-9_]+)(?:\s+where\s+(.+))?)?\s*$",
    )
    .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static CONDITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^([a-z_][a-z0-9_]*)\s*(==|=|!=|<>|>=|<=|>|<)\s*(.+)$")
        .expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static AND_SPLIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").expect("constant regex pattern is valid"));

/// In-memory engine over named frames.
#[derive(Default)]
pub struct MemoryEngine {
    tables: IndexMap<String, Frame>,
    snapshot: Option<IndexMap<String, Frame>>,
    udfs: IndexMap<String, ScalarUdf>,
    closed: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct table access for assertions in tests.
    pub fn table(&self, name: &str) -> Option<&Frame> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }

    fn run_select(&self, sql: &str) -> Result<Frame, EngineError> {
        let caps = SELECT_PATTERN
            .captures(sql.trim())
            .ok_or_else(|| EngineError::Syntax(format!("unsupported statement: {}", sql)))?;
        let projection = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("*");
        let table = caps.get(2).map(|m| m.as_str().to_lowercase());
        let predicate = caps.get(3).map(|m| m.as_str().trim());

        match table {
            Some(table_name) => {
                let source = self
                    .tables
                    .get(&table_name)
                    .ok_or(EngineError::UnknownTable(table_name))?;
                let filtered = match predicate {
                    Some(predicate) => filter_rows(source, predicate)?,
                    None => source.clone(),
                };
                project(&filtered, projection)
            }
            None => literal_row(projection),
        }
    }

    fn guard_open(&self) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Execution("engine is closed".to_string()));
        }
        Ok(())
    }
}

impl SqlEngine for MemoryEngine {
    fn execute(&mut self, sql: &str) -> Result<EngineResult, EngineError> {
        self.guard_open()?;
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Ok(EngineResult::default());
        }

        match sql.to_lowercase().as_str() {
            "begin" | "begin transaction" => {
                self.snapshot = Some(self.tables.clone());
                return Ok(EngineResult::default());
            }
            "commit" => {
                self.snapshot = None;
                return Ok(EngineResult::default());
            }
            "rollback" => {
                if let Some(snapshot) = self.snapshot.take() {
                    self.tables = snapshot;
                }
                return Ok(EngineResult::default());
            }
            _ => {}
        }

        if let Some(caps) = CREATE_PATTERN.captures(sql) {
            let replace = caps.get(1).is_some();
            let table = caps[2].to_lowercase();
            let query = caps[3].to_string();
            if !replace && self.tables.contains_key(&table) {
                return Err(EngineError::Execution(format!(
                    "table '{}' already exists",
                    table
                )));
            }
            let frame = self.run_select(&query)?;
            let rows = frame.row_count() as u64;
            self.tables.insert(table, frame);
            return Ok(EngineResult::rows_affected(rows));
        }

        if let Some(caps) = INSERT_PATTERN.captures(sql) {
            let table = caps[1].to_lowercase();
            let query = caps[2].to_string();
            let incoming = self.run_select(&query)?;
            let target = self
                .tables
                .get_mut(&table)
                .ok_or(EngineError::UnknownTable(table))?;
            let rows = incoming.row_count() as u64;
            target.extend_rows(incoming);
            return Ok(EngineResult::rows_affected(rows));
        }

        if let Some(caps) = DELETE_IN_PATTERN.captures(sql) {
            let table = caps[1].to_lowercase();
            let target_keys: Vec<String> = split_idents(&caps[2]);
            let staged_keys: Vec<String> = split_idents(&caps[3]);
            let staged_name = caps[4].to_lowercase();

            let staged = self
                .tables
                .get(&staged_name)
                .ok_or_else(|| EngineError::UnknownTable(staged_name.clone()))?;
            let key_set = key_tuples(staged, &staged_keys)?;
            let target = self
                .tables
                .get_mut(&table)
                .ok_or(EngineError::UnknownTable(table))?;
            let indices: Vec<usize> = target_keys
                .iter()
                .map(|k| {
                    target.column_index(k).ok_or_else(|| {
                        EngineError::Execution(format!("unknown key column '{}'", k))
                    })
                })
                .collect::<Result<_, _>>()?;
            let before = target.row_count();
            target.rows.retain(|row| {
                let tuple: Vec<String> = indices
                    .iter()
                    .map(|i| row.get(*i).map(|v| v.render_bare()).unwrap_or_default())
                    .collect();
                !key_set.contains(&tuple)
            });
            let removed = (before - target.row_count()) as u64;
            return Ok(EngineResult::rows_affected(removed));
        }

        if let Some(caps) = DROP_PATTERN.captures(sql) {
            let if_exists = caps.get(1).is_some();
            let table = caps[2].to_lowercase();
            let existed = self.tables.shift_remove(&table).is_some();
            if !existed && !if_exists {
                return Err(EngineError::UnknownTable(table));
            }
            return Ok(EngineResult::default());
        }

        if sql.to_lowercase().starts_with("select") {
            let frame = self.run_select(sql)?;
            return Ok(EngineResult::with_frame(frame));
        }

        Err(EngineError::Syntax(format!(
            "unsupported statement: {}",
            sql
        )))
    }

    fn table_exists(&mut self, name: &str) -> Result<bool, EngineError> {
        self.guard_open()?;
        Ok(self.tables.contains_key(&name.to_lowercase()))
    }

    fn register_frame(&mut self, name: &str, frame: Frame) -> Result<(), EngineError> {
        self.guard_open()?;
        self.tables.insert(name.to_lowercase(), frame);
        Ok(())
    }

    fn supports_copy(&self) -> bool {
        true
    }

    fn copy_to_file(
        &mut self,
        query: &str,
        path: &Path,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, EngineError> {
        self.guard_open()?;
        let frame = self.run_select(query.trim().trim_end_matches(';'))?;
        csv::write_csv(path, &frame, true, ',')
            .map_err(|e| EngineError::Execution(e.to_string()))
    }

    fn copy_from_file(
        &mut self,
        table: &str,
        path: &Path,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, EngineError> {
        self.guard_open()?;
        let frame =
            csv::read_csv(path, true, ',').map_err(|e| EngineError::Execution(e.to_string()))?;
        let rows = frame.row_count() as u64;
        self.tables.insert(table.to_lowercase(), frame);
        Ok(rows)
    }

    fn register_udf(&mut self, name: &str, udf: ScalarUdf) -> Result<(), EngineError> {
        self.guard_open()?;
        self.udfs.insert(name.to_lowercase(), udf);
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.closed = true;
        Ok(())
    }
}

fn split_idents(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn key_tuples(frame: &Frame, keys: &[String]) -> Result<Vec<Vec<String>>, EngineError> {
    let indices: Vec<usize> = keys
        .iter()
        .map(|k| {
            frame
                .column_index(k)
                .ok_or_else(|| EngineError::Execution(format!("unknown key column '{}'", k)))
        })
        .collect::<Result<_, _>>()?;
    Ok(frame
        .rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|i| row.get(*i).map(|v| v.render_bare()).unwrap_or_default())
                .collect()
        })
        .collect())
}

fn filter_rows(source: &Frame, predicate: &str) -> Result<Frame, EngineError> {
    let mut conditions = Vec::new();
    for part in AND_SPLIT_PATTERN.split(predicate) {
        let caps = CONDITION_PATTERN
            .captures(part.trim())
            .ok_or_else(|| EngineError::Syntax(format!("unsupported predicate: {}", part)))?;
        let column = caps[1].to_string();
        let index = source
            .column_index(&column)
            .ok_or_else(|| EngineError::Execution(format!("unknown column '{}'", column)))?;
        let op = caps[2].to_string();
        let literal = parse_literal(caps[3].trim())
            .ok_or_else(|| EngineError::Syntax(format!("unsupported literal: {}", &caps[3])))?;
        conditions.push((index, op, literal));
    }

    let mut out = Frame::new(source.columns.clone());
    for row in &source.rows {
        let keep = conditions.iter().all(|(index, op, literal)| {
            row.get(*index)
                .map(|value| compare_values(value, op, literal))
                .unwrap_or(false)
        });
        if keep {
            out.push_row(row.clone());
        }
    }
    Ok(out)
}

fn compare_values(value: &Value, op: &str, literal: &Value) -> bool {
    use std::cmp::Ordering;
    let ordering = match (value, literal) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return matches!(op, "!=" | "<>");
    };
    match op {
        "=" | "==" => ordering == Ordering::Equal,
        "!=" | "<>" => ordering != Ordering::Equal,
        ">" => ordering == Ordering::Greater,
        "<" => ordering == Ordering::Less,
        ">=" => ordering != Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        _ => false,
    }
}

fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim().trim_end_matches(';').trim();
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Some(Value::Str(text[1..text.len() - 1].to_string()));
    }
    if text.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    if text.eq_ignore_ascii_case("null") {
        return Some(Value::Null);
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Some(Value::Float(f));
    }
    None
}

fn project(source: &Frame, projection: &str) -> Result<Frame, EngineError> {
    let projection = projection.trim();
    if projection == "*" {
        return Ok(source.clone());
    }
    let mut columns = Vec::new();
    let mut picks: Vec<ProjectionItem> = Vec::new();
    for item in projection.split(',') {
        let (expr, alias) = parse_projection_item(item.trim())?;
        match expr {
            ProjectionExpr::Column(name) => {
                let index = source
                    .column_index(&name)
                    .ok_or_else(|| EngineError::Execution(format!("unknown column '{}'", name)))?;
                columns.push(alias.unwrap_or(name));
                picks.push(ProjectionItem::Index(index));
            }
            ProjectionExpr::Literal(value) => {
                columns.push(alias.unwrap_or_else(|| format!("col{}", picks.len())));
                picks.push(ProjectionItem::Literal(value));
            }
        }
    }
    let mut out = Frame::new(columns);
    for row in &source.rows {
        out.push_row(
            picks
                .iter()
                .map(|pick| match pick {
                    ProjectionItem::Index(i) => row.get(*i).cloned().unwrap_or(Value::Null),
                    ProjectionItem::Literal(value) => value.clone(),
                })
                .collect(),
        );
    }
    Ok(out)
}

enum ProjectionItem {
    Index(usize),
    Literal(Value),
}

enum ProjectionExpr {
    Column(String),
    Literal(Value),
}

/// Build the one-row frame of a table-less `SELECT 1 x, 'a' y`.
fn literal_row(projection: &str) -> Result<Frame, EngineError> {
    let mut columns = Vec::new();
    let mut row = Vec::new();
    for item in projection.split(',') {
        let (expr, alias) = parse_projection_item(item.trim())?;
        match expr {
            ProjectionExpr::Literal(value) => {
                columns.push(alias.unwrap_or_else(|| format!("col{}", row.len())));
                row.push(value);
            }
            ProjectionExpr::Column(name) => {
                return Err(EngineError::Execution(format!(
                    "column '{}' referenced without a FROM clause",
                    name
                )));
            }
        }
    }
    let mut frame = Frame::new(columns);
    frame.push_row(row);
    Ok(frame)
}

fn parse_projection_item(item: &str) -> Result<(ProjectionExpr, Option<String>), EngineError> {
    if item.is_empty() {
        return Err(EngineError::Syntax("empty projection item".to_string()));
    }

    // Quoted string literal, with optional alias after the closing quote.
    if let Some(rest) = item.strip_prefix('\'') {
        let Some(end) = rest.find('\'') else {
            return Err(EngineError::Syntax(format!(
                "unterminated string in projection: {}",
                item
            )));
        };
        let literal = Value::Str(rest[..end].to_string());
        let alias = parse_alias(rest[end + 1..].trim())?;
        return Ok((ProjectionExpr::Literal(literal), alias));
    }

    let mut parts = item.split_whitespace();
    let Some(head) = parts.next() else {
        return Err(EngineError::Syntax("empty projection item".to_string()));
    };
    let tail: Vec<&str> = parts.collect();
    let alias = parse_alias(&tail.join(" "))?;

    if let Some(value) = parse_literal(head) {
        if !matches!(value, Value::Str(_)) {
            return Ok((ProjectionExpr::Literal(value), alias));
        }
    }
    Ok((ProjectionExpr::Column(head.to_lowercase()), alias))
}

fn parse_alias(text: &str) -> Result<Option<String>, EngineError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let lowered = text.to_lowercase();
    let alias = lowered.strip_prefix("as ").unwrap_or(&lowered).trim();
    if alias.is_empty() || alias.contains(char::is_whitespace) {
        return Err(EngineError::Syntax(format!(
            "unsupported projection alias: {}",
            text
        )));
    }
    Ok(Some(alias.to_string()))
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
