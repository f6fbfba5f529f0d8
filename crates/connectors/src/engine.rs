// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The SQL engine contract.
//!
//! The execution core never inspects engine internals; it issues SQL
//! text, stages in-memory frames, and (when supported) asks for bulk
//! file copies. Engines that are not safe for concurrent queries are
//! serialized by the executor behind a lock.

use crate::chunk::Frame;
use indexmap::IndexMap;
use sqlflow_core::{ColumnSchema, Value};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the SQL engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("SQL syntax error: {0}")]
    Syntax(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("engine does not support {0}")]
    Unsupported(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A scalar user-defined function callable from SQL.
pub type ScalarUdf = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Result of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineResult {
    pub frame: Frame,
    pub rows_affected: u64,
}

impl EngineResult {
    pub fn rows_affected(rows: u64) -> Self {
        Self {
            frame: Frame::default(),
            rows_affected: rows,
        }
    }

    pub fn with_frame(frame: Frame) -> Self {
        let rows = frame.row_count() as u64;
        Self {
            frame,
            rows_affected: rows,
        }
    }

    /// First result row, if any.
    pub fn fetch_one(&self) -> Option<&Vec<Value>> {
        self.frame.rows.first()
    }

    /// All result rows.
    pub fn fetch_all(&self) -> &[Vec<Value>] {
        &self.frame.rows
    }

    /// Column schema of the result set.
    pub fn description(&self) -> Vec<ColumnSchema> {
        self.frame.schema()
    }
}

/// The engine contract.
pub trait SqlEngine: Send {
    /// Execute one SQL statement.
    fn execute(&mut self, sql: &str) -> Result<EngineResult, EngineError>;

    fn table_exists(&mut self, name: &str) -> Result<bool, EngineError>;

    /// Stage an in-memory frame under a table name.
    fn register_frame(&mut self, name: &str, frame: Frame) -> Result<(), EngineError>;

    /// Whether the `copy_*` fast paths are available.
    fn supports_copy(&self) -> bool {
        false
    }

    /// Write a query's result directly to a file (`COPY ... TO`).
    fn copy_to_file(
        &mut self,
        _query: &str,
        _path: &Path,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, EngineError> {
        Err(EngineError::Unsupported("copy_to_file".to_string()))
    }

    /// Bulk-load a file into a table (`COPY ... FROM`).
    fn copy_from_file(
        &mut self,
        _table: &str,
        _path: &Path,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, EngineError> {
        Err(EngineError::Unsupported("copy_from_file".to_string()))
    }

    fn register_udf(&mut self, _name: &str, _udf: ScalarUdf) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("user-defined functions".to_string()))
    }

    /// Whether `BEGIN`/`COMMIT`/`ROLLBACK` are honored. Engines without
    /// transactions make multi-statement loads best-effort.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Whether concurrent queries are safe without external locking.
    fn is_concurrency_safe(&self) -> bool {
        false
    }

    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
