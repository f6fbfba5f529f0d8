// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row-oriented data frames exchanged between connectors and the engine.

use sqlflow_core::{ColumnSchema, Value};
use std::path::PathBuf;

/// A named-column, row-oriented table slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by case-insensitive name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value at (row, column-name), if both exist.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    /// Append another frame's rows. Columns are matched by position; a
    /// column-name mismatch is the caller's schema error to surface.
    pub fn extend_rows(&mut self, other: Frame) {
        self.rows.extend(other.rows);
    }

    /// Column schema snapshot, with types inferred from the first row.
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnSchema {
                name: name.clone(),
                data_type: self
                    .rows
                    .first()
                    .and_then(|row| row.get(i))
                    .map(type_name)
                    .unwrap_or("unknown")
                    .to_string(),
            })
            .collect()
    }

    /// Split into batched chunks of at most `batch_size` rows. When
    /// `source_path` is set and the frame fits one chunk, the chunk is
    /// marked file-backed so the engine may take its `COPY` fast path.
    pub fn into_chunks(
        self,
        batch_size: usize,
        source_path: Option<PathBuf>,
    ) -> Box<dyn Iterator<Item = Result<DataChunk, crate::error::ConnectorError>> + Send> {
        let batch = batch_size.max(1);
        let columns = self.columns;
        let single_chunk = self.rows.len() <= batch;
        let file_path = if single_chunk { source_path } else { None };
        let mut chunks: Vec<DataChunk> = Vec::new();
        let mut rows = self.rows;
        while !rows.is_empty() {
            let rest = rows.split_off(rows.len().min(batch));
            let frame = Frame {
                columns: columns.clone(),
                rows,
            };
            chunks.push(DataChunk {
                frame,
                source_path: file_path.clone(),
            });
            rows = rest;
        }
        if chunks.is_empty() {
            // An empty read still yields one empty chunk so callers see
            // the column schema.
            chunks.push(DataChunk {
                frame: Frame {
                    columns,
                    rows: Vec::new(),
                },
                source_path: file_path,
            });
        }
        Box::new(chunks.into_iter().map(Ok))
    }

    /// Rough in-memory size, used for bytes-processed accounting.
    pub fn approx_bytes(&self) -> u64 {
        let mut bytes = 0u64;
        for row in &self.rows {
            for value in row {
                bytes += match value {
                    Value::Str(s) => s.len() as u64,
                    _ => 8,
                };
            }
        }
        bytes
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "bigint",
        Value::Float(_) => "double",
        Value::Str(_) => "varchar",
    }
}

/// One batch of connector output: a frame plus, when the data is backed
/// by a file on disk, the path that enables the engine's bulk `COPY`
/// fast path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataChunk {
    pub frame: Frame,
    pub source_path: Option<PathBuf>,
}

impl DataChunk {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            source_path: None,
        }
    }

    pub fn file_backed(frame: Frame, path: PathBuf) -> Self {
        Self {
            frame,
            source_path: Some(path),
        }
    }

    pub fn row_count(&self) -> usize {
        self.frame.row_count()
    }
}
