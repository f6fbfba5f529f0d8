// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CSV file connector.
//!
//! Reads batch at a time with RFC-4180 quote handling, tracks an
//! incremental cursor, and writes frames back out with minimal quoting.

use crate::chunk::Frame;
use crate::connector::{ChunkIter, Connector};
use crate::error::ConnectorError;
use indexmap::IndexMap;
use sqlflow_core::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Default rows per emitted chunk.
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Connector for local CSV files.
#[derive(Debug)]
pub struct CsvConnector {
    path: Option<PathBuf>,
    has_header: bool,
    delimiter: char,
    batch_size: usize,
    last_cursor: Option<String>,
}

impl Default for CsvConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvConnector {
    pub fn new() -> Self {
        Self {
            path: None,
            has_header: true,
            delimiter: ',',
            batch_size: DEFAULT_BATCH_SIZE,
            last_cursor: None,
        }
    }

    fn resolve_path(&self, object_name: &str) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => PathBuf::from(object_name),
        }
    }

    fn read_frame(&self, path: &Path) -> Result<Frame, ConnectorError> {
        read_csv(path, self.has_header, self.delimiter)
    }
}

/// Read a whole CSV file into a frame.
pub fn read_csv(path: &Path, has_header: bool, delimiter: char) -> Result<Frame, ConnectorError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut frame = Frame::default();
    if has_header {
        match lines.next() {
            Some(line) => {
                frame.columns = split_csv_line(&line?, delimiter).into_iter().collect();
            }
            None => return Ok(frame),
        }
    }

    for (number, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let fields = split_csv_line(&line, delimiter);
        if frame.columns.is_empty() {
            // Headerless file: synthesize positional column names.
            frame.columns = (0..fields.len()).map(|i| format!("column{}", i)).collect();
        }
        if fields.len() != frame.columns.len() {
            return Err(ConnectorError::Parse {
                object: path.display().to_string(),
                message: format!(
                    "row {} has {} fields, expected {}",
                    number + 1,
                    fields.len(),
                    frame.columns.len()
                ),
            });
        }
        frame.push_row(fields.iter().map(|f| Value::from_literal(f)).collect());
    }
    Ok(frame)
}

impl Connector for CsvConnector {
    fn configure(&mut self, params: &IndexMap<String, serde_json::Value>) -> Vec<String> {
        let mut errors = Vec::new();
        match params.get("path").and_then(|v| v.as_str()) {
            Some(path) if !path.is_empty() => self.path = Some(PathBuf::from(path)),
            _ => errors.push("missing required parameter 'path'".to_string()),
        }
        if let Some(has_header) = params.get("has_header") {
            match has_header.as_bool() {
                Some(value) => self.has_header = value,
                None => errors.push("parameter 'has_header' must be a boolean".to_string()),
            }
        }
        if let Some(delimiter) = params.get("delimiter") {
            match delimiter.as_str().and_then(|s| {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }) {
                Some(c) => self.delimiter = c,
                None => {
                    errors.push("parameter 'delimiter' must be a single character".to_string())
                }
            }
        }
        if let Some(batch) = params.get("batch_size").and_then(|v| v.as_u64()) {
            self.batch_size = (batch as usize).max(1);
        }
        errors
    }

    fn supports_incremental(&self) -> bool {
        true
    }

    fn read(&mut self, object_name: &str) -> Result<ChunkIter, ConnectorError> {
        let path = self.resolve_path(object_name);
        let frame = self.read_frame(&path)?;
        tracing::debug!(path = %path.display(), rows = frame.row_count(), "read CSV file");
        Ok(frame.into_chunks(self.batch_size, Some(path)))
    }

    fn read_incremental(
        &mut self,
        object_name: &str,
        cursor_field: &str,
        cursor_value: Option<&str>,
        batch_size: usize,
    ) -> Result<ChunkIter, ConnectorError> {
        let path = self.resolve_path(object_name);
        let full = self.read_frame(&path)?;
        let cursor_index =
            full.column_index(cursor_field)
                .ok_or_else(|| ConnectorError::InvalidParam {
                    param: "cursor_field".to_string(),
                    message: format!("column '{}' not found in {}", cursor_field, path.display()),
                })?;

        let mut filtered = Frame::new(full.columns.clone());
        let mut max_cursor: Option<String> = None;
        for row in full.rows {
            let row_cursor = row
                .get(cursor_index)
                .map(|v| v.render_bare())
                .unwrap_or_default();
            if let Some(prior) = cursor_value {
                if cursor_cmp(&row_cursor, prior) != std::cmp::Ordering::Greater {
                    continue;
                }
            }
            match &max_cursor {
                Some(seen) if cursor_cmp(&row_cursor, seen) != std::cmp::Ordering::Greater => {}
                _ => max_cursor = Some(row_cursor.clone()),
            }
            filtered.push_row(row);
        }
        self.last_cursor = max_cursor;

        // Filtered rows no longer mirror the file; do not advertise the
        // file-backed COPY path.
        let batch = batch_size.max(1);
        Ok(filtered.into_chunks(batch, None))
    }

    fn cursor_value(&self) -> Option<String> {
        self.last_cursor.clone()
    }

    fn write(
        &mut self,
        destination: &str,
        data: &Frame,
        options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, ConnectorError> {
        let header = options
            .get("header")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let delimiter = options
            .get("delimiter")
            .and_then(|v| v.as_str())
            .and_then(|s| s.chars().next())
            .unwrap_or(self.delimiter);
        write_csv(Path::new(destination), data, header, delimiter)
    }
}

/// Write a frame as CSV, creating parent directories as needed.
pub fn write_csv(
    path: &Path,
    data: &Frame,
    header: bool,
    delimiter: char,
) -> Result<u64, ConnectorError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = File::create(path)?;
    if header && !data.columns.is_empty() {
        let line: Vec<String> = data
            .columns
            .iter()
            .map(|c| encode_csv_field(c, delimiter))
            .collect();
        writeln!(file, "{}", line.join(&delimiter.to_string()))?;
    }
    for row in &data.rows {
        let line: Vec<String> = row
            .iter()
            .map(|v| encode_csv_field(&render_csv_value(v), delimiter))
            .collect();
        writeln!(file, "{}", line.join(&delimiter.to_string()))?;
    }
    Ok(data.row_count() as u64)
}

fn render_csv_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.render_bare(),
    }
}

/// Quote a field when it contains the delimiter, quotes, or newlines;
/// embedded quotes double per RFC 4180.
pub(crate) fn encode_csv_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line honoring double-quoted fields and doubled quotes.
pub(crate) fn split_csv_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

/// Compare cursor strings numerically when both parse as numbers,
/// lexicographically otherwise (timestamps in `YYYY-MM-DD HH:MM:SS`
/// order correctly as text).
pub fn cursor_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
#[path = "csv_tests.rs"]
mod tests;
