// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The connector contract.

use crate::chunk::{DataChunk, Frame};
use crate::error::ConnectorError;
use indexmap::IndexMap;
use std::path::Path;

/// Batches of chunks produced by a read.
pub type ChunkIter = Box<dyn Iterator<Item = Result<DataChunk, ConnectorError>> + Send>;

/// External data adapter. One instance serves one step; instances are
/// never shared across workers.
///
/// Connectors are blocking: step handlers run on blocking-capable
/// workers and are expected to check the cancellation signal between
/// reads.
pub trait Connector: Send + std::fmt::Debug {
    /// Validate and store configuration. Returns one message per
    /// problem; an empty list means the connector is ready.
    fn configure(&mut self, params: &IndexMap<String, serde_json::Value>) -> Vec<String>;

    /// Whether [`Connector::read_incremental`] is available.
    fn supports_incremental(&self) -> bool {
        false
    }

    /// Full-scan read of the named object.
    fn read(&mut self, object_name: &str) -> Result<ChunkIter, ConnectorError>;

    /// Incremental read: only rows whose `cursor_field` value is past
    /// `cursor_value`.
    fn read_incremental(
        &mut self,
        _object_name: &str,
        _cursor_field: &str,
        _cursor_value: Option<&str>,
        _batch_size: usize,
    ) -> Result<ChunkIter, ConnectorError> {
        Err(ConnectorError::Unsupported(
            "incremental reads".to_string(),
        ))
    }

    /// Maximum cursor value seen during the last read, if tracked.
    fn cursor_value(&self) -> Option<String> {
        None
    }

    /// Write a frame to a destination (export connectors).
    fn write(
        &mut self,
        _destination: &str,
        _data: &Frame,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, ConnectorError> {
        Err(ConnectorError::Unsupported("writes".to_string()))
    }

    /// Bulk-ingest a local file (export connectors with a native path).
    fn copy_from_file(
        &mut self,
        _path: &Path,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<u64, ConnectorError> {
        Err(ConnectorError::Unsupported("file copy".to_string()))
    }
}
