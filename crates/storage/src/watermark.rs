// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable watermark store for incremental loads.
//!
//! One JSON document on disk maps `(pipeline, source, cursor_field)` keys
//! to the highest cursor value a successful load has seen. Updates are
//! atomic per key: read-modify-write under a lock, written to a temp file
//! and renamed into place.

use crate::error::StorageError;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;

/// File-backed watermark store.
pub struct WatermarkStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl WatermarkStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn key(pipeline: &str, source: &str, cursor_field: &str) -> String {
        format!("{}/{}/{}", pipeline, source, cursor_field)
    }

    fn read_map(&self) -> Result<IndexMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(IndexMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(IndexMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_map(&self, map: &IndexMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Last persisted cursor for a key, if any.
    pub fn get(
        &self,
        pipeline: &str,
        source: &str,
        cursor_field: &str,
    ) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        let map = self.read_map()?;
        Ok(map.get(&Self::key(pipeline, source, cursor_field)).cloned())
    }

    /// Persist a new cursor for a key. Timestamp-like values are
    /// normalized to `YYYY-MM-DD HH:MM:SS` first.
    pub fn set(
        &self,
        pipeline: &str,
        source: &str,
        cursor_field: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let normalized = normalize_timestamp(value);
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        let key = Self::key(pipeline, source, cursor_field);
        tracing::debug!(key = key.as_str(), value = normalized.as_str(), "persisting watermark");
        map.insert(key, normalized);
        self.write_map(&map)
    }

    /// Remove a key, if present.
    pub fn clear(
        &self,
        pipeline: &str,
        source: &str,
        cursor_field: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        if map
            .shift_remove(&Self::key(pipeline, source, cursor_field))
            .is_some()
        {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Normalize timestamp-like cursor values to `YYYY-MM-DD HH:MM:SS`.
/// Values that do not parse as timestamps are returned unchanged.
pub fn normalize_timestamp(value: &str) -> String {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
    ];
    for format in FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return midnight.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
#[path = "watermark_tests.rs"]
mod tests;
