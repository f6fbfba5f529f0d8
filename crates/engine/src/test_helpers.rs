// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for engine unit tests.

use crate::context::ExecutionContext;
use sqlflow_connectors::MemoryEngine;
use sqlflow_core::{FakeClock, Value, VarTier};
use sqlflow_storage::WatermarkStore;
use sqlflow_vars::VariableStore;
use std::path::Path;
use std::sync::Arc;

/// Context over a fresh in-memory engine, with watermarks in `dir` and a
/// fake clock starting at 1000ms.
pub(crate) fn test_context(dir: &Path) -> ExecutionContext {
    test_context_with_vars(dir, &[])
}

pub(crate) fn test_context_with_vars(dir: &Path, vars: &[(&str, Value)]) -> ExecutionContext {
    let mut store = VariableStore::new();
    for (name, value) in vars {
        store.set(VarTier::Cli, *name, value.clone());
    }
    ExecutionContext::builder("test_pipeline", Box::new(MemoryEngine::new()))
        .variables(store)
        .watermarks(WatermarkStore::open(dir.join("watermarks.json")))
        .clock(Arc::new(FakeClock::at(1_000)))
        .build()
}

/// Write a CSV file under `dir` and return its path as a string.
pub(crate) fn write_csv_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    #[allow(clippy::unwrap_used)]
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

/// Read a table back out of the context's engine.
pub(crate) fn table_rows(ctx: &ExecutionContext, table: &str) -> Vec<Vec<Value>> {
    #[allow(clippy::unwrap_used)]
    ctx.engine
        .statement(|engine| engine.execute(&format!("SELECT * FROM {}", table)))
        .unwrap()
        .frame
        .rows
}
