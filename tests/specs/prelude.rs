//! Shared fixtures for the behavioral specs.

use sqlflow_connectors::MemoryEngine;
use sqlflow_core::{
    ConditionalBlock, ConditionalBranch, ExportStep, FakeClock, LoadMode, LoadStep, Pipeline,
    SetStep, SourceDefinition, Step, SyncMode, TransformStep,
};
use sqlflow_engine::ExecutionContext;
use sqlflow_storage::WatermarkStore;
use std::path::Path;
use std::sync::Arc;

pub fn source(name: &str, path: &str, line: u32) -> Step {
    let mut params = indexmap::IndexMap::new();
    params.insert(
        "path".to_string(),
        serde_json::Value::String(path.to_string()),
    );
    Step::Source(SourceDefinition {
        name: name.to_string(),
        connector_type: "CSV".to_string(),
        params,
        line,
    })
}

pub fn load(table: &str, source: &str, mode: LoadMode, keys: &[&str], line: u32) -> Step {
    Step::Load(LoadStep {
        table: table.to_string(),
        source: source.to_string(),
        mode,
        upsert_keys: keys.iter().map(|k| k.to_string()).collect(),
        sync_mode: SyncMode::FullRefresh,
        cursor_field: None,
        line,
    })
}

pub fn transform(table: &str, sql: &str, line: u32) -> Step {
    Step::Transform(TransformStep {
        table: table.to_string(),
        sql: sql.to_string(),
        line,
    })
}

pub fn export_query(sql: &str, destination: &str, line: u32) -> Step {
    Step::Export(ExportStep {
        sql: Some(sql.to_string()),
        source_table: None,
        destination: destination.to_string(),
        connector_type: "CSV".to_string(),
        options: Default::default(),
        line,
    })
}

pub fn set(name: &str, value: &str, line: u32) -> Step {
    Step::Set(SetStep {
        name: name.to_string(),
        value: value.to_string(),
        line,
    })
}

pub fn if_else(condition: &str, then_steps: Vec<Step>, else_steps: Vec<Step>, line: u32) -> Step {
    Step::Conditional(ConditionalBlock {
        branches: vec![ConditionalBranch {
            condition: condition.to_string(),
            steps: then_steps,
            line,
        }],
        else_branch: else_steps,
        line,
    })
}

pub fn pipeline(steps: Vec<Step>) -> Pipeline {
    Pipeline::new(steps)
}

/// Execution context over a fresh in-memory engine.
pub fn context(dir: &Path) -> ExecutionContext {
    ExecutionContext::builder("specs", Box::new(MemoryEngine::new()))
        .watermarks(WatermarkStore::open(dir.join("watermarks.json")))
        .clock(Arc::new(FakeClock::at(1_000)))
        .build()
}

/// Write a fixture CSV and return its path as a string.
pub fn fixture(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}
