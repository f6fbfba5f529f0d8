// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sqlflow_connectors::MemoryEngine;
use sqlflow_core::FakeClock;

fn ctx() -> ExecutionContext {
    ExecutionContext::builder("pipe", Box::new(MemoryEngine::new()))
        .clock(Arc::new(FakeClock::at(1_000)))
        .build()
}

#[test]
fn cancel_token_child_observes_parent() {
    let parent = CancelToken::new();
    let child = parent.child();
    assert!(!child.is_cancelled());
    parent.cancel();
    assert!(child.is_cancelled());
    assert!(parent.is_cancelled());
}

#[test]
fn cancelling_child_does_not_cancel_parent() {
    let parent = CancelToken::new();
    let child = parent.child();
    child.cancel();
    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());
}

#[test]
fn sibling_children_are_independent() {
    let parent = CancelToken::new();
    let first = parent.child();
    let second = parent.child();
    first.cancel();
    assert!(!second.is_cancelled());
}

#[test]
fn engine_handle_serializes_access() {
    let context = ctx();
    context
        .engine
        .statement(|engine| engine.execute("CREATE OR REPLACE TABLE t AS SELECT 1 x"))
        .unwrap();
    let exists = context
        .engine
        .statement(|engine| engine.table_exists("t"))
        .unwrap();
    assert!(exists);
}

#[test]
fn source_records_roundtrip() {
    let context = ctx();
    assert!(context.source("users").is_none());
    context.store_source(SourceRecord {
        name: "users".to_string(),
        connector_type: "CSV".to_string(),
        params: IndexMap::new(),
    });
    let record = context.source("users").unwrap();
    assert_eq!(record.connector_type, "CSV");
}

#[test]
fn builder_fills_defaults() {
    let context = ctx();
    assert!(!context.run_id.as_str().is_empty());
    assert_eq!(context.pipeline, "pipe");
    assert!(context.variables.is_empty());
    assert!(context.registry.contains("CSV"));
    assert!(!context.cancel.is_cancelled());
}

#[test]
fn contexts_share_state_across_clones() {
    let context = ctx();
    let clone = context.clone();
    context.store_source(SourceRecord {
        name: "s".to_string(),
        connector_type: "CSV".to_string(),
        params: IndexMap::new(),
    });
    assert!(clone.source("s").is_some());
    context.cancel.cancel();
    assert!(clone.cancel.is_cancelled());
}
