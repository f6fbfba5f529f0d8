// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::context::CancelToken;
use crate::steps::handle_step;
use crate::test_helpers::{table_rows, test_context, write_csv_file};
use sqlflow_core::{ErrorKind, PlanStep, StepKind, StepStatus, Value};

fn load_step(table: &str, source: &str, extra: serde_json::Value) -> PlanStep {
    let mut query = serde_json::json!({
        "source_name": source,
        "table_name": table,
    });
    if let (Some(base), Some(extras)) = (query.as_object_mut(), extra.as_object()) {
        for (k, v) in extras {
            base.insert(k.clone(), v.clone());
        }
    }
    let mut step = PlanStep::new(format!("load_{}", table), StepKind::Load)
        .with_name(table)
        .with_query(query);
    step.source_connector_type = Some("CSV".to_string());
    step
}

#[test]
fn replace_mode_loads_file_into_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "u.csv", "id,name\n1,ada\n2,grace\n");
    let ctx = test_context(dir.path());

    let step = load_step("users_tbl", &path, serde_json::json!({"mode": "REPLACE"}));
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.rows_affected, Some(2));
    assert_eq!(result.writes.as_deref(), Some("users_tbl"));
    assert_eq!(table_rows(&ctx, "users_tbl").len(), 2);
    // The staging table does not outlive the step.
    let stage_exists = ctx
        .engine
        .statement(|e| e.table_exists("__sqlflow_stage_users_tbl"))
        .unwrap();
    assert!(!stage_exists);
}

#[test]
fn replace_mode_overwrites_prior_rows() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_csv_file(dir.path(), "a.csv", "id\n1\n2\n3\n");
    let second = write_csv_file(dir.path(), "b.csv", "id\n9\n");
    let ctx = test_context(dir.path());

    handle_step(
        &load_step("t", &first, serde_json::json!({"mode": "REPLACE"})),
        &ctx,
        &CancelToken::new(),
    );
    let result = handle_step(
        &load_step("t", &second, serde_json::json!({"mode": "REPLACE"})),
        &ctx,
        &CancelToken::new(),
    );
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(table_rows(&ctx, "t"), vec![vec![Value::Int(9)]]);
}

#[test]
fn append_mode_accumulates_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "u.csv", "id\n1\n2\n");
    let ctx = test_context(dir.path());

    let step = load_step("t", &path, serde_json::json!({"mode": "APPEND"}));
    handle_step(&step, &ctx, &CancelToken::new());
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(table_rows(&ctx, "t").len(), 4);
}

#[test]
fn upsert_replaces_matches_and_inserts_new_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "delta.csv", "id,name\n2,B2\n4,D\n");
    let ctx = test_context(dir.path());

    // Seed the target with {1:A, 2:B, 3:C}.
    let seed = write_csv_file(dir.path(), "seed.csv", "id,name\n1,A\n2,B\n3,C\n");
    handle_step(
        &load_step("target", &seed, serde_json::json!({"mode": "REPLACE"})),
        &ctx,
        &CancelToken::new(),
    );

    let step = load_step(
        "target",
        &path,
        serde_json::json!({"mode": "UPSERT", "upsert_keys": ["id"]}),
    );
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);

    let mut rows = table_rows(&ctx, "target");
    rows.sort_by_key(|row| match row[0] {
        Value::Int(i) => i,
        _ => 0,
    });
    assert_eq!(
        rows,
        vec![
            vec![Value::Int(1), Value::from("A")],
            vec![Value::Int(2), Value::from("B2")],
            vec![Value::Int(3), Value::from("C")],
            vec![Value::Int(4), Value::from("D")],
        ]
    );
}

#[test]
fn upsert_without_keys_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "u.csv", "id\n1\n");
    let ctx = test_context(dir.path());

    let step = load_step("t", &path, serde_json::json!({"mode": "UPSERT"}));
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::StepExecution);
    assert!(error.message.contains("key"));
}

#[test]
fn upsert_on_missing_target_creates_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "u.csv", "id,name\n1,ada\n");
    let ctx = test_context(dir.path());

    let step = load_step(
        "fresh",
        &path,
        serde_json::json!({"mode": "UPSERT", "upsert_keys": ["id"]}),
    );
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(table_rows(&ctx, "fresh").len(), 1);
}

#[test]
fn named_source_definition_is_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "u.csv", "id\n1\n");
    let ctx = test_context(dir.path());
    ctx.store_source(crate::context::SourceRecord {
        name: "users".to_string(),
        connector_type: "CSV".to_string(),
        params: [(
            "path".to_string(),
            serde_json::Value::String(path.clone()),
        )]
        .into_iter()
        .collect(),
    });

    let step = load_step("users_tbl", "users", serde_json::json!({"mode": "REPLACE"}));
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.reads, vec!["users"]);
    assert_eq!(table_rows(&ctx, "users_tbl").len(), 1);
}

#[test]
fn missing_file_fails_permanently() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let missing = dir.path().join("absent.csv").display().to_string();

    let step = load_step("t", &missing, serde_json::json!({"mode": "REPLACE"}));
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::ConnectorPermanent);
}

#[test]
fn incremental_load_advances_watermark() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(
        dir.path(),
        "events.csv",
        "id,seq\n1,10\n2,20\n",
    );
    let ctx = test_context(dir.path());

    let step = load_step(
        "events",
        &path,
        serde_json::json!({
            "mode": "APPEND",
            "sync_mode": "incremental",
            "cursor_field": "seq",
        }),
    );
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.rows_affected, Some(2));
    assert_eq!(
        ctx.watermarks
            .get("test_pipeline", &path, "seq")
            .unwrap()
            .as_deref(),
        Some("20")
    );

    // Second run with one new row only loads past the watermark.
    std::fs::write(&path, "id,seq\n1,10\n2,20\n3,30\n").unwrap();
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.rows_affected, Some(1));
    assert_eq!(table_rows(&ctx, "events").len(), 3);
    assert_eq!(
        ctx.watermarks
            .get("test_pipeline", &path, "seq")
            .unwrap()
            .as_deref(),
        Some("30")
    );
}

#[test]
fn watermark_does_not_advance_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "e.csv", "id,seq\n1,10\n");
    let ctx = test_context(dir.path());

    // Invalid mode makes the load fail after the read.
    let step = load_step(
        "t",
        &path,
        serde_json::json!({
            "mode": "UPSERT",
            "sync_mode": "incremental",
            "cursor_field": "seq",
        }),
    );
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(
        ctx.watermarks.get("test_pipeline", &path, "seq").unwrap(),
        None
    );
}

#[test]
fn incremental_without_cursor_field_warns_and_full_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "e.csv", "id\n1\n2\n");
    let ctx = test_context(dir.path());

    let step = load_step(
        "t",
        &path,
        serde_json::json!({"mode": "REPLACE", "sync_mode": "incremental"}),
    );
    let result = handle_step(&step, &ctx, &CancelToken::new());
    assert_eq!(result.status, StepStatus::Success);
    assert_eq!(result.rows_affected, Some(2));
    assert!(result.warnings.iter().any(|w| w.contains("cursor_field")));
}

#[test]
fn schema_and_bytes_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv_file(dir.path(), "u.csv", "id,name\n1,ada\n");
    let ctx = test_context(dir.path());

    let step = load_step("t", &path, serde_json::json!({"mode": "REPLACE"}));
    let result = handle_step(&step, &ctx, &CancelToken::new());
    let schema = result.output_schema.unwrap();
    assert_eq!(schema[0].name, "id");
    assert_eq!(schema[0].data_type, "bigint");
    assert!(result.bytes_processed.unwrap() > 0);
}
