//! Execution specs: end-to-end runs, fail-fast, upsert semantics.

use crate::prelude::*;
use sqlflow_core::{LoadMode, RunStatus, StepKind, TaskState, Value};
use sqlflow_engine::{PipelineRunner, RunnerConfig};
use sqlflow_plan::Planner;
use sqlflow_storage::RunStateStore;
use sqlflow_vars::VariableStore;
use std::sync::Arc;

#[tokio::test]
async fn csv_to_csv_pipeline_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let users_csv = fixture(
        dir.path(),
        "u.csv",
        "id,name,age\n1,ada,36\n2,kid,9\n3,grace,45\n",
    );
    let out_csv = dir.path().join("out.csv").display().to_string();

    let pipeline = pipeline(vec![
        source("users", &users_csv, 1),
        load("users_tbl", "users", LoadMode::Replace, &[], 2),
        transform("adults", "SELECT * FROM users_tbl WHERE age >= 18", 3),
        export_query("SELECT * FROM adults", &out_csv, 4),
    ]);
    let mut vars = VariableStore::new();
    let plan = Planner::new().plan(&pipeline, &mut vars).unwrap().plan;

    let ctx = context(dir.path());
    let outcome = PipelineRunner::new(RunnerConfig::serial())
        .run(&plan, &ctx)
        .await
        .unwrap();

    assert!(outcome.is_success(), "outcome: {outcome:?}");
    assert_eq!(
        outcome.executed_steps,
        vec![
            "source_users",
            "load_users_tbl",
            "transform_adults",
            "export_csv_adults"
        ]
    );
    let exported = std::fs::read_to_string(&out_csv).unwrap();
    assert_eq!(exported, "id,name,age\n1,ada,36\n3,grace,45\n");

    // Per-step results carry rows and lineage.
    let load_result = outcome.step_result("load_users_tbl").unwrap();
    assert_eq!(load_result.rows_affected, Some(3));
    assert_eq!(load_result.writes.as_deref(), Some("users_tbl"));
    let export_result = outcome.step_result("export_csv_adults").unwrap();
    assert_eq!(export_result.rows_affected, Some(2));
}

#[tokio::test]
async fn conditional_else_branch_executes_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let out_csv = dir.path().join("t.csv").display().to_string();
    let pipeline = pipeline(vec![
        set("target_region", "${target_region|global}", 1),
        if_else(
            "${target_region} == 'us-east'",
            vec![transform("t", "SELECT 1 x", 3)],
            vec![transform("t", "SELECT 2 x", 5)],
            2,
        ),
        export_query("SELECT * FROM t", &out_csv, 7),
    ]);
    let mut vars = VariableStore::new();
    let plan = Planner::new().plan(&pipeline, &mut vars).unwrap().plan;

    let ctx = context(dir.path());
    let outcome = PipelineRunner::new(RunnerConfig::serial())
        .run(&plan, &ctx)
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(std::fs::read_to_string(&out_csv).unwrap(), "x\n2\n");
}

#[tokio::test]
async fn fail_fast_halts_downstream_of_the_failure() {
    let dir = tempfile::tempdir().unwrap();
    // step2 reads a column that does not exist, so it fails at run time;
    // the planner only warns about what it cannot prove.
    let pipeline = pipeline(vec![
        transform("t1", "SELECT 1 x", 1),
        transform("t2", "SELECT * FROM t1 WHERE nope > 0", 2),
        transform("t3", "SELECT * FROM t2", 3),
    ]);
    let mut vars = VariableStore::new();
    let plan = Planner::new().plan(&pipeline, &mut vars).unwrap().plan;

    let dir_store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let ctx = context(dir.path());
    let runner =
        PipelineRunner::new(RunnerConfig::serial()).with_run_store(Arc::clone(&dir_store));
    let outcome = runner.run(&plan, &ctx).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.failed_step.as_deref(), Some("transform_t2"));
    assert_eq!(outcome.failed_step_type, Some(StepKind::Transform));
    assert_eq!(outcome.failed_at_step_index, Some(1));
    assert_eq!(outcome.executed_steps, vec!["transform_t1"]);
    assert!(outcome.error.is_some());

    // transform_t3 never entered RUNNING.
    let state = dir_store.load(&ctx.run_id).unwrap();
    assert_eq!(state.statuses["transform_t3"].state, TaskState::Pending);
    assert!(state.statuses["transform_t3"].start_time_ms.is_none());
}

#[tokio::test]
async fn upsert_load_merges_on_keys() {
    let dir = tempfile::tempdir().unwrap();
    let delta_csv = fixture(dir.path(), "delta.csv", "id,name\n2,B2\n4,D\n");

    let pipeline = pipeline(vec![
        source("delta", &delta_csv, 1),
        load("target", "delta", LoadMode::Upsert, &["id"], 2),
    ]);
    let mut vars = VariableStore::new();
    let plan = Planner::new().plan(&pipeline, &mut vars).unwrap().plan;

    let ctx = context(dir.path());
    // Seed the target with {1:A, 2:B, 3:C} before the run.
    ctx.engine
        .statement(|engine| {
            engine.register_frame(
                "target",
                sqlflow_connectors::Frame {
                    columns: vec!["id".to_string(), "name".to_string()],
                    rows: vec![
                        vec![Value::Int(1), Value::from("A")],
                        vec![Value::Int(2), Value::from("B")],
                        vec![Value::Int(3), Value::from("C")],
                    ],
                },
            )
        })
        .unwrap();

    let outcome = PipelineRunner::new(RunnerConfig::serial())
        .run(&plan, &ctx)
        .await
        .unwrap();
    assert!(outcome.is_success(), "outcome: {outcome:?}");

    let mut rows = ctx
        .engine
        .statement(|engine| engine.execute("SELECT * FROM target"))
        .unwrap()
        .frame
        .rows;
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

#[tokio::test]
async fn missing_export_source_degrades_to_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let out_csv = dir.path().join("ghost.csv").display().to_string();
    let pipeline = pipeline(vec![export_query("SELECT * FROM ghost", &out_csv, 1)]);
    let mut vars = VariableStore::new();
    let plan = Planner::new().plan(&pipeline, &mut vars).unwrap().plan;

    let ctx = context(dir.path());
    let outcome = PipelineRunner::new(RunnerConfig::serial())
        .run(&plan, &ctx)
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(std::fs::read_to_string(&out_csv).unwrap(), "");
    let result = outcome.step_result("export_csv_ghost").unwrap();
    assert!(result.warnings.iter().any(|w| w.contains("ghost")));
}

#[tokio::test]
async fn run_metrics_aggregate_by_step_kind() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(vec![
        transform("a", "SELECT 1 x", 1),
        transform("b", "SELECT * FROM a", 2),
    ]);
    let mut vars = VariableStore::new();
    let plan = Planner::new().plan(&pipeline, &mut vars).unwrap().plan;

    let ctx = context(dir.path());
    PipelineRunner::new(RunnerConfig::serial())
        .run(&plan, &ctx)
        .await
        .unwrap();
    let stats = ctx.observer.metrics.stats_for(StepKind::Transform);
    assert_eq!(stats.calls, 2);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.success_rate(), 1.0);
}
