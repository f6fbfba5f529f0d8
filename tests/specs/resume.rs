//! Resume-from-failure specs.

use crate::prelude::*;
use sqlflow_connectors::MemoryEngine;
use sqlflow_core::{ExecutionPlan, FakeClock, PlanStep, RunStatus, StepKind, Value};
use sqlflow_engine::{ExecutionContext, PipelineRunner, RunnerConfig};
use sqlflow_storage::{RunStateStore, WatermarkStore};
use std::sync::Arc;

fn step(id: &str, table: &str, sql: &str, deps: &[&str]) -> PlanStep {
    PlanStep::new(id, StepKind::Transform)
        .with_name(table)
        .with_query(serde_json::json!(sql))
        .with_depends_on(deps.iter().map(|d| d.to_string()).collect())
}

/// s1 → s2 → s3, where s2 reads a table that does not exist yet.
fn three_step_plan() -> ExecutionPlan {
    ExecutionPlan::new(vec![
        step("s1", "a", "SELECT 1 x", &[]),
        step("s2", "b", "SELECT * FROM external_feed", &["s1"]),
        step("s3", "c", "SELECT * FROM b", &["s2"]),
    ])
}

#[tokio::test]
async fn resume_carries_successes_and_reruns_failures() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at(10_000);
    let ctx = ExecutionContext::builder("specs", Box::new(MemoryEngine::new()))
        .watermarks(WatermarkStore::open(dir.path().join("wm.json")))
        .clock(Arc::new(clock.clone()))
        .build();
    let store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let runner = PipelineRunner::new(RunnerConfig::serial()).with_run_store(Arc::clone(&store));

    let first = runner.run(&three_step_plan(), &ctx).await.unwrap();
    assert_eq!(first.status, RunStatus::Failed);
    assert_eq!(first.failed_step.as_deref(), Some("s2"));
    assert_eq!(first.executed_steps, vec!["s1"]);
    let s1_first = first.step_result("s1").unwrap().clone();

    // Fix the underlying issue, with the clock visibly later.
    clock.advance_ms(120_000);
    ctx.engine
        .statement(|engine| engine.execute("CREATE TABLE external_feed AS SELECT 42 x"))
        .unwrap();

    let resumed = runner.resume(&ctx.run_id, &ctx).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(resumed.executed_steps, vec!["s1", "s2", "s3"]);

    // s1 was not re-executed: its result, timing included, is unchanged.
    assert_eq!(resumed.step_result("s1").unwrap(), &s1_first);
    // s2 and s3 ran in the resumed window.
    assert!(resumed.step_result("s2").unwrap().started_at_ms >= 130_000);
    assert!(resumed.step_result("s3").unwrap().started_at_ms >= 130_000);

    // The fixed chain flowed through to the end.
    let c_rows = ctx
        .engine
        .statement(|engine| engine.execute("SELECT * FROM c"))
        .unwrap()
        .frame
        .rows;
    assert_eq!(c_rows, vec![vec![Value::Int(42)]]);
}

#[tokio::test]
async fn successful_resume_state_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let runner = PipelineRunner::new(RunnerConfig::serial()).with_run_store(Arc::clone(&store));

    let first = runner.run(&three_step_plan(), &ctx).await.unwrap();
    assert_eq!(first.status, RunStatus::Failed);

    ctx.engine
        .statement(|engine| engine.execute("CREATE TABLE external_feed AS SELECT 1 x"))
        .unwrap();
    runner.resume(&ctx.run_id, &ctx).await.unwrap();

    let state = store.load(&ctx.run_id).unwrap();
    assert_eq!(state.record.status, RunStatus::Success);
    assert_eq!(state.record.step_results.len(), 3);
    assert!(state
        .statuses
        .values()
        .all(|s| s.state == sqlflow_core::TaskState::Success));
}

#[tokio::test]
async fn double_resume_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let runner = PipelineRunner::new(RunnerConfig::serial()).with_run_store(Arc::clone(&store));

    runner.run(&three_step_plan(), &ctx).await.unwrap();
    ctx.engine
        .statement(|engine| engine.execute("CREATE TABLE external_feed AS SELECT 1 x"))
        .unwrap();

    let once = runner.resume(&ctx.run_id, &ctx).await.unwrap();
    assert_eq!(once.status, RunStatus::Success);

    // A second resume re-executes nothing: every result is carried.
    let twice = runner.resume(&ctx.run_id, &ctx).await.unwrap();
    assert_eq!(twice.status, RunStatus::Success);
    assert_eq!(twice.step_results, once.step_results);
}
