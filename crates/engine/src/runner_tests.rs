// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::CancelToken;
use crate::test_helpers::{table_rows, test_context};
use sqlflow_connectors::{
    ChunkIter, Connector, ConnectorError, ConnectorRegistry, MemoryEngine,
};
use sqlflow_core::{FakeClock, StepStatus, TaskState, Value};
use sqlflow_storage::WatermarkStore;
use std::sync::atomic::{AtomicU32, Ordering};

fn transform(id: &str, table: &str, sql: &str, deps: &[&str]) -> PlanStep {
    PlanStep::new(id, StepKind::Transform)
        .with_name(table)
        .with_query(serde_json::json!(sql))
        .with_depends_on(deps.iter().map(|d| d.to_string()).collect())
}

fn linear_plan() -> ExecutionPlan {
    ExecutionPlan::new(vec![
        transform("transform_a", "a", "SELECT 1 x", &[]),
        transform("transform_b", "b", "SELECT * FROM a", &["transform_a"]),
        transform("transform_c", "c", "SELECT * FROM b", &["transform_b"]),
    ])
}

/// Plan where the middle step reads a table nothing defines.
fn failing_plan() -> ExecutionPlan {
    ExecutionPlan::new(vec![
        transform("transform_a", "a", "SELECT 1 x", &[]),
        transform("transform_b", "b", "SELECT * FROM ghost", &["transform_a"]),
        transform("transform_c", "c", "SELECT * FROM b", &["transform_b"]),
    ])
}

#[tokio::test]
async fn linear_plan_runs_to_success() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let runner = PipelineRunner::new(RunnerConfig::serial());

    let outcome = runner.run(&linear_plan(), &ctx).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(
        outcome.executed_steps,
        vec!["transform_a", "transform_b", "transform_c"]
    );
    assert!(outcome.failed_step.is_none());
    assert!(outcome.error.is_none());
    assert_eq!(table_rows(&ctx, "c"), vec![vec![Value::Int(1)]]);
}

#[tokio::test]
async fn empty_plan_is_a_successful_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let runner = PipelineRunner::new(RunnerConfig::serial());
    let outcome = runner.run(&ExecutionPlan::default(), &ctx).await.unwrap();
    assert!(outcome.is_success());
    assert!(outcome.executed_steps.is_empty());
}

#[tokio::test]
async fn fail_fast_halts_downstream_steps() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let runner = PipelineRunner::new(RunnerConfig::serial()).with_run_store(Arc::clone(&store));

    let outcome = runner.run(&failing_plan(), &ctx).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(outcome.failed_step.as_deref(), Some("transform_b"));
    assert_eq!(outcome.failed_step_type, Some(StepKind::Transform));
    assert_eq!(outcome.failed_at_step_index, Some(1));
    assert_eq!(outcome.executed_steps, vec!["transform_a"]);
    assert!(outcome.error.as_deref().unwrap().contains("ghost"));

    // The downstream step never left PENDING.
    let state = store.load(&ctx.run_id).unwrap();
    assert_eq!(state.statuses["transform_c"].state, TaskState::Pending);
    assert!(state.statuses["transform_c"].start_time_ms.is_none());
}

#[tokio::test]
async fn independent_steps_run_under_parallel_workers() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let config = RunnerConfig {
        max_workers: 4,
        ..RunnerConfig::default()
    };
    let runner = PipelineRunner::new(config);

    let plan = ExecutionPlan::new(vec![
        transform("transform_a", "a", "SELECT 1 x", &[]),
        transform("transform_b", "b", "SELECT 2 x", &[]),
        transform("transform_c", "c", "SELECT 3 x", &[]),
        transform("transform_d", "d", "SELECT * FROM a JOINLESS", &[]),
    ]);
    // transform_d is broken SQL, but unrelated steps may still finish
    // before the failure is observed; assert only the settled contract.
    let outcome = runner.run(&plan, &ctx).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.failed_step.as_deref(), Some("transform_d"));
}

#[tokio::test]
async fn continue_on_error_executes_independent_work() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let config = RunnerConfig {
        policy: FailurePolicy::ContinueOnError,
        ..RunnerConfig::serial()
    };
    let runner = PipelineRunner::new(config);

    let plan = ExecutionPlan::new(vec![
        transform("transform_bad", "bad", "SELECT * FROM ghost", &[]),
        transform("transform_down", "down", "SELECT * FROM bad", &["transform_bad"]),
        transform("transform_ok", "ok", "SELECT 1 x", &[]),
    ]);
    let outcome = runner.run(&plan, &ctx).await.unwrap();
    assert_eq!(outcome.status, RunStatus::PartialSuccess);
    assert_eq!(outcome.executed_steps, vec!["transform_ok"]);
    assert_eq!(outcome.failed_step.as_deref(), Some("transform_bad"));
    // The dependent of the failure never produced a result.
    assert!(outcome.step_result("transform_down").is_none());
}

#[tokio::test]
async fn resume_reruns_only_failed_steps() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::at(1_000);
    let ctx = ExecutionContext::builder("pipe", Box::new(MemoryEngine::new()))
        .watermarks(WatermarkStore::open(dir.path().join("wm.json")))
        .clock(Arc::new(clock.clone()))
        .build();
    let store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let runner = PipelineRunner::new(RunnerConfig::serial()).with_run_store(Arc::clone(&store));

    let first = runner.run(&failing_plan(), &ctx).await.unwrap();
    assert_eq!(first.status, RunStatus::Failed);
    let a_first_run = first.step_result("transform_a").unwrap().clone();

    // Fix the environment and advance the clock so re-executed steps
    // get visibly newer timestamps.
    ctx.engine
        .statement(|e| e.execute("CREATE TABLE ghost AS SELECT 9 x"))
        .unwrap();
    clock.advance_ms(60_000);

    let resumed = runner.resume(&ctx.run_id, &ctx).await.unwrap();
    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(
        resumed.executed_steps,
        vec!["transform_a", "transform_b", "transform_c"]
    );
    // transform_a was carried forward, not re-executed: identical result.
    assert_eq!(resumed.step_result("transform_a").unwrap(), &a_first_run);
    // transform_b ran after the clock advanced.
    assert!(
        resumed.step_result("transform_b").unwrap().started_at_ms
            > a_first_run.finished_at_ms
    );
    assert_eq!(table_rows(&ctx, "c"), vec![vec![Value::Int(9)]]);
}

#[tokio::test]
async fn resume_without_store_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let runner = PipelineRunner::new(RunnerConfig::serial());
    let err = runner.resume(&ctx.run_id, &ctx).await.unwrap_err();
    assert!(matches!(err, ExecuteError::Validation(_)));
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn resume_of_unknown_run_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let store = Arc::new(RunStateStore::open(dir.path().join("runs")));
    let runner = PipelineRunner::new(RunnerConfig::serial()).with_run_store(store);
    let err = runner.resume(&RunId::new("ghost"), &ctx).await.unwrap_err();
    assert!(matches!(err, ExecuteError::Storage(_)));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn pre_cancelled_run_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let ctx = {
        let base = test_context(dir.path());
        ExecutionContext {
            cancel,
            ..base
        }
    };
    let runner = PipelineRunner::new(RunnerConfig::serial());
    let outcome = runner.run(&linear_plan(), &ctx).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.executed_steps.is_empty());
    assert_eq!(outcome.error.as_deref(), Some("run cancelled before completion"));
}

// Connector that blocks long enough to trip a step timeout.
#[derive(Debug)]
struct StallingConnector;

impl Connector for StallingConnector {
    fn configure(
        &mut self,
        _params: &indexmap::IndexMap<String, serde_json::Value>,
    ) -> Vec<String> {
        Vec::new()
    }

    fn read(&mut self, _object_name: &str) -> Result<ChunkIter, ConnectorError> {
        std::thread::sleep(std::time::Duration::from_millis(500));
        Err(ConnectorError::Timeout("stalled read".to_string()))
    }
}

#[tokio::test]
async fn step_timeout_fails_that_step_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ConnectorRegistry::new();
    registry.register("STALL", || Box::new(StallingConnector));
    let ctx = ExecutionContext::builder("pipe", Box::new(MemoryEngine::new()))
        .registry(registry)
        .watermarks(WatermarkStore::open(dir.path().join("wm.json")))
        .build();

    let mut slow = PlanStep::new("load_slow", StepKind::Load)
        .with_name("slow")
        .with_query(serde_json::json!({
            "source_name": "whatever",
            "table_name": "slow",
            "mode": "REPLACE",
        }));
    slow.source_connector_type = Some("STALL".to_string());
    slow.extra.insert(
        "timeout_ms".to_string(),
        serde_json::Value::from(50u64),
    );
    let plan = ExecutionPlan::new(vec![slow]);

    let config = RunnerConfig {
        retry: RetryPolicy::no_retries(),
        ..RunnerConfig::serial()
    };
    let runner = PipelineRunner::new(config);
    let outcome = runner.run(&plan, &ctx).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    let error = outcome.step_result("load_slow").unwrap().error.clone().unwrap();
    assert!(error.message.contains("timeout"));
}

// Connector that fails transiently twice, then succeeds.
static FLAKY_CALLS: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
struct FlakyConnector;

impl Connector for FlakyConnector {
    fn configure(
        &mut self,
        _params: &indexmap::IndexMap<String, serde_json::Value>,
    ) -> Vec<String> {
        Vec::new()
    }

    fn read(&mut self, _object_name: &str) -> Result<ChunkIter, ConnectorError> {
        let call = FLAKY_CALLS.fetch_add(1, Ordering::SeqCst);
        if call < 2 {
            return Err(ConnectorError::ConnectionReset(format!(
                "attempt {}",
                call + 1
            )));
        }
        let frame = sqlflow_connectors::Frame {
            columns: vec!["x".to_string()],
            rows: vec![vec![Value::Int(7)]],
        };
        Ok(frame.into_chunks(1000, None))
    }
}

#[tokio::test]
async fn transient_connector_errors_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    FLAKY_CALLS.store(0, Ordering::SeqCst);
    let mut registry = ConnectorRegistry::new();
    registry.register("FLAKY", || Box::new(FlakyConnector));
    let ctx = ExecutionContext::builder("pipe", Box::new(MemoryEngine::new()))
        .registry(registry)
        .watermarks(WatermarkStore::open(dir.path().join("wm.json")))
        .build();

    let mut step = PlanStep::new("load_t", StepKind::Load)
        .with_name("t")
        .with_query(serde_json::json!({
            "source_name": "obj",
            "table_name": "t",
            "mode": "REPLACE",
        }));
    step.source_connector_type = Some("FLAKY".to_string());
    let plan = ExecutionPlan::new(vec![step]);

    let config = RunnerConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
        },
        ..RunnerConfig::serial()
    };
    let runner = PipelineRunner::new(config);
    let outcome = runner.run(&plan, &ctx).await.unwrap();
    assert!(outcome.is_success(), "outcome: {outcome:?}");
    assert_eq!(FLAKY_CALLS.load(Ordering::SeqCst), 3);
    assert_eq!(table_rows(&ctx, "t"), vec![vec![Value::Int(7)]]);
}

#[tokio::test]
async fn retries_exhaust_into_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ConnectorRegistry::new();
    registry.register("DEAD", || Box::new(StallingConnector));
    let ctx = ExecutionContext::builder("pipe", Box::new(MemoryEngine::new()))
        .registry(registry)
        .watermarks(WatermarkStore::open(dir.path().join("wm.json")))
        .build();

    let mut step = PlanStep::new("load_t", StepKind::Load)
        .with_name("t")
        .with_query(serde_json::json!({
            "source_name": "obj",
            "table_name": "t",
            "mode": "REPLACE",
        }));
    step.source_connector_type = Some("DEAD".to_string());
    let plan = ExecutionPlan::new(vec![step]);

    let config = RunnerConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
        },
        ..RunnerConfig::serial()
    };
    let runner = PipelineRunner::new(config);
    let outcome = runner.run(&plan, &ctx).await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    let result = outcome.step_result("load_t").unwrap();
    assert_eq!(result.status, StepStatus::Failed);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::ConnectorTransient);
}

#[tokio::test]
async fn metrics_and_events_are_recorded_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context(dir.path());
    let runner = PipelineRunner::new(RunnerConfig::serial());
    runner.run(&linear_plan(), &ctx).await.unwrap();

    let stats = ctx.observer.metrics.stats_for(StepKind::Transform);
    assert_eq!(stats.calls, 3);
    assert_eq!(stats.failures, 0);
    // start + finish per step
    assert_eq!(ctx.observer.events().len(), 6);
}
