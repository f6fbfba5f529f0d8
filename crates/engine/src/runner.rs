// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run driver.
//!
//! Single-owner control loop: dispatches runnable steps onto a bounded
//! pool of blocking workers, consumes completion events over a channel,
//! and owns every status transition. Run state persists after each
//! completion so a failed run can resume with its successes intact.

use crate::context::ExecutionContext;
use crate::error::ExecuteError;
use crate::retry::RetryPolicy;
use crate::scheduler::{FailurePolicy, Scheduler};
use crate::steps;
use indexmap::IndexMap;
use sqlflow_core::{
    ErrorKind, ExecutionPlan, PlanStep, RunId, RunRecord, RunStatus, StepError,
    StepExecutionResult, StepKind,
};
use sqlflow_storage::{RunState, RunStateStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Worker-pool size; defaults to the logical CPU count.
    pub max_workers: usize,
    pub policy: FailurePolicy,
    pub retry: RetryPolicy,
    /// Applied to steps that do not declare their own `timeout_ms`.
    pub default_step_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            policy: FailurePolicy::default(),
            retry: RetryPolicy::default(),
            default_step_timeout: None,
        }
    }
}

impl RunnerConfig {
    /// Single-worker config for deterministic ordering in tests.
    pub fn serial() -> Self {
        Self {
            max_workers: 1,
            ..Self::default()
        }
    }
}

/// Structured result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub failed_step: Option<String>,
    pub failed_step_type: Option<StepKind>,
    pub failed_at_step_index: Option<usize>,
    /// Ids of successfully executed steps, in plan order. Carried-over
    /// successes from a resumed run are included.
    pub executed_steps: Vec<String>,
    /// All step results, in plan order.
    pub step_results: Vec<StepExecutionResult>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Exit code of the run itself: 0 on success, 2 on execution failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            2
        }
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepExecutionResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }
}

/// Drives execution plans to completion.
pub struct PipelineRunner {
    config: RunnerConfig,
    run_store: Option<Arc<RunStateStore>>,
}

impl PipelineRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            run_store: None,
        }
    }

    /// Attach a run-state store; enables persistence and `resume`.
    pub fn with_run_store(mut self, store: Arc<RunStateStore>) -> Self {
        self.run_store = Some(store);
        self
    }

    /// Execute a plan from scratch.
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
    ) -> Result<RunOutcome, ExecuteError> {
        let scheduler = Scheduler::new(plan, self.config.policy);
        self.drive(plan, ctx, scheduler, Vec::new()).await
    }

    /// Resume a previously failed run.
    ///
    /// Successful steps keep their recorded results (timings unchanged)
    /// and are not re-executed; failed steps reset to `PENDING` and run
    /// again once their dependencies are credited.
    pub async fn resume(
        &self,
        run_id: &RunId,
        ctx: &ExecutionContext,
    ) -> Result<RunOutcome, ExecuteError> {
        let store = self.run_store.as_ref().ok_or_else(|| {
            ExecuteError::Validation("resume requires a run-state store".to_string())
        })?;
        let state = store.load(run_id)?;
        let scheduler = Scheduler::resume(&state.plan, &state.statuses, self.config.policy);
        let carried: Vec<StepExecutionResult> = state
            .record
            .step_results
            .iter()
            .filter(|r| r.is_success())
            .cloned()
            .collect();
        tracing::info!(
            run_id = %run_id,
            carried = carried.len(),
            "resuming run; successful steps carried forward"
        );
        self.drive(&state.plan, ctx, scheduler, carried).await
    }

    async fn drive(
        &self,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
        mut scheduler: Scheduler,
        carried: Vec<StepExecutionResult>,
    ) -> Result<RunOutcome, ExecuteError> {
        let wall_clock = Instant::now();
        let started_at_ms = ctx.clock.epoch_ms();
        let capacity = plan.len().max(1);
        let (tx, mut rx) = mpsc::channel::<(String, StepExecutionResult, u32)>(capacity);
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut fresh_results: Vec<StepExecutionResult> = Vec::new();
        let mut in_flight = 0usize;

        loop {
            if !ctx.cancel.is_cancelled() {
                let available = semaphore.available_permits();
                let ready = scheduler.take_runnable(available, ctx.clock.epoch_ms());
                for id in ready {
                    let Some(step) = plan.get(&id) else {
                        return Err(ExecuteError::Scheduler(format!(
                            "runnable step '{}' is not in the plan",
                            id
                        )));
                    };
                    let permit = Arc::clone(&semaphore)
                        .acquire_owned()
                        .await
                        .map_err(|_| {
                            ExecuteError::Scheduler("worker pool closed".to_string())
                        })?;
                    let step = step.clone();
                    let step_ctx = ctx.clone();
                    let completions = tx.clone();
                    let retry = self.config.retry;
                    let timeout = step_timeout(&step, self.config.default_step_timeout);
                    in_flight += 1;
                    tokio::spawn(async move {
                        let _permit = permit;
                        let (result, attempts) =
                            execute_with_retry(step, step_ctx, retry, timeout).await;
                        let _ = completions
                            .send((result.step_id.clone(), result, attempts))
                            .await;
                    });
                }
            }

            if in_flight == 0 && (scheduler.settled() || ctx.cancel.is_cancelled()) {
                break;
            }

            let Some((id, result, attempts)) = rx.recv().await else {
                return Err(ExecuteError::Scheduler(
                    "completion channel closed unexpectedly".to_string(),
                ));
            };
            in_flight -= 1;
            if attempts > 1 {
                scheduler.add_attempts(&id, attempts - 1);
            }
            scheduler.complete(&id, &result, ctx.clock.epoch_ms());

            let mut resources = IndexMap::new();
            resources.insert("workers_in_flight".to_string(), in_flight as f64);
            resources.insert("attempts".to_string(), attempts as f64);
            ctx.observer.step_finished(&result, resources);
            fresh_results.push(result);

            self.persist(plan, ctx, &scheduler, &carried, &fresh_results, started_at_ms);
        }

        let outcome = self.shape_outcome(
            plan,
            ctx,
            &scheduler,
            carried,
            fresh_results,
            started_at_ms,
            wall_clock.elapsed(),
        );
        self.persist_outcome(plan, ctx, &scheduler, &outcome, started_at_ms);
        Ok(outcome)
    }

    #[allow(clippy::too_many_arguments)]
    fn shape_outcome(
        &self,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
        scheduler: &Scheduler,
        carried: Vec<StepExecutionResult>,
        fresh: Vec<StepExecutionResult>,
        _started_at_ms: u64,
        elapsed: Duration,
    ) -> RunOutcome {
        // Plan-ordered results: fresh results win over carried ones.
        let mut by_id: IndexMap<&str, &StepExecutionResult> = IndexMap::new();
        for result in carried.iter().chain(fresh.iter()) {
            by_id.insert(result.step_id.as_str(), result);
        }
        let step_results: Vec<StepExecutionResult> = plan
            .steps
            .iter()
            .filter_map(|step| by_id.get(step.id.as_str()).copied().cloned())
            .collect();
        let executed_steps: Vec<String> = step_results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.step_id.clone())
            .collect();

        let cancelled = ctx.cancel.is_cancelled() && !scheduler.all_succeeded();
        let status = if scheduler.all_succeeded() {
            RunStatus::Success
        } else if scheduler.any_succeeded()
            && self.config.policy == FailurePolicy::ContinueOnError
        {
            RunStatus::PartialSuccess
        } else {
            RunStatus::Failed
        };

        let failed_step = scheduler.first_failed().map(str::to_string);
        let failed_step_type = failed_step
            .as_deref()
            .and_then(|id| plan.get(id))
            .map(|step| step.kind);
        let failed_at_step_index = failed_step.as_deref().and_then(|id| plan.index_of(id));
        let error = if cancelled && failed_step.is_none() {
            Some("run cancelled before completion".to_string())
        } else {
            failed_step
                .as_deref()
                .and_then(|id| step_results.iter().find(|r| r.step_id == id))
                .and_then(|r| r.error.as_ref())
                .map(|e| e.message.clone())
        };
        let status = if cancelled && status == RunStatus::Success {
            RunStatus::Failed
        } else {
            status
        };

        RunOutcome {
            run_id: ctx.run_id.clone(),
            status,
            failed_step,
            failed_step_type,
            failed_at_step_index,
            executed_steps,
            step_results,
            execution_time_ms: elapsed.as_millis() as u64,
            error,
        }
    }

    /// Best-effort mid-run persistence; a write failure never fails the
    /// run, it only costs resume granularity.
    fn persist(
        &self,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
        scheduler: &Scheduler,
        carried: &[StepExecutionResult],
        fresh: &[StepExecutionResult],
        started_at_ms: u64,
    ) {
        let Some(store) = &self.run_store else {
            return;
        };
        let mut record = RunRecord::new(ctx.run_id.clone(), started_at_ms);
        record.step_results = carried.iter().chain(fresh.iter()).cloned().collect();
        record.status = RunStatus::Failed; // provisional until the run settles
        record.metrics = ctx.observer.metrics.snapshot();
        let state = RunState {
            run_id: ctx.run_id.clone(),
            plan: plan.clone(),
            statuses: scheduler.statuses().clone(),
            record,
        };
        if let Err(persist_error) = store.save(&state) {
            tracing::warn!(error = %persist_error, "run-state persistence failed; resume may lose progress");
        }
    }

    fn persist_outcome(
        &self,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
        scheduler: &Scheduler,
        outcome: &RunOutcome,
        started_at_ms: u64,
    ) {
        let Some(store) = &self.run_store else {
            return;
        };
        let mut record = RunRecord::new(ctx.run_id.clone(), started_at_ms);
        record.finished_at_ms = Some(ctx.clock.epoch_ms());
        record.status = outcome.status;
        record.step_results = outcome.step_results.clone();
        record.metrics = ctx.observer.metrics.snapshot();
        let state = RunState {
            run_id: ctx.run_id.clone(),
            plan: plan.clone(),
            statuses: scheduler.statuses().clone(),
            record,
        };
        if let Err(persist_error) = store.save(&state) {
            tracing::warn!(error = %persist_error, "final run-state persistence failed");
        }
    }
}

/// Per-step timeout: the payload's `timeout_ms` wins over the config
/// default.
fn step_timeout(step: &PlanStep, default: Option<Duration>) -> Option<Duration> {
    step.extra
        .get("timeout_ms")
        .and_then(|v| v.as_u64())
        .map(Duration::from_millis)
        .or(default)
}

async fn execute_with_retry(
    step: PlanStep,
    ctx: ExecutionContext,
    retry: RetryPolicy,
    timeout: Option<Duration>,
) -> (StepExecutionResult, u32) {
    ctx.observer.step_started(&step.id, step.kind);
    let mut attempt = 1u32;
    loop {
        let step_cancel = ctx.cancel.child();
        let handle = {
            let step = step.clone();
            let ctx = ctx.clone();
            let cancel = step_cancel.clone();
            tokio::task::spawn_blocking(move || steps::handle_step(&step, &ctx, &cancel))
        };

        let result = match timeout {
            Some(budget) => match tokio::time::timeout(budget, handle).await {
                Ok(joined) => unwrap_join(joined, &step, &ctx),
                Err(_) => {
                    // Cooperative: flag the step and report the timeout;
                    // the worker is not forcibly killed and its late
                    // result will be dropped by the scheduler.
                    step_cancel.cancel();
                    timeout_failure(&step, &ctx, budget)
                }
            },
            None => unwrap_join(handle.await, &step, &ctx),
        };

        if result.is_success() || !retry.should_retry(&result, attempt) {
            return (result, attempt);
        }
        tracing::warn!(
            step_id = step.id.as_str(),
            attempt,
            "transient connector failure; retrying"
        );
        tokio::time::sleep(retry.backoff(attempt)).await;
        attempt += 1;
    }
}

fn unwrap_join(
    joined: Result<StepExecutionResult, tokio::task::JoinError>,
    step: &PlanStep,
    ctx: &ExecutionContext,
) -> StepExecutionResult {
    match joined {
        Ok(result) => result,
        Err(join_error) => {
            let now = ctx.clock.epoch_ms();
            StepExecutionResult::failure(
                &step.id,
                step.kind,
                now,
                now,
                StepError::new(
                    ErrorKind::StepExecution,
                    format!("step worker aborted: {}", join_error),
                ),
            )
        }
    }
}

fn timeout_failure(
    step: &PlanStep,
    ctx: &ExecutionContext,
    budget: Duration,
) -> StepExecutionResult {
    let now = ctx.clock.epoch_ms();
    StepExecutionResult::failure(
        &step.id,
        step.kind,
        now.saturating_sub(budget.as_millis() as u64),
        now,
        StepError::new(
            ErrorKind::StepExecution,
            format!("step exceeded its timeout of {}ms", budget.as_millis()),
        )
        .with_suggestion("raise timeout_ms or reduce the step's input volume"),
    )
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
