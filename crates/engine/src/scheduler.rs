// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling state for one run.
//!
//! Pure bookkeeping, no I/O: the runner's control loop owns one
//! `Scheduler` and is the only mutator, which serializes every status
//! transition. Steps and their relationships are keyed by string id
//! over the plan's flat step list, so the graph holds no references.

use indexmap::IndexMap;
use sqlflow_core::{ExecutionPlan, StepExecutionResult, TaskState, TaskStatus};

/// What to do after the first step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop dispatching new steps; in-flight steps settle.
    #[default]
    FailFast,
    /// Keep dispatching steps whose dependencies all succeeded. Steps
    /// downstream of a failure stay pending forever.
    ContinueOnError,
}

/// Status bookkeeping plus dependent fan-out for one run.
#[derive(Debug)]
pub struct Scheduler {
    statuses: IndexMap<String, TaskStatus>,
    dependents: IndexMap<String, Vec<String>>,
    /// Plan order, for deterministic dispatch among equally-ready steps.
    order: Vec<String>,
    policy: FailurePolicy,
    failed: Vec<String>,
}

impl Scheduler {
    /// Fresh state: every step `PENDING` (or immediately `RUNNABLE` with
    /// no dependencies).
    pub fn new(plan: &ExecutionPlan, policy: FailurePolicy) -> Self {
        let statuses = plan
            .steps
            .iter()
            .map(|step| {
                (
                    step.id.clone(),
                    TaskStatus::new(step.depends_on.clone()),
                )
            })
            .collect();
        Self::with_statuses_inner(plan, statuses, policy)
    }

    /// Resume state: prior `SUCCESS` steps keep their status; failed and
    /// unstarted steps reset to `PENDING` with dependency counts that
    /// already credit the successes.
    pub fn resume(
        plan: &ExecutionPlan,
        prior: &IndexMap<String, TaskStatus>,
        policy: FailurePolicy,
    ) -> Self {
        let mut statuses: IndexMap<String, TaskStatus> = IndexMap::new();
        for step in &plan.steps {
            let mut status = match prior.get(&step.id) {
                Some(status) if status.state == TaskState::Success => status.clone(),
                _ => TaskStatus::new(step.depends_on.clone()),
            };
            if status.state != TaskState::Success {
                let unmet = step
                    .depends_on
                    .iter()
                    .filter(|dep| {
                        prior
                            .get(dep.as_str())
                            .map(|d| d.state != TaskState::Success)
                            .unwrap_or(true)
                    })
                    .count();
                status.unmet_dependencies = unmet;
                status.state = if unmet == 0 {
                    TaskState::Runnable
                } else {
                    TaskState::Pending
                };
            }
            statuses.insert(step.id.clone(), status);
        }
        Self::with_statuses_inner(plan, statuses, policy)
    }

    fn with_statuses_inner(
        plan: &ExecutionPlan,
        statuses: IndexMap<String, TaskStatus>,
        policy: FailurePolicy,
    ) -> Self {
        let mut dependents: IndexMap<String, Vec<String>> = IndexMap::new();
        for step in &plan.steps {
            dependents.entry(step.id.clone()).or_default();
        }
        for step in &plan.steps {
            for dep in &step.depends_on {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(step.id.clone());
            }
        }
        Self {
            statuses,
            dependents,
            order: plan.steps.iter().map(|s| s.id.clone()).collect(),
            policy,
            failed: Vec::new(),
        }
    }

    /// Whether new dispatches are suppressed (fail-fast after a failure).
    pub fn halted(&self) -> bool {
        self.policy == FailurePolicy::FailFast && !self.failed.is_empty()
    }

    /// Take up to `limit` runnable steps, transitioning each to
    /// `RUNNING`. A step is returned at most once per run; plan order
    /// breaks ties.
    pub fn take_runnable(&mut self, limit: usize, now_ms: u64) -> Vec<String> {
        if self.halted() || limit == 0 {
            return Vec::new();
        }
        let mut taken = Vec::new();
        for id in &self.order {
            if taken.len() >= limit {
                break;
            }
            if let Some(status) = self.statuses.get_mut(id) {
                if status.state == TaskState::Runnable
                    && status.transition(TaskState::Running).is_ok()
                {
                    status.start_time_ms = Some(now_ms);
                    status.attempts += 1;
                    taken.push(id.clone());
                }
            }
        }
        taken
    }

    /// Record a finished step. On success, dependents' unmet counts
    /// decrement and newly-runnable ids are returned. Late results for
    /// already-settled steps (a timed-out step finishing anyway) are
    /// dropped.
    pub fn complete(&mut self, id: &str, result: &StepExecutionResult, now_ms: u64) -> Vec<String> {
        let Some(status) = self.statuses.get_mut(id) else {
            return Vec::new();
        };
        if status.state != TaskState::Running {
            tracing::warn!(step_id = id, state = %status.state, "dropping late step result");
            return Vec::new();
        }
        status.end_time_ms = Some(now_ms);
        if result.is_success() {
            let _ = status.transition(TaskState::Success);
            let mut newly_runnable = Vec::new();
            for dependent in self.dependents.get(id).cloned().unwrap_or_default() {
                if let Some(dep_status) = self.statuses.get_mut(&dependent) {
                    if dep_status.state == TaskState::Pending {
                        if let Ok(true) = dep_status.satisfy_dependency() {
                            newly_runnable.push(dependent);
                        }
                    }
                }
            }
            newly_runnable
        } else {
            let _ = status.transition(TaskState::Failed);
            status.error = result.error.as_ref().map(|e| e.message.clone());
            self.failed.push(id.to_string());
            Vec::new()
        }
    }

    /// Record retry attempts made inside a dispatch.
    pub fn add_attempts(&mut self, id: &str, extra: u32) {
        if let Some(status) = self.statuses.get_mut(id) {
            status.attempts += extra;
        }
    }

    /// No step is running, and nothing more can be dispatched.
    pub fn settled(&self) -> bool {
        let any_running = self
            .statuses
            .values()
            .any(|s| s.state == TaskState::Running);
        if any_running {
            return false;
        }
        if self.halted() {
            return true;
        }
        // Without a halt, the run settles when no step is runnable:
        // remaining PENDING steps sit behind a failed ancestor and can
        // never be credited.
        !self
            .statuses
            .values()
            .any(|s| s.state == TaskState::Runnable)
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.statuses.get(id).map(|s| s.state)
    }

    pub fn status_of(&self, id: &str) -> Option<&TaskStatus> {
        self.statuses.get(id)
    }

    pub fn statuses(&self) -> &IndexMap<String, TaskStatus> {
        &self.statuses
    }

    /// First failed step id, in failure order.
    pub fn first_failed(&self) -> Option<&str> {
        self.failed.first().map(|s| s.as_str())
    }

    pub fn failed_steps(&self) -> &[String] {
        &self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.statuses
            .values()
            .all(|s| s.state == TaskState::Success)
    }

    pub fn any_succeeded(&self) -> bool {
        self.statuses
            .values()
            .any(|s| s.state == TaskState::Success)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
