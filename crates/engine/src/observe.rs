// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-scoped observability: structured step events, per-kind metrics,
//! and thresholded alerts.
//!
//! Everything here is context-scoped and allocated per run; there is no
//! process-wide registry. All mutation is behind dedicated locks.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlflow_core::{Clock, ErrorKind, StepExecutionResult, StepKind};
use std::sync::Arc;

/// Structured event emitted for each step lifecycle edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    Started {
        step_id: String,
        kind: StepKind,
        at_ms: u64,
    },
    Succeeded {
        step_id: String,
        kind: StepKind,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<u64>,
        /// Resource-usage snapshot (workers in flight, retries, ...).
        #[serde(default)]
        resources: IndexMap<String, f64>,
    },
    Failed {
        step_id: String,
        kind: StepKind,
        duration_ms: u64,
        error_kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        suggested_actions: Vec<String>,
    },
}

/// Alert severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A thresholded alert raised during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub component: String,
    pub message: String,
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediations: Vec<String>,
}

/// Aggregates for one step kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub calls: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub total_rows: u64,
}

impl KindStats {
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        (self.calls - self.failures) as f64 / self.calls as f64
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.calls as f64
    }

    /// Throughput in rows per second across all calls of this kind.
    pub fn rows_per_second(&self) -> f64 {
        if self.total_duration_ms == 0 {
            return 0.0;
        }
        self.total_rows as f64 / (self.total_duration_ms as f64 / 1000.0)
    }
}

/// Per-step-kind metric aggregation, serialized by one lock.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    stats: Mutex<IndexMap<StepKind, KindStats>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &StepExecutionResult) {
        let mut stats = self.stats.lock();
        let entry = stats.entry(result.kind).or_default();
        entry.calls += 1;
        if !result.is_success() {
            entry.failures += 1;
        }
        entry.total_duration_ms += result.duration_ms;
        entry.total_rows += result.rows_affected.unwrap_or(0);
    }

    pub fn stats_for(&self, kind: StepKind) -> KindStats {
        self.stats.lock().get(&kind).copied().unwrap_or_default()
    }

    /// Overall failure rate across every kind (0.0 when nothing ran).
    pub fn overall_failure_rate(&self) -> f64 {
        let stats = self.stats.lock();
        let (calls, failures) = stats
            .values()
            .fold((0u64, 0u64), |(c, f), s| (c + s.calls, f + s.failures));
        if calls == 0 {
            return 0.0;
        }
        failures as f64 / calls as f64
    }

    /// JSON snapshot for run records.
    pub fn snapshot(&self) -> IndexMap<String, serde_json::Value> {
        let stats = self.stats.lock();
        let mut out = IndexMap::new();
        for (kind, s) in stats.iter() {
            out.insert(
                kind.to_string(),
                serde_json::json!({
                    "calls": s.calls,
                    "failures": s.failures,
                    "total_duration_ms": s.total_duration_ms,
                    "total_rows": s.total_rows,
                    "success_rate": s.success_rate(),
                    "avg_duration_ms": s.avg_duration_ms(),
                    "rows_per_second": s.rows_per_second(),
                }),
            );
        }
        out
    }
}

/// Thresholded alerter: flags slow steps and critical failure rates.
#[derive(Debug)]
pub struct Alerter {
    /// Duration budget per step before a `slow_execution` alert.
    pub slow_threshold_ms: u64,
    /// Overall failure-rate budget before `failure_rate_critical`.
    pub failure_rate_threshold: f64,
    alerts: Mutex<Vec<Alert>>,
}

impl Default for Alerter {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 300_000,
            failure_rate_threshold: 0.5,
            alerts: Mutex::new(Vec::new()),
        }
    }
}

impl Alerter {
    pub fn new(slow_threshold_ms: u64, failure_rate_threshold: f64) -> Self {
        Self {
            slow_threshold_ms,
            failure_rate_threshold,
            alerts: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, alert: Alert) {
        tracing::warn!(
            severity = ?alert.severity,
            component = alert.component.as_str(),
            message = alert.message.as_str(),
            "alert raised"
        );
        self.alerts.lock().push(alert);
    }

    pub fn observe(&self, result: &StepExecutionResult, metrics: &MetricsRegistry, at_ms: u64) {
        if result.duration_ms > self.slow_threshold_ms {
            self.push(Alert {
                severity: AlertSeverity::Warning,
                component: "slow_execution".to_string(),
                message: format!(
                    "step {} took {}ms (budget {}ms)",
                    result.step_id, result.duration_ms, self.slow_threshold_ms
                ),
                at_ms,
                remediations: vec![
                    "narrow the step's input with an incremental cursor".to_string(),
                    "raise the duration budget if this volume is expected".to_string(),
                ],
            });
        }
        let rate = metrics.overall_failure_rate();
        if rate > self.failure_rate_threshold {
            self.push(Alert {
                severity: AlertSeverity::Critical,
                component: "failure_rate_critical".to_string(),
                message: format!(
                    "overall failure rate {:.0}% exceeds {:.0}%",
                    rate * 100.0,
                    self.failure_rate_threshold * 100.0
                ),
                at_ms,
                remediations: vec![
                    "inspect the first failed step's error context".to_string(),
                    "check connector credentials and source availability".to_string(),
                ],
            });
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

/// Run-scoped observability front-end: fan-in point for step events.
pub struct Observer {
    clock: Arc<dyn Clock>,
    pub metrics: MetricsRegistry,
    pub alerter: Alerter,
    events: Mutex<Vec<StepEvent>>,
}

impl Observer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            metrics: MetricsRegistry::new(),
            alerter: Alerter::default(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_alerter(clock: Arc<dyn Clock>, alerter: Alerter) -> Self {
        Self {
            clock,
            metrics: MetricsRegistry::new(),
            alerter,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn step_started(&self, step_id: &str, kind: StepKind) {
        let at_ms = self.clock.epoch_ms();
        tracing::info!(step_id, kind = %kind, "step started");
        self.events.lock().push(StepEvent::Started {
            step_id: step_id.to_string(),
            kind,
            at_ms,
        });
    }

    pub fn step_finished(&self, result: &StepExecutionResult, resources: IndexMap<String, f64>) {
        self.metrics.record(result);
        let at_ms = self.clock.epoch_ms();
        let event = if result.is_success() {
            tracing::info!(
                step_id = result.step_id.as_str(),
                elapsed_ms = result.duration_ms,
                rows = result.rows_affected,
                "step succeeded"
            );
            StepEvent::Succeeded {
                step_id: result.step_id.clone(),
                kind: result.kind,
                duration_ms: result.duration_ms,
                rows: result.rows_affected,
                bytes: result.bytes_processed,
                resources,
            }
        } else {
            let (error_kind, message, suggested_actions) = match &result.error {
                Some(error) => (
                    error.kind,
                    error.message.clone(),
                    error.suggested_actions.clone(),
                ),
                None => (ErrorKind::StepExecution, "unknown error".to_string(), vec![]),
            };
            tracing::error!(
                step_id = result.step_id.as_str(),
                elapsed_ms = result.duration_ms,
                error = message.as_str(),
                "step failed"
            );
            StepEvent::Failed {
                step_id: result.step_id.clone(),
                kind: result.kind,
                duration_ms: result.duration_ms,
                error_kind,
                message,
                suggested_actions,
            }
        };
        self.events.lock().push(event);
        self.alerter.observe(result, &self.metrics, at_ms);
    }

    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
#[path = "observe_tests.rs"]
mod tests;
