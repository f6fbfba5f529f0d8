// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sqlflow_core::{FakeClock, StepError, StepExecutionResult};

fn success(id: &str, kind: StepKind, duration_ms: u64, rows: u64) -> StepExecutionResult {
    StepExecutionResult::success(id, kind, 0, duration_ms).with_rows(rows)
}

fn failure(id: &str, kind: StepKind) -> StepExecutionResult {
    StepExecutionResult::failure(
        id,
        kind,
        0,
        10,
        StepError::new(ErrorKind::Database, "boom").with_suggestion("check the table"),
    )
}

#[test]
fn metrics_aggregate_per_kind() {
    let registry = MetricsRegistry::new();
    registry.record(&success("load_a", StepKind::Load, 100, 50));
    registry.record(&success("load_b", StepKind::Load, 300, 150));
    registry.record(&failure("transform_t", StepKind::Transform));

    let load = registry.stats_for(StepKind::Load);
    assert_eq!(load.calls, 2);
    assert_eq!(load.failures, 0);
    assert_eq!(load.total_duration_ms, 400);
    assert_eq!(load.total_rows, 200);
    assert_eq!(load.success_rate(), 1.0);
    assert_eq!(load.avg_duration_ms(), 200.0);
    assert_eq!(load.rows_per_second(), 500.0);

    let transform = registry.stats_for(StepKind::Transform);
    assert_eq!(transform.calls, 1);
    assert_eq!(transform.failures, 1);
    assert_eq!(transform.success_rate(), 0.0);
}

#[test]
fn overall_failure_rate_spans_kinds() {
    let registry = MetricsRegistry::new();
    registry.record(&success("load_a", StepKind::Load, 10, 1));
    registry.record(&failure("transform_t", StepKind::Transform));
    assert_eq!(registry.overall_failure_rate(), 0.5);
}

#[test]
fn empty_registry_rates_are_zero() {
    let registry = MetricsRegistry::new();
    assert_eq!(registry.overall_failure_rate(), 0.0);
    let stats = registry.stats_for(StepKind::Export);
    assert_eq!(stats.success_rate(), 0.0);
    assert_eq!(stats.avg_duration_ms(), 0.0);
    assert_eq!(stats.rows_per_second(), 0.0);
}

#[test]
fn snapshot_contains_derived_fields() {
    let registry = MetricsRegistry::new();
    registry.record(&success("load_a", StepKind::Load, 100, 50));
    let snapshot = registry.snapshot();
    let load = &snapshot["load"];
    assert_eq!(load["calls"], 1);
    assert_eq!(load["success_rate"], 1.0);
    assert_eq!(load["rows_per_second"], 500.0);
}

#[test]
fn observer_records_event_sequence() {
    let clock = Arc::new(FakeClock::at(5_000));
    let observer = Observer::new(clock.clone());
    observer.step_started("load_a", StepKind::Load);
    clock.advance_ms(100);
    observer.step_finished(&success("load_a", StepKind::Load, 100, 5), IndexMap::new());

    let events = observer.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        StepEvent::Started { step_id, at_ms: 5_000, .. } if step_id == "load_a"
    ));
    assert!(matches!(
        &events[1],
        StepEvent::Succeeded { step_id, rows: Some(5), .. } if step_id == "load_a"
    ));
}

#[test]
fn failed_event_carries_error_and_suggestions() {
    let observer = Observer::new(Arc::new(FakeClock::new()));
    observer.step_finished(&failure("transform_t", StepKind::Transform), IndexMap::new());
    let events = observer.events();
    match &events[0] {
        StepEvent::Failed {
            error_kind,
            message,
            suggested_actions,
            ..
        } => {
            assert_eq!(*error_kind, ErrorKind::Database);
            assert_eq!(message, "boom");
            assert_eq!(suggested_actions.len(), 1);
        }
        other => panic!("expected failed event, got {other:?}"),
    }
}

#[test]
fn slow_execution_alert_fires_over_budget() {
    let clock = Arc::new(FakeClock::new());
    let observer = Observer::with_alerter(clock, Alerter::new(50, 1.1));
    observer.step_finished(&success("load_a", StepKind::Load, 100, 1), IndexMap::new());
    let alerts = observer.alerter.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].component, "slow_execution");
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
    assert!(!alerts[0].remediations.is_empty());
}

#[test]
fn failure_rate_critical_alert() {
    let clock = Arc::new(FakeClock::new());
    let observer = Observer::with_alerter(clock, Alerter::new(u64::MAX, 0.4));
    observer.step_finished(&failure("transform_t", StepKind::Transform), IndexMap::new());
    let alerts = observer.alerter.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].component, "failure_rate_critical");
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
}

#[test]
fn no_alerts_within_budgets() {
    let clock = Arc::new(FakeClock::new());
    let observer = Observer::with_alerter(clock, Alerter::new(1_000, 0.9));
    observer.step_finished(&success("load_a", StepKind::Load, 100, 1), IndexMap::new());
    assert!(observer.alerter.alerts().is_empty());
}
