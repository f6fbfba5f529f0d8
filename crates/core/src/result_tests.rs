// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn success_result_computes_duration() {
    let result = StepExecutionResult::success("load_t", StepKind::Load, 1_000, 1_750).with_rows(12);
    assert!(result.is_success());
    assert_eq!(result.duration_ms, 750);
    assert_eq!(result.rows_affected, Some(12));
    assert!(result.error.is_none());
}

#[test]
fn failure_result_carries_structured_error() {
    let error = StepError::new(ErrorKind::ConnectorPermanent, "missing required param: path")
        .with_context("step_id", serde_json::json!("source_users"))
        .with_suggestion("add 'path' to the SOURCE PARAMS block");
    let result =
        StepExecutionResult::failure("source_users", StepKind::SourceDefinition, 5, 9, error);
    assert_eq!(result.status, StepStatus::Failed);
    let err = result.error.unwrap();
    assert_eq!(err.kind, ErrorKind::ConnectorPermanent);
    assert_eq!(err.context["step_id"], "source_users");
    assert_eq!(err.suggested_actions.len(), 1);
}

#[test]
fn lineage_is_recorded() {
    let result = StepExecutionResult::success("transform_adults", StepKind::Transform, 0, 1)
        .with_lineage(vec!["users_tbl".to_string()], Some("adults".to_string()));
    assert_eq!(result.reads, vec!["users_tbl"]);
    assert_eq!(result.writes.as_deref(), Some("adults"));
}

#[test]
fn run_record_serde_roundtrip() {
    let mut record = RunRecord::new(RunId::new("r1"), 100);
    record.status = RunStatus::PartialSuccess;
    record.finished_at_ms = Some(200);
    record
        .step_results
        .push(StepExecutionResult::success("load_t", StepKind::Load, 100, 150));
    let json = serde_json::to_string(&record).unwrap();
    assert!(json.contains("PARTIAL_SUCCESS"));
    let back: RunRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
    assert!(back.step_result("load_t").is_some());
    assert!(back.step_result("load_x").is_none());
}

#[test]
fn error_kind_display_is_snake_case() {
    assert_eq!(ErrorKind::ConnectorTransient.to_string(), "connector_transient");
    assert_eq!(ErrorKind::VariableSubstitution.to_string(), "variable_substitution");
}
