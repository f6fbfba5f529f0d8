//! Planning specs: ordering, conditionals, cycles, boundaries.

use crate::prelude::*;
use sqlflow_core::{LoadMode, Value, VarTier};
use sqlflow_plan::{Planner, PlanningError};
use sqlflow_vars::VariableStore;

#[test]
fn linear_pipeline_plans_in_dependency_order() {
    let pipeline = pipeline(vec![
        source("users", "u.csv", 1),
        load("users_tbl", "users", LoadMode::Replace, &[], 2),
        transform("adults", "SELECT * FROM users_tbl WHERE age >= 18", 3),
        export_query("SELECT * FROM adults", "out.csv", 4),
    ]);
    let mut vars = VariableStore::new();
    let outcome = Planner::new().plan(&pipeline, &mut vars).unwrap();

    assert_eq!(
        outcome.plan.ids(),
        vec![
            "source_users",
            "load_users_tbl",
            "transform_adults",
            "export_csv_adults"
        ]
    );
    let deps: Vec<(&str, Vec<String>)> = outcome
        .plan
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.depends_on.clone()))
        .collect();
    assert_eq!(
        deps,
        vec![
            ("source_users", vec![]),
            ("load_users_tbl", vec!["source_users".to_string()]),
            ("transform_adults", vec!["load_users_tbl".to_string()]),
            ("export_csv_adults", vec!["transform_adults".to_string()]),
        ]
    );
}

#[test]
fn conditional_with_default_takes_else_branch() {
    let pipeline = conditional_region_pipeline();
    let mut vars = VariableStore::new();
    let outcome = Planner::new().plan(&pipeline, &mut vars).unwrap();
    let t = outcome.plan.get("transform_t").unwrap();
    assert_eq!(t.sql_text(), Some("SELECT 2 x"));
}

#[test]
fn conditional_with_cli_override_takes_then_branch() {
    let pipeline = conditional_region_pipeline();
    let mut vars = VariableStore::new();
    vars.set(VarTier::Cli, "target_region", Value::from("us-east"));
    let outcome = Planner::new().plan(&pipeline, &mut vars).unwrap();
    let t = outcome.plan.get("transform_t").unwrap();
    assert_eq!(t.sql_text(), Some("SELECT 1 x"));
}

fn conditional_region_pipeline() -> sqlflow_core::Pipeline {
    pipeline(vec![
        set("target_region", "${target_region|global}", 1),
        if_else(
            "${target_region} == 'us-east'",
            vec![transform("t", "SELECT 1 x", 3)],
            vec![transform("t", "SELECT 2 x", 5)],
            2,
        ),
        export_query("SELECT * FROM t", "t.csv", 7),
    ])
}

#[test]
fn cycles_are_rejected_with_readable_paths() {
    let pipeline = pipeline(vec![
        transform("a", "SELECT * FROM b", 1),
        transform("b", "SELECT * FROM a", 2),
    ]);
    let mut vars = VariableStore::new();
    let err = Planner::new().plan(&pipeline, &mut vars).unwrap_err();
    assert!(err
        .to_string()
        .contains("Cycle 1: CREATE TABLE a → CREATE TABLE b → CREATE TABLE a"));
}

#[test]
fn empty_pipeline_plans_empty() {
    let mut vars = VariableStore::new();
    let outcome = Planner::new()
        .plan(&sqlflow_core::Pipeline::default(), &mut vars)
        .unwrap();
    assert!(outcome.plan.is_empty());
}

#[test]
fn set_only_pipeline_plans_empty() {
    let mut vars = VariableStore::new();
    let outcome = Planner::new()
        .plan(&pipeline(vec![set("a", "1", 1), set("b", "'x'", 2)]), &mut vars)
        .unwrap();
    assert!(outcome.plan.is_empty());
    assert_eq!(vars.get("a"), Some(&Value::Int(1)));
    assert_eq!(vars.get("b"), Some(&Value::from("x")));
}

#[test]
fn self_referential_set_resolves_to_its_default() {
    let mut vars = VariableStore::new();
    Planner::new()
        .plan(
            &pipeline(vec![set("region", "${region|fallback}", 1)]),
            &mut vars,
        )
        .unwrap();
    assert_eq!(vars.get("region"), Some(&Value::from("fallback")));
}

#[test]
fn undefined_table_reference_warns_but_plans() {
    let pipeline = pipeline(vec![transform("t", "SELECT * FROM warehouse_managed", 1)]);
    let mut vars = VariableStore::new();
    let outcome = Planner::new().plan(&pipeline, &mut vars).unwrap();
    assert_eq!(outcome.plan.len(), 1);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.message.contains("warehouse_managed")));
}

#[test]
fn missing_variables_fail_planning_with_locations() {
    let pipeline = pipeline(vec![transform("t", "SELECT ${limit}", 9)]);
    let mut vars = VariableStore::new();
    let err = Planner::new().plan(&pipeline, &mut vars).unwrap_err();
    assert!(matches!(err, PlanningError::MissingVariables { .. }));
    let message = err.to_string();
    assert!(message.contains("${limit}"));
    assert!(message.contains("line 9"));
}

#[test]
fn duplicate_target_tables_fail_planning() {
    let pipeline = pipeline(vec![
        transform("t", "SELECT 1 x", 1),
        transform("t", "SELECT 2 x", 2),
    ]);
    let mut vars = VariableStore::new();
    let err = Planner::new().plan(&pipeline, &mut vars).unwrap_err();
    assert!(matches!(err, PlanningError::DuplicateTable { .. }));
}

#[test]
fn plans_round_trip_through_json() {
    let pipeline = pipeline(vec![
        source("users", "u.csv", 1),
        load("users_tbl", "users", LoadMode::Upsert, &["id"], 2),
        transform("adults", "SELECT * FROM users_tbl", 3),
    ]);
    let mut vars = VariableStore::new();
    let outcome = Planner::new().plan(&pipeline, &mut vars).unwrap();
    let json = outcome.plan.to_json().unwrap();
    let reloaded = sqlflow_core::ExecutionPlan::from_json(&json).unwrap();
    assert_eq!(reloaded, outcome.plan);
    // Array order is execution order.
    assert_eq!(reloaded.ids(), outcome.plan.ids());
}
