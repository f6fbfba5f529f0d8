// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `SET` folding and conditional flattening.
//!
//! Walks the pipeline in declaration order. `SET` statements fold their
//! value into the store's `Set` tier as they are encountered, so later
//! conditions and defaults see them. Conditional blocks contribute the
//! steps of their first true branch (recursively flattened), the else
//! branch when nothing matches, or nothing at all.

use crate::error::PlanningError;
use sqlflow_core::{Pipeline, SetStep, Step, Value, VarTier};
use sqlflow_vars::{strip_quotes, ConditionEvaluator, SubstOptions, VariableStore};

/// Flatten conditionals and fold `SET` values into `store`.
///
/// The returned pipeline contains no conditional blocks. `SET` steps are
/// kept (their effect is already folded) and dropped later at emission.
pub fn flatten(pipeline: &Pipeline, store: &mut VariableStore) -> Result<Pipeline, PlanningError> {
    let mut out = Vec::with_capacity(pipeline.steps.len());
    flatten_into(&pipeline.steps, store, &mut out)?;
    Ok(Pipeline::new(out))
}

fn flatten_into(
    steps: &[Step],
    store: &mut VariableStore,
    out: &mut Vec<Step>,
) -> Result<(), PlanningError> {
    for step in steps {
        match step {
            Step::Set(set) => {
                fold_set(set, store)?;
                out.push(step.clone());
            }
            Step::Conditional(block) => {
                let mut matched = false;
                for branch in &block.branches {
                    let evaluator = ConditionEvaluator::new(store);
                    let taken = evaluator.evaluate(&branch.condition).map_err(|source| {
                        PlanningError::Condition {
                            line: branch.line,
                            source,
                        }
                    })?;
                    if taken {
                        tracing::debug!(
                            condition = branch.condition.as_str(),
                            line = branch.line,
                            "condition true, taking branch"
                        );
                        flatten_into(&branch.steps, store, out)?;
                        matched = true;
                        break;
                    }
                    tracing::debug!(
                        condition = branch.condition.as_str(),
                        line = branch.line,
                        "condition false, skipping branch"
                    );
                }
                if !matched {
                    if block.else_branch.is_empty() {
                        tracing::debug!(
                            line = block.line,
                            "no condition matched and no else branch, block contributes nothing"
                        );
                    } else {
                        flatten_into(&block.else_branch, store, out)?;
                    }
                }
            }
            other => out.push(other.clone()),
        }
    }
    Ok(())
}

/// Fold one `SET` into the store's `Set` tier.
///
/// The value text is substituted against the current store first, so
/// `SET x = ${y}` sees earlier definitions and the self-referential
/// `SET x = ${x|default}` resolves to its default (or a higher-tier
/// value) rather than recursing.
fn fold_set(set: &SetStep, store: &mut VariableStore) -> Result<(), PlanningError> {
    let substituted = sqlflow_vars::substitute_text(set.value.trim(), store, SubstOptions::default())?;
    for warning in &substituted.warnings {
        tracing::warn!(
            name = set.name.as_str(),
            line = set.line,
            warning = warning.as_str(),
            "while folding SET value"
        );
    }
    let literal = strip_quotes(substituted.text.trim()).to_string();
    store.set(VarTier::Set, set.name.clone(), Value::from_literal(&literal));
    Ok(())
}

#[cfg(test)]
#[path = "flatten_tests.rs"]
mod tests;
