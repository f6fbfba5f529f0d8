// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boolean condition evaluation for conditional pipeline branches.
//!
//! Conditions are substituted first (missing variables become `None`),
//! then parsed and evaluated under a restricted grammar. The final value
//! must be boolean.

mod ast;
mod lexer;
mod parser;

pub use ast::{CmpOp, Expr};

use crate::store::VariableStore;
use crate::subst::{substitute_text, SubstOptions, SubstitutionError};
use sqlflow_core::Value;
use thiserror::Error;

/// Errors raised while evaluating a condition.
#[derive(Debug, Error, PartialEq)]
pub enum EvaluationError {
    #[error("failed to substitute variables in condition: {0}")]
    Substitution(#[from] SubstitutionError),
    #[error("syntax error in condition at byte {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("syntax error in condition: use '==' for equality, not '='. Example: IF ${{var}} == 'value' THEN ...")]
    BareAssignment,
    #[error("unsupported construct in condition: {construct}. Conditions support comparison operators (==, !=, <, >, <=, >=) and logical operators (and, or, not)")]
    Unsupported { construct: String },
    #[error("condition does not evaluate to a boolean, got {rendered}")]
    NonBoolean { rendered: String },
    #[error("cannot compare {left} {op} {right}")]
    Incomparable {
        left: String,
        op: String,
        right: String,
    },
}

/// Evaluates conditional expressions against a variable store.
pub struct ConditionEvaluator<'a> {
    store: &'a VariableStore,
}

impl<'a> ConditionEvaluator<'a> {
    pub fn new(store: &'a VariableStore) -> Self {
        Self { store }
    }

    /// Substitute variables, then evaluate the condition to a boolean.
    pub fn evaluate(&self, condition: &str) -> Result<bool, EvaluationError> {
        let substituted = substitute_text(condition, self.store, SubstOptions::sql())?;
        for warning in &substituted.warnings {
            tracing::warn!(condition, warning = warning.as_str(), "while evaluating condition");
        }
        tracing::debug!(condition, substituted = substituted.text.as_str(), "evaluating");
        evaluate_expression(&substituted.text)
    }
}

/// Evaluate an already-substituted condition string.
pub fn evaluate_expression(text: &str) -> Result<bool, EvaluationError> {
    let tokens = lexer::tokenize(text)?;
    let expr = parser::Parser::parse(tokens)?;
    match eval_node(&expr)? {
        Value::Bool(b) => Ok(b),
        other => Err(EvaluationError::NonBoolean {
            rendered: other.render_bare(),
        }),
    }
}

fn eval_node(expr: &Expr) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        // Unknown identifiers are string literals: after substitution the
        // only bare words left are unquoted strings like `global`.
        Expr::Ident(name) => Ok(Value::Str(name.clone())),
        Expr::Not(operand) => {
            let value = eval_node(operand)?;
            Ok(Value::Bool(!truthy(&value)))
        }
        Expr::And(left, right) => {
            let left = eval_node(left)?;
            if !truthy(&left) {
                return Ok(left);
            }
            eval_node(right)
        }
        Expr::Or(left, right) => {
            let left = eval_node(left)?;
            if truthy(&left) {
                return Ok(left);
            }
            eval_node(right)
        }
        Expr::Compare(left, op, right) => {
            let left = eval_node(left)?;
            let right = eval_node(right)?;
            compare(&left, *op, &right).map(Value::Bool)
        }
        Expr::Sub(left, right) => eval_sub(left, right),
    }
}

/// Binary `-`: two string operands are rejoined with a hyphen to repair
/// unquoted hyphenated words (`us - east` was `us-east`); numerics
/// subtract; anything else is unsupported.
fn eval_sub(left: &Expr, right: &Expr) -> Result<Value, EvaluationError> {
    let left = eval_node(left)?;
    let right = eval_node(right)?;
    match (&left, &right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}-{}", a, b))),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        _ => Err(EvaluationError::Unsupported {
            construct: format!(
                "subtraction between {} and {}",
                left.render_bare(),
                right.render_bare()
            ),
        }),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty(),
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> Result<bool, EvaluationError> {
    // A boolean compared to a string matches case-insensitively against
    // "true"/"false".
    if matches!(op, CmpOp::Eq | CmpOp::Ne) {
        if let Some(result) = bool_string_eq(left, right) {
            return Ok(match op {
                CmpOp::Eq => result,
                _ => !result,
            });
        }
    }

    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(numeric_compare(as_f64(left), op, as_f64(right)))
        }
        (Value::Str(a), Value::Str(b)) => Ok(match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        }),
        (Value::Bool(a), Value::Bool(b)) => match op {
            CmpOp::Eq => Ok(a == b),
            CmpOp::Ne => Ok(a != b),
            _ => Err(incomparable(left, op, right)),
        },
        (Value::Null, Value::Null) => match op {
            CmpOp::Eq => Ok(true),
            CmpOp::Ne => Ok(false),
            _ => Err(incomparable(left, op, right)),
        },
        _ => match op {
            // Mismatched types never compare equal.
            CmpOp::Eq => Ok(false),
            CmpOp::Ne => Ok(true),
            _ => Err(incomparable(left, op, right)),
        },
    }
}

fn bool_string_eq(left: &Value, right: &Value) -> Option<bool> {
    let (b, s) = match (left, right) {
        (Value::Bool(b), Value::Str(s)) => (*b, s),
        (Value::Str(s), Value::Bool(b)) => (*b, s),
        _ => return None,
    };
    let normalized = s.to_ascii_lowercase();
    Some((b && normalized == "true") || (!b && normalized == "false"))
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}

fn numeric_compare(a: f64, op: CmpOp, b: f64) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
    }
}

fn incomparable(left: &Value, op: CmpOp, right: &Value) -> EvaluationError {
    EvaluationError::Incomparable {
        left: left.render_bare(),
        op: op.as_str().to_string(),
        right: right.render_bare(),
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
