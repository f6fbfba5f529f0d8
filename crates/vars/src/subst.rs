// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable substitution over text and nested configuration values.
//!
//! Two modes: [`SubstMode::General`] injects resolved values verbatim
//! (connector params, destination URIs); [`SubstMode::Sql`] formats for
//! text handed to the SQL engine or the condition evaluator, where the
//! surrounding quote context decides whether a string value gets wrapped
//! in single quotes.

use crate::reference::{scan_references, ScanOutcome, VariableRef};
use crate::store::VariableStore;
use parking_lot::Mutex;
use sqlflow_core::{looks_like_sql_expression, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Substitution failures. Only raised for strict-mode misses, invalid
/// defaults, and unsafe bare-context values; malformed reference syntax
/// warns instead (see [`crate::reference`]).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("variable '{name}' is not defined and has no default")]
    MissingVariable { name: String },
    #[error("invalid default in {reference}: unquoted defaults must not contain whitespace")]
    InvalidDefault { reference: String },
    #[error("value of '{name}' contains SQL metacharacters and cannot be injected bare: {value}")]
    UnsafeValue { name: String, value: String },
}

/// Formatting mode for resolved values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstMode {
    /// Inject values verbatim.
    #[default]
    General,
    /// Format for SQL / condition-evaluator text (context-sensitive quoting).
    Sql,
}

/// Options controlling one substitution pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstOptions {
    pub mode: SubstMode,
    /// When set, an unresolvable reference raises instead of becoming the
    /// literal `None`.
    pub strict: bool,
}

impl SubstOptions {
    pub fn sql() -> Self {
        Self {
            mode: SubstMode::Sql,
            strict: false,
        }
    }

    pub fn strict() -> Self {
        Self {
            mode: SubstMode::General,
            strict: true,
        }
    }
}

/// Output of a substitution pass: the rewritten text plus any warnings
/// from malformed references.
#[derive(Debug, Clone, PartialEq)]
pub struct Substituted {
    pub text: String,
    pub warnings: Vec<String>,
}

/// Substitute every reference in `text` against `store`.
///
/// Fast path: text without `${` is returned unchanged.
pub fn substitute_text(
    text: &str,
    store: &VariableStore,
    opts: SubstOptions,
) -> Result<Substituted, SubstitutionError> {
    if !text.contains("${") {
        return Ok(Substituted {
            text: text.to_string(),
            warnings: Vec::new(),
        });
    }
    let outcome = scan_references(text);
    apply(text, &outcome, store, opts)
}

fn apply(
    text: &str,
    outcome: &ScanOutcome,
    store: &VariableStore,
    opts: SubstOptions,
) -> Result<Substituted, SubstitutionError> {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0usize;
    for reference in &outcome.refs {
        out.push_str(&text[last_end..reference.span.0]);
        out.push_str(&resolve_reference(reference, text, store, opts)?);
        last_end = reference.span.1;
    }
    out.push_str(&text[last_end..]);
    Ok(Substituted {
        text: out,
        warnings: outcome.warnings.clone(),
    })
}

fn resolve_reference(
    reference: &VariableRef,
    text: &str,
    store: &VariableStore,
    opts: SubstOptions,
) -> Result<String, SubstitutionError> {
    if let Some(value) = store.get(&reference.name) {
        return format_value(value, reference, opts);
    }
    if reference.default.is_some() {
        if reference.has_invalid_default() {
            return Err(SubstitutionError::InvalidDefault {
                reference: reference.raw(text).to_string(),
            });
        }
        let literal = reference.default_literal().unwrap_or_default();
        return format_value(&Value::from_literal(literal), reference, opts);
    }
    if opts.strict {
        return Err(SubstitutionError::MissingVariable {
            name: reference.name.clone(),
        });
    }
    Ok("None".to_string())
}

fn format_value(
    value: &Value,
    reference: &VariableRef,
    opts: SubstOptions,
) -> Result<String, SubstitutionError> {
    match opts.mode {
        SubstMode::General => Ok(value.render_bare()),
        SubstMode::Sql => format_for_sql(value, reference),
    }
}

/// Context-sensitive SQL formatting: raw inside quoted literals, typed
/// rendering outside them.
fn format_for_sql(value: &Value, reference: &VariableRef) -> Result<String, SubstitutionError> {
    if reference.context.is_quoted() {
        return Ok(value.render_bare());
    }
    let s = match value {
        Value::Str(s) => s,
        other => return Ok(other.render_bare()),
    };
    if s.eq_ignore_ascii_case("true") {
        return Ok("True".to_string());
    }
    if s.eq_ignore_ascii_case("false") {
        return Ok("False".to_string());
    }
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return Ok(s.clone());
    }
    if looks_like_sql_expression(s) {
        return Ok(s.clone());
    }
    if s.contains(';') || s.contains("--") || s.contains("/*") {
        return Err(SubstitutionError::UnsafeValue {
            name: reference.name.clone(),
            value: s.clone(),
        });
    }
    Ok(format!("'{}'", s))
}

/// Recursively substitute inside a JSON-shaped configuration value.
///
/// String leaves are substituted with [`SubstMode::General`] semantics;
/// all other leaves keep their original type. The input is never mutated;
/// a new value is returned.
pub fn substitute_in_value(
    value: &serde_json::Value,
    store: &VariableStore,
    opts: SubstOptions,
) -> Result<serde_json::Value, SubstitutionError> {
    match value {
        serde_json::Value::String(s) => {
            let substituted = substitute_text(s, store, opts)?;
            for warning in &substituted.warnings {
                tracing::warn!(warning = warning.as_str(), "while substituting container value");
            }
            Ok(serde_json::Value::String(substituted.text))
        }
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                out.insert(key.clone(), substitute_in_value(inner, store, opts)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for inner in items {
                out.push(substitute_in_value(inner, store, opts)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

/// Substitution front-end with a per-template scan cache, for texts that
/// are substituted repeatedly within one run.
#[derive(Debug, Default)]
pub struct Substituter {
    cache: Mutex<HashMap<String, Arc<ScanOutcome>>>,
}

impl Substituter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Substitute with the compiled reference list cached by input text.
    pub fn substitute(
        &self,
        text: &str,
        store: &VariableStore,
        opts: SubstOptions,
    ) -> Result<Substituted, SubstitutionError> {
        if !text.contains("${") {
            return Ok(Substituted {
                text: text.to_string(),
                warnings: Vec::new(),
            });
        }
        let outcome = {
            let mut cache = self.cache.lock();
            match cache.get(text) {
                Some(outcome) => Arc::clone(outcome),
                None => {
                    let outcome = Arc::new(scan_references(text));
                    cache.insert(text.to_string(), Arc::clone(&outcome));
                    outcome
                }
            }
        };
        apply(text, &outcome, store, opts)
    }
}

#[cfg(test)]
#[path = "subst_tests.rs"]
mod tests;
