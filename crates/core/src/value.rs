// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed variable values and source tiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// A variable value: scalar content carried through substitution.
///
/// String values may hold an already-formatted SQL fragment (a quoted
/// comma list or a function call); [`looks_like_sql_expression`] detects
/// those so substitution does not re-quote them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Parse a bare string into the most specific value kind.
    ///
    /// `"true"`/`"false"` (any case) become booleans, digit runs become
    /// integers, everything else stays a string.
    pub fn from_literal(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            "null" | "none" => return Value::Null,
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if s.contains('.') {
                return Value::Float(f);
            }
        }
        Value::Str(s.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render for a bare SQL/condition context: booleans as `True`/`False`,
    /// null as `None`, numerics bare, strings as-is (quoting is the
    /// substitution engine's concern).
    pub fn render_bare(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    /// Convert from a JSON value. Arrays and objects render through their
    /// compact JSON text since variables are scalar.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_bare())
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from_json(&json))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Returns true if a string value is already a formatted SQL expression:
/// a comma-separated quoted list (`'a','b'`) or a call (`ident(...)`).
/// Such values are injected without additional quoting.
pub fn looks_like_sql_expression(value: &str) -> bool {
    let value = value.trim();
    if value.contains(',') && (value.contains('\'') || value.contains('"')) {
        return true;
    }
    value.contains('(') && value.ends_with(')')
}

/// Source tier of a variable. Higher tiers win on conflict; precedence is
/// fixed as `CLI > SET > profile > environment > default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarTier {
    Cli,
    Set,
    Profile,
    Env,
    Default,
}

impl VarTier {
    /// All tiers, highest precedence first.
    pub const ALL: [VarTier; 5] = [
        VarTier::Cli,
        VarTier::Set,
        VarTier::Profile,
        VarTier::Env,
        VarTier::Default,
    ];
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
