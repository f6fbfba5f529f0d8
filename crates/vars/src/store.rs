// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority-ordered variable store.
//!
//! Five tiers, highest precedence first: CLI overrides, pipeline `SET`
//! statements, profile file, process environment, in-pipeline defaults.
//! The store is frozen (read-only) for the duration of a run; `SET`
//! folding happens during planning, before execution starts.

use indexmap::IndexMap;
use sqlflow_core::{Value, VarTier};

/// Tiered name→value store with fixed precedence.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    tiers: [IndexMap<String, Value>; VarTier::ALL.len()],
}

fn tier_index(tier: VarTier) -> usize {
    match tier {
        VarTier::Cli => 0,
        VarTier::Set => 1,
        VarTier::Profile => 2,
        VarTier::Env => 3,
        VarTier::Default => 4,
    }
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable in one tier, replacing any prior value in that tier.
    pub fn set(&mut self, tier: VarTier, name: impl Into<String>, value: Value) {
        self.tiers[tier_index(tier)].insert(name.into(), value);
    }

    /// Bulk-insert into one tier.
    pub fn set_many<I, K>(&mut self, tier: VarTier, entries: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        for (name, value) in entries {
            self.set(tier, name, value);
        }
    }

    /// Resolve a name through the tiers, highest precedence first.
    pub fn resolve(&self, name: &str) -> Option<(&Value, VarTier)> {
        for tier in VarTier::ALL {
            if let Some(value) = self.tiers[tier_index(tier)].get(name) {
                return Some((value, tier));
            }
        }
        None
    }

    /// Resolved value for a name, if defined in any tier.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.resolve(name).map(|(value, _)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Flatten to a single map with precedence applied.
    pub fn effective(&self) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        // Walk lowest tier first so higher tiers overwrite.
        for tier in VarTier::ALL.iter().rev() {
            for (name, value) in &self.tiers[tier_index(*tier)] {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }

    /// Fill the environment tier from the process environment.
    ///
    /// With a prefix (`SQLFLOW_`), only matching variables are taken and
    /// the prefix is stripped from the name; without one, every
    /// environment variable is visible at `Env` precedence.
    pub fn populate_env(&mut self, prefix: Option<&str>) {
        for (name, value) in std::env::vars() {
            let name = match prefix {
                Some(prefix) => match name.strip_prefix(prefix) {
                    Some(stripped) => stripped.to_string(),
                    None => continue,
                },
                None => name,
            };
            self.set(VarTier::Env, name, Value::from_literal(&value));
        }
    }

    /// Names defined in a specific tier, in insertion order.
    pub fn names_in(&self, tier: VarTier) -> Vec<&str> {
        self.tiers[tier_index(tier)].keys().map(|k| k.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|t| t.is_empty())
    }
}

/// Parse command-line variable overrides.
///
/// Accepts either a JSON object (`{"region": "us-east", "limit": 10}`) or
/// the compact `k=v,k=v` form. Values in the compact form are parsed as
/// literals (`true`, `42`, bare strings).
pub fn parse_cli_overrides(input: &str) -> Result<IndexMap<String, Value>, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(IndexMap::new());
    }
    if trimmed.starts_with('{') {
        let json: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| format!("invalid JSON variable overrides: {}", e))?;
        let map = json
            .as_object()
            .ok_or_else(|| "variable overrides must be a JSON object".to_string())?;
        return Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect());
    }
    let mut out = IndexMap::new();
    for pair in trimmed.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected k=v in variable override, got '{}'", pair))?;
        out.insert(name.trim().to_string(), Value::from_literal(value.trim()));
    }
    Ok(out)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
