// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warn-only SQL sanity checks.
//!
//! These findings never block plan emission; the engine is the final
//! authority on SQL validity.

use regex::Regex;
use std::sync::LazyLock;

// Allow expect here as the regex patterns are compile-time verified to be valid
#[allow(clippy::expect_used)]
static SELECT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bselect\b").expect("constant regex pattern is valid"));
#[allow(clippy::expect_used)]
static DANGLING_FROM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfrom\s*$|\bfrom\s+where\b").expect("constant regex pattern is valid")
});

/// Check one SQL text, returning human-readable findings.
pub fn check_sql(sql: &str) -> Vec<String> {
    let lowered = sql.to_lowercase();
    let mut findings = Vec::new();

    let open = lowered.matches('(').count();
    let close = lowered.matches(')').count();
    if open != close {
        findings.push(format!(
            "unmatched parentheses: {} opening vs {} closing",
            open, close
        ));
    }

    if !SELECT_PATTERN.is_match(&lowered) {
        findings.push("query does not contain a SELECT keyword".to_string());
    }

    if DANGLING_FROM_PATTERN.is_match(lowered.trim_end()) {
        findings.push("FROM clause appears to be incomplete".to_string());
    }

    if lowered.matches('\'').count() % 2 != 0 {
        findings.push("unclosed single-quoted string literal".to_string());
    }
    if lowered.matches('"').count() % 2 != 0 {
        findings.push("unclosed double-quoted string literal".to_string());
    }

    let trimmed = lowered.trim_end();
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    let statements = body.split(';').filter(|s| !s.trim().is_empty()).count();
    if statements > 1 {
        findings.push(format!(
            "contains {} SQL statements; ensure this is intentional",
            statements
        ));
    }

    findings
}
