// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${name|default}` reference scanning.
//!
//! A reference is `${` NAME (`|` DEFAULT)? `}` where NAME is an
//! identifier with surrounding whitespace tolerated and DEFAULT is any
//! run of characters excluding braces. Malformed references never fail a
//! scan: the literal text stays in place and a warning is recorded.

use regex::Regex;
use std::sync::LazyLock;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("constant regex pattern is valid")
});

/// Surrounding quote state of a reference inside SQL or condition text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteContext {
    Bare,
    SingleQuoted,
    DoubleQuoted,
}

impl QuoteContext {
    pub fn is_quoted(self) -> bool {
        self != QuoteContext::Bare
    }
}

/// One parsed reference occurrence within a text blob.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub name: String,
    /// Raw default text after `|`, trimmed, quotes not yet stripped.
    pub default: Option<String>,
    /// Byte span `[start, end)` of the whole `${...}` occurrence.
    pub span: (usize, usize),
    pub context: QuoteContext,
}

impl VariableRef {
    /// Default value with surrounding matching quotes stripped.
    pub fn default_literal(&self) -> Option<&str> {
        self.default.as_deref().map(strip_quotes)
    }

    /// An unquoted default containing whitespace is invalid.
    pub fn has_invalid_default(&self) -> bool {
        match &self.default {
            Some(default) => {
                default.chars().any(char::is_whitespace) && strip_quotes(default) == default
            }
            None => false,
        }
    }

    /// The literal `${...}` text of this reference.
    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        &text[self.span.0..self.span.1]
    }
}

/// Result of scanning a text blob for references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    pub refs: Vec<VariableRef>,
    pub warnings: Vec<String>,
}

impl ScanOutcome {
    pub fn has_refs(&self) -> bool {
        !self.refs.is_empty()
    }
}

/// Strip one layer of matching single or double quotes.
pub fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Quote state at byte position `pos`, from a left-to-right scan with
/// backslash-escape awareness.
pub fn quote_context_at(text: &str, pos: usize) -> QuoteContext {
    let mut in_single = false;
    let mut in_double = false;
    let mut prev: Option<char> = None;
    for (i, c) in text.char_indices() {
        if i >= pos {
            break;
        }
        let escaped = prev == Some('\\');
        match c {
            '\'' if !in_double && !escaped => in_single = !in_single,
            '"' if !in_single && !escaped => in_double = !in_double,
            _ => {}
        }
        prev = Some(c);
    }
    if in_single {
        QuoteContext::SingleQuoted
    } else if in_double {
        QuoteContext::DoubleQuoted
    } else {
        QuoteContext::Bare
    }
}

/// Scan a text blob for `${...}` references.
///
/// Fast path: text without `${` returns an empty outcome without
/// allocating.
pub fn scan_references(text: &str) -> ScanOutcome {
    if !text.contains("${") {
        return ScanOutcome::default();
    }

    let mut outcome = ScanOutcome::default();
    let mut search_from = 0usize;
    while let Some(rel) = text[search_from..].find("${") {
        let start = search_from + rel;
        let body_start = start + 2;
        let Some(close_rel) = text[body_start..].find('}') else {
            let warning = format!("unclosed variable reference starting at byte {}", start);
            tracing::warn!(start, "unclosed variable reference left as literal text");
            outcome.warnings.push(warning);
            break;
        };
        let end = body_start + close_rel + 1;
        let inner = &text[body_start..end - 1];

        // A nested `${` inside the body means the outer open was malformed.
        if let Some(nested) = inner.find("${") {
            let warning = format!("malformed variable reference at byte {}: nested '${{'", start);
            tracing::warn!(start, "malformed variable reference left as literal text");
            outcome.warnings.push(warning);
            search_from = body_start + nested;
            continue;
        }

        let (name_part, default) = match inner.split_once('|') {
            Some((name, default)) => (name, Some(default.trim().to_string())),
            None => (inner, None),
        };
        let name = name_part.trim();

        if name.is_empty() || !NAME_PATTERN.is_match(name) {
            let warning = format!(
                "invalid variable name in reference '{}' at byte {}",
                &text[start..end],
                start
            );
            tracing::warn!(start, reference = &text[start..end], "invalid variable name");
            outcome.warnings.push(warning);
            search_from = end;
            continue;
        }

        outcome.refs.push(VariableRef {
            name: name.to_string(),
            default,
            span: (start, end),
            context: quote_context_at(text, start),
        });
        search_from = end;
    }
    outcome
}

#[cfg(test)]
#[path = "reference_tests.rs"]
mod tests;
