// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connector registry: kind → factory lookup.
//!
//! The registry is read-only during a run; a fresh connector instance is
//! created per step so no connector state is shared across workers.

use crate::connector::Connector;
use crate::csv::CsvConnector;
use crate::error::ConnectorError;
use indexmap::IndexMap;

/// Creates a fresh, unconfigured connector instance.
pub type ConnectorFactory = fn() -> Box<dyn Connector>;

/// Registry of connector factories keyed by upper-cased kind.
pub struct ConnectorRegistry {
    factories: IndexMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Registry with the built-in connectors (CSV).
    pub fn new() -> Self {
        let mut registry = Self {
            factories: IndexMap::new(),
        };
        registry.register("CSV", || Box::new(CsvConnector::new()));
        registry
    }

    /// Empty registry, for embedders that supply every connector.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register (or replace) a factory for a connector kind.
    pub fn register(&mut self, kind: &str, factory: ConnectorFactory) {
        self.factories.insert(kind.to_uppercase(), factory);
    }

    /// Create a fresh instance for a kind.
    pub fn create(&self, kind: &str) -> Result<Box<dyn Connector>, ConnectorError> {
        self.factories
            .get(&kind.to_uppercase())
            .map(|factory| factory())
            .ok_or_else(|| ConnectorError::UnknownConnector {
                kind: kind.to_string(),
            })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(&kind.to_uppercase())
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
