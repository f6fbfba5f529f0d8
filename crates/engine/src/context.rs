// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution context: the immutable snapshot handed to step handlers.
//!
//! Everything a handler touches hangs off this struct; there is no
//! process-global state. The run id is the logical scope: metrics,
//! alerts, and source definitions all live and die with the run.

use crate::observe::Observer;
use indexmap::IndexMap;
use parking_lot::Mutex;
use sqlflow_connectors::{ConnectorRegistry, SqlEngine};
use sqlflow_core::{Clock, RunId, SystemClock};
use sqlflow_storage::WatermarkStore;
use sqlflow_vars::{Substituter, VariableStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal.
///
/// A child token trips when either it or its parent is cancelled; the
/// runner hands each step a child of the run-level token so a step
/// timeout cancels that step only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also observes this token's state.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }
}

/// Serialized handle to the shared SQL engine.
///
/// The engine is shared by every step handler; by default all access is
/// serialized through this lock. `session` holds the lock across a
/// multi-statement operation (an upsert's delete+insert); `statement`
/// scopes it to one closure call.
pub struct EngineHandle {
    engine: Mutex<Box<dyn SqlEngine>>,
}

impl EngineHandle {
    pub fn new(engine: Box<dyn SqlEngine>) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }

    /// Run a closure holding the engine lock for its whole duration.
    pub fn session<R>(&self, f: impl FnOnce(&mut dyn SqlEngine) -> R) -> R {
        let mut guard = self.engine.lock();
        f(guard.as_mut())
    }

    /// Alias of [`EngineHandle::session`] for single statements; named
    /// separately so call sites document their locking intent.
    pub fn statement<R>(&self, f: impl FnOnce(&mut dyn SqlEngine) -> R) -> R {
        self.session(f)
    }
}

/// A normalized source definition stored by a `source_definition` step
/// and consumed by later loads.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub name: String,
    pub connector_type: String,
    pub params: IndexMap<String, serde_json::Value>,
}

/// Immutable snapshot passed to every step handler.
///
/// Cheap to clone: all fields are shared handles. The variable store is
/// read-only during execution; `SET` folding happened at planning time.
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    /// Pipeline name, used to scope watermark keys.
    pub pipeline: String,
    pub variables: Arc<VariableStore>,
    pub registry: Arc<ConnectorRegistry>,
    pub engine: Arc<EngineHandle>,
    pub watermarks: Arc<WatermarkStore>,
    pub observer: Arc<Observer>,
    pub substituter: Arc<Substituter>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancelToken,
    /// Source definitions registered by executed `source_definition`
    /// steps. The one piece of shared mutable state handlers touch
    /// outside the SQL engine, guarded by its own lock.
    pub sources: Arc<Mutex<IndexMap<String, SourceRecord>>>,
}

impl ExecutionContext {
    pub fn builder(pipeline: impl Into<String>, engine: Box<dyn SqlEngine>) -> ContextBuilder {
        ContextBuilder::new(pipeline, engine)
    }

    /// Register a source definition (called by the source handler).
    pub fn store_source(&self, record: SourceRecord) {
        self.sources.lock().insert(record.name.clone(), record);
    }

    /// Look up a registered source definition.
    pub fn source(&self, name: &str) -> Option<SourceRecord> {
        self.sources.lock().get(name).cloned()
    }
}

/// Builder for [`ExecutionContext`].
pub struct ContextBuilder {
    pipeline: String,
    engine: Box<dyn SqlEngine>,
    run_id: Option<RunId>,
    variables: Option<Arc<VariableStore>>,
    registry: Option<Arc<ConnectorRegistry>>,
    watermarks: Option<Arc<WatermarkStore>>,
    observer: Option<Arc<Observer>>,
    clock: Option<Arc<dyn Clock>>,
    cancel: Option<CancelToken>,
}

impl ContextBuilder {
    pub fn new(pipeline: impl Into<String>, engine: Box<dyn SqlEngine>) -> Self {
        Self {
            pipeline: pipeline.into(),
            engine,
            run_id: None,
            variables: None,
            registry: None,
            watermarks: None,
            observer: None,
            clock: None,
            cancel: None,
        }
    }

    pub fn run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn variables(mut self, store: VariableStore) -> Self {
        self.variables = Some(Arc::new(store));
        self
    }

    pub fn registry(mut self, registry: ConnectorRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn watermarks(mut self, store: WatermarkStore) -> Self {
        self.watermarks = Some(Arc::new(store));
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> ExecutionContext {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(Observer::new(Arc::clone(&clock))));
        ExecutionContext {
            run_id: self.run_id.unwrap_or_else(RunId::generate),
            pipeline: self.pipeline,
            variables: self.variables.unwrap_or_default(),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ConnectorRegistry::new())),
            engine: Arc::new(EngineHandle::new(self.engine)),
            watermarks: self
                .watermarks
                .unwrap_or_else(|| Arc::new(WatermarkStore::open("sqlflow_watermarks.json"))),
            observer,
            substituter: Arc::new(Substituter::new()),
            clock,
            cancel: self.cancel.unwrap_or_default(),
            sources: Arc::new(Mutex::new(IndexMap::new())),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
