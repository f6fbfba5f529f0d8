// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-state persistence for resume-from-failure.
//!
//! One JSON document per run holds the execution plan (with a sha256
//! content hash), the task-status map, and the run record. `load`
//! refuses a document whose plan no longer matches its recorded hash:
//! resuming against an edited plan would silently skip or re-run the
//! wrong steps.

use crate::error::StorageError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlflow_core::{ExecutionPlan, RunId, RunRecord, TaskStatus};
use std::fs;
use std::path::PathBuf;

/// Everything the scheduler needs to resume a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: RunId,
    pub plan: ExecutionPlan,
    pub statuses: IndexMap<String, TaskStatus>,
    pub record: RunRecord,
}

#[derive(Serialize, Deserialize)]
struct RunStateDoc {
    plan_hash: String,
    #[serde(flatten)]
    state: RunState,
}

/// Directory of per-run state documents.
pub struct RunStateStore {
    root: PathBuf,
}

impl RunStateStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.root.join(format!("{}.json", run_id))
    }

    /// Persist a run's state, replacing any prior document.
    pub fn save(&self, state: &RunState) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        let doc = RunStateDoc {
            plan_hash: plan_hash(&state.plan)?,
            state: state.clone(),
        };
        let path = self.path_for(&state.run_id);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&doc)?)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(run_id = %state.run_id, path = %path.display(), "run state saved");
        Ok(())
    }

    /// Load a run's state, verifying the plan hash.
    pub fn load(&self, run_id: &RunId) -> Result<RunState, StorageError> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Err(StorageError::RunNotFound(run_id.to_string()));
        }
        let doc: RunStateDoc = serde_json::from_str(&fs::read_to_string(&path)?)?;
        let actual = plan_hash(&doc.state.plan)?;
        if actual != doc.plan_hash {
            return Err(StorageError::PlanHashMismatch {
                run_id: run_id.to_string(),
                expected: doc.plan_hash,
                actual,
            });
        }
        Ok(doc.state)
    }

    /// Ids of all persisted runs.
    pub fn run_ids(&self) -> Result<Vec<RunId>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(RunId::new(stem));
                }
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

/// Content hash of a plan's canonical JSON form.
pub fn plan_hash(plan: &ExecutionPlan) -> Result<String, StorageError> {
    let json = serde_json::to_string(plan)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
