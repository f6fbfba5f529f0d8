// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sqlflow-core: shared data model for the SQLFlow execution core

pub mod clock;
pub mod id;
pub mod pipeline;
pub mod plan;
pub mod result;
pub mod status;
pub mod value;

pub use clock::{Clock, FakeClock, SystemClock};
pub use id::{RunId, StepId};
pub use pipeline::{
    ConditionalBlock, ConditionalBranch, ExportStep, LoadMode, LoadStep, Pipeline, SetStep,
    SourceDefinition, Step, SyncMode, TransformStep,
};
pub use plan::{ExecutionPlan, PlanStep, StepKind};
pub use result::{
    ColumnSchema, ErrorKind, RunRecord, RunStatus, StepError, StepExecutionResult, StepStatus,
};
pub use status::{IllegalTransition, TaskState, TaskStatus};
pub use value::{looks_like_sql_expression, Value, VarTier};
