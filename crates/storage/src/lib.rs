// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sqlflow-storage: durable state for the execution core.
//!
//! Two stores: [`WatermarkStore`] persists incremental-load cursors;
//! [`RunStateStore`] persists the plan, task statuses, and step results
//! of each run so a failed run can resume with its successful steps
//! intact.

pub mod error;
pub mod run;
pub mod watermark;

pub use error::StorageError;
pub use run::{RunState, RunStateStore};
pub use watermark::{normalize_timestamp, WatermarkStore};
