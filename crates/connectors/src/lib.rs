// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sqlflow-connectors: contracts for external data sources and the SQL
//! engine, plus the CSV connector.
//!
//! The executor talks to the outside world only through [`Connector`]
//! and [`SqlEngine`]; concrete Postgres/S3/REST bodies live elsewhere
//! and register through the [`ConnectorRegistry`].

pub mod chunk;
pub mod connector;
pub mod csv;
pub mod engine;
pub mod error;
pub mod registry;

pub use chunk::{DataChunk, Frame};
pub use connector::{ChunkIter, Connector};
pub use csv::CsvConnector;
pub use engine::{EngineError, EngineResult, ScalarUdf, SqlEngine};
pub use error::ConnectorError;
pub use registry::{ConnectorFactory, ConnectorRegistry};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryEngine;
