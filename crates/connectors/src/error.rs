// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connector error taxonomy

use thiserror::Error;

/// Errors raised by connectors.
///
/// Transient kinds (timeouts, connection resets, deadlocks) are retry
/// candidates; everything else propagates immediately.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connector timeout: {0}")]
    Timeout(String),
    #[error("connection reset: {0}")]
    ConnectionReset(String),
    #[error("deadlock detected: {0}")]
    Deadlock(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required parameter '{param}'")]
    MissingParam { param: String },
    #[error("invalid parameter '{param}': {message}")]
    InvalidParam { param: String, message: String },
    #[error("parse error in {object}: {message}")]
    Parse { object: String, message: String },
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("unknown connector type: {kind}")]
    UnknownConnector { kind: String },
    #[error("operation not supported by this connector: {0}")]
    Unsupported(String),
}

impl ConnectorError {
    /// Whether a bounded retry may recover this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::Timeout(_)
                | ConnectorError::ConnectionReset(_)
                | ConnectorError::Deadlock(_)
        )
    }
}
