// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `source_definition` handler.
//!
//! Validates connector params, stores the normalized definition in the
//! context, and probes the source with a light read. The probe is
//! advisory: an unreachable remote degrades to a warning because a
//! definition is not data.

use super::{check_cancel, connector_error, query_object, StepOutput};
use crate::context::{CancelToken, ExecutionContext, SourceRecord};
use indexmap::IndexMap;
use sqlflow_core::{ErrorKind, PlanStep, StepError};

pub(crate) fn handle(
    step: &PlanStep,
    ctx: &ExecutionContext,
    cancel: &CancelToken,
) -> Result<StepOutput, StepError> {
    check_cancel(cancel)?;

    let name = step.name.clone().ok_or_else(|| {
        StepError::new(ErrorKind::StepExecution, "source definition has no name")
    })?;
    let connector_type = step
        .source_connector_type
        .clone()
        .unwrap_or_else(|| "CSV".to_string());
    let params: IndexMap<String, serde_json::Value> = query_object(step)
        .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let mut connector = ctx
        .registry
        .create(&connector_type)
        .map_err(connector_error)?;

    let config_errors = connector.configure(&params);
    if !config_errors.is_empty() {
        let mut error = StepError::new(
            ErrorKind::ConnectorPermanent,
            format!(
                "invalid SOURCE parameters for '{}': {}",
                name,
                config_errors.join("; ")
            ),
        );
        for message in &config_errors {
            error = error.with_suggestion(format!("fix: {}", message));
        }
        return Err(error);
    }

    // Definition is valid: store it regardless of what the probe finds.
    ctx.store_source(SourceRecord {
        name: name.clone(),
        connector_type: connector_type.clone(),
        params: params.clone(),
    });

    check_cancel(cancel)?;

    let object = params
        .get("path")
        .and_then(|v| v.as_str())
        .unwrap_or(name.as_str())
        .to_string();
    let mut output = StepOutput::default();
    match connector.read(&object) {
        Ok(mut chunks) => {
            if let Some(Err(probe_error)) = chunks.next() {
                output.warnings.push(format!(
                    "source '{}' defined, but probe read failed: {}",
                    name, probe_error
                ));
            }
        }
        Err(probe_error) => {
            tracing::warn!(
                source = name.as_str(),
                error = %probe_error,
                "source probe failed; definition stored anyway"
            );
            output.warnings.push(format!(
                "source '{}' defined, but probe read failed: {}",
                name, probe_error
            ));
        }
    }
    Ok(output)
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
