// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the pushdown core
//!
//! Driver failures are mapped to `FdwError::RemoteCall`, carrying the
//! driver's diagnostic text and the operation that was being attempted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all planning and execution operations
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FdwError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{operation}: {diagnostics}")]
    RemoteCall {
        operation: String,
        diagnostics: String,
    },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("Operation not implemented: {operation}")]
    Unimplemented { operation: String },

    #[error("Invalid input syntax for type {type_name}: {message}")]
    InvalidData { type_name: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FdwError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    pub fn remote_call(operation: impl Into<String>, err: DriverError) -> Self {
        Self::RemoteCall {
            operation: operation.into(),
            diagnostics: err.to_string(),
        }
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn unimplemented(operation: impl Into<String>) -> Self {
        Self::Unimplemented {
            operation: operation.into(),
        }
    }

    pub fn invalid_data(type_name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidData {
            type_name: type_name.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }
}

/// Result type alias for core operations
pub type FdwResult<T> = Result<T, FdwError>;

/// Diagnostic record reported by a remote driver call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", format_diagnostic(.sqlstate.as_deref(), .message))]
pub struct DriverError {
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            message: message.into(),
        }
    }

    pub fn with_state(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: Some(sqlstate.into()),
            message: message.into(),
        }
    }
}

fn format_diagnostic(sqlstate: Option<&str>, message: &str) -> String {
    match sqlstate {
        Some(state) => format!("{}:{}", state, message),
        None => message.to_string(),
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
