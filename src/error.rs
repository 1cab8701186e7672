//! Unified error model for the browsing engine.
//! Every remote failure is converted into an `AppError` at the reconciler boundary so the
//! caller always receives a displayable message; nothing is swallowed.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Local rule violation; never reaches the remote store.
    Validation { code: String, message: String },
    /// Opaque message returned by the remote store, surfaced verbatim.
    Remote { code: String, message: String },
    /// A save loop stopped after some rows were already written.
    PartialBatch { code: String, message: String, applied: usize, failed: usize, remaining: usize },
    NotFound { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::Remote { code, .. }
            | AppError::PartialBatch { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::Remote { message, .. }
            | AppError::PartialBatch { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn remote(msg: impl Into<String>) -> Self { AppError::Remote { code: "remote_error".into(), message: msg.into() } }
    pub fn not_found(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn internal(code: impl Into<String>, msg: impl Into<String>) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    pub fn partial_batch(message: impl Into<String>, applied: usize, remaining: usize) -> Self {
        AppError::PartialBatch { code: "partial_batch".into(), message: message.into(), applied, failed: 1, remaining }
    }

    /// True for errors raised before any remote call was made.
    pub fn is_local(&self) -> bool { matches!(self, AppError::Validation { .. } | AppError::NotFound { .. }) }

    /// Short line suitable for a status banner.
    pub fn banner(&self) -> String {
        match self {
            AppError::PartialBatch { message, applied, remaining, .. } => {
                format!("saved {} row(s), then failed: {} ({} row(s) still pending)", applied, message, remaining)
            }
            other => other.message().to_string(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Remote store internals report through anyhow; treat as an opaque remote message
        AppError::Remote { code: "remote_error".into(), message: format!("{:#}", err) }
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        AppError::Remote { code: "remote_error".into(), message: crate::remote::postgres::format_db_error(&err) }
    }
}

impl From<crate::remote::StoreError> for AppError {
    fn from(err: crate::remote::StoreError) -> Self {
        match err {
            crate::remote::StoreError::UnknownConnection(id) => {
                AppError::NotFound { code: "unknown_connection".into(), message: format!("connection not found: {}", id) }
            }
            other => AppError::Remote { code: "remote_error".into(), message: other.to_string() },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
