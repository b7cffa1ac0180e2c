// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Scribe write engine.

use std::time::Duration;

use strum::Display;
use thiserror::Error;

/// Boxed error returned by write operations and middleware phases.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The middleware phase in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

/// The primary error type returned by every Scribe operation.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// The caller's write operation failed. Displays exactly as the inner error.
    #[error(transparent)]
    Operation(BoxError),

    /// A middleware phase failed before the write operation could run.
    #[error("middleware `{name}` failed during {phase}: {source}")]
    Middleware {
        name: String,
        phase: Phase,
        source: BoxError,
    },

    /// Beginning or committing the write transaction failed.
    #[error("transaction {stage} failed: {source}")]
    Transaction {
        stage: &'static str,
        source: BoxError,
    },

    /// Storage backend errors (opening a store, read queries, closing).
    #[error("storage error: {source}")]
    Storage { source: BoxError },

    /// Invalid configuration or registration request.
    #[error("configuration error: {0}")]
    Config(String),

    /// No store with the requested name is open.
    #[error("store not found: {name}")]
    StoreNotFound { name: String },

    /// No write middleware is registered under the requested name.
    #[error("write middleware not found: {name}")]
    MiddlewareNotFound { name: String },

    /// The store's writer can no longer accept or execute tasks.
    #[error("writer for store `{store}` is unavailable: {reason}")]
    WriterUnavailable { store: String, reason: String },

    /// The caller stopped waiting for its write. The task itself keeps running.
    #[error("write timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScribeError {
    /// Wrap any error produced by a caller-supplied write operation.
    pub fn operation(err: impl Into<BoxError>) -> Self {
        ScribeError::Operation(err.into())
    }

    /// Returns true for the failures the caller's own operation produced.
    pub fn is_operation(&self) -> bool {
        matches!(self, ScribeError::Operation(_))
    }

    /// Returns true for failures that are raised before any task is enqueued.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScribeError::Config(_)
                | ScribeError::StoreNotFound { .. }
                | ScribeError::MiddlewareNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_error_displays_inner_message() {
        let err = ScribeError::operation("deliberate");
        assert_eq!(err.to_string(), "deliberate");
        assert!(err.is_operation());
    }

    #[test]
    fn middleware_error_names_phase() {
        let err = ScribeError::Middleware {
            name: "audit".into(),
            phase: Phase::Before,
            source: "lock held".into(),
        };
        assert_eq!(
            err.to_string(),
            "middleware `audit` failed during before: lock held"
        );
    }

    #[test]
    fn configuration_failures_are_classified() {
        assert!(ScribeError::Config("bad".into()).is_configuration());
        assert!(
            ScribeError::StoreNotFound {
                name: "nope".into()
            }
            .is_configuration()
        );
        assert!(
            !ScribeError::WriterUnavailable {
                store: "main".into(),
                reason: "closed".into()
            }
            .is_configuration()
        );
    }
}
