//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid object key format (expected 8 characters from the key alphabet)
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid library identifier
    #[error("Invalid library id: {0}")]
    InvalidLibraryId(String),

    /// Invalid idempotency key (empty or oversized)
    #[error("Invalid old id: {0}")]
    InvalidOldId(String),

    /// Unknown sync status string
    #[error("Unknown sync status: {0}")]
    UnknownStatus(String),

    /// Unknown sync direction string
    #[error("Unknown sync direction: {0}")]
    UnknownDirection(String),

    /// Unknown object kind string
    #[error("Unknown object kind: {0}")]
    UnknownKind(String),

    /// Invalid state transition attempt
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status
        from: String,
        /// The attempted target status
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
