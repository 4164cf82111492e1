// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the mmsd daemon.

use thiserror::Error;

use crate::types::{MessageId, TransactionState};

/// The primary error type used across all mmsd adapter traits and core operations.
#[derive(Debug, Error)]
pub enum MmsdError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors. These are fatal to the engine.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The MMS data context could not be brought up.
    #[error("bearer error: {0}")]
    Bearer(#[from] BearerError),

    /// HTTP exchange with the MMSC failed.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// A PDU could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The MMSC answered with a permanent error status.
    #[error("rejected by MMSC: {status}{}", text.as_deref().map(|t| format!(" ({t})")).unwrap_or_default())]
    Rejected { status: String, text: Option<String> },

    /// No message with this id exists in the store.
    #[error("message not found: {id}")]
    NotFound { id: MessageId },

    /// A message with this id is already stored.
    #[error("message already exists: {id}")]
    AlreadyExists { id: MessageId },

    /// The engine attempted a transition the state machine does not allow.
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: MessageId,
        from: TransactionState,
        to: TransactionState,
    },

    /// A client request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failure to acquire the MMS bearer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BearerError {
    /// The modem has no network registration.
    #[error("no network coverage")]
    NoCoverage,

    /// The modem refused or failed to activate the MMS context.
    #[error("context activation failed: {0}")]
    ContextActivationFailed(String),

    /// Activation did not finish within the configured bound.
    #[error("bearer activation timed out")]
    Timeout,
}

/// Failure of a single HTTP exchange with the MMSC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The MMSC or proxy could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The MMSC answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The MMSC or proxy address is not a usable URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl TransferError {
    /// Whether a later attempt of the same exchange may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Timeout | TransferError::Connect(_) | TransferError::Body(_) => true,
            TransferError::Status(code) => *code >= 500 || *code == 408 || *code == 429,
            TransferError::InvalidUrl(_) => false,
        }
    }
}

impl MmsdError {
    /// Whether this error should stop the daemon rather than a single transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MmsdError::Storage { .. } | MmsdError::Internal(_))
    }
}
