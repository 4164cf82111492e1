// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the mmsd MMS daemon.
//!
//! This crate provides the message model, the transaction state machine,
//! error types, and the adapter traits for the modem bearer, the MMSC
//! transfer client, and the message store.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BearerError, MmsdError, TransferError};
pub use types::{
    AdapterType, BearerSettings, ContentPart, Direction, HealthStatus, Message, MessageEvent,
    MessageFilter, MessageHeaders, MessageId, Priority, RetryState, TransactionState,
};

pub use traits::{BearerAdapter, PluginAdapter, StorageAdapter, TransferAdapter};
