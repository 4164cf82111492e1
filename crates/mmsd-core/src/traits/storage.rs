// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for message persistence backends.

use async_trait::async_trait;

use crate::error::MmsdError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Message, MessageFilter, MessageId};

/// Durable message store.
///
/// Every write is atomic per message: a reader (or a restarted daemon)
/// sees either the previous snapshot of a message or the new one.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), MmsdError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), MmsdError>;

    /// Inserts a new message. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, msg: &Message) -> Result<(), MmsdError>;

    /// Inserts or replaces a message snapshot.
    async fn put(&self, msg: &Message) -> Result<(), MmsdError>;

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, MmsdError>;

    /// Lists matching messages, oldest first.
    async fn list(&self, filter: &MessageFilter) -> Result<Vec<Message>, MmsdError>;

    /// Removes a message and its parts. Returns whether it existed.
    async fn delete(&self, id: &MessageId) -> Result<bool, MmsdError>;
}
