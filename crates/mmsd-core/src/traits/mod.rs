// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the daemon's external boundaries.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod bearer;
pub mod storage;
pub mod transfer;

pub use adapter::PluginAdapter;
pub use bearer::BearerAdapter;
pub use storage::StorageAdapter;
pub use transfer::TransferAdapter;
