// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modem boundary for the MMS data context.

use async_trait::async_trait;

use crate::error::BearerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::BearerSettings;

/// Activates and deactivates the modem's MMS context.
///
/// Implementations do no reference counting; callers go through the
/// engine's `BearerController`, which guarantees at most one activation
/// in flight and a deactivation only after the last lease is gone.
#[async_trait]
pub trait BearerAdapter: PluginAdapter {
    /// Brings the MMS context up and reports how to reach the MMSC through it.
    async fn activate_context(&self) -> Result<BearerSettings, BearerError>;

    /// Tears the MMS context down.
    async fn deactivate_context(&self) -> Result<(), BearerError>;
}
