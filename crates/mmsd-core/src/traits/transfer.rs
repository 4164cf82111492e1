// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP exchange with the MMSC.

use async_trait::async_trait;

use crate::error::TransferError;
use crate::traits::adapter::PluginAdapter;
use crate::types::BearerSettings;

/// Moves raw PDU bytes to and from the MMSC over an active bearer.
///
/// Bodies are opaque here; encoding and decoding belong to the codec.
#[async_trait]
pub trait TransferAdapter: PluginAdapter {
    /// Fetches `url` (a notification's content location).
    async fn get(&self, url: &str, bearer: &BearerSettings) -> Result<Vec<u8>, TransferError>;

    /// Submits `body` to `url` and returns the response body.
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        bearer: &BearerSettings,
    ) -> Result<Vec<u8>, TransferError>;
}
