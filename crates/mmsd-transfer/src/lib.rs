// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMSC transfer adapter for the mmsd MMS daemon.
//!
//! This crate implements [`TransferAdapter`] over reqwest. Bodies are raw
//! PDU bytes in both directions; routing (proxy, local address) comes from
//! the bearer lease of each call.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use mmsd_config::MmsdConfig;
use mmsd_core::traits::{PluginAdapter, TransferAdapter};
use mmsd_core::{AdapterType, BearerSettings, HealthStatus, MmsdError, TransferError};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::client::{ClientCache, ClientKey, MMS_CONTENT_TYPE};

/// Responses larger than this are refused.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// HTTP client for MMSC exchanges implementing [`TransferAdapter`].
#[derive(Debug)]
pub struct HttpTransfer {
    clients: ClientCache,
}

impl HttpTransfer {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            clients: ClientCache::new(user_agent, timeout),
        }
    }

    /// Builds the adapter from `[transfer]`.
    pub fn from_config(config: &MmsdConfig) -> Self {
        Self::new(
            config.transfer.user_agent.clone(),
            Duration::from_secs(config.transfer.timeout_secs),
        )
    }

    /// Distinct clients built so far, one per proxy/local-address pair.
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_for(&self, url: &str, bearer: &BearerSettings) -> Result<reqwest::Client, TransferError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TransferError::InvalidUrl(url.to_string()));
        }
        self.clients.client(&ClientKey::from_settings(bearer)?)
    }

    async fn read_body(response: reqwest::Response) -> Result<Vec<u8>, TransferError> {
        read_limited(response, MAX_RESPONSE_SIZE).await
    }
}

/// Reads a successful response body of at most `limit` bytes.
async fn read_limited(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransferError> {
    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::Status(status.as_u16()));
    }
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(TransferError::Body("response exceeds size limit".into()));
    }
    // Chunked bodies carry no length up front.
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_reqwest_err)? {
        if body.len() + chunk.len() > limit {
            return Err(TransferError::Body("response exceeds size limit".into()));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Classifies a reqwest failure for the retry policy.
fn map_reqwest_err(e: reqwest::Error) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout
    } else if e.is_builder() {
        TransferError::InvalidUrl(e.to_string())
    } else if e.is_body() || e.is_decode() {
        TransferError::Body(e.to_string())
    } else {
        TransferError::Connect(e.to_string())
    }
}

#[async_trait]
impl PluginAdapter for HttpTransfer {
    fn name(&self) -> &str {
        "http"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transfer
    }

    async fn health_check(&self) -> Result<HealthStatus, MmsdError> {
        // The MMSC is only reachable over an active bearer.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MmsdError> {
        debug!("HTTP transfer shutting down");
        Ok(())
    }
}

#[async_trait]
impl TransferAdapter for HttpTransfer {
    async fn get(&self, url: &str, bearer: &BearerSettings) -> Result<Vec<u8>, TransferError> {
        let client = self.client_for(url, bearer)?;
        debug!(url, "GET from MMSC");
        let response = client.get(url).send().await.map_err(|e| {
            let err = map_reqwest_err(e);
            warn!(url, error = %err, "MMSC GET failed");
            err
        })?;
        let body = Self::read_body(response).await?;
        debug!(url, bytes = body.len(), "MMSC GET complete");
        Ok(body)
    }

    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        bearer: &BearerSettings,
    ) -> Result<Vec<u8>, TransferError> {
        let client = self.client_for(url, bearer)?;
        debug!(url, bytes = body.len(), "POST to MMSC");
        let response = client
            .post(url)
            .header(CONTENT_TYPE, MMS_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let err = map_reqwest_err(e);
                warn!(url, error = %err, "MMSC POST failed");
                err
            })?;
        let body = Self::read_body(response).await?;
        debug!(url, bytes = body.len(), "MMSC POST complete");
        Ok(body)
    }
}
