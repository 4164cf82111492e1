// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! reqwest clients keyed by the bearer's routing settings.
//!
//! A client is bound to its proxy and local address at build time, so one
//! client is built and pooled per distinct combination.

use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;
use mmsd_core::{BearerSettings, TransferError};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use tracing::debug;

/// Media type of every MMS request and response body.
pub const MMS_CONTENT_TYPE: &str = "application/vnd.wap.mms-message";

/// Routing that forces a separate client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    /// Proxy URL, already normalized by [`proxy_url`].
    pub proxy: Option<String>,
    pub local_address: Option<IpAddr>,
}

impl ClientKey {
    pub fn from_settings(settings: &BearerSettings) -> Result<Self, TransferError> {
        let proxy = settings
            .proxy
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(proxy_url);
        let local_address = settings
            .local_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| {
                a.parse::<IpAddr>()
                    .map_err(|_| TransferError::InvalidUrl(format!("bad local address `{a}`")))
            })
            .transpose()?;
        Ok(Self {
            proxy,
            local_address,
        })
    }
}

/// `host` and `host:port` become `http://host:port`; port 80 when absent.
pub fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        return proxy.to_string();
    }
    let has_port = proxy
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
    if has_port {
        format!("http://{proxy}")
    } else {
        format!("http://{proxy}:80")
    }
}

/// Pool of clients sharing one user agent and timeout.
#[derive(Debug)]
pub struct ClientCache {
    user_agent: String,
    timeout: Duration,
    clients: DashMap<ClientKey, reqwest::Client>,
}

impl ClientCache {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            timeout,
            clients: DashMap::new(),
        }
    }

    /// Returns the client for `key`, building it on first use.
    pub fn client(&self, key: &ClientKey) -> Result<reqwest::Client, TransferError> {
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }
        let client = self.build(key)?;
        Ok(self
            .clients
            .entry(key.clone())
            .or_insert(client)
            .value()
            .clone())
    }

    /// Number of distinct clients built so far.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn build(&self, key: &ClientKey) -> Result<reqwest::Client, TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.wap.mms-message, */*"),
        );

        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(headers)
            .timeout(self.timeout)
            .local_address(key.local_address);

        builder = match &key.proxy {
            Some(proxy) => builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| TransferError::InvalidUrl(format!("proxy `{proxy}`: {e}")))?,
            ),
            // Only the bearer decides routing; ignore *_PROXY env vars.
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| TransferError::Connect(format!("failed to build HTTP client: {e}")))?;
        debug!(proxy = ?key.proxy, local_address = ?key.local_address, "built MMSC client");
        Ok(client)
    }
}
