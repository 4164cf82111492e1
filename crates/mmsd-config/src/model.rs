// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the mmsd daemon.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is
//! reported at startup instead of silently ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level mmsd configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with `MMSD_*`
/// environment overrides. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MmsdConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Message store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Carrier MMSC and modem settings.
    #[serde(default)]
    pub carrier: CarrierConfig,

    /// Data context activation settings.
    #[serde(default)]
    pub bearer: BearerConfig,

    /// HTTP exchange with the MMSC.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Transaction engine: retries, expiry and housekeeping.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Limits applied to client send requests.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl MmsdConfig {
    /// Resolved database location: `storage.database_path`, or `mmsd.db`
    /// inside `daemon.mms_dir`.
    pub fn database_path(&self) -> PathBuf {
        match &self.storage.database_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.daemon.mms_dir).join("mmsd.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the daemon's state.
    #[serde(default = "default_mms_dir")]
    pub mms_dir: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            mms_dir: default_mms_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mms_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("mmsd"))
        .unwrap_or_else(|| PathBuf::from(".mms"))
        .to_string_lossy()
        .into_owned()
}

/// Message store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file. Defaults to `<mms_dir>/mmsd.db`.
    #[serde(default)]
    pub database_path: Option<String>,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Terminal messages older than this many days are deleted.
    /// `None` keeps them forever.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            wal_mode: default_wal_mode(),
            retention_days: None,
        }
    }
}

fn default_wal_mode() -> bool {
    true
}

/// Carrier MMSC and modem identity.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarrierConfig {
    /// MMSC URL, e.g. `http://mms.example.net/mms/wapenc`.
    #[serde(default)]
    pub mmsc: Option<String>,

    /// HTTP proxy for MMSC traffic, `host:port` or a full URL.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Access point name of the MMS data context.
    #[serde(default)]
    pub apn: Option<String>,

    /// The modem's own number, used as the sender address.
    #[serde(default)]
    pub modem_number: Option<String>,

    /// Local address to bind MMSC connections to.
    #[serde(default)]
    pub local_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BearerConfig {
    /// Upper bound on a single context activation.
    #[serde(default = "default_activation_timeout_secs")]
    pub activation_timeout_secs: u64,

    /// Keep the context up this long after the last lease is released.
    #[serde(default)]
    pub linger_secs: u64,
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            activation_timeout_secs: default_activation_timeout_secs(),
            linger_secs: 0,
        }
    }
}

fn default_activation_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    /// Timeout for one HTTP exchange with the MMSC.
    #[serde(default = "default_transfer_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent to the MMSC.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_transfer_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_transfer_timeout_secs() -> u64 {
    120
}

fn default_user_agent() -> String {
    format!("mmsd/{}", env!("CARGO_PKG_VERSION"))
}

/// Transaction engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Attempts per message before it fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// POST a Delivery-Ind after retrieving a message whose sender asked
    /// for a delivery report.
    #[serde(default)]
    pub send_delivery_reports: bool,

    /// MMS version written into outgoing PDUs, `major.minor`.
    #[serde(default = "default_mms_version")]
    pub mms_version: String,

    /// Expiry of outbound messages, and of inbound notifications without one.
    #[serde(default = "default_expiry_secs")]
    pub default_expiry_secs: u64,

    /// Interval between retention sweeps.
    #[serde(default = "default_retention_sweep_secs")]
    pub retention_sweep_secs: u64,

    /// How long shutdown waits for in-flight transactions.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            send_delivery_reports: false,
            mms_version: default_mms_version(),
            default_expiry_secs: default_expiry_secs(),
            retention_sweep_secs: default_retention_sweep_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_secs() -> u64 {
    10
}

fn default_max_backoff_secs() -> u64 {
    600
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_mms_version() -> String {
    "1.2".to_string()
}

fn default_expiry_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_retention_sweep_secs() -> u64 {
    3600
}

fn default_drain_timeout_secs() -> u64 {
    10
}

/// Limits on client send requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,

    /// Upper bound on the summed size of all attachments, in bytes.
    #[serde(default = "default_total_max_attachment_size")]
    pub total_max_attachment_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attachments: default_max_attachments(),
            total_max_attachment_size: default_total_max_attachment_size(),
        }
    }
}

fn default_max_attachments() -> usize {
    25
}

fn default_total_max_attachment_size() -> usize {
    1_100_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_falls_back_to_mms_dir() {
        let mut config = MmsdConfig::default();
        config.daemon.mms_dir = "/var/lib/mmsd".into();
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/mmsd/mmsd.db"));

        config.storage.database_path = Some("/tmp/x.db".into());
        assert_eq!(config.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.max_attempts, 5);
        assert_eq!(engine.mms_version, "1.2");
        assert!(!engine.send_delivery_reports);
        assert_eq!(engine.default_expiry_secs, 604_800);
    }

    #[test]
    fn carrier_section_deserializes() {
        let config: MmsdConfig = toml::from_str(
            r#"
[carrier]
mmsc = "http://mms.example.net/mms/wapenc"
proxy = "10.0.0.1:8080"
modem_number = "+15551234567"
"#,
        )
        .unwrap();
        assert_eq!(
            config.carrier.mmsc.as_deref(),
            Some("http://mms.example.net/mms/wapenc")
        );
        assert_eq!(config.carrier.proxy.as_deref(), Some("10.0.0.1:8080"));
        assert!(config.carrier.apn.is_none());
    }
}
