// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::MmsdConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(s: &str) -> bool {
    let s = s.trim();
    (s.starts_with("http://") || s.starts_with("https://")) && s.len() > "https://".len()
}

fn is_version(s: &str) -> bool {
    match s.split_once('.') {
        Some((major, minor)) => {
            major.parse::<u8>().is_ok_and(|m| (1..=7).contains(&m))
                && minor.parse::<u8>().is_ok_and(|m| m <= 15)
        }
        None => false,
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of stopping at the first.
pub fn validate_config(config: &MmsdConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.daemon.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "daemon.log_level `{}` is not one of {}",
            config.daemon.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.daemon.mms_dir.trim().is_empty() {
        fail("daemon.mms_dir must not be empty".to_string());
    }

    if let Some(path) = &config.storage.database_path
        && path.trim().is_empty()
    {
        fail("storage.database_path must not be empty when set".to_string());
    }

    if config.storage.retention_days == Some(0) {
        fail("storage.retention_days must be at least 1".to_string());
    }

    if let Some(mmsc) = &config.carrier.mmsc
        && !is_http_url(mmsc)
    {
        fail(format!("carrier.mmsc `{mmsc}` is not an http(s) URL"));
    }

    if let Some(addr) = &config.carrier.local_address
        && addr.trim().parse::<std::net::IpAddr>().is_err()
    {
        fail(format!("carrier.local_address `{addr}` is not an IP address"));
    }

    if config.bearer.activation_timeout_secs == 0 {
        fail("bearer.activation_timeout_secs must be at least 1".to_string());
    }

    if config.transfer.timeout_secs == 0 {
        fail("transfer.timeout_secs must be at least 1".to_string());
    }

    let engine = &config.engine;
    if engine.max_attempts == 0 {
        fail("engine.max_attempts must be at least 1".to_string());
    }
    if engine.initial_backoff_secs > engine.max_backoff_secs {
        fail(format!(
            "engine.initial_backoff_secs ({}) exceeds engine.max_backoff_secs ({})",
            engine.initial_backoff_secs, engine.max_backoff_secs
        ));
    }
    if !engine.backoff_multiplier.is_finite() || engine.backoff_multiplier < 1.0 {
        fail(format!(
            "engine.backoff_multiplier must be a finite number >= 1.0, got {}",
            engine.backoff_multiplier
        ));
    }
    if !is_version(&engine.mms_version) {
        fail(format!(
            "engine.mms_version `{}` is not of the form major.minor",
            engine.mms_version
        ));
    }
    if engine.default_expiry_secs == 0 {
        fail("engine.default_expiry_secs must be at least 1".to_string());
    }
    if engine.retention_sweep_secs == 0 {
        fail("engine.retention_sweep_secs must be at least 1".to_string());
    }

    if config.service.max_attachments == 0 {
        fail("service.max_attachments must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
