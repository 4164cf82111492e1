// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy `./mmsd.toml` > `~/.config/mmsd/mmsd.toml` >
//! `/etc/mmsd/mmsd.toml`, with environment overrides via the `MMSD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MmsdConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/mmsd/mmsd.toml";
pub(crate) const LOCAL_CONFIG: &str = "mmsd.toml";

/// Sections recognised in `MMSD_<SECTION>_<KEY>` variables.
const SECTIONS: &[&str] = &[
    "daemon", "storage", "carrier", "bearer", "transfer", "engine", "service",
];

pub(crate) fn user_config() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("mmsd/mmsd.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mmsd/mmsd.toml`
/// 3. `~/.config/mmsd/mmsd.toml`
/// 4. `./mmsd.toml`
/// 5. `MMSD_*` environment variables
pub fn load_config() -> Result<MmsdConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MmsdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MmsdConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MmsdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MmsdConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MmsdConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Maps `MMSD_ENGINE_MAX_ATTEMPTS` to `engine.max_attempts`.
///
/// Only the section prefix is split off; keys keep their underscores.
fn env_provider() -> Env {
    Env::prefixed("MMSD_").map(|key| env_key_to_path(key.as_str()).into())
}

pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
