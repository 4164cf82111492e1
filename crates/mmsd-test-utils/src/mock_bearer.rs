// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock modem bearer for deterministic testing.
//!
//! `MockBearer` implements `BearerAdapter` with a queue of scripted
//! activation failures and counters for assertions.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mmsd_core::{
    AdapterType, BearerAdapter, BearerError, BearerSettings, HealthStatus, MmsdError,
    PluginAdapter,
};

/// MMSC URL the mock context reports.
pub const MOCK_MMSC: &str = "http://mmsc.example/mms";

/// A fake MMS data context.
///
/// Activations succeed with [`MockBearer::settings`] unless a failure was
/// queued with [`MockBearer::fail_next`].
pub struct MockBearer {
    settings: BearerSettings,
    failures: Mutex<VecDeque<BearerError>>,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
}

impl MockBearer {
    pub fn new() -> Self {
        Self::with_settings(BearerSettings {
            mmsc: Some(MOCK_MMSC.to_string()),
            proxy: None,
            local_address: None,
        })
    }

    pub fn with_settings(settings: BearerSettings) -> Self {
        Self {
            settings,
            failures: Mutex::new(VecDeque::new()),
            activations: AtomicUsize::new(0),
            deactivations: AtomicUsize::new(0),
        }
    }

    pub fn settings(&self) -> &BearerSettings {
        &self.settings
    }

    /// Makes the next activation fail with `error`.
    pub fn fail_next(&self, error: BearerError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Activation attempts, successful or not.
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }
}

impl Default for MockBearer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockBearer {
    fn name(&self) -> &str {
        "mock-bearer"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Bearer
    }

    async fn health_check(&self) -> Result<HealthStatus, MmsdError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MmsdError> {
        Ok(())
    }
}

#[async_trait]
impl BearerAdapter for MockBearer {
    async fn activate_context(&self) -> Result<BearerSettings, BearerError> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.settings.clone()),
        }
    }

    async fn deactivate_context(&self) -> Result<(), BearerError> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
