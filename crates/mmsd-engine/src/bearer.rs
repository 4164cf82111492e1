// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference-counted access to the modem's MMS data context.
//!
//! The first [`BearerController::acquire`] activates the context; later
//! acquirers join it. Concurrent first acquirers queue behind one activation
//! gate, so the adapter sees at most one activation in flight. The context
//! is deactivated once the last [`BearerLease`] is gone (after the optional
//! linger period).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use mmsd_config::model::{BearerConfig, CarrierConfig};
use mmsd_core::{
    AdapterType, BearerAdapter, BearerError, BearerSettings, HealthStatus, MmsdError,
    PluginAdapter,
};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct State {
    settings: Option<BearerSettings>,
    holders: usize,
    /// Bumped on every change, so a stale deactivation can tell it lost.
    generation: u64,
}

struct Shared {
    adapter: Arc<dyn BearerAdapter>,
    activation_timeout: Duration,
    linger: Duration,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<State>,
    activations: AtomicU64,
    deactivations: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        // The state is plain counters; a panicked holder leaves nothing half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Joins an active context, if there is one.
    fn join(&self) -> Option<BearerSettings> {
        let mut state = self.state();
        let settings = state.settings.clone()?;
        state.holders += 1;
        state.generation += 1;
        crate::metrics::set_active_leases(state.holders);
        Some(settings)
    }

    /// Drops one holder. Returns the generation to deactivate at when idle.
    fn leave(&self) -> Option<u64> {
        let mut state = self.state();
        if state.holders == 0 {
            warn!("bearer release without a matching acquire");
            return None;
        }
        state.holders -= 1;
        crate::metrics::set_active_leases(state.holders);
        if state.holders > 0 {
            return None;
        }
        state.generation += 1;
        Some(state.generation)
    }

    /// Deactivates if nobody acquired the context since `generation`.
    async fn deactivate_if_idle(&self, generation: u64) {
        let _gate = self.gate.lock().await;
        {
            let mut state = self.state();
            if state.generation != generation || state.holders > 0 || state.settings.is_none() {
                return;
            }
            state.settings = None;
        }
        self.deactivate().await;
    }

    async fn deactivate(&self) {
        match self.adapter.deactivate_context().await {
            Ok(()) => debug!("MMS context deactivated"),
            Err(e) => warn!(error = %e, "MMS context deactivation failed"),
        }
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    /// Schedules deactivation for an idle context, honouring the linger.
    fn schedule_deactivation(self: &Arc<Self>, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime to deactivate the MMS context on");
            return;
        };
        let shared = Arc::clone(self);
        handle.spawn(async move {
            if !shared.linger.is_zero() {
                tokio::time::sleep(shared.linger).await;
            }
            shared.deactivate_if_idle(generation).await;
        });
    }
}

/// Serializes and reference-counts use of a [`BearerAdapter`].
#[derive(Clone)]
pub struct BearerController {
    shared: Arc<Shared>,
}

impl BearerController {
    pub fn new(
        adapter: Arc<dyn BearerAdapter>,
        activation_timeout: Duration,
        linger: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                adapter,
                activation_timeout,
                linger,
                gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(State::default()),
                activations: AtomicU64::new(0),
                deactivations: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(adapter: Arc<dyn BearerAdapter>, config: &BearerConfig) -> Self {
        Self::new(
            adapter,
            Duration::from_secs(config.activation_timeout_secs),
            Duration::from_secs(config.linger_secs),
        )
    }

    /// Takes a lease on the MMS context, activating it if needed.
    ///
    /// Bounded by the activation timeout, including time spent queued
    /// behind another activation.
    pub async fn acquire(&self) -> Result<BearerLease, BearerError> {
        let settings = tokio::time::timeout(self.shared.activation_timeout, self.join_or_activate())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.shared.activation_timeout, "bearer activation timed out");
                BearerError::Timeout
            })??;
        Ok(BearerLease {
            shared: Arc::clone(&self.shared),
            settings,
            released: false,
        })
    }

    async fn join_or_activate(&self) -> Result<BearerSettings, BearerError> {
        if let Some(settings) = self.shared.join() {
            return Ok(settings);
        }

        let _gate = self.shared.gate.lock().await;
        // Someone may have activated while we queued.
        if let Some(settings) = self.shared.join() {
            return Ok(settings);
        }

        debug!("activating MMS context");
        let mut pending = PendingActivation {
            shared: Arc::clone(&self.shared),
            armed: true,
        };
        let result = self.shared.adapter.activate_context().await;
        pending.armed = false;
        let settings = result?;
        self.shared.activations.fetch_add(1, Ordering::SeqCst);
        info!(mmsc = ?settings.mmsc, proxy = ?settings.proxy, "MMS context active");

        let mut state = self.shared.state();
        state.settings = Some(settings.clone());
        state.holders += 1;
        state.generation += 1;
        crate::metrics::set_active_leases(state.holders);
        Ok(settings)
    }

    /// Returns a lease. With no linger, an idle context is torn down before
    /// this returns.
    pub async fn release(&self, mut lease: BearerLease) {
        lease.released = true;
        if let Some(generation) = self.shared.leave() {
            if self.shared.linger.is_zero() {
                self.shared.deactivate_if_idle(generation).await;
            } else {
                self.shared.schedule_deactivation(generation);
            }
        }
    }

    /// Tears down an idle context immediately, skipping any linger.
    pub async fn shutdown(&self) {
        let _gate = self.shared.gate.lock().await;
        let active = {
            let mut state = self.shared.state();
            if state.holders == 0 && state.settings.is_some() {
                state.settings = None;
                state.generation += 1;
                true
            } else {
                false
            }
        };
        if active {
            self.shared.deactivate().await;
        }
    }

    /// Leases currently held.
    pub fn holders(&self) -> usize {
        self.shared.state().holders
    }

    /// Successful context activations so far.
    pub fn activations(&self) -> u64 {
        self.shared.activations.load(Ordering::SeqCst)
    }

    /// Context deactivations so far.
    pub fn deactivations(&self) -> u64 {
        self.shared.deactivations.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.shared.state().settings.is_some()
    }
}

/// A claim on the active MMS context.
///
/// Released exactly once: through [`BearerController::release`], or on drop
/// when the holder is cancelled.
pub struct BearerLease {
    shared: Arc<Shared>,
    settings: BearerSettings,
    released: bool,
}

impl BearerLease {
    pub fn settings(&self) -> &BearerSettings {
        &self.settings
    }
}

impl std::fmt::Debug for BearerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerLease")
            .field("settings", &self.settings)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for BearerLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(generation) = self.shared.leave() {
            self.shared.schedule_deactivation(generation);
        }
    }
}

/// Tears the context down if an activation is abandoned mid-flight, since
/// the modem may still complete it.
struct PendingActivation {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for PendingActivation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime to clean up an abandoned MMS context activation on");
            return;
        };
        let shared = Arc::clone(&self.shared);
        handle.spawn(async move {
            let _gate = shared.gate.lock().await;
            if shared.state().settings.is_some() {
                return;
            }
            debug!("deactivating abandoned MMS context activation");
            shared.deactivate().await;
        });
    }
}

/// A bearer whose MMS context is always up, such as a device with a
/// dedicated MMS APN or Wi-Fi calling.
#[derive(Debug, Clone, Default)]
pub struct StaticBearer {
    settings: BearerSettings,
}

impl StaticBearer {
    pub fn new(settings: BearerSettings) -> Self {
        Self { settings }
    }

    /// Reports the `[carrier]` MMSC, proxy and local address.
    pub fn from_config(carrier: &CarrierConfig) -> Self {
        Self::new(BearerSettings {
            mmsc: carrier.mmsc.clone(),
            proxy: carrier.proxy.clone(),
            local_address: carrier.local_address.clone(),
        })
    }
}

#[async_trait]
impl PluginAdapter for StaticBearer {
    fn name(&self) -> &str {
        "static"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Bearer
    }

    async fn health_check(&self) -> Result<HealthStatus, MmsdError> {
        if self.settings.mmsc.is_some() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded("no MMSC configured".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), MmsdError> {
        Ok(())
    }
}

#[async_trait]
impl BearerAdapter for StaticBearer {
    async fn activate_context(&self) -> Result<BearerSettings, BearerError> {
        Ok(self.settings.clone())
    }

    async fn deactivate_context(&self) -> Result<(), BearerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts calls and can be told to fail or stall.
    #[derive(Default)]
    struct CountingBearer {
        activations: AtomicUsize,
        deactivations: AtomicUsize,
        delay: Duration,
        fail: Option<BearerError>,
    }

    #[async_trait]
    impl PluginAdapter for CountingBearer {
        fn name(&self) -> &str {
            "counting"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 0)
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
    impl BearerAdapter for CountingBearer {
        async fn activate_context(&self) -> Result<BearerSettings, BearerError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.fail {
                Some(e) => Err(e.clone()),
                None => Ok(BearerSettings {
                    mmsc: Some("http://mmsc.example/mms".into()),
                    ..Default::default()
                }),
            }
        }

        async fn deactivate_context(&self) -> Result<(), BearerError> {
            self.deactivations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller(adapter: Arc<CountingBearer>, linger: Duration) -> BearerController {
        BearerController::new(adapter, Duration::from_secs(5), linger)
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_activation() {
        let adapter = Arc::new(CountingBearer {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let ctl = controller(adapter.clone(), Duration::ZERO);

        let leases = futures_join(&ctl, 8).await;
        assert_eq!(ctl.holders(), 8);
        assert_eq!(ctl.activations(), 1);
        assert_eq!(adapter.activations.load(Ordering::SeqCst), 1);

        for lease in leases {
            ctl.release(lease).await;
        }
        assert_eq!(ctl.holders(), 0);
        assert_eq!(adapter.deactivations.load(Ordering::SeqCst), 1);
        assert!(!ctl.is_active());
    }

    async fn futures_join(ctl: &BearerController, n: usize) -> Vec<BearerLease> {
        let mut handles = Vec::new();
        for _ in 0..n {
            let ctl = ctl.clone();
            handles.push(tokio::spawn(async move { ctl.acquire().await }));
        }
        let mut leases = Vec::new();
        for h in handles {
            leases.push(h.await.unwrap().unwrap());
        }
        leases
    }

    #[tokio::test]
    async fn deactivates_only_after_last_release() {
        let adapter = Arc::new(CountingBearer::default());
        let ctl = controller(adapter.clone(), Duration::ZERO);

        let a = ctl.acquire().await.unwrap();
        let b = ctl.acquire().await.unwrap();
        ctl.release(a).await;
        assert_eq!(adapter.deactivations.load(Ordering::SeqCst), 0);
        assert!(ctl.is_active());
        ctl.release(b).await;
        assert_eq!(adapter.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn activation_failure_is_reported_and_not_counted() {
        let adapter = Arc::new(CountingBearer {
            fail: Some(BearerError::NoCoverage),
            ..Default::default()
        });
        let ctl = controller(adapter.clone(), Duration::ZERO);

        assert_eq!(ctl.acquire().await.unwrap_err(), BearerError::NoCoverage);
        assert_eq!(ctl.holders(), 0);
        assert_eq!(ctl.activations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_activation_times_out() {
        let adapter = Arc::new(CountingBearer {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let ctl = BearerController::new(adapter.clone(), Duration::from_secs(2), Duration::ZERO);

        assert_eq!(ctl.acquire().await.unwrap_err(), BearerError::Timeout);
        assert_eq!(ctl.holders(), 0);
        assert_eq!(ctl.activations(), 0);

        // The abandoned activation is torn down by a background task.
        for _ in 0..100 {
            if adapter.deactivations.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(adapter.deactivations.load(Ordering::SeqCst), 1);
        assert!(!ctl.is_active());
    }

    #[tokio::test]
    async fn dropped_lease_releases_once() {
        let adapter = Arc::new(CountingBearer::default());
        let ctl = controller(adapter.clone(), Duration::ZERO);

        let lease = ctl.acquire().await.unwrap();
        drop(lease);
        assert_eq!(ctl.holders(), 0);

        // Drop hands deactivation to a task.
        for _ in 0..100 {
            if ctl.deactivations() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ctl.deactivations(), 1);
        assert_eq!(adapter.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn linger_lets_the_next_acquire_reuse_the_context() {
        let adapter = Arc::new(CountingBearer::default());
        let ctl = controller(adapter.clone(), Duration::from_secs(10));

        let lease = ctl.acquire().await.unwrap();
        ctl.release(lease).await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(ctl.is_active());

        let lease = ctl.acquire().await.unwrap();
        assert_eq!(ctl.activations(), 1);
        ctl.release(lease).await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!ctl.is_active());
        assert_eq!(ctl.deactivations(), 1);
    }

    #[tokio::test]
    async fn shutdown_skips_linger() {
        let adapter = Arc::new(CountingBearer::default());
        let ctl = controller(adapter.clone(), Duration::from_secs(600));

        let lease = ctl.acquire().await.unwrap();
        ctl.release(lease).await;
        assert!(ctl.is_active());
        ctl.shutdown().await;
        assert!(!ctl.is_active());
        assert_eq!(adapter.deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn static_bearer_reports_carrier_settings() {
        let carrier = CarrierConfig {
            mmsc: Some("http://mmsc.example/mms".into()),
            proxy: Some("10.0.0.1:8080".into()),
            ..Default::default()
        };
        let bearer = StaticBearer::from_config(&carrier);
        let settings = bearer.activate_context().await.unwrap();
        assert_eq!(settings.proxy.as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(bearer.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
