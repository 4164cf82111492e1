// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The [`Engine`]: client operations, push handling, recovery and shutdown.
//!
//! Each unfinished message is driven by one task (see
//! [`crate::transaction`]). A registry keyed by message ID keeps a second
//! driver from starting; a request that arrives while a driver is finishing
//! asks it to run once more instead. Every mutation of a stored message,
//! from the driver or from a client, goes through `Inner::modify` under
//! that message's async lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mmsd_config::model::{EngineConfig, MmsdConfig, ServiceConfig};
use mmsd_core::{
    BearerSettings, Direction, Message, MessageEvent, MessageFilter, MessageId, MmsdError,
    StorageAdapter, TransactionState, TransferAdapter,
};
use mmsd_pdu::{DeliveryInd, MmsVersion, NotificationInd, Pdu};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::bearer::BearerController;
use crate::convert::notification_message;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::send::{self, SendRequest};
use crate::shutdown::drain_tasks;
use crate::transaction::Transaction;

const EVENT_CAPACITY: usize = 256;
const TRANSACTION_ID_RETRIES: usize = 3;

struct DriverHandle {
    token: CancellationToken,
    /// Set when another start was requested while this driver was running.
    rerun: Arc<AtomicBool>,
}

/// State shared between the engine handle and its drivers.
pub(crate) struct Inner {
    pub(crate) store: Arc<dyn StorageAdapter>,
    pub(crate) bearer: BearerController,
    pub(crate) transfer: Arc<dyn TransferAdapter>,
    pub(crate) policy: RetryPolicy,
    pub(crate) engine: EngineConfig,
    pub(crate) version: MmsVersion,
    pub(crate) modem_number: Option<String>,
    pub(crate) transfer_timeout: Duration,
    service: ServiceConfig,
    carrier_mmsc: Option<String>,
    retention_days: Option<u32>,
    events: broadcast::Sender<MessageEvent>,
    locks: DashMap<MessageId, Arc<tokio::sync::Mutex<()>>>,
    drivers: DashMap<MessageId, DriverHandle>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    fatal: Mutex<Option<String>>,
}

impl Inner {
    fn lock_for(&self, id: &MessageId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    /// Drops the lock entry for `id` once nobody else holds it.
    fn unlock(&self, id: &MessageId) {
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn emit(&self, event: MessageEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// MMSC URL for an exchange: the bearer's, else the configured one.
    pub(crate) fn mmsc(&self, settings: &BearerSettings) -> Option<String> {
        settings
            .mmsc
            .clone()
            .or_else(|| self.carrier_mmsc.clone())
            .filter(|url| !url.trim().is_empty())
    }

    /// Loads, mutates and stores a message under its lock.
    pub(crate) async fn modify<T: Send>(
        &self,
        id: &MessageId,
        f: impl FnOnce(&mut Message) -> Result<T, MmsdError> + Send,
    ) -> Result<(Message, T), MmsdError> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.modify_locked(id, f).await
        };
        drop(lock);
        self.unlock(id);
        result
    }

    async fn modify_locked<T: Send>(
        &self,
        id: &MessageId,
        f: impl FnOnce(&mut Message) -> Result<T, MmsdError> + Send,
    ) -> Result<(Message, T), MmsdError> {
        let mut msg = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MmsdError::NotFound { id: id.clone() })?;
        let value = f(&mut msg)?;
        msg.updated_at = Utc::now();
        self.store.put(&msg).await?;
        Ok((msg, value))
    }

    /// Moves a message to `to`, persisting it before announcing the change.
    pub(crate) async fn transition(
        &self,
        id: &MessageId,
        to: TransactionState,
        f: impl FnOnce(&mut Message) + Send,
    ) -> Result<Message, MmsdError> {
        let (msg, from) = self
            .modify(id, |msg| {
                let from = msg.state;
                if !from.can_transition_to(to) {
                    return Err(MmsdError::InvalidTransition {
                        id: msg.id.clone(),
                        from,
                        to,
                    });
                }
                msg.state = to;
                f(msg);
                Ok(from)
            })
            .await?;

        debug!(%id, %from, %to, attempts = msg.retry.attempts, "state changed");
        self.emit(MessageEvent::StateChanged {
            id: id.clone(),
            from,
            to,
        });
        if to.is_terminal() {
            metrics::record_terminal(msg.direction, to);
            if let Some(event) = terminal_event(&msg) {
                self.emit(event);
            }
        }
        Ok(msg)
    }

    /// Starts a driver for `id` unless one is already running.
    fn spawn_driver(self: &Arc<Self>, id: MessageId) {
        if self.shutdown.is_cancelled() {
            return;
        }
        match self.drivers.entry(id.clone()) {
            Entry::Occupied(entry) => {
                entry.get().rerun.store(true, Ordering::SeqCst);
                return;
            }
            Entry::Vacant(entry) => {
                let token = self.shutdown.child_token();
                let rerun = Arc::new(AtomicBool::new(false));
                entry.insert(DriverHandle {
                    token: token.clone(),
                    rerun: Arc::clone(&rerun),
                });
                let inner = Arc::clone(self);
                self.tracker.spawn(inner.run_driver(id, token, rerun));
            }
        }
        metrics::set_active_drivers(self.drivers.len());
    }

    async fn run_driver(
        self: Arc<Self>,
        id: MessageId,
        token: CancellationToken,
        rerun: Arc<AtomicBool>,
    ) {
        loop {
            let result = Transaction::new(Arc::clone(&self), id.clone(), token.clone())
                .run()
                .await;
            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    self.fail_fatally(&e);
                    break;
                }
                Err(e) => error!(%id, error = %e, "transaction driver stopped"),
            }
            if token.is_cancelled() {
                self.drivers
                    .remove_if(&id, |_, handle| Arc::ptr_eq(&handle.rerun, &rerun));
                break;
            }
            let mut again = false;
            self.drivers.remove_if(&id, |_, handle| {
                if !Arc::ptr_eq(&handle.rerun, &rerun) {
                    return false;
                }
                again = handle.rerun.swap(false, Ordering::SeqCst);
                !again
            });
            if !again {
                break;
            }
            debug!(%id, "restarting driver");
        }
        metrics::set_active_drivers(self.drivers.len());
    }

    fn fail_fatally(&self, e: &MmsdError) {
        error!(error = %e, "fatal engine error, stopping");
        let mut fatal = self.fatal.lock().unwrap_or_else(|p| p.into_inner());
        if fatal.is_none() {
            *fatal = Some(e.to_string());
        }
        self.shutdown.cancel();
    }

    /// Removes a message under its lock. Returns whether it existed.
    async fn remove(&self, id: &MessageId) -> Result<bool, MmsdError> {
        let existed = {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            self.store.delete(id).await
        };
        self.unlock(id);
        let existed = existed?;
        if existed {
            self.emit(MessageEvent::Removed { id: id.clone() });
        }
        Ok(existed)
    }
}

fn terminal_event(msg: &Message) -> Option<MessageEvent> {
    let id = msg.id.clone();
    let reason = || msg.failure.clone().unwrap_or_default();
    match (msg.state, msg.direction) {
        (TransactionState::Completed, Direction::Inbound) => Some(MessageEvent::Received { id }),
        (TransactionState::Completed, Direction::Outbound) => {
            Some(MessageEvent::SendCompleted { id })
        }
        (TransactionState::Failed, Direction::Inbound) => Some(MessageEvent::ReceiveFailed {
            id,
            reason: reason(),
        }),
        (TransactionState::Failed, Direction::Outbound) => Some(MessageEvent::SendFailed {
            id,
            reason: reason(),
        }),
        (TransactionState::Expired, _) => Some(MessageEvent::Expired { id }),
        _ => None,
    }
}

/// Handle to the transaction engine. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Creates an engine over an initialized store.
    pub fn new(
        config: &MmsdConfig,
        store: Arc<dyn StorageAdapter>,
        bearer: BearerController,
        transfer: Arc<dyn TransferAdapter>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let version = MmsVersion::parse(&config.engine.mms_version).unwrap_or_else(|| {
            warn!(version = %config.engine.mms_version, "unparsable MMS version, using 1.2");
            MmsVersion::V1_2
        });
        let modem_number = config
            .carrier
            .modem_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Self {
            inner: Arc::new(Inner {
                store,
                bearer,
                transfer,
                policy: RetryPolicy::from_config(&config.engine),
                engine: config.engine.clone(),
                version,
                modem_number,
                transfer_timeout: Duration::from_secs(config.transfer.timeout_secs),
                service: config.service.clone(),
                carrier_mmsc: config.carrier.mmsc.clone(),
                retention_days: config.storage.retention_days,
                events,
                locks: DashMap::new(),
                drivers: DashMap::new(),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                fatal: Mutex::new(None),
            }),
        }
    }

    /// Resumes every unfinished message and starts the retention sweeper.
    pub async fn start(&self) -> Result<(), MmsdError> {
        metrics::register_metrics();
        let unfinished = self.inner.store.list(&MessageFilter::unfinished()).await?;
        info!(count = unfinished.len(), "resuming unfinished messages");
        for msg in unfinished {
            debug!(id = %msg.id, state = %msg.state, "resuming");
            self.inner.spawn_driver(msg.id);
        }

        if self.inner.retention_days.is_some() {
            let engine = self.clone();
            let period = Duration::from_secs(self.inner.engine.retention_sweep_secs.max(1));
            self.inner.tracker.spawn(async move { engine.retention_loop(period).await });
        }
        Ok(())
    }

    async fn retention_loop(self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }
            match self.sweep_retention().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    self.inner.fail_fatally(&e);
                    return;
                }
                Err(e) => warn!(error = %e, "retention sweep failed"),
            }
        }
    }

    /// Deletes terminal messages older than `storage.retention_days`.
    pub async fn sweep_retention(&self) -> Result<usize, MmsdError> {
        let Some(days) = self.inner.retention_days else {
            return Ok(0);
        };
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let filter = MessageFilter {
            terminal_before: Some(cutoff),
            ..MessageFilter::default()
        };
        let mut removed = 0;
        for msg in self.inner.store.list(&filter).await? {
            if self.inner.remove(&msg.id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, %cutoff, "retention sweep removed old messages");
        }
        Ok(removed)
    }

    /// Validates, stores and starts sending a message.
    pub async fn send_message(&self, request: SendRequest) -> Result<MessageId, MmsdError> {
        send::validate(&request, &self.inner.service)?;
        let now = Utc::now();
        let from = send::sender(self.inner.modem_number.as_deref());
        let expiry_secs = self.inner.engine.default_expiry_secs;

        for _ in 0..TRANSACTION_ID_RETRIES {
            let tid = send::generate_transaction_id();
            let outgoing = send::build(
                &request,
                &tid,
                from.clone(),
                self.inner.version,
                expiry_secs,
                now,
            )?;
            let raw = mmsd_pdu::encode(&Pdu::SendReq(outgoing.send_req))
                .map_err(|e| MmsdError::Codec(e.to_string()))?;

            let mut msg = Message::new(
                MessageId(tid),
                Direction::Outbound,
                self.inner.policy.max_attempts,
                now,
            );
            msg.headers = outgoing.headers;
            msg.parts = outgoing.parts;
            msg.raw_pdu = Some(raw);
            msg.read = true;
            msg.expires_at = i64::try_from(expiry_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|d| now.checked_add_signed(d));

            match self.inner.store.create(&msg).await {
                Ok(()) => {
                    info!(
                        id = %msg.id,
                        recipients = msg.headers.to.len(),
                        "message queued for sending"
                    );
                    self.inner.emit(MessageEvent::Added {
                        id: msg.id.clone(),
                        direction: Direction::Outbound,
                    });
                    self.inner.spawn_driver(msg.id.clone());
                    return Ok(msg.id);
                }
                Err(MmsdError::AlreadyExists { id }) => {
                    debug!(%id, "transaction ID collision, generating another");
                }
                Err(e) => return Err(e),
            }
        }
        Err(MmsdError::Internal(
            "could not allocate a unique transaction ID".into(),
        ))
    }

    pub async fn get_message(&self, id: &MessageId) -> Result<Message, MmsdError> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or_else(|| MmsdError::NotFound { id: id.clone() })
    }

    pub async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, MmsdError> {
        self.inner.store.list(filter).await
    }

    pub async fn mark_read(&self, id: &MessageId) -> Result<(), MmsdError> {
        self.inner
            .modify(id, |msg| {
                msg.read = true;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Stops any driver for `id` and deletes the message.
    pub async fn delete_message(&self, id: &MessageId) -> Result<(), MmsdError> {
        if let Some((_, handle)) = self.inner.drivers.remove(id) {
            handle.token.cancel();
            metrics::set_active_drivers(self.inner.drivers.len());
        }
        if self.inner.remove(id).await? {
            info!(%id, "message deleted");
            Ok(())
        } else {
            Err(MmsdError::NotFound { id: id.clone() })
        }
    }

    /// Restarts a failed message with a fresh retry budget.
    pub async fn retry_message(&self, id: &MessageId) -> Result<(), MmsdError> {
        let max_attempts = self.inner.policy.max_attempts;
        self.inner
            .transition(id, TransactionState::Pending, |msg| {
                msg.retry.attempts = 0;
                msg.retry.max_attempts = max_attempts;
                msg.retry.next_attempt_at = None;
                msg.failure = None;
            })
            .await?;
        info!(%id, "retrying message");
        self.inner.spawn_driver(id.clone());
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the message reaches a terminal state.
    pub async fn wait_for_terminal(&self, id: &MessageId) -> Result<TransactionState, MmsdError> {
        let mut events = self.subscribe();
        let current = self.get_message(id).await?;
        if current.state.is_terminal() {
            return Ok(current.state);
        }
        loop {
            match events.recv().await {
                Ok(MessageEvent::StateChanged { id: changed, to, .. })
                    if changed == *id && to.is_terminal() =>
                {
                    return Ok(to);
                }
                Ok(MessageEvent::Removed { id: removed }) if removed == *id => {
                    return Err(MmsdError::NotFound { id: id.clone() });
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "event receiver lagged, re-reading state");
                    let current = self.get_message(id).await?;
                    if current.state.is_terminal() {
                        return Ok(current.state);
                    }
                }
                Err(RecvError::Closed) => {
                    return Err(MmsdError::Internal("event channel closed".into()));
                }
            }
        }
    }

    /// Handles a WAP-Push payload carrying an MMS PDU.
    ///
    /// Returns the ID of a newly started inbound message; duplicates,
    /// unusable notifications and delivery reports give `None`.
    pub async fn handle_push(&self, data: &[u8]) -> Result<Option<MessageId>, MmsdError> {
        let pdu = mmsd_pdu::decode_push(data).map_err(|e| {
            metrics::record_push("invalid");
            MmsdError::Codec(e.to_string())
        })?;
        match pdu {
            Pdu::NotificationInd(notification) => {
                metrics::record_push("notification");
                self.notification(&notification).await
            }
            Pdu::DeliveryInd(report) => {
                metrics::record_push("delivery_report");
                self.delivery_report(&report).await?;
                Ok(None)
            }
            other => {
                metrics::record_push("unexpected");
                Err(MmsdError::Codec(format!(
                    "unexpected {} in WAP push",
                    other.message_type().name()
                )))
            }
        }
    }

    async fn notification(
        &self,
        notification: &NotificationInd,
    ) -> Result<Option<MessageId>, MmsdError> {
        let Some(msg) =
            notification_message(notification, self.inner.policy.max_attempts, Utc::now())
        else {
            warn!(
                tid = %notification.transaction_id,
                "dropping notification without transaction ID or content location"
            );
            return Ok(None);
        };
        match self.inner.store.create(&msg).await {
            Ok(()) => {}
            Err(MmsdError::AlreadyExists { id }) => {
                info!(%id, "ignoring duplicate notification");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        info!(
            id = %msg.id,
            from = msg.headers.from.as_deref().unwrap_or("unknown"),
            size = msg.headers.message_size,
            "incoming message notified"
        );
        self.inner.emit(MessageEvent::Added {
            id: msg.id.clone(),
            direction: Direction::Inbound,
        });
        self.inner.spawn_driver(msg.id.clone());
        Ok(Some(msg.id))
    }

    async fn delivery_report(&self, report: &DeliveryInd) -> Result<(), MmsdError> {
        let filter = MessageFilter {
            direction: Some(Direction::Outbound),
            ..MessageFilter::default()
        };
        let target = self
            .inner
            .store
            .list(&filter)
            .await?
            .into_iter()
            .find(|m| m.headers.message_id.as_deref() == Some(report.message_id.as_str()));
        let Some(target) = target else {
            warn!(message_id = %report.message_id, "delivery report for unknown message");
            return Ok(());
        };

        let status = report.status.name().to_string();
        let recorded = status.clone();
        self.inner
            .modify(&target.id, move |msg| {
                msg.delivery_status = Some(recorded);
                Ok(())
            })
            .await?;
        info!(id = %target.id, %status, "delivery report received");
        self.inner.emit(MessageEvent::DeliveryReport {
            id: target.id,
            status,
        });
        Ok(())
    }

    /// The store error that stopped the engine, if any.
    pub fn fatal_error(&self) -> Option<String> {
        self.inner
            .fatal
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Resolves when the engine stops, by shutdown or a fatal error.
    pub async fn stopped(&self) {
        self.inner.shutdown.cancelled().await;
    }

    pub fn bearer(&self) -> &BearerController {
        &self.inner.bearer
    }

    /// Number of messages with a running driver.
    pub fn active_drivers(&self) -> usize {
        self.inner.drivers.len()
    }

    /// Number of messages with a live per-message lock.
    pub fn locked_messages(&self) -> usize {
        self.inner.locks.len()
    }

    /// Cancels all drivers, waits up to `engine.drain_timeout_secs` for
    /// them, then drops the bearer and checkpoints the store.
    pub async fn shutdown(&self) -> Result<(), MmsdError> {
        info!("engine shutting down");
        self.inner.shutdown.cancel();
        let drain = Duration::from_secs(self.inner.engine.drain_timeout_secs);
        drain_tasks(&self.inner.tracker, drain).await;
        self.inner.bearer.shutdown().await;
        self.inner.store.close().await?;
        info!("engine stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("drivers", &self.inner.drivers.len())
            .field("locks", &self.inner.locks.len())
            .field("stopping", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}
