// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-message transaction driver.
//!
//! A [`Transaction`] reloads its message from the store before every step
//! and persists each transition before doing the work that follows it, so
//! a driver started on a half-finished message picks up where the previous
//! one stopped:
//!
//! - `AwaitingAck` re-evaluates the recorded Send-Conf and never re-POSTs.
//! - `Decoding` re-decodes the recorded Retrieve-Conf.
//! - `Transferring` counts as an interrupted attempt and goes back through
//!   the retry path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mmsd_core::{
    BearerError, BearerSettings, Direction, Message, MessageId, MmsdError, TransactionState,
    TransferError,
};
use mmsd_pdu::{DeliveryInd, EncodedString, MmsStatus, NotifyRespInd, Pdu, RetrieveConf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bearer::BearerLease;
use crate::convert::apply_retrieve_conf;
use crate::engine::Inner;
use crate::metrics;

/// Drives one message until it is terminal, cancelled, or deleted.
pub(crate) struct Transaction {
    inner: Arc<Inner>,
    id: MessageId,
    cancel: CancellationToken,
    lease: Option<BearerLease>,
}

/// What a step wants the driver loop to do next.
enum Flow {
    Continue,
    Stop,
}

impl Transaction {
    pub(crate) fn new(inner: Arc<Inner>, id: MessageId, cancel: CancellationToken) -> Self {
        Self {
            inner,
            id,
            cancel,
            lease: None,
        }
    }

    /// Runs the message to completion. Only store failures are returned.
    pub(crate) async fn run(mut self) -> Result<(), MmsdError> {
        let result = self.drive().await;
        self.release().await;
        match result {
            Err(MmsdError::NotFound { .. }) => {
                debug!(id = %self.id, "message removed while in flight");
                Ok(())
            }
            other => other,
        }
    }

    async fn drive(&mut self) -> Result<(), MmsdError> {
        loop {
            if self.cancel.is_cancelled() {
                debug!(id = %self.id, "transaction cancelled");
                return Ok(());
            }
            let Some(msg) = self.inner.store.get(&self.id).await? else {
                return Ok(());
            };
            if msg.state.is_terminal() {
                return Ok(());
            }
            if msg.is_expired_at(Utc::now()) {
                info!(id = %self.id, state = %msg.state, "message expired");
                self.inner
                    .transition(&self.id, TransactionState::Expired, |m| {
                        m.failure = Some("expired".into());
                    })
                    .await?;
                return Ok(());
            }

            let flow = match msg.state {
                TransactionState::Pending => self.begin().await?,
                TransactionState::BearerWait => self.attempt(msg).await?,
                TransactionState::Transferring => {
                    self.retry_later(&msg, "transfer interrupted").await?
                }
                TransactionState::AwaitingAck => self.evaluate_send_conf(msg).await?,
                TransactionState::Decoding => self.decode_retrieve_conf(msg).await?,
                TransactionState::Completed
                | TransactionState::Failed
                | TransactionState::Expired => Flow::Stop,
            };
            if let Flow::Stop = flow {
                return Ok(());
            }
        }
    }

    async fn release(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.inner.bearer.release(lease).await;
        }
    }

    /// Pending: first attempt.
    async fn begin(&mut self) -> Result<Flow, MmsdError> {
        let msg = self
            .inner
            .transition(&self.id, TransactionState::BearerWait, |m| {
                m.retry.attempts += 1;
                m.retry.next_attempt_at = None;
                m.last_attempt_at = Some(Utc::now());
            })
            .await?;
        metrics::record_attempt(msg.direction);
        Ok(Flow::Continue)
    }

    /// BearerWait: sit out any backoff, then take a lease and transfer.
    async fn attempt(&mut self, msg: Message) -> Result<Flow, MmsdError> {
        if let Some(at) = msg.retry.next_attempt_at {
            let wake = msg.expires_at.map_or(at, |exp| exp.min(at));
            let wait = (wake - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if !wait.is_zero() {
                debug!(id = %self.id, ?wait, attempt = msg.retry.attempts + 1, "backing off");
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(Flow::Stop),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            if msg.is_expired_at(Utc::now()) {
                return Ok(Flow::Continue);
            }
            let msg = self
                .inner
                .transition(&self.id, TransactionState::BearerWait, |m| {
                    m.retry.attempts += 1;
                    m.retry.next_attempt_at = None;
                    m.last_attempt_at = Some(Utc::now());
                })
                .await?;
            metrics::record_attempt(msg.direction);
            return Ok(Flow::Continue);
        }

        let settings = match self.lease().await {
            Ok(Some(settings)) => settings,
            Ok(None) => return Ok(Flow::Stop),
            Err(e) => {
                warn!(id = %self.id, error = %e, "bearer unavailable");
                return self.retry_later(&msg, &e.to_string()).await;
            }
        };

        self.inner
            .transition(&self.id, TransactionState::Transferring, |_| {})
            .await?;

        match msg.direction {
            Direction::Inbound => self.retrieve(&msg, &settings).await,
            Direction::Outbound => self.submit(&msg, &settings).await,
        }
    }

    /// Current lease settings, acquiring one if needed. `None` on cancel.
    async fn lease(&mut self) -> Result<Option<BearerSettings>, BearerError> {
        if let Some(lease) = &self.lease {
            return Ok(Some(lease.settings().clone()));
        }
        let lease = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            lease = self.inner.bearer.acquire() => lease?,
        };
        let settings = lease.settings().clone();
        self.lease = Some(lease);
        Ok(Some(settings))
    }

    /// GET with the engine's timeout. `None` on cancel.
    async fn get(
        &self,
        url: &str,
        settings: &BearerSettings,
    ) -> Option<Result<Vec<u8>, TransferError>> {
        let request = self.inner.transfer.get(url, settings);
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(self.inner.transfer_timeout, request) => {
                Some(result.unwrap_or(Err(TransferError::Timeout)))
            }
        }
    }

    /// POST with the engine's timeout. `None` on cancel.
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        settings: &BearerSettings,
    ) -> Option<Result<Vec<u8>, TransferError>> {
        let request = self.inner.transfer.post(url, body, settings);
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = tokio::time::timeout(self.inner.transfer_timeout, request) => {
                Some(result.unwrap_or(Err(TransferError::Timeout)))
            }
        }
    }

    /// Transferring, inbound: fetch the Retrieve-Conf.
    async fn retrieve(&mut self, msg: &Message, settings: &BearerSettings) -> Result<Flow, MmsdError> {
        let Some(location) = msg.headers.content_location.clone() else {
            return self.fail("notification has no content location").await;
        };
        debug!(id = %self.id, %location, "retrieving message");
        match self.get(&location, settings).await {
            None => Ok(Flow::Stop),
            Some(Ok(body)) => {
                self.inner
                    .transition(&self.id, TransactionState::Decoding, |m| {
                        m.raw_pdu = Some(body);
                    })
                    .await?;
                Ok(Flow::Continue)
            }
            Some(Err(e)) => self.transfer_failed(msg, e).await,
        }
    }

    /// Transferring, outbound: submit the stored Send-Req.
    async fn submit(&mut self, msg: &Message, settings: &BearerSettings) -> Result<Flow, MmsdError> {
        let Some(url) = self.inner.mmsc(settings) else {
            return self.fail("no MMSC URL configured").await;
        };
        let Some(send_req) = msg.raw_pdu.clone() else {
            return self.fail("no Send-Req recorded").await;
        };
        debug!(id = %self.id, %url, bytes = send_req.len(), "submitting message");
        match self.post(&url, send_req, settings).await {
            None => Ok(Flow::Stop),
            Some(Ok(body)) => {
                self.inner
                    .transition(&self.id, TransactionState::AwaitingAck, |m| {
                        m.confirmation = Some(body);
                    })
                    .await?;
                Ok(Flow::Continue)
            }
            Some(Err(e)) => self.transfer_failed(msg, e).await,
        }
    }

    async fn transfer_failed(&mut self, msg: &Message, error: TransferError) -> Result<Flow, MmsdError> {
        if error.is_retryable() {
            warn!(id = %self.id, error = %error, "transfer failed, will retry");
            self.retry_later(msg, &error.to_string()).await
        } else {
            warn!(id = %self.id, error = %error, "transfer failed permanently");
            self.fail(&error.to_string()).await
        }
    }

    /// Schedules the next attempt, or fails once the budget is spent.
    async fn retry_later(&mut self, msg: &Message, reason: &str) -> Result<Flow, MmsdError> {
        self.release().await;
        if msg.retry.exhausted() {
            let reason = format!("{reason} (gave up after {} attempts)", msg.retry.attempts);
            return self.fail(&reason).await;
        }
        let policy = &self.inner.policy;
        let msg = self
            .inner
            .transition(&self.id, TransactionState::BearerWait, |m| {
                m.retry.next_attempt_at =
                    Some(policy.next_attempt_at(m.retry.attempts + 1, Utc::now()));
            })
            .await?;
        metrics::record_retry(msg.direction);
        Ok(Flow::Continue)
    }

    async fn fail(&mut self, reason: &str) -> Result<Flow, MmsdError> {
        self.release().await;
        self.inner
            .transition(&self.id, TransactionState::Failed, |m| {
                m.failure = Some(reason.to_string());
                m.retry.next_attempt_at = None;
            })
            .await?;
        Ok(Flow::Stop)
    }

    /// AwaitingAck: judge the recorded Send-Conf.
    async fn evaluate_send_conf(&mut self, msg: Message) -> Result<Flow, MmsdError> {
        let Some(bytes) = msg.confirmation.as_deref() else {
            return self.fail("no Send-Conf recorded").await;
        };
        let conf = match mmsd_pdu::decode(bytes) {
            Ok(Pdu::SendConf(conf)) => conf,
            Ok(other) => {
                let reason = format!("expected M-Send.conf, got {}", other.message_type().name());
                return self.fail(&reason).await;
            }
            Err(e) => return self.fail(&format!("undecodable Send-Conf: {e}")).await,
        };

        let status = conf.response_status;
        if status.is_ok() {
            self.release().await;
            info!(id = %self.id, message_id = ?conf.message_id, "message sent");
            self.inner
                .transition(&self.id, TransactionState::Completed, |m| {
                    m.headers.message_id = conf.message_id;
                    m.failure = None;
                })
                .await?;
            return Ok(Flow::Stop);
        }

        let rejection = MmsdError::Rejected {
            status: status.name(),
            text: conf.response_text.map(|t| t.text),
        };
        if status.is_transient() {
            warn!(id = %self.id, status = %status.name(), "MMSC deferred the message");
            self.retry_later(&msg, &rejection.to_string()).await
        } else {
            warn!(id = %self.id, status = %status.name(), "MMSC rejected the message");
            self.fail(&rejection.to_string()).await
        }
    }

    /// Decoding: unpack the recorded Retrieve-Conf and acknowledge it.
    async fn decode_retrieve_conf(&mut self, msg: Message) -> Result<Flow, MmsdError> {
        let Some(bytes) = msg.raw_pdu.as_deref() else {
            return self.fail("no Retrieve-Conf recorded").await;
        };
        let conf = match mmsd_pdu::decode(bytes) {
            Ok(Pdu::RetrieveConf(conf)) => conf,
            Ok(other) => {
                let reason =
                    format!("expected M-Retrieve.conf, got {}", other.message_type().name());
                self.notify_resp(MmsStatus::Unrecognised).await;
                return self.fail(&reason).await;
            }
            Err(e) => {
                self.notify_resp(MmsStatus::Unrecognised).await;
                return self.fail(&format!("undecodable Retrieve-Conf: {e}")).await;
            }
        };

        if let Some(status) = conf.retrieve_status.filter(|s| !s.is_ok()) {
            let rejection = MmsdError::Rejected {
                status: status.name(),
                text: conf.retrieve_text.as_ref().map(|t| t.text.clone()),
            };
            warn!(id = %self.id, status = %status.name(), "MMSC refused retrieval");
            return self.fail(&rejection.to_string()).await;
        }

        self.inner
            .modify(&self.id, |m| {
                apply_retrieve_conf(m, &conf);
                Ok(())
            })
            .await?;
        self.notify_resp(MmsStatus::Retrieved).await;
        self.release().await;

        let msg = self
            .inner
            .transition(&self.id, TransactionState::Completed, |m| {
                m.failure = None;
            })
            .await?;
        info!(id = %self.id, parts = msg.parts.len(), "message received");

        if msg.headers.delivery_report && self.inner.engine.send_delivery_reports {
            self.delivery_ind(&conf, &msg).await;
        }
        Ok(Flow::Stop)
    }

    /// Best-effort acknowledgement of a notification.
    async fn notify_resp(&mut self, status: MmsStatus) {
        let pdu = Pdu::NotifyRespInd(NotifyRespInd {
            transaction_id: self.id.to_string(),
            version: self.inner.version,
            status,
            report_allowed: Some(self.inner.engine.send_delivery_reports),
            extra_headers: Vec::new(),
        });
        self.post_best_effort(&pdu, "NotifyResp-Ind").await;
    }

    /// Best-effort delivery report towards the original sender.
    ///
    /// The report names the modem number, or failing that the recipients
    /// the Retrieve-Conf listed.
    async fn delivery_ind(&mut self, conf: &RetrieveConf, msg: &Message) {
        let Some(message_id) = conf.message_id.clone() else {
            debug!(id = %self.id, "no Message-ID to report delivery for");
            return;
        };
        let to: Vec<EncodedString> = match &self.inner.modem_number {
            Some(number) => vec![EncodedString::new(format!("{number}/TYPE=PLMN"))],
            None => msg.headers.to.iter().map(EncodedString::new).collect(),
        };
        if to.is_empty() {
            warn!(id = %self.id, "no recipient address to report delivery for");
            return;
        }
        let pdu = Pdu::DeliveryInd(DeliveryInd {
            version: self.inner.version,
            message_id,
            to,
            date: u64::try_from(Utc::now().timestamp()).unwrap_or_default(),
            status: MmsStatus::Retrieved,
            extra_headers: Vec::new(),
        });
        self.post_best_effort(&pdu, "Delivery-Ind").await;
        self.release().await;
    }

    async fn post_best_effort(&mut self, pdu: &Pdu, what: &'static str) {
        let body = match mmsd_pdu::encode(pdu) {
            Ok(body) => body,
            Err(e) => {
                warn!(id = %self.id, error = %e, "failed to encode {what}");
                return;
            }
        };
        let settings = match self.lease().await {
            Ok(Some(settings)) => settings,
            Ok(None) => return,
            Err(e) => {
                warn!(id = %self.id, error = %e, "no bearer for {what}");
                return;
            }
        };
        let Some(url) = self.inner.mmsc(&settings) else {
            warn!(id = %self.id, "no MMSC URL for {what}");
            return;
        };
        match self.post(&url, body, &settings).await {
            Some(Ok(_)) => debug!(id = %self.id, "{what} sent"),
            Some(Err(e)) => warn!(id = %self.id, error = %e, "failed to send {what}"),
            None => {}
        }
    }
}
