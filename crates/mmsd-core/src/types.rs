// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message model and common types shared by the engine, store, and adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Transaction identifier of a message.
///
/// Inbound messages use the X-Mms-Transaction-Id from the notification;
/// outbound messages get a locally generated one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Bearer,
    Transfer,
    Storage,
}

/// Which way a message travels relative to this device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Position of a message in its MMS transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Known to the daemon, no work started yet.
    Pending,
    /// Waiting for a bearer lease (or for the next retry slot).
    BearerWait,
    /// HTTP exchange with the MMSC in flight.
    Transferring,
    /// Outbound: Send-Conf received and recorded, not yet evaluated.
    AwaitingAck,
    /// Inbound: Retrieve-Conf received and recorded, not yet decoded.
    Decoding,
    Completed,
    Failed,
    Expired,
}

impl TransactionState {
    /// Completed, Failed, and Expired end the transaction.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Completed | TransactionState::Failed | TransactionState::Expired
        )
    }

    /// Whether moving from `self` to `next` is a legal step.
    ///
    /// Going back to `BearerWait` is only allowed as a retry. `Failed -> Pending`
    /// is reserved for an explicit client retry.
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        match (self, next) {
            (Pending, BearerWait | Failed | Expired) => true,
            (BearerWait, BearerWait | Transferring | Failed | Expired) => true,
            (Transferring, Decoding | AwaitingAck | BearerWait | Failed | Expired) => true,
            (Decoding, Completed | Failed | Expired) => true,
            (AwaitingAck, Completed | Failed | BearerWait | Expired) => true,
            (Failed, Pending) => true,
            _ => false,
        }
    }
}

/// X-Mms-Priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// One body part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPart {
    /// Media type, possibly with parameters such as `; charset=utf-8`.
    pub content_type: String,
    pub content_id: Option<String>,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl ContentPart {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            content_id: None,
            filename: None,
            data,
        }
    }

    /// The bare media type without parameters, lowercased.
    pub fn media_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

/// MMS headers carried alongside the message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub subject: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub priority: Option<Priority>,
    pub message_class: Option<String>,
    #[serde(default)]
    pub delivery_report: bool,
    #[serde(default)]
    pub read_report: bool,
    /// Message-ID assigned by the MMSC.
    pub message_id: Option<String>,
    /// URL the content is retrieved from (inbound only).
    pub content_location: Option<String>,
    pub message_size: Option<u64>,
    /// Value of the MMS Date header.
    pub date: Option<DateTime<Utc>>,
}

/// Per-message retry bookkeeping. Mutated only by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            next_attempt_at: None,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// A message and the state of its MMS transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub direction: Direction,
    pub state: TransactionState,
    pub headers: MessageHeaders,
    pub parts: Vec<ContentPart>,
    pub retry: RetryState,
    pub read: bool,
    pub failure: Option<String>,
    pub delivery_status: Option<String>,
    /// Retrieve-Conf bytes (inbound) or the encoded Send-Req (outbound).
    pub raw_pdu: Option<Vec<u8>>,
    /// Raw Send-Conf, recorded before it is evaluated.
    pub confirmation: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: MessageId,
        direction: Direction,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            direction,
            state: TransactionState::Pending,
            headers: MessageHeaders::default(),
            parts: Vec::new(),
            retry: RetryState::new(max_attempts),
            read: false,
            failure: None,
            delivery_status: None,
            raw_pdu: None,
            confirmation: None,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Selection criteria for listing stored messages. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub direction: Option<Direction>,
    pub states: Vec<TransactionState>,
    pub read: Option<bool>,
    /// Only terminal messages last updated before this instant.
    pub terminal_before: Option<DateTime<Utc>>,
}

impl MessageFilter {
    /// Messages the engine still has to drive.
    pub fn unfinished() -> Self {
        use TransactionState::*;
        Self {
            states: vec![Pending, BearerWait, Transferring, AwaitingAck, Decoding],
            ..Self::default()
        }
    }

    pub fn matches(&self, msg: &Message) -> bool {
        if self.direction.is_some_and(|d| d != msg.direction) {
            return false;
        }
        if !self.states.is_empty() && !self.states.contains(&msg.state) {
            return false;
        }
        if self.read.is_some_and(|r| r != msg.read) {
            return false;
        }
        if let Some(before) = self.terminal_before {
            if !msg.state.is_terminal() || msg.updated_at >= before {
                return false;
            }
        }
        true
    }
}

/// Settings of an active MMS data context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearerSettings {
    /// MMSC URL announced by the context, if any.
    pub mmsc: Option<String>,
    /// HTTP proxy as `host:port`.
    pub proxy: Option<String>,
    /// Local address to bind outgoing connections to.
    pub local_address: Option<String>,
}

/// Notifications published to local clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    Added {
        id: MessageId,
        direction: Direction,
    },
    StateChanged {
        id: MessageId,
        from: TransactionState,
        to: TransactionState,
    },
    Received {
        id: MessageId,
    },
    SendCompleted {
        id: MessageId,
    },
    SendFailed {
        id: MessageId,
        reason: String,
    },
    ReceiveFailed {
        id: MessageId,
        reason: String,
    },
    Expired {
        id: MessageId,
    },
    Removed {
        id: MessageId,
    },
    DeliveryReport {
        id: MessageId,
        status: String,
    },
}

impl MessageEvent {
    pub fn id(&self) -> &MessageId {
        match self {
            MessageEvent::Added { id, .. }
            | MessageEvent::StateChanged { id, .. }
            | MessageEvent::Received { id }
            | MessageEvent::SendCompleted { id }
            | MessageEvent::SendFailed { id, .. }
            | MessageEvent::ReceiveFailed { id, .. }
            | MessageEvent::Expired { id }
            | MessageEvent::Removed { id }
            | MessageEvent::DeliveryReport { id, .. } => id,
        }
    }
}
