// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MMS transaction engine for the mmsd daemon.
//!
//! The [`Engine`] owns every in-flight MMS transaction:
//! - Starts inbound retrievals from WAP-Push notifications
//! - Queues outbound messages from client send requests
//! - Shares the modem's MMS context through a ref-counted [`BearerController`]
//! - Persists each state transition before acting on it, and resumes
//!   unfinished messages on start
//! - Publishes [`MessageEvent`](mmsd_core::MessageEvent)s to local clients

pub mod bearer;
pub mod convert;
pub mod engine;
pub mod metrics;
pub mod retry;
pub mod send;
pub mod shutdown;
mod transaction;

pub use bearer::{BearerController, BearerLease, StaticBearer};
pub use engine::Engine;
pub use retry::RetryPolicy;
pub use send::{Attachment, SendRequest, generate_transaction_id, normalize_recipient};
pub use shutdown::{drain_tasks, install_signal_handler};
