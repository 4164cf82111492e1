// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; nothing is exported unless the binary
//! installs a recorder.

use metrics::{describe_counter, describe_gauge};
use mmsd_core::{Direction, TransactionState};

/// Register all mmsd metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "mmsd_transactions_total",
        "Transactions that reached a terminal state"
    );
    describe_counter!("mmsd_attempts_total", "Transfer attempts started");
    describe_counter!("mmsd_retries_total", "Attempts scheduled for retry");
    describe_counter!("mmsd_pushes_total", "WAP push messages handled");
    describe_gauge!("mmsd_active_leases", "Bearer leases currently held");
    describe_gauge!("mmsd_active_drivers", "Messages currently being driven");
}

/// Record a message reaching `state`.
pub fn record_terminal(direction: Direction, state: TransactionState) {
    metrics::counter!(
        "mmsd_transactions_total",
        "direction" => direction.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

pub fn record_attempt(direction: Direction) {
    metrics::counter!("mmsd_attempts_total", "direction" => direction.to_string()).increment(1);
}

pub fn record_retry(direction: Direction) {
    metrics::counter!("mmsd_retries_total", "direction" => direction.to_string()).increment(1);
}

/// `kind` is the PDU type carried, or "invalid".
pub fn record_push(kind: &'static str) {
    metrics::counter!("mmsd_pushes_total", "kind" => kind).increment(1);
}

pub fn set_active_leases(count: usize) {
    metrics::gauge!("mmsd_active_leases").set(count as f64);
}

pub fn set_active_drivers(count: usize) {
    metrics::gauge!("mmsd_active_drivers").set(count as f64);
}
