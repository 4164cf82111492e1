// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted MMSC for deterministic testing.
//!
//! `MockMmsc` implements `TransferAdapter`. GETs are served from published
//! content; Send-Req POSTs are answered from a script, falling back to an
//! `Ok` Send-Conf. Every request is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use mmsd_core::{
    AdapterType, BearerSettings, HealthStatus, MmsdError, PluginAdapter, TransferAdapter,
    TransferError,
};
use mmsd_pdu::{DeliveryInd, NotifyRespInd, Pdu, ResponseStatus, SendReq};

use crate::pdus;

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    /// `None` for GET.
    pub body: Option<Vec<u8>>,
    pub bearer: BearerSettings,
}

#[derive(Default)]
struct State {
    content: HashMap<String, Vec<u8>>,
    get_script: VecDeque<TransferError>,
    send_script: VecDeque<Result<Vec<u8>, TransferError>>,
    requests: Vec<Request>,
    delay: Duration,
}

/// A fake carrier MMSC.
#[derive(Default)]
pub struct MockMmsc {
    state: Mutex<State>,
}

impl MockMmsc {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serves `body` for GETs of `url`.
    pub fn publish(&self, url: &str, body: Vec<u8>) {
        self.state().content.insert(url.to_string(), body);
    }

    /// Makes the next GET fail with `error`.
    pub fn fail_next_get(&self, error: TransferError) {
        self.state().get_script.push_back(error);
    }

    /// Answers the next Send-Req with `result`.
    pub fn script_send(&self, result: Result<Vec<u8>, TransferError>) {
        self.state().send_script.push_back(result);
    }

    /// Answers the next Send-Req with a Send-Conf carrying `status`.
    pub fn script_send_status(&self, status: ResponseStatus) {
        self.script_send(Ok(pdus::send_conf(status, None)));
    }

    /// Holds every request for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = delay;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    pub fn gets(&self) -> Vec<String> {
        self.state()
            .requests
            .iter()
            .filter(|r| r.body.is_none())
            .map(|r| r.url.clone())
            .collect()
    }

    /// Decoded bodies of every POST, in order.
    pub fn posted(&self) -> Vec<Pdu> {
        self.state()
            .requests
            .iter()
            .filter_map(|r| r.body.as_deref())
            .filter_map(|body| mmsd_pdu::decode(body).ok())
            .collect()
    }

    pub fn send_reqs(&self) -> Vec<SendReq> {
        self.posted()
            .into_iter()
            .filter_map(|pdu| match pdu {
                Pdu::SendReq(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn notify_resps(&self) -> Vec<NotifyRespInd> {
        self.posted()
            .into_iter()
            .filter_map(|pdu| match pdu {
                Pdu::NotifyRespInd(resp) => Some(resp),
                _ => None,
            })
            .collect()
    }

    pub fn delivery_inds(&self) -> Vec<DeliveryInd> {
        self.posted()
            .into_iter()
            .filter_map(|pdu| match pdu {
                Pdu::DeliveryInd(ind) => Some(ind),
                _ => None,
            })
            .collect()
    }

    async fn hold(&self) {
        let delay = self.state().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PluginAdapter for MockMmsc {
    fn name(&self) -> &str {
        "mock-mmsc"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transfer
    }

    async fn health_check(&self) -> Result<HealthStatus, MmsdError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MmsdError> {
        Ok(())
    }
}

#[async_trait]
impl TransferAdapter for MockMmsc {
    async fn get(&self, url: &str, bearer: &BearerSettings) -> Result<Vec<u8>, TransferError> {
        self.state().requests.push(Request {
            url: url.to_string(),
            body: None,
            bearer: bearer.clone(),
        });
        self.hold().await;

        let mut state = self.state();
        if let Some(error) = state.get_script.pop_front() {
            return Err(error);
        }
        state
            .content
            .get(url)
            .cloned()
            .ok_or(TransferError::Status(404))
    }

    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        bearer: &BearerSettings,
    ) -> Result<Vec<u8>, TransferError> {
        let pdu = mmsd_pdu::decode(&body).ok();
        self.state().requests.push(Request {
            url: url.to_string(),
            body: Some(body),
            bearer: bearer.clone(),
        });
        self.hold().await;

        match pdu {
            Some(Pdu::SendReq(req)) => self.state().send_script.pop_front().unwrap_or_else(|| {
                let message_id = format!("msg-{}", req.transaction_id);
                Ok(pdus::send_conf(ResponseStatus::OK, Some(&message_id)))
            }),
            Some(_) => Ok(Vec::new()),
            None => Err(TransferError::Status(400)),
        }
    }
}
