// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` assembles an [`Engine`] over a temp SQLite store, a
//! [`MockBearer`] and a [`MockMmsc`], and records every event the engine
//! publishes so tests can check the state paths messages took.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mmsd_config::model::MmsdConfig;
use mmsd_core::{
    Message, MessageEvent, MessageId, MmsdError, StorageAdapter, TransactionState,
};
use mmsd_engine::{BearerController, Engine};
use mmsd_storage::SqliteStore;
use tokio::sync::broadcast;

use crate::mock_bearer::MockBearer;
use crate::mock_mmsc::MockMmsc;
use crate::pdus;

/// How long [`TestHarness::wait`] waits for a terminal state.
const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: MmsdConfig,
    seed: Vec<Message>,
    start: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = MmsdConfig::default();
        // Retries run back to back unless a test asks otherwise.
        config.engine.initial_backoff_secs = 0;
        config.engine.max_backoff_secs = 0;
        config.engine.drain_timeout_secs = 2;
        config.transfer.timeout_secs = 5;
        config.bearer.activation_timeout_secs = 5;
        config.carrier.modem_number = Some("+15552223333".to_string());
        Self {
            config,
            seed: Vec::new(),
            start: true,
        }
    }

    /// Adjust the configuration before the engine is built.
    pub fn with_config(mut self, f: impl FnOnce(&mut MmsdConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Store `msg` before the engine starts, as if left by an earlier run.
    pub fn with_message(mut self, msg: Message) -> Self {
        self.seed.push(msg);
        self
    }

    /// Build without calling [`Engine::start`].
    pub fn stopped(mut self) -> Self {
        self.start = false;
        self
    }

    pub async fn build(self) -> Result<TestHarness, MmsdError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| MmsdError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("mmsd-test.db");

        let store = Arc::new(SqliteStore::new(&db_path, true));
        store.initialize().await?;
        for msg in &self.seed {
            store.put(msg).await?;
        }

        let bearer = Arc::new(MockBearer::new());
        let mmsc = Arc::new(MockMmsc::new());
        let engine = engine_over(&self.config, &store, &bearer, &mmsc);
        let events = engine.subscribe();
        if self.start {
            engine.start().await?;
        }

        Ok(TestHarness {
            engine,
            store,
            bearer,
            mmsc,
            config: self.config,
            events: Mutex::new(events),
            recorded: Mutex::new(Vec::new()),
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

fn engine_over(
    config: &MmsdConfig,
    store: &Arc<SqliteStore>,
    bearer: &Arc<MockBearer>,
    mmsc: &Arc<MockMmsc>,
) -> Engine {
    let controller = BearerController::from_config(bearer.clone(), &config.bearer);
    Engine::new(config, store.clone(), controller, mmsc.clone())
}

/// An engine wired to mocks, with its events recorded.
pub struct TestHarness {
    pub engine: Engine,
    /// The engine's store (temp DB, removed on drop).
    pub store: Arc<SqliteStore>,
    pub bearer: Arc<MockBearer>,
    pub mmsc: Arc<MockMmsc>,
    pub config: MmsdConfig,
    events: Mutex<broadcast::Receiver<MessageEvent>>,
    recorded: Mutex<Vec<MessageEvent>>,
    db_path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Every event published so far.
    pub fn events(&self) -> Vec<MessageEvent> {
        let mut rx = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let mut recorded = self.recorded.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            match rx.try_recv() {
                Ok(event) => recorded.push(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    panic!("event recorder lagged by {skipped} events")
                }
                Err(_) => break,
            }
        }
        recorded.clone()
    }

    /// States `id` moved through, in order, as announced by the engine.
    pub fn states(&self, id: &MessageId) -> Vec<TransactionState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MessageEvent::StateChanged { id: changed, to, .. } if changed == *id => Some(to),
                _ => None,
            })
            .collect()
    }

    /// Panics unless every recorded transition is allowed and each
    /// message's transitions chain up.
    pub fn assert_valid_transitions(&self) {
        let mut last: Vec<(MessageId, TransactionState)> = Vec::new();
        for event in self.events() {
            let MessageEvent::StateChanged { id, from, to } = event else {
                continue;
            };
            assert!(
                from.can_transition_to(to),
                "{id}: illegal transition {from} -> {to}"
            );
            match last.iter_mut().find(|(seen, _)| *seen == id) {
                Some((_, state)) => {
                    assert_eq!(*state, from, "{id}: transition from {from} after {state}");
                    *state = to;
                }
                None => last.push((id, to)),
            }
        }
    }

    /// Waits for `id` to reach a terminal state.
    pub async fn wait(&self, id: &MessageId) -> TransactionState {
        tokio::time::timeout(WAIT_LIMIT, self.engine.wait_for_terminal(id))
            .await
            .unwrap_or_else(|_| panic!("{id} did not finish in {WAIT_LIMIT:?}"))
            .unwrap_or_else(|e| panic!("waiting for {id} failed: {e}"))
    }

    pub async fn message(&self, id: &MessageId) -> Message {
        self.engine
            .get_message(id)
            .await
            .unwrap_or_else(|e| panic!("{id} should be stored: {e}"))
    }

    /// Publishes `body` at `location` and pushes a notification for it.
    pub async fn deliver(&self, tid: &str, location: &str, body: Vec<u8>) -> Option<MessageId> {
        self.mmsc.publish(location, body);
        let push = pdus::notification_push(pdus::notification(tid, location));
        self.engine
            .handle_push(&push)
            .await
            .unwrap_or_else(|e| panic!("push should be accepted: {e}"))
    }

    /// Stops the engine and starts a fresh one over the same database.
    ///
    /// Events recorded so far are kept.
    pub async fn restart(&mut self) -> Result<(), MmsdError> {
        self.events();
        self.engine.shutdown().await?;

        let store = Arc::new(SqliteStore::new(&self.db_path, true));
        store.initialize().await?;
        let engine = engine_over(&self.config, &store, &self.bearer, &self.mmsc);
        *self.events.lock().unwrap_or_else(|e| e.into_inner()) = engine.subscribe();
        engine.start().await?;

        self.store = store;
        self.engine = engine;
        Ok(())
    }
}
