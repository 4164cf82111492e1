// SPDX-FileCopyrightText: 2026 mmsd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for mmsd integration tests.
//!
//! Provides mock adapters and harness infrastructure for fast,
//! deterministic tests without a modem or a carrier MMSC.
//!
//! # Components
//!
//! - [`MockBearer`] - Modem stand-in with scripted activation results
//! - [`MockMmsc`] - Scripted MMSC that records every GET and POST
//! - [`TestHarness`] - Engine over a temp SQLite store wired to both mocks
//! - [`pdus`] - Builders for the PDUs a carrier would send

pub mod harness;
pub mod mock_bearer;
pub mod mock_mmsc;
pub mod pdus;

pub use harness::TestHarness;
pub use mock_bearer::MockBearer;
pub use mock_mmsc::MockMmsc;
