// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Scribe integration tests.
//!
//! # Components
//!
//! - [`TestStore`] - a store in a temp directory with its own middleware registry
//! - [`Recording`] - write middleware that logs its phases to an [`EventLog`]

pub mod harness;
pub mod recording;

pub use harness::{TestStore, TestStoreBuilder};
pub use recording::{EventLog, Recording};
