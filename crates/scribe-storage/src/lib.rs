// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized write engine for embedded SQLite stores.
//!
//! Each store gets exactly one writer thread and one writer connection. Every
//! write, from any caller, is queued to that thread and executed strictly in
//! arrival order, wrapped in the middleware registered in a
//! [`MiddlewareRegistry`]. Reads use a separate connection and never queue.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scribe_config::{StoreConfig, WriterConfig};
//! use scribe_core::WriteOptions;
//! use scribe_storage::{Database, MiddlewareRegistry};
//!
//! # async fn demo() -> Result<(), scribe_core::ScribeError> {
//! let store = StoreConfig::file("main", "main.db");
//! let db = Database::open(&store, &WriterConfig::default(), MiddlewareRegistry::global()).await?;
//! db.execute_write_script("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY)", WriteOptions::default())
//!     .await?;
//! db.execute_write("INSERT INTO t DEFAULT VALUES", [], WriteOptions::default()).await?;
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod database;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod stores;
mod task;
pub mod writer;

pub use builtin::{AuditEntry, AuditTrail};
pub use database::{Database, QueryResult, WriteSummary};
pub use crate::metrics::describe_metrics;
pub use middleware::{Wrap, WriteContext, WriteMiddleware, WriteMiddlewareFactory, WriteOutcome};
pub use registry::{MiddlewareRegistry, RegisteredFactory};
pub use stores::Stores;
pub use writer::{Writer, WriterStats};
