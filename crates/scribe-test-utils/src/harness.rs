// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness: a file-backed store in a temp directory.
//!
//! Each `TestStore` gets its own [`MiddlewareRegistry`], so tests can register
//! middleware without touching the process-wide registry.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::types::Value;
use scribe_config::{StoreConfig, WriterConfig};
use scribe_core::ScribeError;
use scribe_storage::{Database, MiddlewareRegistry};

/// Builder for [`TestStore`].
pub struct TestStoreBuilder {
    name: String,
    writer: WriterConfig,
    registry: Option<Arc<MiddlewareRegistry>>,
    wal_mode: bool,
}

impl TestStoreBuilder {
    fn new() -> Self {
        Self {
            name: "test".to_string(),
            writer: WriterConfig::default(),
            registry: None,
            wal_mode: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_writer_config(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Use an existing registry, e.g. [`MiddlewareRegistry::global`].
    pub fn with_registry(mut self, registry: Arc<MiddlewareRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_wal_mode(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub async fn build(self) -> Result<TestStore, ScribeError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ScribeError::Storage { source: e.into() })?;
        let path = temp_dir.path().join(format!("{}.db", self.name));

        let mut store = StoreConfig::file(self.name, path.to_string_lossy());
        store.wal_mode = self.wal_mode;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(MiddlewareRegistry::new()));
        let db = Database::open(&store, &self.writer, Arc::clone(&registry)).await?;

        Ok(TestStore {
            db,
            registry,
            path,
            _temp_dir: temp_dir,
        })
    }
}

/// An open store plus the registry its writer consults.
pub struct TestStore {
    pub db: Database,
    pub registry: Arc<MiddlewareRegistry>,
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestStore {
    pub fn builder() -> TestStoreBuilder {
        TestStoreBuilder::new()
    }

    /// Store with default settings and an empty private registry.
    pub async fn new() -> Result<Self, ScribeError> {
        Self::builder().build().await
    }

    /// Row count of `table`, read through the store's read connection.
    pub async fn count(&self, table: &str) -> Result<i64, ScribeError> {
        let result = self
            .db
            .execute(&format!("SELECT COUNT(*) FROM {table}"), [])
            .await?;
        match result.first_value() {
            Some(Value::Integer(n)) => Ok(*n),
            other => Err(ScribeError::Internal(format!(
                "unexpected COUNT(*) result: {other:?}"
            ))),
        }
    }

    /// A separate connection for inspecting the file once the store is closed.
    pub fn inspector(&self) -> rusqlite::Result<rusqlite::Connection> {
        rusqlite::Connection::open(&self.path)
    }

    pub async fn close(&self) -> Result<(), ScribeError> {
        self.db.close().await
    }
}
