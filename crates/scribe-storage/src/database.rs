// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store handle: the serialized write path plus a separate read connection.
//!
//! All writes are queued on the store's [`Writer`]. Reads go through their
//! own `tokio-rusqlite` connection opened with `query_only`, so they never
//! wait behind the write queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::types::Value;
use rusqlite::{Connection, Params};
use scribe_config::{StoreConfig, WriterConfig};
use scribe_core::{BoxError, ScribeError, TaskId, WriteOptions};
use tracing::{debug, info};

use crate::registry::MiddlewareRegistry;
use crate::task::{erase, unerase};
use crate::writer::{Writer, WriterStats};

/// What a single-statement write changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows_affected: usize,
    pub last_insert_rowid: i64,
}

/// Rows returned by a read query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first column of the first row, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }
}

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ScribeError {
    ScribeError::Storage {
        source: Box::new(e),
    }
}

/// An open store.
pub struct Database {
    name: String,
    writer: Writer,
    reader: tokio_rusqlite::Connection,
    closed: AtomicBool,
}

impl Database {
    /// Open a store: start its writer thread, then its read connection.
    pub async fn open(
        store: &StoreConfig,
        writer_config: &WriterConfig,
        registry: Arc<MiddlewareRegistry>,
    ) -> Result<Self, ScribeError> {
        let writer = Writer::spawn(store, writer_config, registry).await?;

        let reader = match open_reader(store).await {
            Ok(reader) => reader,
            Err(err) => {
                let _ = writer.shutdown().await;
                return Err(err);
            }
        };

        info!(store = %store.name, wal = store.wal_mode && !store.is_memory(), "store opened");
        Ok(Self {
            name: store.name.clone(),
            writer,
            reader,
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run one SQL statement through the write queue.
    pub async fn execute_write<P>(
        &self,
        sql: &str,
        params: P,
        options: WriteOptions,
    ) -> Result<WriteSummary, ScribeError>
    where
        P: Params + Send + 'static,
    {
        let sql = sql.to_string();
        self.execute_write_fn(
            move |conn| {
                let rows_affected = conn.execute(&sql, params)?;
                Ok(WriteSummary {
                    rows_affected,
                    last_insert_rowid: conn.last_insert_rowid(),
                })
            },
            options,
        )
        .await
    }

    /// Run a multi-statement SQL script through the write queue.
    pub async fn execute_write_script(
        &self,
        sql: &str,
        options: WriteOptions,
    ) -> Result<(), ScribeError> {
        let sql = sql.to_string();
        self.execute_write_fn(
            move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            },
            options,
        )
        .await
    }

    /// Run one statement once per parameter set, as a single task.
    ///
    /// Returns the total number of rows affected.
    pub async fn execute_write_many<P>(
        &self,
        sql: &str,
        params_seq: Vec<P>,
        options: WriteOptions,
    ) -> Result<usize, ScribeError>
    where
        P: Params + Send + 'static,
    {
        let sql = sql.to_string();
        self.execute_write_fn(
            move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let mut total = 0;
                for params in params_seq {
                    total += stmt.execute(params)?;
                }
                Ok(total)
            },
            options,
        )
        .await
    }

    /// Run `f` on the writer connection and return its result.
    ///
    /// `f` runs after every registered middleware's before phase and, unless
    /// `options` opts out, inside an IMMEDIATE transaction that commits when
    /// `f` succeeds.
    pub async fn execute_write_fn<F, R>(&self, f: F, options: WriteOptions) -> Result<R, ScribeError>
    where
        F: FnOnce(&Connection) -> Result<R, BoxError> + Send + 'static,
        R: Send + 'static,
    {
        let value = self.writer.submit(erase(f), &options).await?;
        unerase(value)
    }

    /// Queue `f` without waiting for it. Failures are only logged.
    pub async fn spawn_write_fn<F, R>(&self, f: F, options: WriteOptions) -> Result<TaskId, ScribeError>
    where
        F: FnOnce(&Connection) -> Result<R, BoxError> + Send + 'static,
        R: Send + 'static,
    {
        let task_id = self.writer.submit_detached(erase(f), &options).await?;
        debug!(store = %self.name, %task_id, "queued detached write");
        Ok(task_id)
    }

    /// Run a read-only query on the read connection.
    pub async fn execute<P>(&self, sql: &str, params: P) -> Result<QueryResult, ScribeError>
    where
        P: Params + Send + 'static,
    {
        let sql = sql.to_string();
        self.reader
            .call(move |conn| -> Result<QueryResult, rusqlite::Error> {
                let mut stmt = conn.prepare(&sql)?;
                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                let width = columns.len();
                let rows = stmt
                    .query_map(params, |row| {
                        (0..width)
                            .map(|idx| row.get::<_, Value>(idx))
                            .collect::<Result<Vec<_>, _>>()
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(QueryResult { columns, rows })
            })
            .await
            .map_err(map_tr_err)
    }

    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }

    /// Drain the write queue, checkpoint the WAL and close both connections.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), ScribeError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.writer.shutdown().await?;
        self.reader.clone().close().await.map_err(map_tr_err)?;
        info!(store = %self.name, "store closed");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

async fn open_reader(store: &StoreConfig) -> Result<tokio_rusqlite::Connection, ScribeError> {
    let reader = tokio_rusqlite::Connection::open(store.open_target())
        .await
        .map_err(|e| ScribeError::Storage {
            source: Box::new(e),
        })?;
    let busy_timeout = store.busy_timeout();
    reader
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.pragma_update(None, "query_only", true)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(reader)
}
