// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-store writer: one OS thread, one connection, one FIFO queue.
//!
//! Every write to a store is funnelled through its [`Writer`]. Callers enqueue
//! a task and await its result slot; the writer thread dequeues tasks one at a
//! time, wraps each in the registered middleware and (optionally) an
//! IMMEDIATE transaction, and resolves the slot. No other connection ever
//! writes to the store, so writes never contend for the SQLite write lock.
//!
//! **Do NOT open additional connections for writes.**

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};
use scribe_config::{StoreConfig, WriterConfig};
use scribe_core::{ScribeError, TaskId, WriteOptions};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, debug_span, error, info, warn};

use crate::metrics;
use crate::middleware::{ChainOutput, MiddlewareChain, WriteContext};
use crate::registry::{MiddlewareRegistry, RegisteredFactory};
use crate::task::{Operation, WriteTask};

/// Reason recorded when a store is closed on request.
const CLOSED: &str = "store is closed";

pub(crate) enum Message {
    Task(WriteTask),
    Shutdown(oneshot::Sender<Result<(), ScribeError>>),
    /// Put the writer into its failed state as if connection recovery failed.
    #[cfg(test)]
    Fail(String),
}

/// Counters for a single writer, as of the moment they were read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Tasks enqueued but not yet started.
    pub queued: usize,
    /// Tasks whose write succeeded.
    pub completed: u64,
    /// Tasks that resolved with an error.
    pub failed: u64,
    /// Abandoned tasks the writer skipped without running.
    pub skipped: u64,
    /// After phases that failed and were ignored.
    pub middleware_failures: u64,
}

/// State visible to both the writer thread and its handles.
struct Shared {
    store: String,
    queued: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    middleware_failures: AtomicU64,
    /// Set once the writer stops accepting tasks.
    closed: OnceLock<String>,
}

impl Shared {
    fn new(store: &str) -> Self {
        Self {
            store: store.to_string(),
            queued: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            middleware_failures: AtomicU64::new(0),
            closed: OnceLock::new(),
        }
    }

    fn unavailable(&self) -> ScribeError {
        let reason = self
            .closed
            .get()
            .cloned()
            .unwrap_or_else(|| "writer thread has stopped".to_string());
        ScribeError::WriterUnavailable {
            store: self.store.clone(),
            reason,
        }
    }
}

/// Handle to a store's writer thread.
pub struct Writer {
    tx: mpsc::Sender<Message>,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    default_timeout: Option<Duration>,
}

impl Writer {
    /// Start the writer thread for `store` and wait until its connection is open.
    pub async fn spawn(
        store: &StoreConfig,
        config: &WriterConfig,
        registry: Arc<MiddlewareRegistry>,
    ) -> Result<Self, ScribeError> {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared::new(&store.name));
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread = {
            let store = store.clone();
            let shared = Arc::clone(&shared);
            let skip_abandoned = config.skip_abandoned;
            thread::Builder::new()
                .name(format!("scribe-writer-{}", store.name))
                .spawn(move || {
                    let conn = match open_connection(&store) {
                        Ok(conn) => {
                            let _ = ready_tx.send(Ok(()));
                            conn
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };
                    WriterLoop {
                        conn,
                        rx,
                        shared,
                        registry,
                        skip_abandoned,
                        checkpoint_on_close: store.wal_mode && !store.is_memory(),
                    }
                    .run();
                })
                .map_err(|err| ScribeError::Storage {
                    source: Box::new(err),
                })?
        };

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(ScribeError::Storage {
                    source: Box::new(err),
                });
            }
            Err(_) => {
                return Err(ScribeError::Internal(format!(
                    "writer thread for store `{}` exited before opening its connection",
                    store.name
                )));
            }
        }

        info!(
            store = %store.name,
            target = %store.open_target(),
            queue_capacity = config.queue_capacity,
            "writer started"
        );
        Ok(Self {
            tx,
            shared,
            thread: Mutex::new(Some(thread)),
            default_timeout: config.default_timeout(),
        })
    }

    /// Enqueue a write and wait for its result.
    ///
    /// A timeout bounds the whole wait, including the wait for queue space.
    /// A task that made it into the queue stays there and still runs; one that
    /// timed out waiting for space is never enqueued.
    pub(crate) async fn submit(
        &self,
        operation: Operation,
        options: &WriteOptions,
    ) -> Result<Box<dyn Any + Send>, ScribeError> {
        let (task, receiver) = WriteTask::new(operation, options);
        let task_id = task.id;
        let wait = async {
            self.enqueue(task).await?;
            receiver.await.map_err(|_| self.shared.unavailable())?
        };

        match options.timeout.or(self.default_timeout) {
            Some(duration) => match tokio::time::timeout(duration, wait).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(store = %self.shared.store, %task_id, ?duration, "stopped waiting for write");
                    Err(ScribeError::Timeout { duration })
                }
            },
            None => wait.await,
        }
    }

    /// Enqueue a write nobody waits on. Its outcome is only logged.
    pub(crate) async fn submit_detached(
        &self,
        operation: Operation,
        options: &WriteOptions,
    ) -> Result<TaskId, ScribeError> {
        let task = WriteTask::detached(operation, options);
        let task_id = task.id;
        self.enqueue(task).await?;
        Ok(task_id)
    }

    /// Wait for queue space, then hand the task to the writer.
    ///
    /// Cancel-safe: a caller dropped while waiting for space leaves no trace
    /// in the queue depth.
    async fn enqueue(&self, task: WriteTask) -> Result<(), ScribeError> {
        if self.shared.closed.get().is_some() {
            return Err(self.shared.unavailable());
        }
        let permit = self
            .tx
            .reserve()
            .await
            .map_err(|_| self.shared.unavailable())?;
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        permit.send(Message::Task(task));
        let depth = self.shared.queued.load(Ordering::SeqCst);
        metrics::set_queue_depth(&self.shared.store, depth);
        Ok(())
    }

    /// Stop the writer once every task queued so far has run.
    ///
    /// Tasks submitted afterwards fail with [`ScribeError::WriterUnavailable`].
    /// Calling this on a writer that has already stopped is a no-op.
    pub async fn shutdown(&self) -> Result<(), ScribeError> {
        let _ = self.shared.closed.set(CLOSED.to_string());
        let (ack, done) = oneshot::channel();
        let result = match self.tx.send(Message::Shutdown(ack)).await {
            Ok(()) => done.await.unwrap_or(Ok(())),
            Err(_) => Ok(()),
        };

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!(store = %self.shared.store, "writer thread did not exit cleanly");
            }
        }
        result
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            queued: self.shared.queued.load(Ordering::SeqCst),
            completed: self.shared.completed.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            skipped: self.shared.skipped.load(Ordering::SeqCst),
            middleware_failures: self.shared.middleware_failures.load(Ordering::SeqCst),
        }
    }

    /// True once the writer no longer accepts tasks.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.get().is_some() || self.tx.is_closed()
    }

    #[cfg(test)]
    pub(crate) async fn fail(&self, reason: &str) {
        let _ = self.tx.send(Message::Fail(reason.to_string())).await;
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("store", &self.shared.store)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Open the writer connection and apply the store's pragmas.
fn open_connection(store: &StoreConfig) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(store.open_target())?;
    if store.wal_mode && !store.is_memory() {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(store = %store.name, journal_mode = %mode, "WAL mode was not enabled");
        }
    }
    conn.busy_timeout(store.busy_timeout())?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

enum Exit {
    Disconnected,
    Shutdown(oneshot::Sender<Result<(), ScribeError>>),
    Failed(String),
}

/// The body of the writer thread.
struct WriterLoop {
    conn: Connection,
    rx: mpsc::Receiver<Message>,
    shared: Arc<Shared>,
    registry: Arc<MiddlewareRegistry>,
    skip_abandoned: bool,
    checkpoint_on_close: bool,
}

impl WriterLoop {
    fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        match self.serve() {
            Exit::Disconnected => {
                debug!(store = %shared.store, "all writer handles dropped");
                if let Err(err) = self.close() {
                    warn!(store = %shared.store, error = %err, "closing writer connection failed");
                }
            }
            Exit::Shutdown(ack) => {
                self.shut_queue(CLOSED.to_string());
                let result = self.close();
                if result.is_ok() {
                    info!(store = %shared.store, "writer stopped");
                }
                let _ = ack.send(result);
            }
            Exit::Failed(reason) => {
                error!(store = %shared.store, %reason, "writer connection is unusable, failing queued writes");
                self.shut_queue(reason);
                if let Err(err) = self.close() {
                    warn!(store = %shared.store, error = %err, "closing writer connection failed");
                }
            }
        }
    }

    fn serve(&mut self) -> Exit {
        while let Some(message) = self.rx.blocking_recv() {
            match message {
                Message::Task(task) => {
                    let depth = self
                        .shared
                        .queued
                        .fetch_sub(1, Ordering::SeqCst)
                        .saturating_sub(1);
                    metrics::set_queue_depth(&self.shared.store, depth);
                    if let Err(reason) = self.execute(task) {
                        return Exit::Failed(reason);
                    }
                }
                Message::Shutdown(ack) => return Exit::Shutdown(ack),
                #[cfg(test)]
                Message::Fail(reason) => return Exit::Failed(reason),
            }
        }
        Exit::Disconnected
    }

    /// Run one task and resolve its result slot.
    ///
    /// Returns an error only when the connection could not be returned to
    /// autocommit mode afterwards.
    fn execute(&mut self, task: WriteTask) -> Result<(), String> {
        let abandoned = task.is_abandoned();
        let WriteTask {
            id,
            operation,
            transactional,
            request,
            result_slot,
            enqueued_at,
            span: caller_span,
        } = task;
        let shared = Arc::clone(&self.shared);
        let store = shared.store.as_str();
        let span = debug_span!(parent: &caller_span, "write_task", store, task_id = %id);
        let _entered = span.enter();

        if self.skip_abandoned && abandoned {
            debug!("caller stopped waiting, skipping write");
            shared.skipped.fetch_add(1, Ordering::SeqCst);
            metrics::record_write(store, "skipped");
            return Ok(());
        }

        debug!(transactional, "write started");
        let factories = self.registry.snapshot();
        let ctx = WriteContext {
            store,
            request: request.as_ref(),
            transactional,
            task_id: id,
        };
        let output = if transactional {
            run_transactional(&mut self.conn, &factories, &ctx, operation)
        } else {
            run_direct(&self.conn, &factories, &ctx, operation)
        };

        for name in &output.failed_observers {
            shared.middleware_failures.fetch_add(1, Ordering::SeqCst);
            metrics::record_middleware_failure(store, name);
        }
        match &output.result {
            Ok(_) => {
                shared.completed.fetch_add(1, Ordering::SeqCst);
                metrics::record_write(store, "ok");
                debug!("write completed");
            }
            Err(err) => {
                shared.failed.fetch_add(1, Ordering::SeqCst);
                metrics::record_write(store, "error");
                if result_slot.is_some() {
                    debug!(error = %err, "write failed");
                } else {
                    warn!(error = %err, "detached write failed");
                }
            }
        }
        metrics::record_duration(store, enqueued_at.elapsed());

        let recovered = self.restore_autocommit();
        if let Some(slot) = result_slot {
            let _ = slot.send(output.result);
        }
        recovered
    }

    /// Roll back any transaction a task left open.
    fn restore_autocommit(&self) -> Result<(), String> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        warn!("write left a transaction open, rolling it back");
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|err| format!("could not roll back a leaked transaction: {err}"))
    }

    /// Stop accepting tasks and fail everything still queued.
    fn shut_queue(&mut self, reason: String) {
        let _ = self.shared.closed.set(reason);
        self.rx.close();
        let mut drained = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Task(task) => {
                    self.shared.queued.fetch_sub(1, Ordering::SeqCst);
                    drained += 1;
                    match task.result_slot {
                        Some(slot) => {
                            let _ = slot.send(Err(self.shared.unavailable()));
                        }
                        None => {
                            warn!(store = %self.shared.store, task_id = %task.id, "detached write dropped")
                        }
                    }
                }
                Message::Shutdown(ack) => {
                    let _ = ack.send(Ok(()));
                }
                #[cfg(test)]
                Message::Fail(_) => {}
            }
        }
        metrics::set_queue_depth(&self.shared.store, 0);
        if drained > 0 {
            debug!(store = %self.shared.store, drained, "failed queued writes");
        }
    }

    fn close(self) -> Result<(), ScribeError> {
        if self.checkpoint_on_close {
            if let Err(err) = self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                warn!(store = %self.shared.store, error = %err, "WAL checkpoint failed");
            } else {
                debug!(store = %self.shared.store, "WAL checkpoint complete");
            }
        }
        self.conn.close().map_err(|(_, err)| ScribeError::Storage {
            source: Box::new(err),
        })
    }
}

fn run_direct(
    conn: &Connection,
    factories: &[RegisteredFactory],
    ctx: &WriteContext<'_>,
    operation: Operation,
) -> ChainOutput {
    match MiddlewareChain::build(factories, ctx) {
        Ok(chain) => chain.drive(conn, operation),
        Err(err) => ChainOutput::failed(err),
    }
}

fn run_transactional(
    conn: &mut Connection,
    factories: &[RegisteredFactory],
    ctx: &WriteContext<'_>,
    operation: Operation,
) -> ChainOutput {
    let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
        Ok(tx) => tx,
        Err(err) => {
            return ChainOutput::failed(ScribeError::Transaction {
                stage: "begin",
                source: Box::new(err),
            });
        }
    };

    let mut output = match MiddlewareChain::build(factories, ctx) {
        Ok(chain) => chain.drive(&tx, operation),
        Err(err) => ChainOutput::failed(err),
    };
    if output.result.is_ok() {
        if let Err(err) = tx.commit() {
            output.result = Err(ScribeError::Transaction {
                stage: "commit",
                source: Box::new(err),
            });
        }
    } else if let Err(err) = tx.rollback() {
        warn!(error = %err, "rollback of failed write did not complete");
    }
    output
}

impl ChainOutput {
    fn failed(err: ScribeError) -> Self {
        ChainOutput {
            result: Err(err),
            failed_observers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    use tempfile::TempDir;

    use super::*;
    use crate::task::{erase, unerase};

    async fn file_writer(config: WriterConfig) -> (TempDir, Writer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("writer.db");
        let store = StoreConfig::file("unit", path.to_string_lossy());
        let writer = Writer::spawn(&store, &config, Arc::new(MiddlewareRegistry::new()))
            .await
            .unwrap();
        (dir, writer)
    }

    fn sleeper(millis: u64) -> Operation {
        erase(move |_: &Connection| {
            std::thread::sleep(Duration::from_millis(millis));
            Ok(())
        })
    }

    /// One long task running and one waiting, so a capacity-1 queue is full.
    async fn fill_queue(writer: &Writer) {
        writer
            .submit_detached(sleeper(300), &WriteOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        writer
            .submit_detached(sleeper(300), &WriteOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn operations_run_on_named_writer_thread() {
        let (_dir, writer) = file_writer(WriterConfig::default()).await;
        let op = erase(|_: &Connection| Ok(thread::current().name().map(str::to_string)));
        let value = writer.submit(op, &WriteOptions::default()).await.unwrap();
        let name = unerase::<Option<String>>(value).unwrap();
        assert_eq!(name.as_deref(), Some("scribe-writer-unit"));
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn open_failure_is_reported_from_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("x.db");
        let store = StoreConfig::file("broken", path.to_string_lossy());
        let err = Writer::spawn(
            &store,
            &WriterConfig::default(),
            Arc::new(MiddlewareRegistry::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScribeError::Storage { .. }));
    }

    #[tokio::test]
    async fn failed_writer_resolves_queued_tasks_as_unavailable() {
        let (_dir, writer) = file_writer(WriterConfig::default()).await;
        let ran = Arc::new(AtomicBool::new(false));

        writer
            .submit_detached(sleeper(100), &WriteOptions::default())
            .await
            .unwrap();
        writer.fail("disk on fire").await;

        let op = |ran: Arc<AtomicBool>| {
            erase(move |_: &Connection| {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        let options = WriteOptions::default();
        let (first, second) = tokio::join!(
            writer.submit(op(Arc::clone(&ran)), &options),
            writer.submit(op(Arc::clone(&ran)), &options),
        );

        for result in [first, second] {
            match result {
                Err(ScribeError::WriterUnavailable { store, reason }) => {
                    assert_eq!(store, "unit");
                    assert_eq!(reason, "disk on fire");
                }
                other => panic!("expected WriterUnavailable, got {other:?}"),
            }
        }
        assert!(!ran.load(Ordering::SeqCst));
        assert!(writer.is_closed());
        assert_eq!(writer.stats().queued, 0);

        let later = writer.submit(op(Arc::clone(&ran)), &options).await;
        assert!(matches!(later, Err(ScribeError::WriterUnavailable { .. })));
    }

    #[tokio::test]
    async fn shutdown_runs_earlier_tasks_and_rejects_later_ones() {
        let (_dir, writer) = file_writer(WriterConfig::default()).await;
        let create = erase(|conn: &Connection| {
            conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")?;
            Ok(())
        });
        writer.submit(create, &WriteOptions::default()).await.unwrap();
        writer.shutdown().await.unwrap();

        let stats = writer.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);

        let err = writer
            .submit(sleeper(0), &WriteOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("store is closed"));

        // A second shutdown is harmless.
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_tasks_are_skipped_when_configured() {
        let config = WriterConfig {
            skip_abandoned: true,
            ..WriterConfig::default()
        };
        let (_dir, writer) = file_writer(config).await;
        let ran = Arc::new(AtomicBool::new(false));

        writer
            .submit_detached(sleeper(100), &WriteOptions::default())
            .await
            .unwrap();
        let flag = Arc::clone(&ran);
        let (task, receiver) = WriteTask::new(
            erase(move |_: &Connection| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
            &WriteOptions::default(),
        );
        writer.enqueue(task).await.unwrap();
        drop(receiver);

        // Anything queued later runs after the skipped task.
        writer.submit(sleeper(0), &WriteOptions::default()).await.unwrap();
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(writer.stats().skipped, 1);
        assert_eq!(writer.stats().completed, 2);
    }

    #[tokio::test]
    async fn timeout_bounds_the_wait_not_the_write() {
        let (_dir, writer) = file_writer(WriterConfig::default()).await;
        let options = WriteOptions::default().with_timeout(Duration::from_millis(20));
        let err = writer.submit(sleeper(200), &options).await.unwrap_err();
        assert!(matches!(err, ScribeError::Timeout { .. }));

        // FIFO: this waits for the timed-out task to finish first.
        writer.submit(sleeper(0), &WriteOptions::default()).await.unwrap();
        assert_eq!(writer.stats().completed, 2);
    }

    #[tokio::test]
    async fn timeout_covers_waiting_for_queue_space() {
        let config = WriterConfig {
            queue_capacity: 1,
            ..WriterConfig::default()
        };
        let (_dir, writer) = file_writer(config).await;
        fill_queue(&writer).await;

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let op = erase(move |_: &Connection| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        let options = WriteOptions::default().with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        let err = writer.submit(op, &options).await.unwrap_err();
        assert!(matches!(err, ScribeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(250));

        // The timed-out task never reached the queue.
        writer.submit(sleeper(0), &WriteOptions::default()).await.unwrap();
        assert!(!ran.load(Ordering::SeqCst));
        let stats = writer.stats();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.queued, 0);
    }

    #[tokio::test]
    async fn cancelled_enqueue_does_not_skew_queue_depth() {
        let config = WriterConfig {
            queue_capacity: 1,
            ..WriterConfig::default()
        };
        let (_dir, writer) = file_writer(config).await;
        fill_queue(&writer).await;

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            writer.submit(sleeper(0), &WriteOptions::default()),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(writer.stats().queued, 1);

        writer.submit(sleeper(0), &WriteOptions::default()).await.unwrap();
        let stats = writer.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.completed, 3);
    }
}
