// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write tasks: the unit of work carried through a store's writer queue.

use std::any::Any;
use std::time::Instant;

use rusqlite::Connection;
use scribe_core::{BoxError, RequestContext, ScribeError, TaskId, WriteOptions};
use tokio::sync::oneshot;
use tracing::Span;

/// A type-erased write operation run against the writer's connection.
pub(crate) type Operation =
    Box<dyn FnOnce(&Connection) -> Result<Box<dyn Any + Send>, BoxError> + Send>;

/// What a task resolves its result slot with.
pub(crate) type TaskResult = Result<Box<dyn Any + Send>, ScribeError>;

/// Erase the result type of a caller's write function.
pub(crate) fn erase<F, R>(f: F) -> Operation
where
    F: FnOnce(&Connection) -> Result<R, BoxError> + Send + 'static,
    R: Send + 'static,
{
    Box::new(move |conn| f(conn).map(|value| Box::new(value) as Box<dyn Any + Send>))
}

/// Recover the concrete result type erased by [`erase`].
pub(crate) fn unerase<R: 'static>(value: Box<dyn Any + Send>) -> Result<R, ScribeError> {
    value
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| ScribeError::Internal("write result has an unexpected type".into()))
}

/// A queued write.
///
/// Owned by the writer from enqueue until it has been executed and its
/// result slot resolved. Detached tasks have no result slot.
pub(crate) struct WriteTask {
    pub id: TaskId,
    pub operation: Operation,
    pub transactional: bool,
    pub request: Option<RequestContext>,
    pub result_slot: Option<oneshot::Sender<TaskResult>>,
    pub enqueued_at: Instant,
    /// The submitter's span, so writer-side logs nest under the caller's.
    pub span: Span,
}

impl WriteTask {
    /// Build a task whose result is delivered to the returned receiver.
    pub fn new(operation: Operation, options: &WriteOptions) -> (Self, oneshot::Receiver<TaskResult>) {
        let (slot, receiver) = oneshot::channel();
        let mut task = Self::detached(operation, options);
        task.result_slot = Some(slot);
        (task, receiver)
    }

    /// Build a task nobody waits on.
    pub fn detached(operation: Operation, options: &WriteOptions) -> Self {
        Self {
            id: TaskId::new(),
            operation,
            transactional: options.transaction,
            request: options.request.clone(),
            result_slot: None,
            enqueued_at: Instant::now(),
            span: Span::current(),
        }
    }

    /// True when the caller dropped its receiver before the task started.
    pub fn is_abandoned(&self) -> bool {
        self.result_slot.as_ref().is_some_and(|slot| slot.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erased_operation_round_trips_result_type() {
        let conn = Connection::open_in_memory().unwrap();
        let op = erase(|conn: &Connection| {
            let n: i64 = conn.query_row("SELECT 40 + 2", [], |row| row.get(0))?;
            Ok(n)
        });
        let value = op(&conn).unwrap();
        assert_eq!(unerase::<i64>(value).unwrap(), 42);
    }

    #[test]
    fn unerase_rejects_wrong_type() {
        let value: Box<dyn Any + Send> = Box::new("text");
        assert!(matches!(
            unerase::<i64>(value),
            Err(ScribeError::Internal(_))
        ));
    }

    #[test]
    fn dropped_receiver_marks_task_abandoned() {
        let op = erase(|_: &Connection| Ok(()));
        let (task, receiver) = WriteTask::new(op, &WriteOptions::default());
        assert!(task.transactional);
        assert!(!task.is_abandoned());
        drop(receiver);
        assert!(task.is_abandoned());

        let detached = WriteTask::detached(erase(|_: &Connection| Ok(())), &WriteOptions::default());
        assert!(!detached.is_abandoned());
    }
}
