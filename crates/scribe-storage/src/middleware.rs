// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write middleware: extension-supplied before/after pairs composed around
//! every serialized write.
//!
//! For each task the writer asks every registered [`WriteMiddlewareFactory`]
//! (in registration order) for a unit. Units are driven with stack
//! discipline: befores run in order, the write runs, then afters run in the
//! reverse order of the befores that actually ran. Afters observe the write's
//! outcome but cannot change it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rusqlite::Connection;
use scribe_core::{BoxError, Phase, RequestContext, ScribeError, TaskId};
use tracing::warn;

use crate::registry::RegisteredFactory;
use crate::task::{Operation, TaskResult};

/// What a factory learns about the write it is asked to wrap.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    /// Name of the store being written to.
    pub store: &'a str,
    /// Caller-supplied context, passed through untouched.
    pub request: Option<&'a RequestContext>,
    /// Whether the write runs inside a transaction.
    pub transactional: bool,
    /// Identifier of the task, for correlation in logs and audit rows.
    pub task_id: TaskId,
}

/// The outcome an after phase observes.
#[derive(Debug, Clone, Copy)]
pub enum WriteOutcome<'a> {
    /// The write produced a value. Downcast with [`WriteOutcome::value`].
    Success(&'a (dyn Any + Send)),
    /// The write, or an earlier before phase, failed.
    Failure(&'a ScribeError),
}

impl<'a> WriteOutcome<'a> {
    pub fn is_success(&self) -> bool {
        matches!(self, WriteOutcome::Success(_))
    }

    /// The write's result, if it succeeded and is a `T`.
    pub fn value<T: Any>(&self) -> Option<&'a T> {
        match self {
            WriteOutcome::Success(value) => value.downcast_ref::<T>(),
            WriteOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&'a ScribeError> {
        match self {
            WriteOutcome::Success(_) => None,
            WriteOutcome::Failure(err) => Some(err),
        }
    }
}

/// A two-phase wrap unit built for a single write.
///
/// Both phases run on the writer thread against the same connection as the
/// write itself, inside its transaction when there is one.
pub trait WriteMiddleware {
    /// Runs before the write. An error stops the write from running.
    fn before(&mut self, _conn: &Connection) -> Result<(), BoxError> {
        Ok(())
    }

    /// Runs after the write, or after a failed before phase further in.
    ///
    /// Errors are logged and counted but never replace the outcome the
    /// caller receives.
    fn after(&mut self, _conn: &Connection, _outcome: &WriteOutcome<'_>) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A factory's answer for one write.
pub enum Wrap {
    /// Wrap the write with this unit.
    Unit(Box<dyn WriteMiddleware>),
    /// Do not take part in this write.
    Skip,
}

impl Wrap {
    pub fn unit(middleware: impl WriteMiddleware + 'static) -> Self {
        Wrap::Unit(Box::new(middleware))
    }
}

impl std::fmt::Debug for Wrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Wrap::Unit(_) => f.write_str("Wrap::Unit"),
            Wrap::Skip => f.write_str("Wrap::Skip"),
        }
    }
}

/// Provider of wrap units, installed in a [`MiddlewareRegistry`](crate::MiddlewareRegistry).
///
/// Consulted afresh for every write, so it may decide per request.
pub trait WriteMiddlewareFactory: Send + Sync {
    fn create(&self, ctx: &WriteContext<'_>) -> Wrap;
}

/// Adapts a closure into a factory. See [`MiddlewareRegistry::register_fn`](crate::MiddlewareRegistry::register_fn).
pub(crate) struct FnFactory<F>(pub F);

impl<F> WriteMiddlewareFactory for FnFactory<F>
where
    F: Fn(&WriteContext<'_>) -> Wrap + Send + Sync,
{
    fn create(&self, ctx: &WriteContext<'_>) -> Wrap {
        (self.0)(ctx)
    }
}

/// The result of driving a chain: the write's outcome plus the units whose
/// after phase failed while observing it.
pub(crate) struct ChainOutput {
    pub result: TaskResult,
    pub failed_observers: Vec<Arc<str>>,
}

struct ChainUnit {
    name: Arc<str>,
    unit: Box<dyn WriteMiddleware>,
}

/// The wrap units built for one write, in registration order.
pub(crate) struct MiddlewareChain {
    units: Vec<ChainUnit>,
}

impl MiddlewareChain {
    /// Ask every factory for a unit. A panicking factory fails the write
    /// before anything has run.
    pub fn build(factories: &[RegisteredFactory], ctx: &WriteContext<'_>) -> Result<Self, ScribeError> {
        let mut units = Vec::new();
        for registered in factories {
            let wrap = panic::catch_unwind(AssertUnwindSafe(|| registered.factory().create(ctx)))
                .map_err(|payload| ScribeError::Middleware {
                    name: registered.name().to_string(),
                    phase: Phase::Before,
                    source: panic_message(payload).into(),
                })?;
            if let Wrap::Unit(unit) = wrap {
                units.push(ChainUnit {
                    name: Arc::clone(registered.name_arc()),
                    unit,
                });
            }
        }
        Ok(Self { units })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Run befores, the operation, then afters in reverse.
    pub fn drive(mut self, conn: &Connection, operation: Operation) -> ChainOutput {
        let mut entered = 0;
        let mut before_failure = None;
        for chain_unit in self.units.iter_mut() {
            match guarded(|| chain_unit.unit.before(conn)) {
                Ok(()) => entered += 1,
                Err(source) => {
                    warn!(middleware = %chain_unit.name, phase = %Phase::Before, error = %source, "write middleware before phase failed");
                    before_failure = Some(ScribeError::Middleware {
                        name: chain_unit.name.to_string(),
                        phase: Phase::Before,
                        source,
                    });
                    break;
                }
            }
        }

        let result = match before_failure {
            Some(err) => Err(err),
            None => guarded(|| operation(conn)).map_err(ScribeError::Operation),
        };

        let mut failed_observers = Vec::new();
        for chain_unit in self.units[..entered].iter_mut().rev() {
            let outcome = match &result {
                Ok(value) => WriteOutcome::Success(&**value),
                Err(err) => WriteOutcome::Failure(err),
            };
            if let Err(err) = guarded(|| chain_unit.unit.after(conn, &outcome)) {
                warn!(middleware = %chain_unit.name, phase = %Phase::After, error = %err, "write middleware after phase failed");
                failed_observers.push(Arc::clone(&chain_unit.name));
            }
        }

        ChainOutput {
            result,
            failed_observers,
        }
    }
}

/// Run a phase, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload).into()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
