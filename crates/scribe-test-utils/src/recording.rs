// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording write middleware for asserting phase order in tests.
//!
//! `Recording` is a factory whose units push a marker into a shared
//! [`EventLog`] for every phase they run. Unlabelled units log `before` and
//! `after`; labelled ones log `{label}-before` and `{label}-after`.

use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;
use scribe_core::BoxError;
use scribe_storage::{Wrap, WriteContext, WriteMiddleware, WriteMiddlewareFactory, WriteOutcome};

/// Ordered log shared between a test and the writer thread.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    /// A copy of everything logged so far.
    pub fn entries(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Factory for recording units.
#[derive(Debug, Clone)]
pub struct Recording {
    label: String,
    log: EventLog,
    fail_before: Option<String>,
    fail_after: Option<String>,
    with_outcome: bool,
}

impl Recording {
    /// Unlabelled recorder: logs `before` and `after`.
    pub fn new(log: &EventLog) -> Self {
        Self::labelled("", log)
    }

    pub fn labelled(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: log.clone(),
            fail_before: None,
            fail_after: None,
            with_outcome: false,
        }
    }

    /// Make the before phase fail with `message` after logging.
    pub fn failing_before(mut self, message: impl Into<String>) -> Self {
        self.fail_before = Some(message.into());
        self
    }

    /// Make the after phase fail with `message` after logging.
    pub fn failing_after(mut self, message: impl Into<String>) -> Self {
        self.fail_after = Some(message.into());
        self
    }

    /// Append `:ok` or `:err(<message>)` to the after marker.
    pub fn with_outcome(mut self) -> Self {
        self.with_outcome = true;
        self
    }

    fn marker(&self, phase: &str) -> String {
        if self.label.is_empty() {
            phase.to_string()
        } else {
            format!("{}-{phase}", self.label)
        }
    }
}

impl WriteMiddlewareFactory for Recording {
    fn create(&self, _ctx: &WriteContext<'_>) -> Wrap {
        Wrap::unit(RecordingUnit {
            recording: self.clone(),
        })
    }
}

struct RecordingUnit {
    recording: Recording,
}

impl WriteMiddleware for RecordingUnit {
    fn before(&mut self, _conn: &Connection) -> Result<(), BoxError> {
        let recording = &self.recording;
        recording.log.push(recording.marker("before"));
        match &recording.fail_before {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    fn after(&mut self, _conn: &Connection, outcome: &WriteOutcome<'_>) -> Result<(), BoxError> {
        let recording = &self.recording;
        let mut marker = recording.marker("after");
        if recording.with_outcome {
            match outcome.error() {
                None => marker.push_str(":ok"),
                Some(err) => marker.push_str(&format!(":err({err})")),
            }
        }
        recording.log.push(marker);
        match &recording.fail_after {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}
