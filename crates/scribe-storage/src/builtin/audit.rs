// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit trail middleware.
//!
//! Records one row per write in `_scribe_audit`, on the writer connection and
//! inside the write's transaction. A transactional write that fails rolls its
//! audit row back with it; non-transactional failures stay recorded.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::Connection;
use scribe_core::{Actor, BoxError, TaskId};

use crate::middleware::{Wrap, WriteContext, WriteMiddleware, WriteMiddlewareFactory, WriteOutcome};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS _scribe_audit (
    id TEXT PRIMARY KEY,
    store TEXT NOT NULL,
    task_outcome TEXT NOT NULL,
    actor_id TEXT,
    error TEXT,
    recorded_at TEXT NOT NULL
)";

/// Factory for the audit unit.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    stores: Option<HashSet<String>>,
}

impl AuditTrail {
    /// Audit writes to every store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit writes to the named stores only.
    pub fn for_stores<I, S>(stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stores: Some(stores.into_iter().map(Into::into).collect()),
        }
    }

    fn covers(&self, store: &str) -> bool {
        self.stores.as_ref().is_none_or(|stores| stores.contains(store))
    }
}

impl WriteMiddlewareFactory for AuditTrail {
    fn create(&self, ctx: &WriteContext<'_>) -> Wrap {
        if !self.covers(ctx.store) {
            return Wrap::Skip;
        }
        Wrap::unit(AuditUnit {
            store: ctx.store.to_string(),
            task_id: ctx.task_id,
            actor_id: ctx
                .request
                .and_then(|request| request.get::<Actor>())
                .map(|actor| actor.id.clone()),
        })
    }
}

struct AuditUnit {
    store: String,
    task_id: TaskId,
    actor_id: Option<String>,
}

impl WriteMiddleware for AuditUnit {
    fn before(&mut self, conn: &Connection) -> Result<(), BoxError> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(())
    }

    fn after(&mut self, conn: &Connection, outcome: &WriteOutcome<'_>) -> Result<(), BoxError> {
        let (task_outcome, error) = match outcome.error() {
            None => ("ok", None),
            Some(err) => ("error", Some(err.to_string())),
        };
        conn.execute(
            "INSERT INTO _scribe_audit (id, store, task_outcome, actor_id, error, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                self.task_id.to_string(),
                self.store,
                task_outcome,
                self.actor_id,
                error,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// A row of the audit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: String,
    pub store: String,
    pub task_outcome: String,
    pub actor_id: Option<String>,
    pub error: Option<String>,
    pub recorded_at: String,
}

impl AuditEntry {
    /// Every recorded entry, oldest first. Empty if nothing was audited yet.
    pub fn load_all(conn: &Connection) -> rusqlite::Result<Vec<AuditEntry>> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_scribe_audit')",
            [],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(
            "SELECT id, store, task_outcome, actor_id, error, recorded_at \
             FROM _scribe_audit ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                store: row.get(1)?,
                task_outcome: row.get(2)?,
                actor_id: row.get(3)?,
                error: row.get(4)?,
                recorded_at: row.get(5)?,
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use scribe_core::{RequestContext, ScribeError};

    use super::*;

    fn ctx<'a>(store: &'a str, request: Option<&'a RequestContext>) -> WriteContext<'a> {
        WriteContext {
            store,
            request,
            transactional: false,
            task_id: TaskId::new(),
        }
    }

    #[test]
    fn store_filter_skips_other_stores() {
        let trail = AuditTrail::for_stores(["main"]);
        assert!(matches!(trail.create(&ctx("main", None)), Wrap::Unit(_)));
        assert!(matches!(trail.create(&ctx("cache", None)), Wrap::Skip));
        assert!(matches!(AuditTrail::new().create(&ctx("cache", None)), Wrap::Unit(_)));
    }

    #[test]
    fn records_actor_and_failure() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(AuditEntry::load_all(&conn).unwrap().is_empty());

        let request = RequestContext::new(Actor::new("alice"));
        let Wrap::Unit(mut unit) = AuditTrail::new().create(&ctx("main", Some(&request))) else {
            panic!("expected a unit");
        };
        unit.before(&conn).unwrap();
        let err = ScribeError::operation("deliberate");
        unit.after(&conn, &WriteOutcome::Failure(&err)).unwrap();

        let entries = AuditEntry::load_all(&conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].store, "main");
        assert_eq!(entries[0].task_outcome, "error");
        assert_eq!(entries[0].actor_id.as_deref(), Some("alice"));
        assert_eq!(entries[0].error.as_deref(), Some("deliberate"));
    }
}
