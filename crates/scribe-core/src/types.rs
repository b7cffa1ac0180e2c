// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared between callers, the write engine, and middleware.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to every write task, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque caller-supplied data passed through to write middleware.
///
/// The engine never inspects the payload. Middleware that knows the concrete
/// type recovers it with [`RequestContext::get`]. Cloning is cheap.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<dyn Any + Send + Sync>,
}

impl RequestContext {
    /// Wrap an arbitrary value as a request context.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Borrow the payload if it is a `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns true if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext").finish_non_exhaustive()
    }
}

/// The authenticated identity behind a request, as produced by a token verifier.
///
/// A conventional request-context payload: the engine does not require it, but
/// the built-in audit middleware reads it when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Attach an extra attribute (e.g. a correlation id or token kind).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Per-call options accepted by every write entry point.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Wrap the operation and all middleware phases in one transaction.
    pub transaction: bool,
    /// Opaque context forwarded to middleware factories.
    pub request: Option<RequestContext>,
    /// How long the caller waits for the result. The task is not cancelled.
    pub timeout: Option<Duration>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_transaction(mut self) -> Self {
        self.transaction = false;
        self
    }

    pub fn with_transaction(mut self, transaction: bool) -> Self {
        self.transaction = transaction;
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            transaction: true,
            request: None,
            timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_serializes_as_bare_uuid() {
        let id = TaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[derive(Debug, PartialEq)]
    struct ChangeGroup {
        group_id: i64,
    }

    #[test]
    fn write_options_default_to_transactional() {
        let opts = WriteOptions::default();
        assert!(opts.transaction);
        assert!(opts.request.is_none());
        assert!(opts.timeout.is_none());
        assert!(!opts.without_transaction().transaction);
    }

    #[test]
    fn request_context_downcasts_to_payload_type() {
        let ctx = RequestContext::new(ChangeGroup { group_id: 7 });
        assert!(ctx.is::<ChangeGroup>());
        assert_eq!(ctx.get::<ChangeGroup>(), Some(&ChangeGroup { group_id: 7 }));
        assert!(ctx.get::<Actor>().is_none());

        let cloned = ctx.clone();
        assert_eq!(cloned.get::<ChangeGroup>().map(|g| g.group_id), Some(7));
    }

    #[test]
    fn actor_serializes_with_attributes() {
        let actor = Actor::new("root").with_attribute("token", "dstok");
        let json = serde_json::to_value(&actor).unwrap();
        assert_eq!(json["id"], "root");
        assert_eq!(json["attributes"]["token"], "dstok");

        let parsed: Actor = serde_json::from_value(serde_json::json!({"id": "alice"})).unwrap();
        assert!(parsed.attributes.is_empty());
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }
}
