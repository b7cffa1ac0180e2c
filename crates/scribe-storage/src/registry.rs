// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of write middleware factories.
//!
//! Registration order is composition order: the first registered factory's
//! unit is the outermost wrap. Writers take a snapshot of the registry when a
//! task starts, so registering or unregistering never disturbs a task that is
//! already running.

use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use arc_swap::ArcSwap;
use scribe_core::ScribeError;
use tracing::{debug, info};

use crate::middleware::{FnFactory, Wrap, WriteContext, WriteMiddlewareFactory};

static GLOBAL: LazyLock<Arc<MiddlewareRegistry>> =
    LazyLock::new(|| Arc::new(MiddlewareRegistry::new()));

/// A named factory as stored in the registry.
#[derive(Clone)]
pub struct RegisteredFactory {
    name: Arc<str>,
    factory: Arc<dyn WriteMiddlewareFactory>,
}

impl RegisteredFactory {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    pub fn factory(&self) -> &dyn WriteMiddlewareFactory {
        self.factory.as_ref()
    }
}

impl std::fmt::Debug for RegisteredFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFactory")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered set of write middleware factories.
///
/// Stores built without an explicit registry share [`MiddlewareRegistry::global`].
pub struct MiddlewareRegistry {
    factories: ArcSwap<Vec<RegisteredFactory>>,
    update: Mutex<()>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self {
            factories: ArcSwap::from_pointee(Vec::new()),
            update: Mutex::new(()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> Arc<MiddlewareRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Append a factory under a unique name.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: impl WriteMiddlewareFactory + 'static,
    ) -> Result<(), ScribeError> {
        let name: String = name.into();
        if name.is_empty() {
            return Err(ScribeError::Config(
                "write middleware name must not be empty".into(),
            ));
        }

        let _guard = self.update.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.factories.load_full();
        if current.iter().any(|entry| *entry.name == *name) {
            return Err(ScribeError::Config(format!(
                "write middleware `{name}` is already registered"
            )));
        }

        let mut next = current.as_ref().clone();
        next.push(RegisteredFactory {
            name: Arc::from(name.as_str()),
            factory: Arc::new(factory),
        });
        let position = next.len();
        self.factories.store(Arc::new(next));
        info!(middleware = %name, position, "registered write middleware");
        Ok(())
    }

    /// Register a closure as a factory.
    pub fn register_fn<F>(&self, name: impl Into<String>, factory: F) -> Result<(), ScribeError>
    where
        F: Fn(&WriteContext<'_>) -> Wrap + Send + Sync + 'static,
    {
        self.register(name, FnFactory(factory))
    }

    /// Remove a factory. Later writes no longer consult it.
    pub fn unregister(&self, name: &str) -> Result<(), ScribeError> {
        let _guard = self.update.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.factories.load_full();
        let Some(index) = current.iter().position(|entry| &*entry.name == name) else {
            return Err(ScribeError::MiddlewareNotFound {
                name: name.to_string(),
            });
        };

        let mut next = current.as_ref().clone();
        next.remove(index);
        self.factories.store(Arc::new(next));
        debug!(middleware = name, "unregistered write middleware");
        Ok(())
    }

    /// The factories in registration order, as of now.
    pub fn snapshot(&self) -> Arc<Vec<RegisteredFactory>> {
        self.factories.load_full()
    }

    pub fn names(&self) -> Vec<String> {
        self.factories
            .load()
            .iter()
            .map(|entry| entry.name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip(_: &WriteContext<'_>) -> Wrap {
        Wrap::Skip
    }

    #[test]
    fn registration_order_is_preserved() {
        let registry = MiddlewareRegistry::new();
        assert!(registry.is_empty());
        registry.register_fn("outer", skip).unwrap();
        registry.register_fn("inner", skip).unwrap();
        assert_eq!(registry.names(), vec!["outer", "inner"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let registry = MiddlewareRegistry::new();
        registry.register_fn("audit", skip).unwrap();
        let err = registry.register_fn("audit", skip).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let registry = MiddlewareRegistry::new();
        assert!(matches!(
            registry.register_fn("", skip),
            Err(ScribeError::Config(_))
        ));
    }

    #[test]
    fn unregister_unknown_name_fails() {
        let registry = MiddlewareRegistry::new();
        let err = registry.unregister("ghost").unwrap_err();
        assert!(matches!(err, ScribeError::MiddlewareNotFound { ref name } if name == "ghost"));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let registry = MiddlewareRegistry::new();
        registry.register_fn("a", skip).unwrap();
        let before = registry.snapshot();
        registry.register_fn("b", skip).unwrap();
        registry.unregister("a").unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].name(), "a");
        assert_eq!(registry.names(), vec!["b"]);
    }
}
