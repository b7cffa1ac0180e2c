// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The set of stores opened from configuration, addressed by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use scribe_config::ScribeConfig;
use scribe_core::ScribeError;
use tracing::{info, warn};

use crate::database::Database;
use crate::registry::MiddlewareRegistry;

/// Every configured store, each with its own writer thread.
#[derive(Debug)]
pub struct Stores {
    stores: BTreeMap<String, Arc<Database>>,
}

impl Stores {
    /// Open every store in `config`, sharing one middleware registry.
    ///
    /// If any store fails to open, the ones already opened are closed again.
    pub async fn open(
        config: &ScribeConfig,
        registry: Arc<MiddlewareRegistry>,
    ) -> Result<Self, ScribeError> {
        let mut stores = BTreeMap::new();
        for store in &config.stores {
            if stores.contains_key(&store.name) {
                close_quietly(&stores).await;
                return Err(ScribeError::Config(format!(
                    "store `{}` is configured more than once",
                    store.name
                )));
            }
            match Database::open(store, &config.writer, Arc::clone(&registry)).await {
                Ok(db) => {
                    stores.insert(store.name.clone(), Arc::new(db));
                }
                Err(err) => {
                    close_quietly(&stores).await;
                    return Err(err);
                }
            }
        }
        info!(count = stores.len(), "stores opened");
        Ok(Self { stores })
    }

    /// Look up a store. Unknown names fail before anything is queued.
    pub fn get(&self, name: &str) -> Result<Arc<Database>, ScribeError> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| ScribeError::StoreNotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Close every store. Returns the first error, after trying them all.
    pub async fn close_all(&self) -> Result<(), ScribeError> {
        let mut first_err = None;
        for (name, db) in &self.stores {
            if let Err(err) = db.close().await {
                warn!(store = %name, error = %err, "failed to close store");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn close_quietly(stores: &BTreeMap<String, Arc<Database>>) {
    for db in stores.values() {
        let _ = db.close().await;
    }
}
