// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Scribe write engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Scribe configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScribeConfig {
    /// Settings shared by every per-store writer.
    #[serde(default)]
    pub writer: WriterConfig,

    /// The stores to open. Each gets its own writer thread.
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
}

impl ScribeConfig {
    /// Look up a store by name.
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }
}

/// Per-store writer queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WriterConfig {
    /// Maximum number of queued write tasks per store. Submitters wait for
    /// room once the queue is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Skip tasks whose caller stopped waiting before the task started.
    #[serde(default)]
    pub skip_abandoned: bool,

    /// Default caller-side wait limit in milliseconds. 0 waits forever.
    #[serde(default)]
    pub default_timeout_ms: u64,
}

impl WriterConfig {
    /// The default timeout as a `Duration`, if one is configured.
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_ms > 0).then(|| Duration::from_millis(self.default_timeout_ms))
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            skip_abandoned: false,
            default_timeout_ms: 0,
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

/// A single embedded store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Name callers use to address the store.
    pub name: String,

    /// Path to the SQLite database file. When absent the store is a
    /// shared-cache in-memory database named after the store.
    #[serde(default)]
    pub path: Option<String>,

    /// Enable WAL (Write-Ahead Logging) mode so reads never wait on the writer.
    /// Ignored for in-memory stores.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// SQLite busy timeout for both the writer and read connections.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// File-backed store with default settings.
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    /// In-memory store with default settings.
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            wal_mode: false,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    /// The SQLite open target: a file path or a shared-cache memory URI.
    pub fn open_target(&self) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => format!("file:{}?mode=memory&cache=shared", self.name),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.is_none()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_uses_shared_cache_uri() {
        let store = StoreConfig::memory("scratch");
        assert!(store.is_memory());
        assert_eq!(store.open_target(), "file:scratch?mode=memory&cache=shared");
    }

    #[test]
    fn zero_timeout_means_wait_forever() {
        let writer = WriterConfig::default();
        assert_eq!(writer.default_timeout(), None);

        let writer = WriterConfig {
            default_timeout_ms: 250,
            ..WriterConfig::default()
        };
        assert_eq!(writer.default_timeout(), Some(Duration::from_millis(250)));
    }
}
