// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./scribe.toml` > `~/.config/scribe/scribe.toml` > `/etc/scribe/scribe.toml`
//! with environment variable overrides via `SCRIBE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ScribeConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/scribe/scribe.toml` (system-wide)
/// 3. `~/.config/scribe/scribe.toml` (user XDG config)
/// 4. `./scribe.toml` (local directory)
/// 5. `SCRIBE_*` environment variables
pub fn load_config() -> Result<ScribeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ScribeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScribeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ScribeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ScribeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ScribeConfig::default()))
        .merge(Toml::file("/etc/scribe/scribe.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("scribe/scribe.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("scribe.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `SCRIBE_WRITER_QUEUE_CAPACITY` to `writer.queue_capacity`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because field names contain
/// underscores. Stores are a list and are only configurable from files.
fn env_provider() -> Env {
    Env::prefixed("SCRIBE_").filter_map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        key.strip_prefix("writer_")
            .map(|field| format!("writer.{field}").into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_writer_settings() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "scribe.toml",
                r#"
[writer]
queue_capacity = 8
"#,
            )?;
            jail.set_env("SCRIBE_WRITER_QUEUE_CAPACITY", "64");
            jail.set_env("SCRIBE_WRITER_SKIP_ABANDONED", "true");

            let config = load_config_from_path(Path::new("scribe.toml"))?;
            assert_eq!(config.writer.queue_capacity, 64);
            assert!(config.writer.skip_abandoned);
            Ok(())
        });
    }
}
