// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as unique store names and a non-zero queue capacity.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::ScribeConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ScribeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.writer.queue_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "writer.queue_capacity must be greater than 0".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for (idx, store) in config.stores.iter().enumerate() {
        let name = store.name.trim();
        if name.is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("stores[{idx}].name must not be empty"),
            });
            continue;
        }

        if !seen.insert(name) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate store name `{name}`"),
            });
        }

        if let Some(path) = &store.path {
            if path.trim().is_empty() {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "stores[{idx}].path must not be empty; omit it for an in-memory store"
                    ),
                });
            }
        } else if name.contains(['?', '#', '&', '/']) {
            // The name becomes part of a `file:` URI.
            errors.push(ConfigError::Validation {
                message: format!(
                    "in-memory store name `{name}` must not contain `?`, `#`, `&` or `/`"
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
