// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write middleware shipped with the engine.

pub mod audit;

pub use audit::{AuditEntry, AuditTrail};
