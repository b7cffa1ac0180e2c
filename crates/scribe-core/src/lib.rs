// SPDX-FileCopyrightText: 2026 Scribe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for the Scribe serialized write engine.
//!
//! This crate holds the error taxonomy and the small value types that cross
//! the boundary between callers, the per-store writer, and write middleware.
//! It has no storage dependency so extensions can depend on it alone.

pub mod error;
pub mod types;

pub use error::{BoxError, Phase, ScribeError};
pub use types::{Actor, RequestContext, TaskId, WriteOptions};
