//! Wire types (DTOs) for every resource, plus the SQLite rows behind them.
//!
//! Rows map to tables via `sqlx::FromRow`; result and payload types
//! serialize as JSON via `serde`.

pub mod artifact;
pub mod aspect;
pub mod common;
pub mod metadata;
pub mod package;
pub mod service;
