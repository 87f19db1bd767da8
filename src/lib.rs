//! # queryd
//!
//! MySQL queue drain daemon.
//!
//! Polls a queue table whose rows hold SQL statements, runs each statement
//! against the same schema and deletes the row, then sleeps and polls again.
//! Also provides the one-shot helpers behind the `queryd` CLI: listing the
//! schema's tables, submitting and listing queued statements.

pub mod config;
pub mod daemon;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod telemetry;
