//! Packrat library
//!
//! Local-first store for tracking personal items, with best-effort
//! reconciliation against a per-user cloud mirror. The local SQLite store
//! is authoritative; pushes queue in a durable outbox and remote changes
//! arrive over a change-feed subscription, newest write winning.

pub mod config;
pub mod database;
pub mod error;
pub mod geo;
pub mod identity;
pub mod remote;
pub mod services;
pub mod session;
