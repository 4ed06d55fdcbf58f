//! Metadata cache module
//!
//! This module handles the cached view of the source tree:
//! - SQLite store and schema (store.rs)
//! - Shared data structures (record.rs)
//! - Filesystem scanning (scanner.rs)
//! - Effective access-level resolution (access.rs)
//! - Full rebuilds and the periodic scheduler (sync.rs)

pub mod access;
pub mod record;
pub mod scanner;
pub mod store;
pub mod sync;
