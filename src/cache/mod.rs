//! Cache module for storing command output in an embedded database
//!
//! This module provides the deterministic `CacheKey` for a command invocation
//! and the SQLite-backed `Store` holding one timestamped entry per key.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, CacheStore, Store, StoreError};
