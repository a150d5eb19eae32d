//! Lock store contract
//!
//! This module defines the trait every lock backend implements. The SQL
//! backend in [`crate::sql`] is the only implementation in this crate;
//! in-memory or cache-server backends would plug in behind the same trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Storage backend for named mutual-exclusion locks
///
/// At most one owner holds a given key at a time; enforcement is entirely
/// the backend's concern. Callers supply an opaque `owner` identifier and
/// get back booleans or typed errors; there is no queueing and no retry in
/// this layer.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Try to acquire `key` for `owner`.
    ///
    /// A `ttl` of `None` (or zero) creates a lock that never expires and
    /// can only be released explicitly. Returns `false` when the key is
    /// currently held by a live lock.
    async fn save(&self, key: &str, owner: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Release the lock held on `key` by `owner`.
    ///
    /// Fails with [`crate::LockError::ReleaseNotOwned`] when the stored
    /// owner differs from `owner`, or when no lock exists for `key`.
    async fn delete(&self, key: &str, owner: &str) -> Result<()>;

    /// Whether a live lock is currently held for `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Renew the expiration of a held lock.
    async fn extend(&self, key: &str, ttl: Option<Duration>) -> Result<()>;

    /// Release the underlying storage handle.
    async fn disconnect(&self) -> Result<()>;
}
