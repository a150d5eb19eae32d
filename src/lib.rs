//! Cerrojo - SQL-backed distributed lock store
//!
//! This crate provides:
//! - The [`LockStore`] trait describing the lock backend contract
//! - [`DatabaseLockStore`], a MySQL/PostgreSQL backend built on SeaORM
//! - Typed errors separating ownership violations from storage failures
//!
//! A lock is one row in a single table whose primary key is the lock key.
//! The database's uniqueness constraint enforces mutual exclusion across
//! independent processes, and expiry is a lazily evaluated predicate over
//! wall-clock time, so no coordinator and no background process exist.

pub mod error;
pub mod model;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use error::{LockError, Result};
pub use model::LockRow;
pub use sql::{DatabaseLockStore, DatabaseStoreOptions};
pub use traits::LockStore;
