//! `PostgreSQL` store for the litterbox usage pipeline.
//!
//! The persister writes each accumulated batch of usage events in a single
//! transaction. Every event id is checked for prior existence before it is
//! staged, so a redelivered message is surfaced as
//! [`DbError::DuplicateRecord`] rather than silently dropped or overwritten.
//!
//! # Architecture
//!
//! ```text
//! persister batch
//!     |
//!     +-- UsageStore::insert_batch --> BEGIN
//!                                       |-- SELECT EXISTS (per event)
//!                                       |-- INSERT       (per event)
//!                                       +-- COMMIT (or ROLLBACK on any failure)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool, configuration and schema
//! - [`usage_store`] -- Batch insert-with-dedup and read queries
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod usage_store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use usage_store::{UsageRow, UsageStore};
