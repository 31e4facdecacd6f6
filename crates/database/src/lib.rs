//! # Population Store
//!
//! Durable storage for everything the evolution loop needs to survive a
//! restart: genomes, published generations, realized performance, classified
//! market state, and closed trades.
//!
//! ## Architectural Principles
//!
//! - **Adapter:** Callers depend on the [`PopulationStore`] trait only. The SQL
//!   lives behind [`PgStore`]; [`InMemoryStore`] serves simulation runs and tests.
//! - **Idempotent Writes:** Every write is an upsert on a natural key, so a
//!   retried cycle never duplicates data.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and the
//!   PostgreSQL adapter uses a connection pool (`PgPool`) for concurrent access.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: Pool setup and embedded schema migrations.
//! - `PopulationStore`: The storage trait consumed by the engine.
//! - `GenerationRecord` / `GenerationMember`: Published generation manifests.
//! - `PgStore`, `InMemoryStore`: The two backends.
//! - `DbError`: The specific error types that can be returned from this crate.

pub mod connection;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::{GenerationMember, GenerationRecord, PopulationStore};
