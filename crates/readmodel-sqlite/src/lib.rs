//! SQLite-backed store for projected records
//!
//! Provides the queryable SQL database projection streams write into.
//!
//! Key features:
//! - In-memory or file-backed databases
//! - Prepared-statement and literal insert paths
//! - Query results as JSON rows
//! - WAL mode for file-backed stores

pub mod bind;
pub mod store;

pub use store::SqliteSink;
