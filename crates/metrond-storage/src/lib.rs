//! Persistence backends for the metrics server.
//!
//! The [`Storage`] trait is the seam between the upsert core and the two
//! backends: [`MemStorage`] (a locked map) and [`PgStorage`] (PostgreSQL
//! through SeaORM). The service pre-partitions batches into inserts and
//! updates, so both backends can treat each call as a plain write set.
//!
//! In-flight calls are cancelled by dropping their futures (the HTTP server
//! does this when a request dies); the Postgres backend additionally aborts
//! retry backoffs when its shutdown token fires.

pub mod classify;
pub mod entities;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod snapshot;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use metrond_common::metric::{Metric, MetricType};

pub use error::StorageError;
pub use memory::MemStorage;
pub use postgres::PgStorage;

/// Keyed set of metrics (id within a type is the deduplication key).
///
/// Implementations must be shareable across the ingestion handlers and the
/// snapshot task (`Send + Sync`).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reachability probe.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Releases backend resources. Further calls may fail.
    async fn close(&self) -> Result<(), StorageError>;

    /// Writes metrics whose keys are new.
    async fn insert(&self, metrics: Vec<Metric>) -> Result<(), StorageError>;

    /// Writes metrics whose keys already exist.
    async fn update(&self, metrics: Vec<Metric>) -> Result<(), StorageError>;

    /// Type-aware lookup: a stored metric under the same id but a different
    /// type yields `None`.
    async fn get(&self, id: &str, mtype: MetricType) -> Result<Option<Metric>, StorageError>;

    /// Bulk lookup by id, any type.
    async fn get_by_ids(&self, ids: &[String]) -> Result<HashMap<String, Metric>, StorageError>;

    /// Unordered snapshot of everything stored.
    async fn get_all(&self) -> Result<Vec<Metric>, StorageError>;
}
