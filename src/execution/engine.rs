//! Warehouse Executor Trait - contract for whatever runs the resolved SQL
//!
//! Executors return the raw result table; date normalization, renaming and
//! de-duplication happen afterwards in the post-processor.

use crate::error::Result;
use async_trait::async_trait;
use polars::prelude::DataFrame;

#[async_trait]
pub trait WarehouseExecutor: Send + Sync {
    /// Executor name (e.g., "bigquery", "polars")
    fn name(&self) -> &'static str;

    /// Run one SQL statement and return its rows. Errors are execution or
    /// transport failures; an empty table is a normal result.
    async fn execute(&self, sql: &str) -> Result<DataFrame>;
}
