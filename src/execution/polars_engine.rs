//! Polars SQL Executor
//!
//! Runs SQL against in-memory frames or CSV files through the polars SQL
//! context. Meant for local runs and demos; the production warehouse is an
//! external collaborator behind the same trait.

use crate::error::{with_timeout, ResolverError, Result};
use crate::execution::engine::WarehouseExecutor;
use async_trait::async_trait;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub struct PolarsSqlExecutor {
    tables: HashMap<String, DataFrame>,
    timeout_secs: u64,
}

impl PolarsSqlExecutor {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            tables: HashMap::new(),
            timeout_secs,
        }
    }

    /// Make `frame` queryable as `name`
    pub fn register(mut self, name: impl Into<String>, frame: DataFrame) -> Self {
        self.tables.insert(name.into(), frame);
        self
    }

    /// Register every `*.csv` file in `dir` under its file stem
    pub fn register_csv_dir(mut self, dir: &Path) -> Result<Self> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let frame = LazyCsvReader::new(&path).finish()?.collect()?;
            info!("Registered table '{}' ({} rows)", stem, frame.height());
            self.tables.insert(stem.to_string(), frame);
        }
        Ok(self)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }

    fn run(tables: HashMap<String, DataFrame>, sql: String) -> Result<DataFrame> {
        let mut ctx = SQLContext::new();
        for (name, frame) in tables {
            ctx.register(&name, frame.lazy());
        }
        let frame = ctx
            .execute(&sql)
            .and_then(|lf| lf.collect())
            .map_err(|e| ResolverError::Execution(format!("Polars SQL failed: {}", e)))?;
        Ok(frame)
    }
}

#[async_trait]
impl WarehouseExecutor for PolarsSqlExecutor {
    fn name(&self) -> &'static str {
        "polars"
    }

    async fn execute(&self, sql: &str) -> Result<DataFrame> {
        let start_time = std::time::Instant::now();
        info!("Executing query with Polars: {}", sql);

        let tables = self.tables.clone();
        let sql = sql.to_string();
        let frame = with_timeout("warehouse", self.timeout_secs, async move {
            tokio::task::spawn_blocking(move || Self::run(tables, sql))
                .await
                .map_err(|e| ResolverError::Execution(format!("Query task failed: {}", e)))?
        })
        .await?;

        info!(
            "✅ Query completed in {}ms, returned {} rows",
            start_time.elapsed().as_millis(),
            frame.height()
        );
        Ok(frame)
    }
}
