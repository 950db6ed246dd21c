//! Known-good query records and their CSV source

use crate::error::{ResolverError, Result};
use crate::embedder::Embedding;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const USER_QUERY_COLUMN: &str = "user_query";
pub const SQL_QUERY_COLUMN: &str = "sql_query";

/// A validated question/SQL pair as read from the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownQueryRow {
    pub user_query: String,
    pub sql_query: String,
}

impl KnownQueryRow {
    pub fn new(user_query: impl Into<String>, sql_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            sql_query: sql_query.into(),
        }
    }
}

/// A cached known-good query, immutable once the cache is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownQueryRecord {
    pub raw_query: String,
    pub normalized_query: String,
    /// Computed from `normalized_query`
    #[serde(skip)]
    pub embedding: Embedding,
    pub sql: String,
}

/// Result of reading the bulk record source
#[derive(Debug, Clone, Default)]
pub struct SourceLoad {
    pub rows: Vec<KnownQueryRow>,
    pub skipped: usize,
}

/// CSV source of known-good queries (`user_query`, `sql_query` columns)
pub struct KnownQuerySource;

impl KnownQuerySource {
    pub fn from_csv_path(path: &Path) -> Result<SourceLoad> {
        let file = std::fs::File::open(path).map_err(|e| {
            ResolverError::Cache(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    /// Read rows from any byte stream. UTF-8 is tried first; anything else
    /// is decoded as Latin-1, which accepts every input. Malformed rows are
    /// skipped, not fatal.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<SourceLoad> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                warn!("Known-query source is not valid UTF-8, decoding as Latin-1");
                e.into_bytes().iter().map(|&b| b as char).collect()
            }
        };
        Self::parse_csv(content.trim_start_matches('\u{feff}'))
    }

    pub fn parse_csv(content: &str) -> Result<SourceLoad> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = csv_reader.headers()?.clone();
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (query_idx, sql_idx) = match (position(USER_QUERY_COLUMN), position(SQL_QUERY_COLUMN)) {
            (Some(q), Some(s)) => (q, s),
            _ => {
                return Err(ResolverError::Cache(format!(
                    "Source must have '{}' and '{}' columns, found: {:?}",
                    USER_QUERY_COLUMN,
                    SQL_QUERY_COLUMN,
                    headers.iter().collect::<Vec<_>>()
                )))
            }
        };

        let mut load = SourceLoad::default();
        for (line, record) in csv_reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping unreadable row {}: {}", line + 1, e);
                    load.skipped += 1;
                    continue;
                }
            };
            if record.len() != headers.len() {
                warn!(
                    "Skipping row {}: expected {} fields, found {}",
                    line + 1,
                    headers.len(),
                    record.len()
                );
                load.skipped += 1;
                continue;
            }
            let user_query = record.get(query_idx).unwrap_or_default().trim();
            let sql_query = record.get(sql_idx).unwrap_or_default().trim();
            if user_query.is_empty() || sql_query.is_empty() {
                warn!("Skipping row {}: empty query or SQL", line + 1);
                load.skipped += 1;
                continue;
            }
            load.rows.push(KnownQueryRow::new(user_query, sql_query));
        }

        info!(
            "Loaded {} known-good queries ({} skipped)",
            load.rows.len(),
            load.skipped
        );
        Ok(load)
    }
}
