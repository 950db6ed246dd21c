//! Query Resolution Pipeline
//!
//! Turns one natural-language data question into SQL:
//!
//! ```text
//! Start -> CacheExact -> CacheSimilar -> Generate -> ExtractSanitize -> Resolved
//!                                                                    \-> Failed
//! ```
//!
//! Requests are independent. The only shared state is the read-only
//! [`SemanticCache`], injected as an `Arc` and never written here.

use crate::config::ResolverConfig;
use crate::error::{with_timeout, ResolverError, Result};
use crate::execution::WarehouseExecutor;
use crate::intent::QueryKind;
use crate::llm::ChatModel;
use crate::metadata::SchemaMetadata;
use crate::post_processor::{dedupe, normalize_dates, RenameOutcome, ResultPostProcessor};
use crate::semantic_cache::{CacheHit, SemanticCache};
use crate::sql_generator::{ConversationContextEntry, SqlGenerator};
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionState {
    Start,
    CacheExact,
    CacheSimilar,
    Generate,
    ExtractSanitize,
    Resolved,
    Failed,
    /// Not a data question; nothing was looked up or generated
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlSource {
    ExactCache,
    SimilarCache,
    Generated,
}

#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    pub query: String,
    pub kind: QueryKind,
    pub metadata: Option<SchemaMetadata>,
    /// Previous exchanges, oldest first
    pub context: Vec<ConversationContextEntry>,
}

impl ResolutionRequest {
    /// A data question with no metadata or context yet
    pub fn data(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            kind: QueryKind::Data,
            metadata: None,
            context: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: QueryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_metadata(mut self, metadata: SchemaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_context(mut self, context: Vec<ConversationContextEntry>) -> Self {
        self.context = context;
        self
    }
}

/// SQL ready for the warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSql {
    pub sql: String,
    pub source: SqlSource,
    pub cache_hit: Option<CacheHit>,
}

#[derive(Debug)]
pub enum ResolutionOutcome {
    Resolved(ResolvedSql),
    Failed(ResolverError),
    Skipped(QueryKind),
}

/// Result of one pass through the state machine
#[derive(Debug)]
pub struct Resolution {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Every state visited, in order, ending in the terminal one
    pub trail: Vec<ResolutionState>,
    pub outcome: ResolutionOutcome,
}

/// Serializable summary of a [`Resolution`] for logs and callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub trail: Vec<ResolutionState>,
    pub sql: Option<String>,
    pub source: Option<SqlSource>,
    pub error: Option<String>,
}

impl Resolution {
    /// Terminal state
    pub fn state(&self) -> ResolutionState {
        match self.outcome {
            ResolutionOutcome::Resolved(_) => ResolutionState::Resolved,
            ResolutionOutcome::Failed(_) => ResolutionState::Failed,
            ResolutionOutcome::Skipped(_) => ResolutionState::Skipped,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Resolved(_))
    }

    pub fn sql(&self) -> Option<&str> {
        match &self.outcome {
            ResolutionOutcome::Resolved(resolved) => Some(&resolved.sql),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<SqlSource> {
        match &self.outcome {
            ResolutionOutcome::Resolved(resolved) => Some(resolved.source),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ResolverError> {
        match &self.outcome {
            ResolutionOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn report(&self) -> ResolutionReport {
        ResolutionReport {
            request_id: self.request_id,
            started_at: self.started_at,
            trail: self.trail.clone(),
            sql: self.sql().map(str::to_string),
            source: self.source(),
            error: self.error().map(|e| e.to_string()),
        }
    }

    pub fn into_result(self) -> Result<ResolvedSql> {
        match self.outcome {
            ResolutionOutcome::Resolved(resolved) => Ok(resolved),
            ResolutionOutcome::Failed(e) => Err(e),
            ResolutionOutcome::Skipped(kind) => Err(ResolverError::Configuration(format!(
                "{} questions are not resolved to SQL",
                kind
            ))),
        }
    }
}

/// An executed and post-processed answer
#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub request_id: Uuid,
    pub sql: String,
    pub source: SqlSource,
    /// `None` when the query ran but returned no rows
    pub rows: Option<DataFrame>,
    /// `None` when there were no rows to rename
    pub rename: Option<RenameOutcome>,
}

impl QueryAnswer {
    pub fn has_rows(&self) -> bool {
        self.rows.is_some()
    }
}

pub struct QueryResolutionPipeline {
    cache: Arc<SemanticCache>,
    generator: SqlGenerator,
    post_processor: ResultPostProcessor,
    config: ResolverConfig,
}

/// Records the states one request walks through
struct Tracker {
    request_id: Uuid,
    trail: Vec<ResolutionState>,
}

impl Tracker {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            trail: Vec::new(),
        }
    }

    fn enter(&mut self, state: ResolutionState) {
        debug!("[{}] -> {:?}", self.request_id, state);
        self.trail.push(state);
    }
}

impl QueryResolutionPipeline {
    pub fn new(cache: Arc<SemanticCache>, llm: Arc<dyn ChatModel>, config: ResolverConfig) -> Self {
        Self {
            cache,
            generator: SqlGenerator::new(llm.clone(), &config),
            post_processor: ResultPostProcessor::new(llm, &config),
            config,
        }
    }

    pub fn cache(&self) -> &SemanticCache {
        &self.cache
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run the state machine for one request. Never panics and never returns
    /// partial SQL: the outcome is resolved, failed or skipped.
    pub async fn resolve(&self, request: &ResolutionRequest) -> Resolution {
        let request_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tracker = Tracker::new(request_id);
        tracker.enter(ResolutionState::Start);
        info!("[{}] Resolving query: {}", request_id, request.query);

        let outcome = self.run(request, &mut tracker).await;
        match &outcome {
            ResolutionOutcome::Resolved(resolved) => {
                tracker.enter(ResolutionState::Resolved);
                info!("[{}] Resolved via {:?}", request_id, resolved.source);
            }
            ResolutionOutcome::Failed(e) => {
                tracker.enter(ResolutionState::Failed);
                error!("[{}] Resolution failed: {}", request_id, e);
                if let ResolverError::Generation { raw_response, .. } = e {
                    error!("[{}] Raw model response: {}", request_id, raw_response);
                }
            }
            ResolutionOutcome::Skipped(kind) => {
                tracker.enter(ResolutionState::Skipped);
                info!("[{}] {} question, not resolving to SQL", request_id, kind);
            }
        }

        Resolution {
            request_id,
            started_at,
            trail: tracker.trail,
            outcome,
        }
    }

    async fn run(&self, request: &ResolutionRequest, tracker: &mut Tracker) -> ResolutionOutcome {
        if !request.kind.is_data() {
            return ResolutionOutcome::Skipped(request.kind);
        }

        let metadata = match &request.metadata {
            Some(metadata) if metadata.is_available() => metadata,
            _ => {
                return ResolutionOutcome::Failed(ResolverError::Configuration(
                    "No schema metadata available".to_string(),
                ))
            }
        };

        tracker.enter(ResolutionState::CacheExact);
        if let Some(hit) = self.cache.find_exact_match(&request.query) {
            info!("✅ Found exact match: {}", hit.matched_query);
            return ResolutionOutcome::Resolved(ResolvedSql {
                sql: hit.sql.clone(),
                source: SqlSource::ExactCache,
                cache_hit: Some(hit),
            });
        }

        tracker.enter(ResolutionState::CacheSimilar);
        match self
            .cache
            .find_similar_match(&request.query, self.config.similarity_threshold)
            .await
        {
            Ok(Some(hit)) => {
                info!("✅ Found similar match: {}", hit.matched_query);
                return ResolutionOutcome::Resolved(ResolvedSql {
                    sql: hit.sql.clone(),
                    source: SqlSource::SimilarCache,
                    cache_hit: Some(hit),
                });
            }
            Ok(None) => debug!("No similar match above {}", self.config.similarity_threshold),
            Err(e) => return ResolutionOutcome::Failed(e),
        }

        tracker.enter(ResolutionState::Generate);
        let response = match self
            .generator
            .request_sql(&request.query, metadata, &request.context)
            .await
        {
            Ok(response) => response,
            Err(e) => return ResolutionOutcome::Failed(e),
        };

        tracker.enter(ResolutionState::ExtractSanitize);
        match self.generator.finalize(&response) {
            Ok(sql) => ResolutionOutcome::Resolved(ResolvedSql {
                sql,
                source: SqlSource::Generated,
                cache_hit: None,
            }),
            Err(e) => ResolutionOutcome::Failed(e),
        }
    }

    /// [`Self::resolve`] as a `Result`
    pub async fn resolve_sql(&self, request: &ResolutionRequest) -> Result<ResolvedSql> {
        self.resolve(request).await.into_result()
    }

    /// Resolve, execute and post-process.
    ///
    /// An empty result is an answer with `rows: None`, not an error.
    pub async fn answer(
        &self,
        request: &ResolutionRequest,
        executor: &dyn WarehouseExecutor,
    ) -> Result<QueryAnswer> {
        let resolution = self.resolve(request).await;
        let request_id = resolution.request_id;
        let resolved = resolution.into_result()?;

        info!("[{}] Executing on {}", request_id, executor.name());
        let table = with_timeout(
            "warehouse",
            self.config.warehouse_timeout_secs,
            executor.execute(&resolved.sql),
        )
        .await?;

        if table.height() == 0 {
            warn!("[{}] Query returned no rows", request_id);
            return Ok(QueryAnswer {
                request_id,
                sql: resolved.sql,
                source: resolved.source,
                rows: None,
                rename: None,
            });
        }

        let table = normalize_dates(table)?;
        let original_columns: Vec<String> = table
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (table, rename) = self
            .post_processor
            .rename_columns(table, &original_columns)
            .await;
        let table = dedupe(table)?;
        info!("[{}] Answer has {} rows", request_id, table.height());

        Ok(QueryAnswer {
            request_id,
            sql: resolved.sql,
            source: resolved.source,
            rows: Some(table),
            rename: Some(rename),
        })
    }
}
