//! End-to-end tests for query resolution with in-process collaborators

use async_trait::async_trait;
use kgq_engine::error::{ResolverError, Result};
use kgq_engine::post_processor::RenameOutcome;
use kgq_engine::semantic_cache::record::KnownQueryRow;
use kgq_engine::{
    ChatMessage, ChatModel, ConversationContextEntry, Embedder, QueryKind,
    QueryResolutionPipeline, ResolutionRequest, ResolutionState, ResolverConfig, SamplingParams,
    SchemaMetadata, SemanticCache, SqlSource, WarehouseExecutor,
};
use polars::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SITES_PER_PROVINCE_SQL: &str =
    "SELECT province, COUNT(DISTINCT siteid) AS total_sites FROM `edgepointprod.Axin_Data.siteinfra` GROUP BY province";

/// Replies in order; an exhausted script answers with a transport error.
struct ScriptedChatModel {
    replies: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedChatModel {
    fn new(replies: Vec<Option<&str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, messages: &[ChatMessage], params: &SamplingParams) -> Result<String> {
        assert_eq!(params.temperature, 0.0);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        match self.replies.lock().unwrap().pop_front().flatten() {
            Some(reply) => Ok(reply),
            None => Err(ResolverError::transport("llm", "connection refused")),
        }
    }
}

/// One-hot bag of words over a fixed vocabulary
struct KeywordEmbedder;

const VOCABULARY: [&str; 6] = ["total", "sites", "per", "province", "fuel", "outages"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; VOCABULARY.len()];
        for token in text.split_whitespace() {
            if let Some(slot) = VOCABULARY.iter().position(|w| *w == token) {
                vector[slot] += 1.0;
            }
        }
        Ok(vector)
    }
}

struct FixedExecutor {
    table: DataFrame,
    executed: Mutex<Vec<String>>,
}

impl FixedExecutor {
    fn new(table: DataFrame) -> Self {
        Self {
            table,
            executed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WarehouseExecutor for FixedExecutor {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn execute(&self, sql: &str) -> Result<DataFrame> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(self.table.clone())
    }
}

async fn known_query_cache() -> Arc<SemanticCache> {
    let rows = vec![
        KnownQueryRow::new("total sites per province", SITES_PER_PROVINCE_SQL),
        KnownQueryRow::new(
            "Show fuel outages",
            "SELECT siteid, COUNT(*) AS outages FROM `edgepointprod.Axin_Data.outages` GROUP BY siteid",
        ),
    ];
    Arc::new(SemanticCache::build(rows, Arc::new(KeywordEmbedder)).await.unwrap())
}

fn metadata() -> SchemaMetadata {
    SchemaMetadata::new(serde_json::json!({
        "edgepointprod.Axin_Data.siteinfra": ["siteid", "province", "region"],
        "edgepointprod.Axin_Data.fuel": ["siteid", "fuel_consumed", "time"]
    }))
}

async fn pipeline(llm: Arc<ScriptedChatModel>) -> QueryResolutionPipeline {
    QueryResolutionPipeline::new(known_query_cache().await, llm, ResolverConfig::default())
}

#[tokio::test]
async fn test_missing_schema_fails_before_generation() {
    let llm = ScriptedChatModel::new(vec![Some("```sql\nSELECT 1\n```")]);
    let pipeline = pipeline(llm.clone()).await;

    let request = ResolutionRequest::data("show fuel consumption for site X yesterday");
    let resolution = pipeline.resolve(&request).await;
    assert_eq!(resolution.state(), ResolutionState::Failed);
    assert_eq!(resolution.trail, vec![ResolutionState::Start, ResolutionState::Failed]);
    assert!(matches!(resolution.error(), Some(ResolverError::Configuration(_))));
    assert!(resolution.sql().is_none());

    let empty = request.with_metadata(SchemaMetadata::new(serde_json::json!({})));
    assert_eq!(pipeline.resolve(&empty).await.state(), ResolutionState::Failed);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_rephrased_question_reuses_stored_sql() {
    let llm = ScriptedChatModel::new(vec![]);
    let pipeline = pipeline(llm.clone()).await;

    let request =
        ResolutionRequest::data("Find the number of sites per province").with_metadata(metadata());
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.sql(), Some(SITES_PER_PROVINCE_SQL));
    assert_eq!(resolution.source(), Some(SqlSource::SimilarCache));
    assert_eq!(
        resolution.trail,
        vec![
            ResolutionState::Start,
            ResolutionState::CacheExact,
            ResolutionState::CacheSimilar,
            ResolutionState::Resolved,
        ]
    );
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_configured_threshold_governs_similar_match() {
    let llm = ScriptedChatModel::new(vec![Some("```sql\nSELECT province FROM t\n```")]);
    let config = ResolverConfig {
        similarity_threshold: 0.9,
        ..Default::default()
    };
    let pipeline = QueryResolutionPipeline::new(known_query_cache().await, llm.clone(), config);

    // cosine("sites per province", "total sites per province") is about 0.87
    let request =
        ResolutionRequest::data("Find the number of sites per province").with_metadata(metadata());
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.source(), Some(SqlSource::Generated));
    assert_eq!(resolution.sql(), Some("SELECT province FROM t"));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_exact_match_skips_similarity() {
    let llm = ScriptedChatModel::new(vec![]);
    let pipeline = pipeline(llm.clone()).await;

    let request = ResolutionRequest::data("Total sites per province?").with_metadata(metadata());
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.source(), Some(SqlSource::ExactCache));
    assert_eq!(
        resolution.trail,
        vec![
            ResolutionState::Start,
            ResolutionState::CacheExact,
            ResolutionState::Resolved,
        ]
    );
    assert_eq!(resolution.report().sql.as_deref(), Some(SITES_PER_PROVINCE_SQL));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_cache_miss_generates_sanitized_sql() {
    let llm = ScriptedChatModel::new(vec![Some(
        "Here you go:\n```sql\nSELECT siteid AS \"Site Id\", SUM(fuel_consumed) AS \"2024 Fuel (L)\"\nFROM `edgepointprod.Axin_Data.fuel`\nGROUP BY siteid\n```",
    )]);
    let pipeline = pipeline(llm.clone()).await;

    let request = ResolutionRequest::data("fuel consumed by each site this year")
        .with_metadata(metadata())
        .with_context(vec![ConversationContextEntry {
            generated_sql: "SELECT region FROM `edgepointprod.Axin_Data.siteinfra`".to_string(),
            analysis: "Listed regions".to_string(),
        }]);
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.source(), Some(SqlSource::Generated));
    assert_eq!(
        resolution.sql(),
        Some(
            "SELECT siteid AS Site_Id, SUM(fuel_consumed) AS col_2024_Fuel__L_\nFROM `edgepointprod.Axin_Data.fuel`\nGROUP BY siteid"
        )
    );
    assert_eq!(
        &resolution.trail[3..],
        &[
            ResolutionState::Generate,
            ResolutionState::ExtractSanitize,
            ResolutionState::Resolved,
        ]
    );

    let prompt = llm.last_prompt();
    assert!(prompt.contains("fuel consumed by each site this year"));
    assert!(prompt.contains("edgepointprod.Axin_Data.fuel"));
    assert!(prompt.contains("Listed regions"));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_reply_without_sql_block_fails() {
    let llm = ScriptedChatModel::new(vec![Some("SELECT siteid FROM somewhere")]);
    let pipeline = pipeline(llm.clone()).await;

    let request = ResolutionRequest::data("fuel consumed yesterday").with_metadata(metadata());
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.state(), ResolutionState::Failed);
    assert_eq!(resolution.trail.last(), Some(&ResolutionState::Failed));
    assert!(resolution.trail.contains(&ResolutionState::ExtractSanitize));
    match resolution.error() {
        Some(ResolverError::Generation { raw_response, .. }) => {
            assert_eq!(raw_response, "SELECT siteid FROM somewhere")
        }
        other => panic!("expected generation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_llm_transport_failure_is_a_failed_resolution() {
    let llm = ScriptedChatModel::new(vec![None]);
    let pipeline = pipeline(llm.clone()).await;

    let request = ResolutionRequest::data("fuel consumed yesterday").with_metadata(metadata());
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.state(), ResolutionState::Failed);
    assert!(resolution.error().map(|e| e.is_transport()).unwrap_or(false));
    assert!(!resolution.trail.contains(&ResolutionState::ExtractSanitize));
    assert!(pipeline.resolve_sql(&request).await.is_err());
}

#[tokio::test]
async fn test_non_data_question_is_skipped() {
    let llm = ScriptedChatModel::new(vec![]);
    let pipeline = pipeline(llm.clone()).await;

    let request = ResolutionRequest::data("hello there")
        .with_kind(QueryKind::Chat)
        .with_metadata(metadata());
    let resolution = pipeline.resolve(&request).await;

    assert_eq!(resolution.trail, vec![ResolutionState::Start, ResolutionState::Skipped]);
    assert!(resolution.into_result().is_err());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_answer_renames_and_dedupes() {
    let llm = ScriptedChatModel::new(vec![Some(
        "```python\n{'province': 'Province', 'total_sites': 'Total Sites'}\n```",
    )]);
    let pipeline = pipeline(llm.clone()).await;
    let executor = FixedExecutor::new(
        df![
            "province" => ["North", "South", "North"],
            "total_sites" => [12i64, 7, 12]
        ]
        .unwrap(),
    );

    let request = ResolutionRequest::data("total sites per province").with_metadata(metadata());
    let answer = pipeline.answer(&request, &executor).await.unwrap();

    assert_eq!(answer.source, SqlSource::ExactCache);
    assert_eq!(executor.executed.lock().unwrap().as_slice(), &[SITES_PER_PROVINCE_SQL.to_string()]);
    let rows = answer.rows.expect("rows");
    assert_eq!(rows.height(), 2);
    assert_eq!(rows.get_column_names(), vec!["Province", "Total Sites"]);
    assert!(matches!(answer.rename, Some(RenameOutcome::Applied(_))));
    assert!(llm.last_prompt().contains("'province', 'total_sites'"));
}

#[tokio::test]
async fn test_answer_keeps_original_names_on_bad_mapping() {
    let llm = ScriptedChatModel::new(vec![Some("{'province': 'Province', 'total_sites': ")]);
    let pipeline = pipeline(llm.clone()).await;
    let executor = FixedExecutor::new(
        df![
            "province" => ["North", "South"],
            "total_sites" => [12i64, 7]
        ]
        .unwrap(),
    );

    let request = ResolutionRequest::data("total sites per province").with_metadata(metadata());
    let answer = pipeline.answer(&request, &executor).await.unwrap();

    let rows = answer.rows.expect("rows");
    assert_eq!(rows.get_column_names(), vec!["province", "total_sites"]);
    assert!(matches!(answer.rename, Some(RenameOutcome::Fallback { .. })));
}

#[tokio::test]
async fn test_answer_with_no_rows() {
    let llm = ScriptedChatModel::new(vec![]);
    let pipeline = pipeline(llm.clone()).await;
    let empty = DataFrame::new(vec![
        Series::new_empty("province", &DataType::String),
        Series::new_empty("total_sites", &DataType::Int64),
    ])
    .unwrap();
    let executor = FixedExecutor::new(empty);

    let request = ResolutionRequest::data("total sites per province").with_metadata(metadata());
    let answer = pipeline.answer(&request, &executor).await.unwrap();

    assert!(!answer.has_rows());
    assert!(answer.rename.is_none());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_answer_propagates_failed_resolution() {
    let llm = ScriptedChatModel::new(vec![]);
    let pipeline = pipeline(llm.clone()).await;
    let executor = FixedExecutor::new(DataFrame::empty());

    let request = ResolutionRequest::data("total sites per province");
    let err = pipeline.answer(&request, &executor).await.unwrap_err();
    assert!(matches!(err, ResolverError::Configuration(_)));
    assert!(executor.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_share_the_cache() {
    let llm = ScriptedChatModel::new(vec![]);
    let pipeline = Arc::new(pipeline(llm.clone()).await);

    let first = ResolutionRequest::data("total sites per province").with_metadata(metadata());
    let second = ResolutionRequest::data("show fuel outages").with_metadata(metadata());
    let (a, b) = tokio::join!(pipeline.resolve(&first), pipeline.resolve(&second));

    assert_eq!(a.source(), Some(SqlSource::ExactCache));
    assert_eq!(b.source(), Some(SqlSource::ExactCache));
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(pipeline.cache().len(), 2);
}
