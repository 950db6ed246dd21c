use anyhow::Result;
use clap::Parser;
use kgq_engine::intent::{self, QueryKind};
use kgq_engine::{
    ChatModel, Embedder, HashingEmbedder, OpenAiChatClient, OpenAiEmbedder, PolarsSqlExecutor,
    QueryResolutionPipeline, ResolutionRequest, ResolverConfig, SchemaMetadata, SemanticCache,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kgq")]
#[command(about = "Resolve a natural-language data question to warehouse SQL")]
struct Args {
    /// The question in natural language
    query: String,

    /// CSV of known-good queries (columns: user_query, sql_query)
    #[arg(short, long, default_value = "known_queries.csv")]
    known_queries: PathBuf,

    /// Schema metadata JSON file
    #[arg(short, long, default_value = "metadata.json")]
    metadata: PathBuf,

    /// Directory of CSV tables to run the resolved SQL against
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON config file (otherwise settings come from the environment)
    #[arg(long)]
    config: Option<PathBuf>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Similarity threshold for cache hits
    #[arg(long)]
    threshold: Option<f32>,

    /// Classify the question first and skip non-data questions
    #[arg(long)]
    classify: bool,

    /// Print the resolution report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ResolverConfig::from_json_file(path)?,
        None => ResolverConfig::from_env()?,
    };
    if let Some(api_key) = args.api_key.clone() {
        config.api_key = api_key;
    }
    if let Some(threshold) = args.threshold {
        config.similarity_threshold = threshold;
    }
    config.validate()?;

    info!("kgq starting...");
    info!("Query: {}", args.query);

    let embedder: Arc<dyn Embedder> = if config.is_dummy() {
        warn!("No API key configured, using the offline hashing embedder");
        Arc::new(HashingEmbedder::default())
    } else {
        Arc::new(OpenAiEmbedder::from_config(&config)?)
    };
    let llm: Arc<dyn ChatModel> = Arc::new(OpenAiChatClient::from_config(&config)?);

    let cache = SemanticCache::load_or_empty(&args.known_queries, embedder).await;
    info!("Loaded {} known queries", cache.len());

    let kind = if args.classify {
        intent::classify(llm.as_ref(), &config.rename_model, &args.query).await
    } else {
        QueryKind::Data
    };
    let mut request = ResolutionRequest::data(args.query.clone()).with_kind(kind);
    if let Some(metadata) = SchemaMetadata::load_optional(&args.metadata) {
        request = request.with_metadata(metadata);
    }

    let pipeline = QueryResolutionPipeline::new(Arc::new(cache), llm, config.clone());

    match &args.data_dir {
        Some(dir) => {
            let executor =
                PolarsSqlExecutor::new(config.warehouse_timeout_secs).register_csv_dir(dir)?;
            let answer = pipeline.answer(&request, &executor).await?;
            println!("\n=== SQL ({:?}) ===", answer.source);
            println!("{}", answer.sql);
            match &answer.rows {
                Some(rows) => println!("\n{}", rows),
                None => println!("\nNo data found for the given query."),
            }
        }
        None => {
            let resolution = pipeline.resolve(&request).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&resolution.report())?);
            } else if let Some(sql) = resolution.sql() {
                println!("{}", sql);
            }
            resolution.into_result()?;
        }
    }

    Ok(())
}
