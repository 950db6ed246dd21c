pub mod config;
pub mod embedder;
pub mod error;
pub mod execution;
pub mod intent;
pub mod llm;
pub mod mapping_parser;
pub mod metadata;
pub mod normalizer;
pub mod pipeline;
pub mod post_processor;
pub mod prompts;
pub mod semantic_cache;
pub mod sql_generator;

pub use config::ResolverConfig;
pub use embedder::{Embedder, HashingEmbedder, OpenAiEmbedder};
pub use error::{ResolverError, Result};
pub use execution::{PolarsSqlExecutor, WarehouseExecutor};
pub use intent::QueryKind;
pub use llm::{ChatMessage, ChatModel, OpenAiChatClient, SamplingParams};
pub use metadata::SchemaMetadata;
pub use pipeline::{
    QueryAnswer, QueryResolutionPipeline, Resolution, ResolutionRequest, ResolutionState,
    ResolvedSql, SqlSource,
};
pub use semantic_cache::SemanticCache;
pub use sql_generator::ConversationContextEntry;
