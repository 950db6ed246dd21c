//! SQL Generator
//!
//! Fallback used when the semantic cache has no answer: prompt the model with
//! the schema, recent conversation context and the warehouse rules, then pull
//! the fenced SQL block out of its reply and make the aliases warehouse-safe.

use crate::config::ResolverConfig;
use crate::error::{ResolverError, Result};
use crate::llm::{ChatMessage, ChatModel, SamplingParams};
use crate::mapping_parser::ParseOutcome;
use crate::metadata::SchemaMetadata;
use crate::prompts;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Prefix for aliases that would otherwise not start with a letter
pub const ALIAS_PREFIX: &str = "col_";

lazy_static! {
    static ref SQL_BLOCK_RE: Regex =
        Regex::new(r"(?is)```sql[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("sql block pattern is valid");
    static ref QUOTED_ALIAS_RE: Regex =
        Regex::new(r#"(?i)\bAS\s*"([^"]+)""#).expect("alias pattern is valid");
    static ref UNSAFE_ALIAS_CHAR_RE: Regex =
        Regex::new(r"[^a-zA-Z0-9]").expect("alias char pattern is valid");
}

/// One previous exchange in the conversation, owned by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContextEntry {
    pub generated_sql: String,
    pub analysis: String,
}

#[derive(Serialize)]
struct ContextPair<'a> {
    sql: &'a str,
    analysis: &'a str,
}

pub struct SqlGenerator {
    llm: Arc<dyn ChatModel>,
    model: String,
    context_window: usize,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn ChatModel>, config: &ResolverConfig) -> Self {
        Self {
            llm,
            model: config.sql_model.clone(),
            context_window: config.context_window,
        }
    }

    /// Build the generation prompt.
    ///
    /// `context` is in chronological order; only the last `context_window`
    /// entries are used.
    pub fn build_prompt(
        &self,
        user_query: &str,
        metadata: &SchemaMetadata,
        context: &[ConversationContextEntry],
    ) -> Result<String> {
        let recent = &context[context.len().saturating_sub(self.context_window)..];
        let context_text = if recent.is_empty() {
            prompts::NO_CONTEXT.to_string()
        } else {
            let pairs: Vec<ContextPair<'_>> = recent
                .iter()
                .map(|entry| ContextPair {
                    sql: &entry.generated_sql,
                    analysis: &entry.analysis,
                })
                .collect();
            serde_json::to_string_pretty(&pairs)?
        };
        Ok(prompts::build_sql_prompt(
            user_query,
            &metadata.to_prompt_text(),
            &context_text,
        ))
    }

    /// Ask the model for SQL and return the sanitized statement.
    pub async fn generate(
        &self,
        user_query: &str,
        metadata: &SchemaMetadata,
        context: &[ConversationContextEntry],
    ) -> Result<String> {
        let response = self.request_sql(user_query, metadata, context).await?;
        self.finalize(&response)
    }

    /// Send the generation prompt and return the model's raw reply.
    pub async fn request_sql(
        &self,
        user_query: &str,
        metadata: &SchemaMetadata,
        context: &[ConversationContextEntry],
    ) -> Result<String> {
        if !metadata.is_available() {
            return Err(ResolverError::Configuration(
                "No schema metadata available".to_string(),
            ));
        }

        let prompt = self.build_prompt(user_query, metadata, context)?;
        let messages = [
            ChatMessage::system(prompts::SQL_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let params = SamplingParams::deterministic(self.model.clone());

        let response = self.llm.complete(&messages, &params).await?;
        debug!("SQL generation response:\n{}", response);
        Ok(response)
    }

    /// Extract the fenced SQL from a raw reply, clean its aliases and check
    /// it is a single statement.
    pub fn finalize(&self, response: &str) -> Result<String> {
        let sql = match extract_sql(response) {
            ParseOutcome::Parsed(sql) => sql,
            ParseOutcome::Rejected { reason } => {
                error!("{}; raw response: {}", reason, response);
                return Err(ResolverError::Generation {
                    reason,
                    raw_response: response.to_string(),
                });
            }
        };
        ensure_single_statement(&sql, response)?;

        info!("✅ Generated new query using {}", self.model);
        Ok(sql)
    }
}

/// Take the first fenced `sql` block and clean its aliases
pub fn extract_sql(response_text: &str) -> ParseOutcome<String> {
    match SQL_BLOCK_RE.captures(response_text) {
        Some(caps) => {
            let sql = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if sql.is_empty() {
                return ParseOutcome::rejected("Empty SQL block in the response");
            }
            ParseOutcome::Parsed(clean_column_aliases(sql))
        }
        None => ParseOutcome::rejected("No SQL code found in the response"),
    }
}

/// Rewrite `AS "Some Name"` aliases into identifiers the warehouse accepts
pub fn clean_column_aliases(sql: &str) -> String {
    QUOTED_ALIAS_RE
        .replace_all(sql, |caps: &Captures| format!("AS {}", sanitize_alias(&caps[1])))
        .into_owned()
}

/// Non-alphanumerics become `_`; a leading non-letter gets [`ALIAS_PREFIX`].
pub fn sanitize_alias(alias: &str) -> String {
    let clean = UNSAFE_ALIAS_CHAR_RE.replace_all(alias, "_").into_owned();
    match clean.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => clean,
        _ => format!("{}{}", ALIAS_PREFIX, clean),
    }
}

/// Reject multi-statement SQL. Parse failures only warn: the parser does not
/// know every warehouse extension.
fn ensure_single_statement(sql: &str, raw_response: &str) -> Result<()> {
    let dialect = BigQueryDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) if statements.len() > 1 => Err(ResolverError::Generation {
            reason: format!("Expected one SQL statement, found {}", statements.len()),
            raw_response: raw_response.to_string(),
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!("SQL parsing failed, passing statement through unchecked: {}", e);
            Ok(())
        }
    }
}
