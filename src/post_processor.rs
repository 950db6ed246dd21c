//! Result Post-Processing
//!
//! Makes an executed result presentable: dates as `YYYY-MM-DD`, readable
//! column names proposed by the model, duplicate rows removed. Renaming is
//! best effort; whatever the model returns, the table is always delivered.

use crate::config::ResolverConfig;
use crate::error::Result;
use crate::llm::{ChatMessage, ChatModel, SamplingParams};
use crate::mapping_parser::{parse_rename_mapping, ParseOutcome, RenameMapping};
use crate::prompts;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// What happened to the column names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenameOutcome {
    /// The pairs that were applied
    Applied(RenameMapping),
    /// Original names kept
    Fallback { reason: String },
}

impl RenameOutcome {
    pub fn mapping(&self) -> Option<&RenameMapping> {
        match self {
            RenameOutcome::Applied(mapping) => Some(mapping),
            RenameOutcome::Fallback { .. } => None,
        }
    }
}

pub struct ResultPostProcessor {
    llm: Arc<dyn ChatModel>,
    model: String,
}

impl ResultPostProcessor {
    pub fn new(llm: Arc<dyn ChatModel>, config: &ResolverConfig) -> Self {
        Self {
            llm,
            model: config.rename_model.clone(),
        }
    }

    /// Ask the model for friendlier column names and apply them.
    ///
    /// Never fails: transport errors, unparsable replies and unusable
    /// mappings all leave the table as it was.
    pub async fn rename_columns(
        &self,
        mut table: DataFrame,
        original_columns: &[String],
    ) -> (DataFrame, RenameOutcome) {
        let messages = [
            ChatMessage::system(prompts::RENAME_SYSTEM_PROMPT),
            ChatMessage::user(prompts::build_rename_prompt(original_columns)),
        ];
        let params = SamplingParams::deterministic(self.model.clone());

        let response = match self.llm.complete(&messages, &params).await {
            Ok(response) => response,
            Err(e) => return (table, fallback(format!("rename request failed: {}", e))),
        };

        let mapping = match parse_rename_mapping(&response) {
            ParseOutcome::Parsed(mapping) => mapping,
            ParseOutcome::Rejected { reason } => {
                return (
                    table,
                    fallback(format!("Error parsing column rename map: {}", reason)),
                )
            }
        };

        match apply_mapping(&mut table, &mapping) {
            Ok(applied) => {
                info!("Columns renamed successfully: {:?}", applied);
                (table, RenameOutcome::Applied(applied))
            }
            Err(reason) => (table, fallback(reason)),
        }
    }
}

fn fallback(reason: String) -> RenameOutcome {
    warn!("{}", reason);
    warn!("Returning table with original column names.");
    RenameOutcome::Fallback { reason }
}

/// Rename columns in place. Keys naming no column are ignored; a mapping
/// that would produce duplicate or empty names is rejected whole.
pub fn apply_mapping(
    table: &mut DataFrame,
    mapping: &RenameMapping,
) -> std::result::Result<RenameMapping, String> {
    let current: Vec<String> = table
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut applied: RenameMapping = Vec::new();
    let renamed: Vec<String> = current
        .iter()
        .map(|name| match mapping.iter().find(|(old, _)| old == name) {
            Some((old, new)) => {
                applied.push((old.clone(), new.clone()));
                new.clone()
            }
            None => name.clone(),
        })
        .collect();

    if renamed.iter().any(|name| name.trim().is_empty()) {
        return Err("rename mapping produces an empty column name".to_string());
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = renamed.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(format!(
            "rename mapping produces duplicate column '{}'",
            duplicate
        ));
    }

    table
        .set_column_names(renamed.as_slice())
        .map_err(|e| format!("failed to rename columns: {}", e))?;
    Ok(applied)
}

/// Convert date and datetime columns to `YYYY-MM-DD` strings
pub fn normalize_dates(mut table: DataFrame) -> Result<DataFrame> {
    let names: Vec<String> = table
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for name in names {
        let converted = {
            let series = table.column(&name)?;
            match series.dtype() {
                DataType::Date => Some(series.cast(&DataType::String)?),
                DataType::Datetime(_, _) => {
                    Some(series.cast(&DataType::Date)?.cast(&DataType::String)?)
                }
                _ => None,
            }
        };
        if let Some(series) = converted {
            table.with_column(series)?;
        }
    }
    Ok(table)
}

/// Drop fully duplicate rows, keeping first occurrences in order
pub fn dedupe(table: DataFrame) -> Result<DataFrame> {
    if table.width() == 0 || table.height() < 2 {
        return Ok(table);
    }
    let before = table.height();
    let unique = table.unique_stable(None, UniqueKeepStrategy::First, None)?;
    if unique.height() != before {
        info!("Removed {} duplicate rows", before - unique.height());
    }
    Ok(unique)
}
