//! Query intent signal
//!
//! Only `Data` questions go through SQL resolution. Chat, definitions and
//! out-of-scope questions are answered (or refused) elsewhere.

use crate::llm::{ChatMessage, ChatModel, SamplingParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"
Classify the query into one of these categories:
- CHAT: General conversation, greetings, or small talk
- DATA: Queries about site metrics, performance, or comparisons
- DEFINITION: Requests for definitions or explanations of technical terms
- OUT_OF_SCOPE: Questions about unrelated topics (politics, general knowledge, etc.)

Respond with only the category name.
"#;

const CLASSIFY_MAX_TOKENS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryKind {
    Chat,
    Data,
    Definition,
    OutOfScope,
}

impl QueryKind {
    /// Parse a classifier label. Anything unrecognised is `OutOfScope`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().trim_matches(|c| c == '"' || c == '.').to_uppercase().as_str() {
            "CHAT" => QueryKind::Chat,
            "DATA" => QueryKind::Data,
            "DEFINITION" => QueryKind::Definition,
            _ => QueryKind::OutOfScope,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, QueryKind::Data)
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryKind::Chat => "CHAT",
            QueryKind::Data => "DATA",
            QueryKind::Definition => "DEFINITION",
            QueryKind::OutOfScope => "OUT_OF_SCOPE",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ask the model which kind of question `query` is.
///
/// Classification failures are not fatal: they fall back to `OutOfScope`.
pub async fn classify(llm: &dyn ChatModel, model: &str, query: &str) -> QueryKind {
    let messages = [
        ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
        ChatMessage::user(format!("\"{}\"", query)),
    ];
    let params = SamplingParams {
        model: model.to_string(),
        temperature: 0.0,
        max_tokens: Some(CLASSIFY_MAX_TOKENS),
    };

    match llm.complete(&messages, &params).await {
        Ok(label) => QueryKind::from_label(&label),
        Err(e) => {
            warn!("Error in query classification: {}", e);
            QueryKind::OutOfScope
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label() {
        assert_eq!(QueryKind::from_label("DATA"), QueryKind::Data);
        assert_eq!(QueryKind::from_label("  data\n"), QueryKind::Data);
        assert_eq!(QueryKind::from_label("Chat."), QueryKind::Chat);
        assert_eq!(QueryKind::from_label("definition"), QueryKind::Definition);
        assert_eq!(QueryKind::from_label("OUT_OF_SCOPE"), QueryKind::OutOfScope);
        assert_eq!(QueryKind::from_label("weather"), QueryKind::OutOfScope);
        assert_eq!(QueryKind::from_label(""), QueryKind::OutOfScope);
    }

    #[test]
    fn test_only_data_is_data() {
        assert!(QueryKind::Data.is_data());
        assert!(!QueryKind::Chat.is_data());
        assert!(!QueryKind::OutOfScope.is_data());
    }

    #[test]
    fn test_serde_labels() {
        assert_eq!(
            serde_json::to_string(&QueryKind::OutOfScope).unwrap(),
            "\"OUT_OF_SCOPE\""
        );
        assert_eq!(QueryKind::Definition.to_string(), "DEFINITION");
    }
}
