//! LLM Client
//!
//! Chat-completion access behind the [`ChatModel`] trait. The pipeline only
//! ever sees the trait, so tests and alternative providers plug in freely.

use crate::config::ResolverConfig;
use crate::error::{with_timeout, ResolverError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant"
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl SamplingParams {
    /// Temperature 0, the setting used for SQL generation and renaming.
    pub fn deterministic(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Text-completion capability of the LLM collaborator
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation and return the assistant's text
    async fn complete(&self, messages: &[ChatMessage], params: &SamplingParams) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client
#[derive(Clone)]
pub struct OpenAiChatClient {
    api_key: String,
    base_url: String,
    timeout_secs: u64,
    http: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ResolverError::transport("llm", format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key,
            base_url,
            timeout_secs,
            http,
        })
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            config.llm_timeout_secs,
        )
    }

    /// Canned answers used when no API key is configured
    fn dummy_response(messages: &[ChatMessage]) -> String {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if prompt.contains("Python dictionary") {
            "{}".to_string()
        } else if prompt.contains("Classify the query") {
            "DATA".to_string()
        } else {
            "```sql\nSELECT siteid, province FROM `edgepointprod.Axin_Data.siteinfra` LIMIT 10\n```"
                .to_string()
        }
    }

    async fn post_completion(&self, body: serde_json::Value) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolverError::transport("llm", format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ResolverError::transport(
                "llm",
                format!("LLM API error ({}): {}", status, error_text),
            ));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ResolverError::transport("llm", format!("Failed to parse LLM response: {}", e)))?;

        extract_message_content(&response_json)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage], params: &SamplingParams) -> Result<String> {
        if self.api_key == crate::config::DUMMY_API_KEY {
            debug!("Dummy API key configured, returning canned completion");
            return Ok(Self::dummy_response(messages));
        }

        let mut body = serde_json::json!({
            "model": params.model,
            "messages": messages,
            "temperature": params.temperature,
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        with_timeout("llm", self.timeout_secs, self.post_completion(body)).await
    }
}

/// Pull `choices[0].message.content` out of a chat-completion payload
pub fn extract_message_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(ResolverError::transport("llm", format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| ResolverError::transport("llm", "No choices in LLM response"))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(ResolverError::transport(
                "llm",
                "LLM response was filtered by content policy",
            ))
        }
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .ok_or_else(|| ResolverError::transport("llm", "No content in LLM response"))?;

    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_message_content() {
        let payload = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  hello \n"}, "finish_reason": "stop"}]
        });
        assert_eq!(extract_message_content(&payload).unwrap(), "hello");
    }

    #[test]
    fn test_extract_message_content_errors() {
        let error_payload = serde_json::json!({"error": {"message": "bad key"}});
        assert!(extract_message_content(&error_payload).unwrap_err().is_transport());

        let empty = serde_json::json!({"choices": []});
        assert!(extract_message_content(&empty).is_err());

        let filtered = serde_json::json!({
            "choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]
        });
        assert!(extract_message_content(&filtered).is_err());
    }

    #[tokio::test]
    async fn test_dummy_client_returns_sql_block() {
        let client = OpenAiChatClient::new(
            crate::config::DUMMY_API_KEY.to_string(),
            "http://localhost".to_string(),
            5,
        )
        .unwrap();
        let text = client
            .complete(
                &[ChatMessage::user("generate sql")],
                &SamplingParams::deterministic("gpt-4o-mini"),
            )
            .await
            .unwrap();
        assert!(text.starts_with("```sql"));
    }
}
