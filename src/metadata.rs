//! Schema Metadata
//!
//! Table and column descriptions for the warehouse. The resolver treats the
//! content as opaque and only passes it into prompt construction; what it does
//! care about is whether any metadata is present at all.

use crate::error::{ResolverError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMetadata {
    value: serde_json::Value,
}

impl SchemaMetadata {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("🔃 Loading schema metadata from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            ResolverError::Configuration(format!(
                "Failed to read schema metadata {}: {}",
                path.display(),
                e
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        info!("✅ Schema metadata loaded from {}", path.display());
        Ok(Self { value })
    }

    /// Load, logging and returning `None` on failure.
    pub fn load_optional(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                error!("Error loading metadata: {}", e);
                None
            }
        }
    }

    /// False for `null`, empty objects, empty arrays and blank strings.
    pub fn is_available(&self) -> bool {
        match &self.value {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::String(s) => !s.trim().is_empty(),
            _ => true,
        }
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Structured text for the SQL prompt
    pub fn to_prompt_text(&self) -> String {
        if !self.is_available() {
            return "No metadata available".to_string();
        }
        serde_json::to_string_pretty(&self.value).unwrap_or_else(|_| self.value.to_string())
    }
}

impl From<serde_json::Value> for SchemaMetadata {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}
