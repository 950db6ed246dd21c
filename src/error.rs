use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    /// Essential input is missing (no schema metadata, invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The model answered but no usable SQL could be taken from the answer.
    #[error("Generation error: {reason}")]
    Generation {
        reason: String,
        raw_response: String,
    },

    #[error("Transport error ({collaborator}): {message}")]
    Transport {
        collaborator: &'static str,
        message: String,
    },

    #[error("Timeout after {seconds}s waiting for {collaborator}")]
    Timeout {
        collaborator: &'static str,
        seconds: u64,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl ResolverError {
    pub fn transport(collaborator: &'static str, message: impl Into<String>) -> Self {
        ResolverError::Transport {
            collaborator,
            message: message.into(),
        }
    }

    /// True for failures of an external collaborator call.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ResolverError::Transport { .. } | ResolverError::Timeout { .. }
        )
    }
}

impl From<polars::error::PolarsError> for ResolverError {
    fn from(e: polars::error::PolarsError) -> Self {
        ResolverError::Polars(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolverError>;

/// Await `fut` for at most `seconds`, mapping the elapsed case to [`ResolverError::Timeout`].
pub async fn with_timeout<T, F>(collaborator: &'static str, seconds: u64, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_secs(seconds), fut).await {
        Ok(result) => result,
        Err(_) => Err(ResolverError::Timeout {
            collaborator,
            seconds,
        }),
    }
}
