//! Error types for the ATF tools MCP hub

use rmcp::ErrorData as McpError;
use thiserror::Error;

use crate::docker_client::DockerError;
use crate::process::ProcessError;

/// Main error type shared by the tool handlers
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{context}: {message}")]
    Failed { context: String, message: String },

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MySQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

impl ToolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn failed(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Prefix the message with the operation that failed; invalid input is left as is
    pub fn context(self, context: &str) -> Self {
        match self {
            Self::InvalidInput(_) | Self::Failed { .. } => self,
            other => Self::failed(context, other.to_string()),
        }
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidInput(msg) => McpError::invalid_params(msg, None),
            other => McpError::internal_error(other.to_string(), None),
        }
    }
}

/// Result type alias for convenience; the error defaults to `ToolError`
pub type Result<T, E = ToolError> = std::result::Result<T, E>;
