//! MCP tool handlers, one per mount
//!
//! Each handler is an independent rmcp server; `crate::hub` mounts them
//! side by side and under a combined, prefixed catalogue.

pub mod database_query_tools;
pub mod dependency_tools;
pub mod docker_tools;
pub mod fastapi_tools;
pub mod git_clone_tools;
pub mod image_tools;
pub mod mongodb_tools;
pub mod mysql_tools;
pub mod react_tools;
pub mod request_tools;
pub mod templates;
pub mod types;

pub use database_query_tools::DatabaseQueryToolHandler;
pub use dependency_tools::DependencyToolHandler;
pub use docker_tools::DockerToolHandler;
pub use fastapi_tools::FastapiToolHandler;
pub use git_clone_tools::GitCloneToolHandler;
pub use image_tools::ImageProcessingToolHandler;
pub use mongodb_tools::MongoToolHandler;
pub use mysql_tools::MysqlToolHandler;
pub use react_tools::ReactContestToolHandler;
pub use request_tools::RequestToolHandler;

use rmcp::{model::{CallToolResult, Content}, ErrorData as McpError};

use crate::error::ToolError;

pub(crate) fn make_error(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

/// Pretty-printed JSON as the single text content of a successful result
pub(crate) fn json_result(value: &serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value)
            .map_err(|e| make_error(format!("JSON error: {}", e)))?,
    )]))
}

/// `<prefix>-<8 hex chars>`, used for container and network names
pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Last path segment of a repository URL without `.git`
pub fn repo_name_from_url(github_url: &str) -> String {
    let trimmed = github_url.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Reject empty names and anything that could escape a directory
pub(crate) fn validate_plain_name(name: &str, what: &str) -> Result<(), ToolError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(ToolError::invalid(format!("Invalid {}: '{}'", what, name)));
    }
    Ok(())
}

/// Git URLs accepted by the clone-based tools
pub(crate) fn validate_github_url(github_url: &str) -> Result<(), ToolError> {
    // the URL ends up on a Dockerfile RUN line and in git argv
    if github_url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ToolError::invalid("Invalid GitHub URL: whitespace and control characters are not allowed"));
    }
    if !github_url.starts_with("https://github.com/") && !github_url.starts_with("git@github.com:") {
        return Err(ToolError::invalid(
            "Invalid GitHub URL. Must start with 'https://github.com/' or 'git@github.com:'",
        ));
    }
    let repo = repo_name_from_url(github_url);
    validate_plain_name(&repo, "repository name")
}
