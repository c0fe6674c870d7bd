//! `git_clone` mount: clone GitHub repositories under the work directory and remove them

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    RoleServer,
};
use serde_json::{json, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::types::*;
use super::{json_result, repo_name_from_url, validate_github_url};
use crate::config::Config;
use crate::error::{Result, ToolError};
use crate::process::{self, ProcessError};

const TOOL_COUNT: usize = 2;

/// `git clone <url> <dest>`; a failed or timed-out clone leaves nothing behind.
pub(crate) async fn clone_repo(github_url: &str, dest: &Path, timeout: Duration) -> Result<()> {
    info!("Cloning {} into {}", github_url, dest.display());
    let dest_arg = dest.display().to_string();
    let outcome = process::run("git", ["clone", github_url, dest_arg.as_str()], None, Some(timeout)).await;

    let error = match outcome {
        Ok(result) if result.success => return Ok(()),
        Ok(result) => ToolError::failed("Git clone failed", result.error_text()),
        Err(ProcessError::Timeout { secs, .. }) => ToolError::failed(
            "Git clone failed",
            format!("operation timed out after {} seconds", secs),
        ),
        Err(e) => ToolError::from(e).context("Git clone failed"),
    };

    if dest.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(dest).await {
            warn!("Could not remove partial clone {}: {}", dest.display(), e);
        }
    }
    Err(error)
}

/// GitHub clone tool handler
#[derive(Clone)]
pub struct GitCloneToolHandler {
    tool_router: ToolRouter<GitCloneToolHandler>,
    config: Config,
}

impl GitCloneToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn clone_into_work_dir(&self, github_url: &str) -> Result<Value> {
        validate_github_url(github_url)?;
        let clone_root = self.config.clone_dir();
        let dest = clone_root.join(repo_name_from_url(github_url));
        if dest.exists() {
            return Err(ToolError::invalid(format!(
                "Destination already exists: {}. Run cleanup_clone first",
                dest.display()
            )));
        }
        tokio::fs::create_dir_all(&clone_root).await?;
        clone_repo(github_url, &dest, self.config.command_timeout).await?;

        Ok(json!({
            "status": "success",
            "message": "Repository cloned successfully",
            "local_path": dest.display().to_string(),
        }))
    }

    async fn remove_clone(&self, local_path: &str) -> Result<Value> {
        let path = PathBuf::from(local_path);
        if !path.exists() {
            warn!("Directory does not exist: {}", local_path);
            return Ok(json!({
                "status": "warning",
                "message": format!("Directory does not exist: {}", local_path),
                "path": local_path,
            }));
        }

        let target = tokio::fs::canonicalize(&path).await?;
        let root = tokio::fs::canonicalize(self.config.clone_dir())
            .await
            .map_err(|_| ToolError::invalid(format!("Refusing to remove {}: no clones exist", local_path)))?;
        if target == root || !target.starts_with(&root) {
            return Err(ToolError::invalid(format!(
                "Refusing to remove {}: not inside {}",
                local_path,
                root.display()
            )));
        }

        tokio::fs::remove_dir_all(&target)
            .await
            .map_err(|e| ToolError::from(e).context("Error cleaning up directory"))?;
        info!("Removed clone {}", target.display());

        Ok(json!({
            "status": "success",
            "message": format!("Cleaned up directory: {}", target.display()),
            "path": target.display().to_string(),
        }))
    }
}

impl Default for GitCloneToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl GitCloneToolHandler {
    #[tool(description = "Clone a GitHub repository into the cloned_repos directory. Returns the local path.")]
    async fn github_clone_repo(&self, Parameters(args): Parameters<GithubCloneRepoArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.clone_into_work_dir(&args.github_url).await?)
    }

    #[tool(description = "Remove a cloned repository directory created by github_clone_repo")]
    async fn cleanup_clone(&self, Parameters(args): Parameters<CleanupCloneArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.remove_clone(&args.local_path).await?)
    }
}

#[tool_handler]
impl ServerHandler for GitCloneToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "GitHub Clone MCP Server. {} tools available: github_clone_repo, cleanup_clone.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("GitHub Clone MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_text(result: &CallToolResult) -> &str {
        result.content[0].as_text().expect("expected text content").text.as_str()
    }

    fn handler_in(dir: &Path) -> GitCloneToolHandler {
        GitCloneToolHandler::new(Config {
            work_dir: dir.to_path_buf(),
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn test_clone_rejects_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let err = handler_in(dir.path())
            .github_clone_repo(Parameters(GithubCloneRepoArgs {
                github_url: "https://gitlab.com/user/repo.git".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Invalid GitHub URL"));
    }

    #[tokio::test]
    async fn test_clone_rejects_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cloned_repos/repo")).unwrap();
        let err = handler_in(dir.path())
            .github_clone_repo(Parameters(GithubCloneRepoArgs {
                github_url: "https://github.com/user/repo.git".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(err.message.contains("already exists"));
    }

    #[tokio::test]
    async fn test_cleanup_missing_path_warns() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("cloned_repos/nothing-here");
        let result = handler_in(dir.path())
            .cleanup_clone(Parameters(CleanupCloneArgs {
                local_path: missing.display().to_string(),
            }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["status"], "warning");
    }

    #[tokio::test]
    async fn test_cleanup_removes_clone() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("cloned_repos/repo");
        std::fs::create_dir_all(repo.join("src")).unwrap();
        std::fs::write(repo.join("src/main.py"), "print('hi')").unwrap();

        let result = handler_in(dir.path())
            .cleanup_clone(Parameters(CleanupCloneArgs {
                local_path: repo.display().to_string(),
            }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["status"], "success");
        assert!(!repo.exists());
    }

    #[tokio::test]
    async fn test_cleanup_refuses_outside_clone_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cloned_repos")).unwrap();
        let outside = dir.path().join("precious");
        std::fs::create_dir_all(&outside).unwrap();

        let handler = handler_in(dir.path());
        for path in [outside.clone(), dir.path().join("cloned_repos"), dir.path().join("cloned_repos/../precious")] {
            let err = handler
                .cleanup_clone(Parameters(CleanupCloneArgs {
                    local_path: path.display().to_string(),
                }))
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        }
        assert!(outside.exists());
    }

    #[tokio::test]
    async fn test_clone_failure_leaves_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("repo");
        // Fails either because git is absent or the path is not a repository
        let result = clone_repo("/nonexistent/atf-test-repo.git", &dest, Duration::from_secs(30)).await;
        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
