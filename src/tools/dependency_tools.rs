//! `dependencies` mount: pip / npm / yarn installs inside a cloned repository

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
use std::path::Path;
use tracing::info;

use super::json_result;
use super::types::*;
use crate::config::Config;
use crate::error::{Result, ToolError};
use crate::process::{self, ProcessError};

const TOOL_COUNT: usize = 2;

/// Dependency installation tool handler
#[derive(Clone)]
pub struct DependencyToolHandler {
    tool_router: ToolRouter<DependencyToolHandler>,
    config: Config,
}

/// Whether package.json lists express under dependencies
pub fn has_express_dependency(package_json: &Value) -> bool {
    package_json
        .get("dependencies")
        .and_then(Value::as_object)
        .is_some_and(|deps| deps.contains_key("express"))
}

impl DependencyToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    /// Run one install step in `dir`, failing with the tool's stderr
    async fn install_step(&self, program: &str, args: &[&str], dir: &Path) -> Result<()> {
        let label = format!("{} {}", program, args.join(" "));
        info!("Running '{}' in {}", label, dir.display());
        match process::run(program, args, Some(dir), Some(self.config.command_timeout)).await {
            Ok(result) if result.success => Ok(()),
            Ok(result) => Err(ToolError::failed(format!("{} failed", label), result.error_text())),
            Err(ProcessError::Timeout { secs, .. }) => Err(ToolError::failed(
                format!("{} failed", label),
                format!("timed out after {} seconds", secs),
            )),
            Err(e) => Err(ToolError::from(e)),
        }
    }

    async fn install_python(&self, cloned_path: &str) -> Result<Value> {
        let dir = Path::new(cloned_path);
        if !dir.is_dir() {
            return Err(ToolError::invalid(format!("Path does not exist: {}", cloned_path)));
        }

        let mut steps = Vec::new();
        if dir.join("requirements.txt").is_file() {
            self.install_step("pip", &["install", "-r", "requirements.txt"], dir).await?;
            steps.push("pip install -r requirements.txt");
        }
        if dir.join("pyproject.toml").is_file() {
            self.install_step("pip", &["install", "-e", "."], dir).await?;
            steps.push("pip install -e .");
        }

        if steps.is_empty() {
            return Ok(json!({
                "status": "warning",
                "message": "No dependency files found",
                "path": cloned_path,
                "steps": steps,
            }));
        }

        Ok(json!({
            "status": "success",
            "message": "Python dependencies installed successfully",
            "path": cloned_path,
            "steps": steps,
        }))
    }

    async fn install_node(&self, cloned_path: &str, package_manager: &str) -> Result<Value> {
        if package_manager != "npm" && package_manager != "yarn" {
            return Err(ToolError::invalid(format!(
                "Invalid package manager '{}'. Must be 'npm' or 'yarn'",
                package_manager
            )));
        }
        let dir = Path::new(cloned_path);
        if !dir.is_dir() {
            return Err(ToolError::invalid(format!("Path does not exist: {}", cloned_path)));
        }

        let manifest = dir.join("package.json");
        if !manifest.is_file() {
            return Ok(json!({
                "status": "warning",
                "message": "No package.json found",
                "path": cloned_path,
            }));
        }

        self.install_step(package_manager, &["install"], dir).await?;

        let package_data: Value = serde_json::from_str(&tokio::fs::read_to_string(&manifest).await?)?;
        let express_detected = has_express_dependency(&package_data);
        if express_detected {
            info!("Express.js project detected in {}", cloned_path);
        }

        Ok(json!({
            "status": "success",
            "message": "Node.js dependencies installed successfully",
            "path": cloned_path,
            "package_manager": package_manager,
            "express_detected": express_detected,
        }))
    }
}

impl Default for DependencyToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl DependencyToolHandler {
    #[tool(description = "Install Python dependencies (requirements.txt and/or pyproject.toml) in a cloned repository")]
    async fn install_dependencies_python(&self, Parameters(args): Parameters<InstallPythonArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.install_python(&args.cloned_path).await?)
    }

    #[tool(description = "Install Node.js dependencies in a cloned repository with npm or yarn")]
    async fn install_dependencies_node(&self, Parameters(args): Parameters<InstallNodeArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.install_node(&args.cloned_path, &args.package_manager).await?)
    }
}

#[tool_handler]
impl ServerHandler for DependencyToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Dependency Installer MCP Server. {} tools available: \
                 install_dependencies_python, install_dependencies_node.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Dependency MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_text(result: &CallToolResult) -> &str {
        result.content[0].as_text().expect("expected text content").text.as_str()
    }

    #[test]
    fn test_express_detection() {
        assert!(has_express_dependency(&json!({"dependencies": {"express": "^4.18.0"}})));
        assert!(!has_express_dependency(&json!({"devDependencies": {"express": "^4.18.0"}})));
        assert!(!has_express_dependency(&json!({})));
    }

    #[tokio::test]
    async fn test_python_missing_path() {
        let err = DependencyToolHandler::default()
            .install_dependencies_python(Parameters(InstallPythonArgs {
                cloned_path: "/nonexistent/atf-test-path".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_python_without_manifests_warns() {
        let dir = tempfile::tempdir().unwrap();
        let result = DependencyToolHandler::default()
            .install_dependencies_python(Parameters(InstallPythonArgs {
                cloned_path: dir.path().display().to_string(),
            }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["status"], "warning");
        assert_eq!(body["steps"], json!([]));
    }

    #[tokio::test]
    async fn test_node_rejects_unknown_package_manager() {
        let dir = tempfile::tempdir().unwrap();
        let err = DependencyToolHandler::default()
            .install_dependencies_node(Parameters(InstallNodeArgs {
                cloned_path: dir.path().display().to_string(),
                package_manager: "pnpm".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("'npm' or 'yarn'"));
    }

    #[tokio::test]
    async fn test_node_without_package_json_warns() {
        let dir = tempfile::tempdir().unwrap();
        let result = DependencyToolHandler::default()
            .install_dependencies_node(Parameters(InstallNodeArgs {
                cloned_path: dir.path().display().to_string(),
                package_manager: "yarn".to_string(),
            }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["status"], "warning");
        assert_eq!(body["message"], "No package.json found");
    }

    #[test]
    fn test_package_manager_default() {
        let args: InstallNodeArgs = serde_json::from_value(json!({"cloned_path": "/tmp/x"})).unwrap();
        assert_eq!(args.package_manager, "npm");
    }
}
