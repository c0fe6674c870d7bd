//! `fastapi` mount: a python container with FastAPI and uvicorn installed

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
use tracing::{info, warn};

use super::types::*;
use super::{json_result, unique_name};
use crate::config::Config;
use crate::docker_client::{self, RunSpec};

const TOOL_COUNT: usize = 1;

/// FastAPI container tool handler
#[derive(Clone)]
pub struct FastapiToolHandler {
    tool_router: ToolRouter<FastapiToolHandler>,
    config: Config,
}

impl FastapiToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    /// Every failure is reported as `status: "error"` data
    async fn provision(&self, port: u16) -> Value {
        let container_name = unique_name("fastapi");
        let image = self.config.fastapi_image.clone();

        let spec = RunSpec::new(&image)
            .name(&container_name)
            .detached()
            .port(port, 8000)
            .command(["sleep", "infinity"]);
        let container_id = match docker_client::run_container(&spec, Some(self.config.command_timeout)).await {
            Ok(id) => id,
            Err(e) => {
                warn!("FastAPI container failed to start: {}", e);
                return json!({
                    "status": "error",
                    "message": format!("Failed to start container: {}", e),
                });
            }
        };

        let failure = |message: String| {
            json!({
                "status": "error",
                "message": message,
                "container_id": container_id,
                "container_name": container_name,
                "image": image,
                "port": port,
            })
        };

        let steps: [(&[&str], &str); 2] = [
            (&["pip", "install", "fastapi", "uvicorn[standard]"], "Failed to install FastAPI/Uvicorn"),
            (&["mkdir", "-p", "/app"], "Failed to create /app directory"),
        ];
        for (command, context) in steps {
            match docker_client::exec(&container_id, command, Some(self.config.command_timeout)).await {
                Ok(result) if result.success => {}
                Ok(result) => return failure(format!("{}: {}", context, result.error_text())),
                Err(e) => return failure(format!("{}: {}", context, e)),
            }
        }

        let cd_output = match docker_client::exec_shell(&container_id, "cd /app && pwd").await {
            Ok(result) if result.success => result.stdout.trim().to_string(),
            Ok(result) => return failure(format!("Failed to cd into /app: {}", result.error_text())),
            Err(e) => return failure(format!("Failed to cd into /app: {}", e)),
        };

        info!("FastAPI container '{}' ready on port {}", container_name, port);
        json!({
            "status": "success",
            "container_id": container_id,
            "container_name": container_name,
            "image": image,
            "port": port,
            "message": format!(
                "Container '{}' running with image '{}' on port {}, FastAPI-ready, /app directory created.",
                container_name, image, port
            ),
            "cd_output": cd_output,
        })
    }
}

impl Default for FastapiToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl FastapiToolHandler {
    #[tool(description = "Start a python slim container with fastapi and uvicorn installed; host port maps to container port 8000")]
    async fn create_docker_container(&self, Parameters(args): Parameters<CreateFastapiContainerArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.provision(args.port).await)
    }
}

#[tool_handler]
impl ServerHandler for FastapiToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "FastAPI Container MCP Server. {} tool available: create_docker_container.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("FastAPI MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_default() {
        let args: CreateFastapiContainerArgs = serde_json::from_value(json!({})).unwrap();
        assert_eq!(args.port, 8080);
    }

    #[test]
    fn test_tool_catalogue() {
        let tools = FastapiToolHandler::default().tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "create_docker_container");
    }

    #[test]
    fn test_uses_configured_image() {
        let handler = FastapiToolHandler::new(Config {
            fastapi_image: "python:3.12-slim".to_string(),
            ..Config::default()
        });
        assert_eq!(handler.config.fastapi_image, "python:3.12-slim");
    }
}
