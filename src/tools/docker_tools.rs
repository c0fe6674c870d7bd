//! `docker` mount: build an image from a GitHub repository, run it, kill containers

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
use tracing::info;

use super::templates::{self, DOCKERFILE_NODE_APP, DOCKERFILE_PYTHON_APP};
use super::types::*;
use super::{json_result, repo_name_from_url, validate_github_url};
use crate::config::Config;
use crate::docker_client::{self, ContainerState, DockerError, RunSpec};
use crate::error::{Result, ToolError};
use crate::process;

const TOOL_COUNT: usize = 2;

/// Docker tool handler
#[derive(Clone)]
pub struct DockerToolHandler {
    tool_router: ToolRouter<DockerToolHandler>,
    config: Config,
}

impl DockerToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn build_and_run(&self, args: CreateAndRunDockerArgs) -> Result<Value> {
        let project_type = args.project_type.to_lowercase();
        let (template, port) = match project_type.as_str() {
            "python" => (DOCKERFILE_PYTHON_APP, 8000u16),
            "nodejs" => (DOCKERFILE_NODE_APP, 3000u16),
            other => {
                return Err(ToolError::invalid(format!(
                    "Invalid project type '{}'. Must be 'python' or 'nodejs'",
                    other
                )))
            }
        };
        validate_github_url(&args.github_url)?;

        let repo = repo_name_from_url(&args.github_url);
        let build_dir = self.config.docker_builds_dir().join(&repo);
        tokio::fs::create_dir_all(&build_dir).await?;

        let port_str = port.to_string();
        let dockerfile = templates::render(
            template,
            &[("GITHUB_URL", args.github_url.as_str()), ("PORT", port_str.as_str())],
        );
        tokio::fs::write(build_dir.join("Dockerfile"), dockerfile).await?;

        let image_name = format!("{}:{}", repo.to_lowercase(), project_type);
        docker_client::build_image(&image_name, &build_dir, Some(self.config.build_timeout))
            .await
            .map_err(|e| ToolError::from(e).context("Error creating Docker image"))?;

        if !docker_client::image_exists(&image_name).await? {
            return Err(ToolError::failed(
                "Error creating Docker image",
                format!("image '{}' not found after build", image_name),
            ));
        }

        let container_name = format!("{}-container", image_name.replace(':', "-"));
        let spec = RunSpec::new(&image_name)
            .name(&container_name)
            .detached()
            .env("DEFAULT_PORT", &port_str)
            .port(port, port);
        let container_id = docker_client::run_container(&spec, Some(self.config.command_timeout))
            .await
            .map_err(|e| ToolError::from(e).context("Error running Docker container"))?;

        let details = docker_client::inspect_container(&container_id).await?;
        let container_ip = details
            .pointer("/NetworkSettings/IPAddress")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let reachable = process::wait_for_port("127.0.0.1", port, self.config.port_wait).await;
        info!(
            "Container '{}' from '{}' listening on {} (reachable: {})",
            container_name, image_name, port, reachable
        );

        Ok(json!({
            "status": "success",
            "image_name": image_name,
            "container_id": container_id,
            "container_ip": container_ip,
            "port": port,
            "url": format!("http://localhost:{}", port),
            "reachable": reachable,
        }))
    }

    async fn stop_and_remove(&self, container_id: &str) -> Result<Value> {
        match docker_client::container_status(container_id).await? {
            ContainerState::NotFound => return Err(DockerError::NotFound(container_id.to_string()).into()),
            ContainerState::Running => {
                docker_client::stop_container(container_id)
                    .await
                    .map_err(|e| ToolError::from(e).context("Error killing container"))?;
            }
            state => info!("Container {} is {}, removing without stop", container_id, state),
        }
        docker_client::remove_container(container_id, false)
            .await
            .map_err(|e| ToolError::from(e).context("Error removing container"))?;

        Ok(json!({
            "status": "success",
            "container_id": container_id,
            "message": format!("Container {} stopped and removed", container_id),
        }))
    }
}

impl Default for DockerToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl DockerToolHandler {
    #[tool(description = "Create a Dockerfile for a GitHub repository, build the image and run it. project_type is 'python' (port 8000) or 'nodejs' (port 3000).")]
    async fn create_and_run_docker(&self, Parameters(args): Parameters<CreateAndRunDockerArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.build_and_run(args).await?)
    }

    #[tool(description = "Stop and remove a running container by ID or name")]
    async fn kill_container(&self, Parameters(args): Parameters<KillContainerArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.stop_and_remove(&args.container_id).await?)
    }
}

#[tool_handler]
impl ServerHandler for DockerToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Docker MCP Server - build and run GitHub projects in containers. \
                 {} tools available: create_and_run_docker, kill_container.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Docker MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}
