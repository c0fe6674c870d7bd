//! Mount registry and transports
//!
//! Every enabled mount is served on its own streamable-HTTP endpoint at
//! `/tools/<mount>/mcp`. The same mounts are also combined into a single
//! [`HubHandler`] whose tools are named `<mount>_<tool>`, served at
//! `/tools/mcp` or over stdio.

use axum::Router;
use rmcp::{
    ServerHandler,
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    },
    RoleServer,
};
use tracing::{debug, info};

use crate::config::{Config, ALL_SERVERS};
use crate::tools::{
    DatabaseQueryToolHandler, DependencyToolHandler, DockerToolHandler, FastapiToolHandler,
    GitCloneToolHandler, ImageProcessingToolHandler, MongoToolHandler, MysqlToolHandler,
    ReactContestToolHandler, RequestToolHandler,
};

/// One of the tool handlers, so mounts can be stored side by side
#[derive(Clone)]
pub enum MountHandler {
    Docker(DockerToolHandler),
    GitClone(GitCloneToolHandler),
    Dependencies(DependencyToolHandler),
    MysqlQuery(MysqlToolHandler),
    Mongodb(MongoToolHandler),
    ImageProcessing(ImageProcessingToolHandler),
    Fastapi(FastapiToolHandler),
    ReactContest(ReactContestToolHandler),
    Nodejs(RequestToolHandler),
    DatabaseQuery(DatabaseQueryToolHandler),
}

macro_rules! dispatch {
    ($handler:expr, $inner:ident => $body:expr) => {
        match $handler {
            MountHandler::Docker($inner) => $body,
            MountHandler::GitClone($inner) => $body,
            MountHandler::Dependencies($inner) => $body,
            MountHandler::MysqlQuery($inner) => $body,
            MountHandler::Mongodb($inner) => $body,
            MountHandler::ImageProcessing($inner) => $body,
            MountHandler::Fastapi($inner) => $body,
            MountHandler::ReactContest($inner) => $body,
            MountHandler::Nodejs($inner) => $body,
            MountHandler::DatabaseQuery($inner) => $body,
        }
    };
}

impl MountHandler {
    /// Handler for a mount name, `None` if the name is not a known mount
    pub fn create(name: &str, config: &Config) -> Option<Self> {
        let config = config.clone();
        let handler = match name {
            "docker" => Self::Docker(DockerToolHandler::new(config)),
            "git_clone" => Self::GitClone(GitCloneToolHandler::new(config)),
            "dependencies" => Self::Dependencies(DependencyToolHandler::new(config)),
            "mysql_query" => Self::MysqlQuery(MysqlToolHandler::new(config)),
            "mongodb" => Self::Mongodb(MongoToolHandler::new(config)),
            "image_processing" => Self::ImageProcessing(ImageProcessingToolHandler::new(config)),
            "fastapi" => Self::Fastapi(FastapiToolHandler::new(config)),
            "react_contest" => Self::ReactContest(ReactContestToolHandler::new(config)),
            "nodejs" => Self::Nodejs(RequestToolHandler::new()),
            "database_query" => Self::DatabaseQuery(DatabaseQueryToolHandler::new(config)),
            _ => return None,
        };
        Some(handler)
    }

    pub fn tools(&self) -> Vec<Tool> {
        dispatch!(self, h => h.tools())
    }
}

impl ServerHandler for MountHandler {
    fn get_info(&self) -> ServerInfo {
        dispatch!(self, h => h.get_info())
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        dispatch!(self, h => h.initialize(request, context).await)
    }

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        dispatch!(self, h => h.list_tools(request, context).await)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        dispatch!(self, h => h.call_tool(request, context).await)
    }
}

/// A named, enabled mount
#[derive(Clone)]
pub struct Mount {
    pub name: &'static str,
    pub handler: MountHandler,
}

/// Enabled mounts in registration order
pub fn build_mounts(config: &Config) -> Vec<Mount> {
    ALL_SERVERS
        .iter()
        .filter(|name| config.is_enabled(name))
        .filter_map(|&name| {
            MountHandler::create(name, config).map(|handler| Mount { name, handler })
        })
        .collect()
}

/// Name of a mount's tool on the combined endpoint
pub fn prefixed_name(mount: &str, tool: &str) -> String {
    format!("{}_{}", mount, tool)
}

/// Split a combined tool name into `(mount, tool)` using the longest matching mount prefix
pub fn resolve_tool<'m, 'n>(
    mounts: impl IntoIterator<Item = &'m str>,
    name: &'n str,
) -> Option<(&'m str, &'n str)> {
    mounts
        .into_iter()
        .filter_map(|mount| {
            let tool = name.strip_prefix(mount)?.strip_prefix('_')?;
            (!tool.is_empty()).then_some((mount, tool))
        })
        .max_by_key(|(mount, _)| mount.len())
}

/// Combined handler exposing every enabled mount under a name prefix
#[derive(Clone)]
pub struct HubHandler {
    mounts: Vec<Mount>,
}

impl HubHandler {
    pub fn new(config: &Config) -> Self {
        Self::from_mounts(build_mounts(config))
    }

    pub fn from_mounts(mounts: Vec<Mount>) -> Self {
        Self { mounts }
    }

    pub fn mount_names(&self) -> Vec<&'static str> {
        self.mounts.iter().map(|m| m.name).collect()
    }

    /// Every tool of every mount, renamed to `<mount>_<tool>`
    pub fn tools(&self) -> Vec<Tool> {
        self.mounts
            .iter()
            .flat_map(|mount| {
                mount.handler.tools().into_iter().map(move |mut tool| {
                    tool.name = prefixed_name(mount.name, &tool.name).into();
                    tool
                })
            })
            .collect()
    }

    /// Mount and unprefixed tool name for a combined tool name
    pub fn route<'n>(&self, name: &'n str) -> Result<(&Mount, &'n str), McpError> {
        resolve_tool(self.mounts.iter().map(|m| m.name), name)
            .and_then(|(mount_name, tool)| {
                self.mounts
                    .iter()
                    .find(|m| m.name == mount_name)
                    .map(|mount| (mount, tool))
            })
            .ok_or_else(|| McpError::invalid_params(format!("Unknown tool '{}'", name), None))
    }
}

impl ServerHandler for HubHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "ATF Tools MCP Hub. {} tools available, named <mount>_<tool>. Mounts: {}.",
                self.tools().len(),
                self.mount_names().join(", "),
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("ATF Tools hub initialized with {} mounts", self.mounts.len());
        Ok(self.get_info())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let (mount, tool) = self.route(&request.name)?;
        debug!("Dispatching {} to mount '{}' as '{}'", request.name, mount.name, tool);
        let inner = CallToolRequestParam {
            name: tool.to_string().into(),
            arguments: request.arguments.clone(),
        };
        mount.handler.call_tool(inner, context).await
    }
}

fn streamable_service<S>(handler: S) -> StreamableHttpService<S, LocalSessionManager>
where
    S: ServerHandler + Clone + Send + Sync + 'static,
{
    StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    )
}

/// Per-mount endpoints plus the combined endpoint
pub fn build_router(config: &Config) -> Router {
    let mounts = build_mounts(config);
    let mut router = Router::new();
    for mount in &mounts {
        let path = format!("/tools/{}/mcp", mount.name);
        info!("Mounting {}", path);
        router = router.nest_service(&path, streamable_service(mount.handler.clone()));
    }
    info!("Mounting /tools/mcp with {} mounts", mounts.len());
    router.nest_service("/tools/mcp", streamable_service(HubHandler::from_mounts(mounts)))
}

/// Serve the HTTP transport until Ctrl-C
pub async fn serve_http(config: &Config) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, build_router(config))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}
