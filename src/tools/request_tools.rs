//! `nodejs` mount: issue an HTTP request against a running application

use reqwest::{header::CONTENT_TYPE, Method};
use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    RoleServer,
};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::info;

use super::json_result;
use super::types::*;
use crate::error::{Result, ToolError};

const TOOL_COUNT: usize = 1;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper-case and validate an HTTP method name
pub fn parse_method(method: &str) -> Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(ToolError::invalid("HTTP method must not be empty"));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| ToolError::invalid(format!("Invalid HTTP method '{}'", method)))
}

/// HTTP request tool handler
#[derive(Clone)]
pub struct RequestToolHandler {
    tool_router: ToolRouter<RequestToolHandler>,
    client: reqwest::Client,
}

impl RequestToolHandler {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
            client: reqwest::Client::new(),
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn send(&self, args: ApiRequestArgs) -> Result<Value> {
        let method = parse_method(&args.method)?;
        let payload = match args.payload.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                serde_json::from_str::<Value>(raw)
                    .map_err(|e| ToolError::invalid(format!("Invalid JSON payload: {}", e)))?,
            ),
        };

        info!("{} {}", method, args.url);
        let mut request = self
            .client
            .request(method, &args.url)
            .timeout(REQUEST_TIMEOUT)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &payload {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::from(e).context("API request failed"))?;

        let status_code = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    Value::String(String::from_utf8_lossy(value.as_bytes()).to_string()),
                )
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::from(e).context("API request failed"))?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(json!({
            "status": "success",
            "status_code": status_code,
            "headers": headers,
            "body": body,
        }))
    }
}

impl Default for RequestToolHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl RequestToolHandler {
    #[tool(description = "Make an HTTP request (GET, POST, PUT, DELETE, ...) with an optional JSON payload and return status, headers and body")]
    async fn make_api_request(&self, Parameters(args): Parameters<ApiRequestArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.send(args).await?)
    }
}

#[tool_handler]
impl ServerHandler for RequestToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Node.js API MCP Server - send HTTP requests to a running app. \
                 {} tool available: make_api_request.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Node.js API MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}
