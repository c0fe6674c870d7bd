//! `react_contest` mount: build a React app with Playwright checks in Docker and report the results

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
use tracing::{debug, info, warn};

use super::git_clone_tools::clone_repo;
use super::templates::{self, DEFAULT_REACT_BUILD_STEP, DOCKERFILE_REACT_CONTEST, PLAYWRIGHT_TEST_PY, REACT_RUN_ALL_SH};
use super::types::*;
use super::{json_result, repo_name_from_url, validate_github_url};
use crate::config::Config;
use crate::docker_client::{self, RunSpec};
use crate::error::{Result, ToolError};
use crate::process::shell_quote;

const TOOL_COUNT: usize = 1;

/// Dockerfile `RUN` line for the build step
pub fn build_step(build_command: Option<&str>) -> Result<String> {
    match build_command.map(str::trim) {
        None | Some("") => Ok(DEFAULT_REACT_BUILD_STEP.to_string()),
        Some(cmd) if cmd.contains(['\n', '\r']) => {
            Err(ToolError::invalid("build_command must be a single line"))
        }
        Some(cmd) => Ok(format!("RUN {}", cmd)),
    }
}

/// Entrypoint script with the start command override filled in
pub fn render_run_script(start_command: Option<&str>) -> String {
    let quoted = start_command
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(shell_quote)
        .unwrap_or_else(|| "''".to_string());
    templates::render(REACT_RUN_ALL_SH, &[("START_COMMAND", quoted.as_str())])
}

/// React contest tool handler
#[derive(Clone)]
pub struct ReactContestToolHandler {
    tool_router: ToolRouter<ReactContestToolHandler>,
    config: Config,
}

impl ReactContestToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    /// Clone the app and write the build context under `run_dir`
    async fn prepare_run_dir(&self, args: &RunReactContestArgs, run_dir: &Path) -> Result<()> {
        let step = build_step(args.build_command.as_deref())?;
        let code_dir = run_dir.join("code");
        if code_dir.exists() {
            info!("Removing existing code directory {}", code_dir.display());
            tokio::fs::remove_dir_all(&code_dir).await?;
        }
        tokio::fs::create_dir_all(run_dir).await?;
        clone_repo(&args.github_url, &code_dir, self.config.command_timeout).await?;

        let port = args.port.to_string();
        tokio::fs::write(code_dir.join("playwright_test.py"), PLAYWRIGHT_TEST_PY).await?;
        tokio::fs::write(run_dir.join("run_all.sh"), render_run_script(args.start_command.as_deref())).await?;
        tokio::fs::write(
            run_dir.join("Dockerfile"),
            templates::render(DOCKERFILE_REACT_CONTEST, &[("BUILD_STEP", step.as_str()), ("PORT", port.as_str())]),
        )
        .await?;
        Ok(())
    }

    /// Start the container and wait for it to exit successfully
    async fn run_to_completion(&self, spec: &RunSpec, container_name: &str) -> Result<()> {
        docker_client::run_container(spec, Some(self.config.command_timeout)).await?;

        let exit_code = docker_client::wait_container(container_name, self.config.react_timeout).await;

        if let Ok(logs) = docker_client::logs(container_name).await {
            debug!("{} stdout:\n{}", container_name, logs.stdout);
            if !logs.stderr.is_empty() {
                debug!("{} stderr:\n{}", container_name, logs.stderr);
            }
        }

        match exit_code? {
            0 => Ok(()),
            code => Err(ToolError::failed(
                "React contest failed",
                format!("container exited with code {}", code),
            )),
        }
    }

    async fn run_contest(&self, args: RunReactContestArgs) -> Result<Value> {
        validate_github_url(&args.github_url)?;
        let repo = repo_name_from_url(&args.github_url);
        let run_dir = self.config.react_runs_dir().join(&repo);
        self.prepare_run_dir(&args, &run_dir).await?;

        let container_name = format!("react-contest-{}", repo.to_lowercase());
        let image_tag = format!("{}:latest", container_name);
        docker_client::build_image(&image_tag, &run_dir, Some(self.config.build_timeout))
            .await
            .map_err(|e| ToolError::from(e).context("React contest failed"))?;

        docker_client::force_remove(&container_name).await;

        let output_dir = run_dir.join("output");
        tokio::fs::create_dir_all(&output_dir).await?;
        let results_path = output_dir.join("test_results.json");
        if results_path.exists() {
            tokio::fs::remove_file(&results_path).await?;
        }
        let output_abs = tokio::fs::canonicalize(&output_dir).await?;

        let spec = RunSpec::new(&image_tag)
            .name(&container_name)
            .detached()
            .port(args.port, args.port)
            .volume(output_abs.display().to_string(), "/app/output")
            .env("REACT_PORT", args.port.to_string())
            .env("HEADLESS", args.headless.to_string());

        let outcome = self.run_to_completion(&spec, &container_name).await;
        if args.keep_container_running {
            info!("Leaving container '{}' in place", container_name);
        } else {
            docker_client::force_remove(&container_name).await;
        }
        outcome.map_err(|e| e.context("React contest failed"))?;

        if !results_path.is_file() {
            return Err(ToolError::failed(
                "React contest failed",
                "Test results not found in output directory.",
            ));
        }
        let test_results: Value = serde_json::from_str(&tokio::fs::read_to_string(&results_path).await?)?;
        if let Some(errors) = test_results.get("console_errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                warn!("{} console error(s) reported by {}", errors.len(), repo);
            }
        }

        let mut response = json!({"status": "success"});
        if let (Some(body), Some(extra)) = (response.as_object_mut(), test_results.as_object()) {
            for (key, value) in extra {
                if key != "status" {
                    body.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(response)
    }
}

impl Default for ReactContestToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl ReactContestToolHandler {
    #[tool(description = "Clone a React app, build it with Playwright in Docker, run structural checks and screenshots, and return the results")]
    async fn run_react_contest_tests(&self, Parameters(args): Parameters<RunReactContestArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.run_contest(args).await?)
    }
}

#[tool_handler]
impl ServerHandler for ReactContestToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "React Contest MCP Server. {} tool available: run_react_contest_tests.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("React Contest MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_step_default_and_custom() {
        assert_eq!(build_step(None).unwrap(), DEFAULT_REACT_BUILD_STEP);
        assert_eq!(build_step(Some("  ")).unwrap(), DEFAULT_REACT_BUILD_STEP);
        assert_eq!(build_step(Some("npm run build:prod")).unwrap(), "RUN npm run build:prod");
        assert!(build_step(Some("npm run build\nRUN rm -rf /")).is_err());
    }

    #[test]
    fn test_run_script_start_command_is_quoted() {
        let script = render_run_script(Some("npm run serve -- --port 5173; echo 'hi'"));
        assert!(script.contains(r#"CUSTOM_START_CMD='npm run serve -- --port 5173; echo '\''hi'\'''"#));
        assert!(!script.contains("{{START_COMMAND}}"));
    }

    #[test]
    fn test_run_script_without_override() {
        let script = render_run_script(None);
        assert!(script.contains("CUSTOM_START_CMD=''\n"));
    }

    #[test]
    fn test_args_defaults() {
        let args: RunReactContestArgs =
            serde_json::from_value(json!({"github_url": "https://github.com/u/app.git"})).unwrap();
        assert_eq!(args.port, 5173);
        assert!(args.headless);
        assert!(!args.keep_container_running);
        assert!(args.build_command.is_none());
    }

    #[tokio::test]
    async fn test_rejects_multiline_build_command_before_cloning() {
        let dir = tempfile::tempdir().unwrap();
        let handler = ReactContestToolHandler::new(Config {
            work_dir: dir.path().to_path_buf(),
            ..Config::default()
        });
        let err = handler
            .run_react_contest_tests(Parameters(RunReactContestArgs {
                github_url: "https://github.com/user/app.git".to_string(),
                port: 5173,
                headless: true,
                build_command: Some("true\nRUN false".to_string()),
                start_command: None,
                keep_container_running: false,
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(!dir.path().join("react_contest_runs/app/code").exists());
    }
}
