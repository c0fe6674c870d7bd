//! `mysql_query` mount: MySQL evaluation workflow
//!
//! create environment -> create database -> setup -> evaluate -> cleanup.
//! Queries run through the `mysql` client inside the container, so the host
//! needs nothing but Docker.

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
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::*;
use super::{json_result, unique_name};
use crate::config::Config;
use crate::docker_client::{self, DockerError, RunSpec};
use crate::error::{Result, ToolError};
use crate::process::ProcessError;
use crate::query_result::{compare_results, parse_batch_output};

const TOOL_COUNT: usize = 5;

const ROOT_PASSWORD: &str = "rootpassword";
const EVALUATOR_USER: &str = "evaluator";
const EVALUATOR_PASSWORD: &str = "evaluatorpass";

const READY_ATTEMPTS: u32 = 30;
const READY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const READY_INTERVAL: Duration = Duration::from_secs(2);

/// MySQL identifiers accepted for database names: `[A-Za-z0-9_$]+`
pub fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn check_database_name(name: &str) -> Result<()> {
    if is_valid_database_name(name) {
        Ok(())
    } else {
        Err(ToolError::invalid(format!(
            "Invalid database name '{}': only letters, digits, '_' and '$' are allowed",
            name
        )))
    }
}

/// argv for the in-container client as `evaluator`
fn evaluator_command(database: Option<&str>, sql: &str, batch: bool) -> Vec<String> {
    let mut cmd = vec![
        "mysql".to_string(),
        "-u".to_string(),
        EVALUATOR_USER.to_string(),
        format!("-p{}", EVALUATOR_PASSWORD),
    ];
    if let Some(db) = database {
        cmd.push(db.to_string());
    }
    if batch {
        cmd.push("--batch".to_string());
        cmd.push("--raw".to_string());
    }
    cmd.push("-e".to_string());
    cmd.push(sql.to_string());
    cmd
}

/// MySQL evaluation tool handler
#[derive(Clone)]
pub struct MysqlToolHandler {
    tool_router: ToolRouter<MysqlToolHandler>,
    config: Config,
}

impl MysqlToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn wait_until_ready(&self, container_id: &str) -> bool {
        let probe = evaluator_command(None, "SELECT 1", false);
        for attempt in 1..=READY_ATTEMPTS {
            match docker_client::exec(container_id, probe.as_slice(), Some(READY_PROBE_TIMEOUT)).await {
                Ok(result) if result.success => {
                    info!("MySQL ready after {} attempt(s)", attempt);
                    return true;
                }
                Ok(result) => debug!("MySQL not ready ({}/{}): {}", attempt, READY_ATTEMPTS, result.error_text()),
                Err(e) => debug!("MySQL not ready ({}/{}): {}", attempt, READY_ATTEMPTS, e),
            }
            tokio::time::sleep(READY_INTERVAL).await;
        }
        false
    }

    async fn create_environment(&self, args: CreateMysqlEnvironmentArgs) -> Result<Value> {
        check_database_name(&args.database_name)?;
        let container_name = unique_name("mysql-evaluator");

        let spec = RunSpec::new(&self.config.mysql_image)
            .name(&container_name)
            .detached()
            .env("MYSQL_ROOT_PASSWORD", ROOT_PASSWORD)
            .env("MYSQL_DATABASE", &args.database_name)
            .env("MYSQL_USER", EVALUATOR_USER)
            .env("MYSQL_PASSWORD", EVALUATOR_PASSWORD)
            .port(args.mysql_port, 3306);
        let container_id = docker_client::run_container(&spec, Some(self.config.command_timeout))
            .await
            .map_err(|e| ToolError::from(e).context("Error creating MySQL environment"))?;

        if !self.wait_until_ready(&container_id).await {
            docker_client::force_remove(&container_id).await;
            return Err(ToolError::failed(
                "Error creating MySQL environment",
                format!("MySQL container failed to become ready after {} attempts", READY_ATTEMPTS),
            ));
        }

        Ok(json!({
            "status": "success",
            "container_id": container_id,
            "container_name": container_name,
            "database_name": args.database_name,
            "port": args.mysql_port,
            "connection_info": {
                "host": "localhost",
                "port": args.mysql_port,
                "user": EVALUATOR_USER,
                "password": EVALUATOR_PASSWORD,
                "database": args.database_name,
            },
        }))
    }

    async fn create_db(&self, container_id: &str, database_name: &str) -> Result<Value> {
        check_database_name(database_name)?;
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS `{db}`; \
             GRANT ALL PRIVILEGES ON `{db}`.* TO '{user}'@'%'; \
             FLUSH PRIVILEGES;",
            db = database_name,
            user = EVALUATOR_USER,
        );
        let password = format!("-p{}", ROOT_PASSWORD);
        let command = ["mysql", "-u", "root", password.as_str(), "-e", sql.as_str()];
        let result = docker_client::exec(container_id, &command, Some(self.config.command_timeout)).await?;
        if !result.success {
            return Err(ToolError::failed("Error creating database", result.error_text()));
        }

        Ok(json!({
            "status": "success",
            "database_name": database_name,
            "message": format!("Database '{}' created and granted to '{}'", database_name, EVALUATOR_USER),
        }))
    }

    async fn run_setup(&self, args: SetupContestDatabaseArgs) -> Result<Value> {
        check_database_name(&args.database_name)?;
        for (i, query) in args.setup_queries.iter().enumerate() {
            let command = evaluator_command(Some(&args.database_name), query, false);
            let result = docker_client::exec(&args.container_id, command.as_slice(), Some(self.config.command_timeout)).await?;
            if !result.success {
                return Err(ToolError::failed(
                    format!("Setup query {} failed", i + 1),
                    result.error_text(),
                ));
            }
        }

        Ok(json!({
            "status": "success",
            "queries_executed": args.setup_queries.len(),
            "message": format!("Executed {} setup queries", args.setup_queries.len()),
        }))
    }

    /// Evaluation outcomes, including failures, are reported as data
    async fn evaluate(&self, args: EvaluateMysqlQueryArgs) -> Result<Value> {
        check_database_name(&args.database_name)?;
        let command = evaluator_command(Some(&args.database_name), &args.user_query, true);
        let limit = Duration::from_secs(args.timeout_seconds);

        let started = Instant::now();
        let outcome = docker_client::exec(&args.container_id, command.as_slice(), Some(limit)).await;
        let execution_time = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(result) => result,
            Err(DockerError::Process(ProcessError::Timeout { .. })) => {
                warn!("Query timed out after {} seconds", args.timeout_seconds);
                return Ok(json!({
                    "status": "timeout",
                    "query": args.user_query,
                    "error": format!("Query timed out after {} seconds", args.timeout_seconds),
                    "correct": false,
                }));
            }
            Err(e) => {
                return Ok(json!({
                    "status": "error",
                    "query": args.user_query,
                    "error": e.to_string(),
                    "correct": false,
                }))
            }
        };

        if !result.success {
            return Ok(json!({
                "status": "error",
                "query": args.user_query,
                "error": result.error_text(),
                "correct": false,
            }));
        }

        let actual = parse_batch_output(&result.stdout);
        let (correct, comparison) = match &args.expected_result {
            Some(expected) => {
                let matched = compare_results(&actual, expected, args.order_sensitive);
                (matched, json!({"expected": expected, "actual": actual, "match": matched}))
            }
            None => (true, Value::Null),
        };

        Ok(json!({
            "status": "success",
            "query": args.user_query,
            "result": actual,
            "correct": correct,
            "comparison": comparison,
            "execution_time": execution_time,
        }))
    }

    async fn cleanup(&self, container_id: &str) -> Result<Value> {
        docker_client::stop_container(container_id)
            .await
            .map_err(|e| ToolError::from(e).context("Error cleaning up MySQL environment"))?;
        docker_client::remove_container(container_id, false)
            .await
            .map_err(|e| ToolError::from(e).context("Error cleaning up MySQL environment"))?;

        Ok(json!({
            "status": "success",
            "message": format!("Container {} stopped and removed", docker_client::short_id(container_id)),
        }))
    }
}

impl Default for MysqlToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl MysqlToolHandler {
    #[tool(description = "Start a MySQL container for query evaluation and wait until it accepts connections")]
    async fn create_mysql_docker_environment(&self, Parameters(args): Parameters<CreateMysqlEnvironmentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.create_environment(args).await?)
    }

    #[tool(description = "Create a database in the MySQL container and grant it to the evaluator user")]
    async fn create_database(&self, Parameters(args): Parameters<CreateMysqlDatabaseArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.create_db(&args.container_id, &args.database_name).await?)
    }

    #[tool(description = "Run setup SQL statements (tables, seed data) in order; stops at the first failure")]
    async fn setup_contest_database(&self, Parameters(args): Parameters<SetupContestDatabaseArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.run_setup(args).await?)
    }

    #[tool(description = "Run a user query and compare its rows with the expected result. Row order is ignored unless order_sensitive is set.")]
    async fn evaluate_mysql_query(&self, Parameters(args): Parameters<EvaluateMysqlQueryArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.evaluate(args).await?)
    }

    #[tool(description = "Stop and remove the MySQL container")]
    async fn cleanup_mysql_environment(&self, Parameters(args): Parameters<CleanupMysqlEnvironmentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.cleanup(&args.container_id).await?)
    }
}

#[tool_handler]
impl ServerHandler for MysqlToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "MySQL Query Evaluation MCP Server. {} tools available: \
                 create_mysql_docker_environment, create_database, setup_contest_database, \
                 evaluate_mysql_query, cleanup_mysql_environment.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("MySQL MCP server initialized with {} tools", TOOL_COUNT);
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
    fn test_database_name_validation() {
        assert!(is_valid_database_name("contest_db"));
        assert!(is_valid_database_name("db$2"));
        assert!(!is_valid_database_name(""));
        assert!(!is_valid_database_name("x`; DROP DATABASE mysql; --"));
        assert!(!is_valid_database_name("my-db"));
    }

    #[test]
    fn test_evaluator_command_shape() {
        let cmd = evaluator_command(Some("contest_db"), "SELECT 1", true);
        assert_eq!(
            cmd,
            vec!["mysql", "-u", "evaluator", "-pevaluatorpass", "contest_db", "--batch", "--raw", "-e", "SELECT 1"]
        );
        let probe = evaluator_command(None, "SELECT 1", false);
        assert_eq!(probe, vec!["mysql", "-u", "evaluator", "-pevaluatorpass", "-e", "SELECT 1"]);
    }

    #[test]
    fn test_evaluate_args_defaults() {
        let args: EvaluateMysqlQueryArgs = serde_json::from_value(json!({
            "container_id": "abc",
            "user_query": "SELECT 1",
        }))
        .unwrap();
        assert_eq!(args.timeout_seconds, 30);
        assert_eq!(args.database_name, "contest_db");
        assert!(!args.order_sensitive);
        assert!(args.expected_result.is_none());
    }

    #[tokio::test]
    async fn test_create_database_rejects_bad_name() {
        let err = MysqlToolHandler::default()
            .create_database(Parameters(CreateMysqlDatabaseArgs {
                container_id: "abc".to_string(),
                database_name: "bad name".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_evaluate_against_missing_container_is_data() {
        let result = MysqlToolHandler::default()
            .evaluate_mysql_query(Parameters(EvaluateMysqlQueryArgs {
                container_id: "atf-test-no-such-container".to_string(),
                user_query: "SELECT 1".to_string(),
                expected_result: Some(json!([{"1": 1}])),
                timeout_seconds: 10,
                database_name: "contest_db".to_string(),
                order_sensitive: false,
            }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_ne!(body["status"], "success");
        assert_eq!(body["correct"], false);
    }

    #[test]
    fn test_server_info() {
        let instructions = MysqlToolHandler::default().get_info().instructions.unwrap();
        assert!(instructions.contains("5 tools"));
        assert!(instructions.contains("evaluate_mysql_query"));
    }
}
