//! Integration tests for the ATF tools MCP hub

use atf_tools::{Args, Config, HubHandler, MountHandler, ToolError, ALL_SERVERS};
use atf_tools::docker_client::{DockerError, RunSpec};
use atf_tools::hub::{build_mounts, resolve_tool};
use atf_tools::process::{self, ProcessError};
use atf_tools::query_result::{compare_results, parse_batch_output};
use atf_tools::tools::{
    DockerToolHandler, MongoToolHandler, MysqlToolHandler, RequestToolHandler,
};
use atf_tools::tools::database_query_tools::{parse_mongo_query, DbKind, MongoOperation};
use clap::Parser;
use rmcp::{model::ErrorCode, ErrorData as McpError, ServerHandler};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

fn tool_names(tools: &[rmcp::model::Tool]) -> Vec<String> {
    let mut names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
    names.sort();
    names
}

// --- Config ---

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8000);
    assert_eq!(config.servers.len(), ALL_SERVERS.len());
    assert_eq!(config.mysql_image, "mysql");
    assert_eq!(config.mongosh_image, "alpine/mongosh:2.0.2");
    assert!(config.mysql_host.is_none());
    assert!(config.mongodb_uri.is_none());
}

#[test]
fn test_config_work_dirs() {
    let config = Config {
        work_dir: PathBuf::from("/srv/atf"),
        ..Config::default()
    };
    assert_eq!(config.clone_dir(), PathBuf::from("/srv/atf/cloned_repos"));
    assert_eq!(config.docker_builds_dir(), PathBuf::from("/srv/atf/docker_builds"));
    assert_eq!(config.image_runs_dir(), PathBuf::from("/srv/atf/image_contest_runs"));
    assert_eq!(config.react_runs_dir(), PathBuf::from("/srv/atf/react_contest_runs"));
}

#[test]
fn test_config_from_args() {
    let args = Args::parse_from([
        "atf-tools",
        "--port", "9000",
        "--servers", "mysql_query,mongodb",
        "--port-wait-secs", "5",
        "--mysql-host", "db.internal",
    ]);
    let config = Config::from_args(&args);
    assert_eq!(config.port, 9000);
    assert!(config.is_enabled("mysql_query"));
    assert!(!config.is_enabled("docker"));
    assert_eq!(config.port_wait, Duration::from_secs(5));
    assert_eq!(config.mysql_host.as_deref(), Some("db.internal"));
}

// --- Handlers ---

#[test]
fn test_every_mount_has_a_handler() {
    let config = Config::default();
    for name in ALL_SERVERS {
        let handler = MountHandler::create(name, &config)
            .unwrap_or_else(|| panic!("no handler for {}", name));
        assert!(!handler.tools().is_empty(), "{} has no tools", name);
        assert!(handler.get_info().capabilities.tools.is_some());
    }
}

#[test]
fn test_mysql_tool_catalogue() {
    let tools = MysqlToolHandler::new(Config::default()).tools();
    assert_eq!(
        tool_names(&tools),
        vec![
            "cleanup_mysql_environment",
            "create_database",
            "create_mysql_docker_environment",
            "evaluate_mysql_query",
            "setup_contest_database",
        ]
    );
}

#[test]
fn test_mongodb_tool_catalogue() {
    let tools = MongoToolHandler::new(Config::default()).tools();
    assert_eq!(tools.len(), 12);
    let names = tool_names(&tools);
    for expected in ["create_docker_container", "read_document", "cleanup_mongodb_environment"] {
        assert!(names.iter().any(|n| n == expected), "missing {}", expected);
    }
}

#[test]
fn test_handler_info_mentions_tool_count() {
    let info = DockerToolHandler::new(Config::default()).get_info();
    assert!(info.instructions.unwrap().contains("2 tools available"));
    let info = RequestToolHandler::default().get_info();
    assert!(info.instructions.unwrap().contains("make_api_request"));
}

// --- Hub ---

#[test]
fn test_hub_exposes_prefixed_tools() {
    let hub = HubHandler::new(&Config::default());
    let names = tool_names(&hub.tools());
    assert!(names.contains(&"mysql_query_evaluate_mysql_query".to_string()));
    assert!(names.contains(&"mongodb_create_docker_container".to_string()));
    assert!(names.contains(&"fastapi_create_docker_container".to_string()));
    assert!(names.contains(&"database_query_execute_query".to_string()));
    // same tool name in two mounts stays distinct
    let create_db: Vec<_> = names.iter().filter(|n| n.ends_with("_create_database")).collect();
    assert_eq!(create_db, vec!["mongodb_create_database", "mysql_query_create_database"]);
}

#[test]
fn test_hub_respects_enabled_servers() {
    let config = Config {
        servers: vec!["git_clone".to_string()],
        ..Config::default()
    };
    let hub = HubHandler::new(&config);
    assert_eq!(hub.mount_names(), vec!["git_clone"]);
    assert_eq!(
        tool_names(&hub.tools()),
        vec!["git_clone_cleanup_clone", "git_clone_github_clone_repo"]
    );
    let err = hub.route("docker_kill_container").err().unwrap();
    assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
}

#[test]
fn test_hub_resolution_longest_prefix() {
    assert_eq!(resolve_tool(["mysql", "mysql_query"], "mysql_query_cleanup"), Some(("mysql_query", "cleanup")));
    assert_eq!(resolve_tool(ALL_SERVERS.iter().copied(), "unknown_tool"), None);
    assert_eq!(build_mounts(&Config::default()).len(), ALL_SERVERS.len());
}

// --- Docker argv ---

#[test]
fn test_run_spec_args() {
    let args = RunSpec::new("mongo")
        .name("db-mongo-mcp-evaluator-0a1b2c3d")
        .detached()
        .network("net-mongo-mcp-evaluator-0a1b2c3d")
        .port(27017, 27017)
        .to_args();
    assert_eq!(
        args,
        vec![
            "run", "-d",
            "--name", "db-mongo-mcp-evaluator-0a1b2c3d",
            "--network", "net-mongo-mcp-evaluator-0a1b2c3d",
            "-p", "27017:27017",
            "mongo",
        ]
    );
}

// --- Errors ---

#[test]
fn test_error_mapping() {
    let err: McpError = ToolError::invalid("bad project type").into();
    assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    assert_eq!(err.message, "bad project type");

    let err: McpError = ToolError::from(DockerError::NotFound("abc".to_string()))
        .context("Failed to kill container")
        .into();
    assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    assert_eq!(err.message, "Failed to kill container: Container abc not found");
}

#[test]
fn test_process_error_display() {
    let err = ProcessError::Timeout { program: "git".to_string(), secs: 300 };
    assert_eq!(err.to_string(), "git timed out after 300 seconds");
}

#[tokio::test]
async fn test_missing_program_is_spawn_error() {
    let err = process::run("atf-tools-no-such-program", ["--version"], None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Spawn { .. }));
}

// --- Query results ---

#[test]
fn test_evaluate_flow_comparison() {
    let actual = parse_batch_output("id\tname\n2\tBob\n1\tAlice\n");
    let expected = json!([{"id": 1, "name": "Alice"}, {"id": "2", "name": "Bob"}]);
    assert!(compare_results(&actual, &expected, false));
    assert!(!compare_results(&actual, &expected, true));
    assert!(!compare_results(&actual, &json!([{"id": 1, "name": "Alice"}]), false));
}

#[test]
fn test_database_query_parsing() {
    assert_eq!(DbKind::parse("MySQL").unwrap(), DbKind::Mysql);
    assert!(DbKind::parse("postgres").is_err());

    let (query, op) = parse_mongo_query(r#"{"collection": "users", "operation": "find", "filter": {"age": 30}}"#).unwrap();
    assert_eq!(query.collection, "users");
    assert_eq!(op, MongoOperation::Find);
    assert!(parse_mongo_query(r#"{"collection": "users", "operation": "drop"}"#).is_err());
}
