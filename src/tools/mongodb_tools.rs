//! `mongodb` mount: MongoDB container plus a mongosh sidecar, and CRUD through it
//!
//! Every operation is a `mongosh --eval` inside the sidecar, pointed at the
//! database container by name over their shared network. Collection names
//! only reach JavaScript as JSON string literals.

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
use tracing::{info, warn};

use super::types::*;
use super::{json_result, unique_name};
use crate::config::Config;
use crate::docker_client::{self, DockerError, ExecResult, RunSpec};
use crate::error::{Result, ToolError};

const TOOL_COUNT: usize = 12;

/// `db.getCollection("<name>")` with the name escaped as a JSON string
pub fn collection_ref(name: &str) -> String {
    let literal = serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string());
    format!("db.getCollection({})", literal)
}

/// Split a comma-separated list of names, dropping blanks
pub fn split_collection_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// The list wins over the single value; neither is invalid input
fn one_or_many(single: Option<String>, many: Option<Vec<String>>, what: &str) -> Result<Vec<String>> {
    match (many, single) {
        (Some(list), _) if !list.is_empty() => Ok(list),
        (_, Some(one)) if !one.is_empty() => Ok(vec![one]),
        _ => Err(ToolError::invalid(format!("No {} provided", what))),
    }
}

/// Pair up filters and updates for update_document
fn update_pairs(args: &UpdateDocumentArgs) -> Result<Vec<(String, String)>> {
    match (&args.filter_queries, &args.update_queries) {
        (Some(filters), Some(updates)) => {
            if filters.len() != updates.len() {
                return Err(ToolError::invalid(format!(
                    "filter_queries and update_queries must have the same length ({} vs {})",
                    filters.len(),
                    updates.len()
                )));
            }
            if filters.is_empty() {
                return Err(ToolError::invalid("No filter_queries provided"));
            }
            Ok(filters.iter().cloned().zip(updates.iter().cloned()).collect())
        }
        (Some(_), None) | (None, Some(_)) => Err(ToolError::invalid(
            "filter_queries and update_queries must be given together",
        )),
        (None, None) => match (&args.filter_query, &args.update_query) {
            (Some(filter), Some(update)) => Ok(vec![(filter.clone(), update.clone())]),
            _ => Err(ToolError::invalid("No filter_query/update_query provided")),
        },
    }
}

/// Parse mongosh output as JSON, falling back to the raw text
fn parse_output(stdout: &str) -> Value {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

/// One entry of a multi-item result
fn item_result(
    key: Option<(&str, &str)>,
    outcome: std::result::Result<ExecResult, DockerError>,
    output_key: Option<&str>,
) -> Value {
    let mut entry = Map::new();
    if let Some((k, v)) = key {
        entry.insert(k.to_string(), Value::String(v.to_string()));
    }
    match outcome {
        Ok(result) if result.success => {
            entry.insert("status".to_string(), json!("success"));
            if let Some(field) = output_key {
                entry.insert(field.to_string(), parse_output(&result.stdout));
            }
        }
        Ok(result) => {
            entry.insert("status".to_string(), json!("error"));
            entry.insert("error".to_string(), json!(result.error_text()));
        }
        Err(e) => {
            entry.insert("status".to_string(), json!("error"));
            entry.insert("error".to_string(), json!(e.to_string()));
        }
    }
    Value::Object(entry)
}

fn batch_summary(results: Vec<Value>, verb: &str, noun: &str) -> Value {
    let message = format!("Attempted to {} {} {}(s).", verb, results.len(), noun);
    json!({"results": results, "message": message})
}

/// MongoDB tool handler
#[derive(Clone)]
pub struct MongoToolHandler {
    tool_router: ToolRouter<MongoToolHandler>,
    config: Config,
}

impl MongoToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn mongosh(
        &self,
        target: &MongoTarget,
        database: &str,
        script: &str,
    ) -> std::result::Result<ExecResult, DockerError> {
        let uri = format!("mongodb://{}:27017/{}", target.db_mongo_container_name, database);
        let command = ["mongosh", uri.as_str(), "--quiet", "--eval", script];
        docker_client::exec(&target.sh_mongo_container_name, &command, Some(self.config.command_timeout)).await
    }

    /// mongosh that must succeed
    async fn mongosh_checked(&self, target: &MongoTarget, database: &str, script: &str, context: &str) -> Result<String> {
        let result = self
            .mongosh(target, database, script)
            .await
            .map_err(|e| ToolError::from(e).context(context))?;
        if !result.success {
            return Err(ToolError::failed(context, result.error_text()));
        }
        Ok(result.stdout)
    }

    async fn start_environment(&self, mongo_port: u16) -> Result<Value> {
        let base = unique_name("mongo-mcp-evaluator");
        let network_name = format!("net-{}", base);
        let db_name = format!("db-{}", base);
        let sh_name = format!("sh-{}", base);
        let context = "Error creating MongoDB/mongosh environment";

        docker_client::create_network(&network_name)
            .await
            .map_err(|e| ToolError::from(e).context(context))?;

        let db_spec = RunSpec::new(&self.config.mongo_image)
            .name(&db_name)
            .detached()
            .network(&network_name)
            .port(mongo_port, 27017);
        let db_id = match docker_client::run_container(&db_spec, Some(self.config.command_timeout)).await {
            Ok(id) => id,
            Err(e) => {
                self.teardown(&[], &network_name).await;
                return Err(ToolError::from(e).context(context));
            }
        };

        let sh_spec = RunSpec::new(&self.config.mongosh_image)
            .name(&sh_name)
            .detached()
            .network(&network_name)
            .command(["sleep", "infinity"]);
        let sh_id = match docker_client::run_container(&sh_spec, Some(self.config.command_timeout)).await {
            Ok(id) => id,
            Err(e) => {
                self.teardown(&[db_name.as_str()], &network_name).await;
                return Err(ToolError::from(e).context(context));
            }
        };

        info!("MongoDB '{}' and mongosh '{}' running on '{}'", db_name, sh_name, network_name);
        Ok(json!({
            "status": "success",
            "db_mongo_container_id": db_id,
            "sh_mongo_container_id": sh_id,
            "mongo_container_name": db_name,
            "mongosh_container_name": sh_name,
            "network_name": network_name,
            "port": mongo_port,
            "message": "MongoDB and mongosh containers created and running.",
        }))
    }

    /// Best-effort removal used when environment creation fails halfway
    async fn teardown(&self, containers: &[&str], network: &str) {
        for container in containers {
            docker_client::force_remove(container).await;
        }
        if let Err(e) = docker_client::remove_network(network).await {
            warn!("{}", e);
        }
    }

    async fn create_db(&self, args: MongoCreateDatabaseArgs) -> Result<Value> {
        let script = format!("{}.insertOne({{ name: \"test\" }})", collection_ref("testcollection"));
        self.mongosh_checked(&args.target, &args.database_name, &script, "Error creating MongoDB database")
            .await?;
        Ok(json!({
            "status": "success",
            "db_mongo_container_name": args.target.db_mongo_container_name,
            "sh_mongo_container_name": args.target.sh_mongo_container_name,
            "database_name": args.database_name,
            "message": format!("Database '{}' created and test document inserted successfully.", args.database_name),
        }))
    }

    async fn drop_db(&self, args: MongoDeleteDatabaseArgs) -> Result<Value> {
        self.mongosh_checked(&args.target, &args.database_name, "db.dropDatabase()", "Error dropping MongoDB database")
            .await?;
        Ok(json!({
            "status": "success",
            "database_name": args.database_name,
            "message": format!("Database '{}' dropped successfully.", args.database_name),
        }))
    }

    /// Run one script per collection and collect per-collection results
    async fn for_each_collection<F>(
        &self,
        target: &MongoTarget,
        database: &str,
        names: &[String],
        output_key: Option<&str>,
        script: F,
    ) -> Vec<Value>
    where
        F: Fn(&str) -> String,
    {
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.mongosh(target, database, &script(&collection_ref(name))).await;
            results.push(item_result(Some(("collection_name", name.as_str())), outcome, output_key));
        }
        results
    }

    async fn create_collections(&self, args: CreateCollectionArgs) -> Result<Value> {
        let names = split_collection_names(&args.collection_names);
        if names.is_empty() {
            return Err(ToolError::invalid("No valid collection names provided."));
        }
        let mut results = Vec::with_capacity(names.len());
        for name in &names {
            let literal = serde_json::to_string(name)?;
            let outcome = self
                .mongosh(&args.target, &args.database_name, &format!("db.createCollection({})", literal))
                .await;
            results.push(item_result(Some(("collection_name", name.as_str())), outcome, None));
        }
        Ok(batch_summary(results, "create", "collection"))
    }

    async fn read_collections(&self, args: CollectionsArgs) -> Result<Value> {
        let names = one_or_many(args.collection_name, args.collection_names, "collection_name or collection_names")?;
        let results = self
            .for_each_collection(&args.target, &args.database_name, &names, Some("documents"), |c| {
                format!("JSON.stringify({}.find().toArray())", c)
            })
            .await;
        Ok(batch_summary(results, "read", "collection"))
    }

    async fn update_collections(&self, args: UpdateCollectionArgs) -> Result<Value> {
        let UpdateCollectionArgs { collections, filter_query, update_query } = args;
        let names = one_or_many(
            collections.collection_name,
            collections.collection_names,
            "collection_name or collection_names",
        )?;
        let results = self
            .for_each_collection(&collections.target, &collections.database_name, &names, Some("output"), |c| {
                format!("JSON.stringify({}.updateMany({}, {}))", c, filter_query, update_query)
            })
            .await;
        Ok(batch_summary(results, "update", "collection"))
    }

    async fn drop_collections(&self, args: CollectionsArgs) -> Result<Value> {
        let names = one_or_many(args.collection_name, args.collection_names, "collection_name or collection_names")?;
        let results = self
            .for_each_collection(&args.target, &args.database_name, &names, None, |c| format!("{}.drop()", c))
            .await;
        Ok(batch_summary(results, "delete", "collection"))
    }

    /// Run one script per item against a single collection
    async fn for_each_item<F>(
        &self,
        target: &MongoTarget,
        database: &str,
        items: &[String],
        output_key: Option<&str>,
        script: F,
    ) -> Vec<Value>
    where
        F: Fn(&str) -> String,
    {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let outcome = self.mongosh(target, database, &script(item)).await;
            results.push(item_result(None, outcome, output_key));
        }
        results
    }

    async fn insert_documents(&self, args: CreateDocumentArgs) -> Result<Value> {
        let docs = one_or_many(args.document, args.documents, "document or documents")?;
        let collection = collection_ref(&args.collection_name);
        let results = self
            .for_each_item(&args.target, &args.database_name, &docs, Some("output"), |doc| {
                format!("JSON.stringify({}.insertOne({}))", collection, doc)
            })
            .await;
        Ok(batch_summary(results, "insert", "document"))
    }

    async fn find_documents(&self, args: FilterDocumentArgs) -> Result<Value> {
        let filters = one_or_many(args.filter_query, args.filter_queries, "filter_query or filter_queries")?;
        let collection = collection_ref(&args.collection_name);
        let results = self
            .for_each_item(&args.target, &args.database_name, &filters, Some("document"), |filter| {
                format!("JSON.stringify({}.findOne({}))", collection, filter)
            })
            .await;
        Ok(batch_summary(results, "read", "document"))
    }

    async fn update_documents(&self, args: UpdateDocumentArgs) -> Result<Value> {
        let pairs = update_pairs(&args)?;
        let collection = collection_ref(&args.collection_name);
        let mut results = Vec::with_capacity(pairs.len());
        for (filter, update) in &pairs {
            let script = format!("JSON.stringify({}.updateOne({}, {}))", collection, filter, update);
            let outcome = self.mongosh(&args.target, &args.database_name, &script).await;
            results.push(item_result(None, outcome, Some("output")));
        }
        Ok(batch_summary(results, "update", "document"))
    }

    async fn remove_documents(&self, args: FilterDocumentArgs) -> Result<Value> {
        let filters = one_or_many(args.filter_query, args.filter_queries, "filter_query or filter_queries")?;
        let collection = collection_ref(&args.collection_name);
        let results = self
            .for_each_item(&args.target, &args.database_name, &filters, Some("output"), |filter| {
                format!("JSON.stringify({}.deleteOne({}))", collection, filter)
            })
            .await;
        Ok(batch_summary(results, "delete", "document"))
    }

    async fn cleanup(&self, args: CleanupMongoEnvironmentArgs) -> Result<Value> {
        let MongoTarget { db_mongo_container_name, sh_mongo_container_name } = &args.target;
        docker_client::force_remove(sh_mongo_container_name).await;
        docker_client::force_remove(db_mongo_container_name).await;
        docker_client::remove_network(&args.network_name)
            .await
            .map_err(|e| ToolError::from(e).context("Error cleaning up MongoDB environment"))?;

        Ok(json!({
            "status": "success",
            "message": format!(
                "Removed containers '{}', '{}' and network '{}'.",
                db_mongo_container_name, sh_mongo_container_name, args.network_name
            ),
        }))
    }
}

impl Default for MongoToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl MongoToolHandler {
    #[tool(description = "Create a MongoDB container and a mongosh sidecar container on a shared network")]
    async fn create_docker_container(&self, Parameters(args): Parameters<CreateMongoEnvironmentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.start_environment(args.mongo_port).await?)
    }

    #[tool(description = "Create a database by inserting a test document through mongosh")]
    async fn create_database(&self, Parameters(args): Parameters<MongoCreateDatabaseArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.create_db(args).await?)
    }

    #[tool(description = "Drop a database")]
    async fn delete_database(&self, Parameters(args): Parameters<MongoDeleteDatabaseArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.drop_db(args).await?)
    }

    #[tool(description = "Create one or more collections; collection_names is comma-separated")]
    async fn create_collection(&self, Parameters(args): Parameters<CreateCollectionArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.create_collections(args).await?)
    }

    #[tool(description = "Read all documents from one or more collections")]
    async fn read_collection(&self, Parameters(args): Parameters<CollectionsArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.read_collections(args).await?)
    }

    #[tool(description = "Apply updateMany(filter_query, update_query) to one or more collections")]
    async fn update_collection(&self, Parameters(args): Parameters<UpdateCollectionArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.update_collections(args).await?)
    }

    #[tool(description = "Drop one or more collections")]
    async fn delete_collection(&self, Parameters(args): Parameters<CollectionsArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.drop_collections(args).await?)
    }

    #[tool(description = "Insert one document or several documents into a collection")]
    async fn create_document(&self, Parameters(args): Parameters<CreateDocumentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.insert_documents(args).await?)
    }

    #[tool(description = "Find one document per filter query")]
    async fn read_document(&self, Parameters(args): Parameters<FilterDocumentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.find_documents(args).await?)
    }

    #[tool(description = "updateOne for each filter/update pair; filter_queries and update_queries must be the same length")]
    async fn update_document(&self, Parameters(args): Parameters<UpdateDocumentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.update_documents(args).await?)
    }

    #[tool(description = "deleteOne for each filter query")]
    async fn delete_document(&self, Parameters(args): Parameters<FilterDocumentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.remove_documents(args).await?)
    }

    #[tool(description = "Remove the MongoDB and mongosh containers and their network")]
    async fn cleanup_mongodb_environment(&self, Parameters(args): Parameters<CleanupMongoEnvironmentArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.cleanup(args).await?)
    }
}

#[tool_handler]
impl ServerHandler for MongoToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "MongoDB MCP Server - MongoDB container with a mongosh sidecar. \
                 {} tools available: create_docker_container, create_database, delete_database, \
                 create_collection, read_collection, update_collection, delete_collection, \
                 create_document, read_document, update_document, delete_document, \
                 cleanup_mongodb_environment.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("MongoDB MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_text(result: &CallToolResult) -> &str {
        result.content[0].as_text().expect("expected text content").text.as_str()
    }

    fn target() -> MongoTarget {
        MongoTarget {
            db_mongo_container_name: "atf-test-no-db".to_string(),
            sh_mongo_container_name: "atf-test-no-sh".to_string(),
        }
    }

    #[test]
    fn test_collection_ref_escapes_name() {
        assert_eq!(collection_ref("users"), r#"db.getCollection("users")"#);
        assert_eq!(
            collection_ref(r#"x"); db.dropDatabase(); ("#),
            r#"db.getCollection("x\"); db.dropDatabase(); (")"#
        );
    }

    #[test]
    fn test_split_collection_names() {
        assert_eq!(split_collection_names("col1, col2,,col3 "), vec!["col1", "col2", "col3"]);
        assert!(split_collection_names(" , ").is_empty());
    }

    #[test]
    fn test_one_or_many_precedence() {
        let picked = one_or_many(Some("a".into()), Some(vec!["b".into(), "c".into()]), "x").unwrap();
        assert_eq!(picked, vec!["b", "c"]);
        assert_eq!(one_or_many(Some("a".into()), None, "x").unwrap(), vec!["a"]);
        assert!(one_or_many(None, None, "x").is_err());
        assert!(one_or_many(None, Some(vec![]), "x").is_err());
    }

    #[test]
    fn test_update_pairs_length_mismatch() {
        let args: UpdateDocumentArgs = serde_json::from_value(json!({
            "db_mongo_container_name": "db",
            "sh_mongo_container_name": "sh",
            "database_name": "d",
            "collection_name": "c",
            "filter_queries": ["{a: 1}", "{a: 2}"],
            "update_queries": ["{$set: {b: 1}}"],
        }))
        .unwrap();
        let err = update_pairs(&args).unwrap_err();
        assert!(err.to_string().contains("same length"));
    }

    #[test]
    fn test_update_pairs_defaults_to_single_pair() {
        let args: UpdateDocumentArgs = serde_json::from_value(json!({
            "db_mongo_container_name": "db",
            "sh_mongo_container_name": "sh",
            "database_name": "d",
            "collection_name": "c",
        }))
        .unwrap();
        assert_eq!(update_pairs(&args).unwrap(), vec![("{}".to_string(), "{}".to_string())]);
    }

    #[test]
    fn test_parse_output_falls_back_to_text() {
        assert_eq!(parse_output("[{\"a\":1}]\n"), json!([{"a": 1}]));
        assert_eq!(parse_output("MongoServerError: boom"), json!("MongoServerError: boom"));
    }

    #[test]
    fn test_item_result_records_failure() {
        let failed = ExecResult {
            success: false,
            stdout: String::new(),
            stderr: "no such container".to_string(),
            exit_code: 1,
        };
        let entry = item_result(Some(("collection_name", "users")), Ok(failed), Some("documents"));
        assert_eq!(entry, json!({"collection_name": "users", "status": "error", "error": "no such container"}));
    }

    #[tokio::test]
    async fn test_create_collection_rejects_empty_list() {
        let err = MongoToolHandler::default()
            .create_collection(Parameters(CreateCollectionArgs {
                target: target(),
                database_name: "d".to_string(),
                collection_names: " , ,".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_read_collection_failures_do_not_abort_batch() {
        let result = MongoToolHandler::default()
            .read_collection(Parameters(CollectionsArgs {
                target: target(),
                database_name: "d".to_string(),
                collection_name: None,
                collection_names: Some(vec!["a".to_string(), "b".to_string()]),
            }))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(extract_text(&result)).unwrap();
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
        assert_eq!(body["results"][0]["status"], "error");
        assert_eq!(body["message"], "Attempted to read 2 collection(s).");
    }

    #[test]
    fn test_flattened_target_deserializes() {
        let args: MongoCreateDatabaseArgs = serde_json::from_value(json!({
            "db_mongo_container_name": "db-x",
            "sh_mongo_container_name": "sh-x",
        }))
        .unwrap();
        assert_eq!(args.target.db_mongo_container_name, "db-x");
        assert_eq!(args.database_name, "mcp_database");
    }

    #[test]
    fn test_server_info() {
        let handler = MongoToolHandler::default();
        assert_eq!(handler.tools().len(), TOOL_COUNT);
        assert!(handler.get_info().instructions.unwrap().contains("12 tools"));
    }
}
