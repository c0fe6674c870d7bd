//! `database_query` mount: one query against an external MySQL or MongoDB server
//!
//! MySQL goes through sqlx with positional `?` parameters; MongoDB through the
//! official driver with a small JSON query envelope.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::options::{ClientOptions, Credential};
use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
    service::RequestContext,
    RoleServer,
};
use serde_json::{json, Map, Number, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use super::json_result;
use super::types::*;
use crate::config::Config;
use crate::error::{Result, ToolError};

const TOOL_COUNT: usize = 1;
const MONGO_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Mysql,
    Mongodb,
}

impl DbKind {
    pub fn parse(db_type: &str) -> Result<Self> {
        match db_type.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "mongodb" => Ok(Self::Mongodb),
            other => Err(ToolError::invalid(format!("Unsupported database type: {}", other))),
        }
    }
}

/// Statements whose rows are returned rather than an affected-row count
pub fn is_select_query(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

/// Supported MongoDB operations in the query envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MongoOperation {
    Find,
    Insert,
    Update,
    Delete,
}

impl MongoOperation {
    pub fn parse(op: &str) -> Result<Self> {
        match op {
            "find" => Ok(Self::Find),
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(ToolError::invalid(format!("Unsupported MongoDB operation: {}", other))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Parse the `{collection, operation, ...}` envelope
pub fn parse_mongo_query(query: &str) -> Result<(MongoQuery, MongoOperation)> {
    let parsed: MongoQuery = serde_json::from_str(query)
        .map_err(|e| ToolError::invalid(format!("Query must be a JSON object with 'collection' and 'operation': {}", e)))?;
    if parsed.collection.is_empty() || parsed.operation.is_empty() {
        return Err(ToolError::invalid("Query must specify 'collection' and 'operation'"));
    }
    let op = MongoOperation::parse(&parsed.operation)?;
    Ok((parsed, op))
}

fn to_document(value: Option<&Value>) -> Result<Document> {
    match value {
        None | Some(Value::Null) => Ok(Document::new()),
        // extended JSON: small integers stay Int32, {"$oid": ..} becomes an ObjectId
        Some(v) => match Bson::try_from(v.clone()) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(other) => Err(ToolError::invalid(format!("Expected a JSON object, got {}", other))),
            Err(e) => Err(ToolError::invalid(format!("Invalid extended JSON: {}", e))),
        },
    }
}

fn bind_json<'q>(query: Query<'q, MySql, MySqlArguments>, value: &Value) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn decode_cell(row: &MySqlRow, index: usize, type_name: &str) -> std::result::Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOLEAN" => json!(row.try_get_unchecked::<bool, _>(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            json!(row.try_get_unchecked::<i64, _>(index)?)
        }
        t if t.ends_with("UNSIGNED") => json!(row.try_get_unchecked::<u64, _>(index)?),
        "FLOAT" => json!(row.try_get_unchecked::<f32, _>(index)?),
        "DOUBLE" => json!(row.try_get_unchecked::<f64, _>(index)?),
        "DECIMAL" => {
            let text: String = row.try_get_unchecked(index)?;
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::String(text))
        }
        "DATE" => json!(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "DATETIME" => json!(row.try_get::<chrono::NaiveDateTime, _>(index)?.to_string()),
        "TIMESTAMP" => json!(row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?.to_rfc3339()),
        "TIME" => json!(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT" | "GEOMETRY" => {
            json!(STANDARD.encode(row.try_get_unchecked::<Vec<u8>, _>(index)?))
        }
        _ => json!(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

/// A MySQL row as a JSON object keyed by column name
fn row_to_json(row: &MySqlRow) -> std::result::Result<Value, sqlx::Error> {
    let mut object = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value = if row.try_get_raw(index)?.is_null() {
            Value::Null
        } else {
            decode_cell(row, index, column.type_info().name())?
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

/// Database query tool handler
#[derive(Clone)]
pub struct DatabaseQueryToolHandler {
    tool_router: ToolRouter<DatabaseQueryToolHandler>,
    config: Config,
}

impl DatabaseQueryToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn execute(&self, args: ExecuteQueryArgs) -> Result<Value> {
        let kind = DbKind::parse(&args.db_config.db_type)?;
        info!("Executing query on {:?} database {}", kind, args.db_config.database);
        let outcome = match kind {
            DbKind::Mysql => self.execute_mysql(&args.db_config, &args.query, args.params.as_deref()).await,
            DbKind::Mongodb => self.execute_mongodb(&args.db_config, &args.query).await,
        };
        outcome.map_err(|e| e.context("Database query error"))
    }

    async fn execute_mysql(&self, db: &DbConfig, query: &str, params: Option<&[Value]>) -> Result<Value> {
        let host = self.config.mysql_host.as_deref().unwrap_or(&db.host);
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(db.port)
            .username(&db.username)
            .password(&db.password)
            .database(&db.database);
        let mut conn = MySqlConnection::connect_with(&options).await?;

        let mut statement = sqlx::query(query);
        for value in params.unwrap_or_default() {
            statement = bind_json(statement, value);
        }

        let response = if is_select_query(query) {
            let rows = statement.fetch_all(&mut conn).await?;
            let result = rows.iter().map(row_to_json).collect::<std::result::Result<Vec<_>, _>>()?;
            json!({"status": "success", "query_type": "select", "result": result})
        } else {
            let done = statement.execute(&mut conn).await?;
            json!({
                "status": "success",
                "query_type": "modify",
                "result": {"affected_rows": done.rows_affected()},
            })
        };

        if let Err(e) = conn.close().await {
            warn!("Error closing MySQL connection: {}", e);
        }
        Ok(response)
    }

    async fn mongo_client(&self, db: &DbConfig) -> Result<mongodb::Client> {
        let mut options = match &self.config.mongodb_uri {
            Some(uri) => ClientOptions::parse(uri.as_str()).await?,
            None => {
                let mut options = ClientOptions::parse(format!("mongodb://{}:{}", db.host, db.port)).await?;
                options.credential = Some(
                    Credential::builder()
                        .username(db.username.clone())
                        .password(db.password.clone())
                        .source(db.database.clone())
                        .build(),
                );
                options
            }
        };
        options.server_selection_timeout = Some(MONGO_SELECTION_TIMEOUT);
        Ok(mongodb::Client::with_options(options)?)
    }

    async fn execute_mongodb(&self, db: &DbConfig, query: &str) -> Result<Value> {
        let (parsed, op) = parse_mongo_query(query)?;
        let client = self.mongo_client(db).await?;
        let collection = client.database(&db.database).collection::<Document>(&parsed.collection);
        let filter = to_document(parsed.filter.as_ref())?;

        let result = match op {
            MongoOperation::Find => {
                let docs: Vec<Document> = collection.find(filter).await?.try_collect().await?;
                Value::Array(docs.into_iter().map(|d| Bson::Document(d).into_relaxed_extjson()).collect())
            }
            MongoOperation::Insert => {
                let inserted = collection.insert_one(to_document(parsed.document.as_ref())?).await?;
                json!({"inserted_id": inserted.inserted_id.into_relaxed_extjson()})
            }
            MongoOperation::Update => {
                let updated = collection.update_many(filter, to_document(parsed.update.as_ref())?).await?;
                json!({"matched_count": updated.matched_count, "modified_count": updated.modified_count})
            }
            MongoOperation::Delete => {
                let deleted = collection.delete_many(filter).await?;
                json!({"deleted_count": deleted.deleted_count})
            }
        };

        Ok(json!({"status": "success", "operation": op.as_str(), "result": result}))
    }
}

impl Default for DatabaseQueryToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[tool_router]
impl DatabaseQueryToolHandler {
    #[tool(description = "Execute a query against MySQL (SQL with optional positional params) or MongoDB (JSON {collection, operation, filter, document, update})")]
    async fn execute_query(&self, Parameters(args): Parameters<ExecuteQueryArgs>) -> Result<CallToolResult, McpError> {
        json_result(&self.execute(args).await?)
    }
}

#[tool_handler]
impl ServerHandler for DatabaseQueryToolHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Database Query MCP Server - MySQL and MongoDB. {} tool available: execute_query.",
                TOOL_COUNT,
            )),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        info!("Database Query MCP server initialized with {} tools", TOOL_COUNT);
        Ok(self.get_info())
    }
}
