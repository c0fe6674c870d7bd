//! Type definitions for the ATF MCP tools

use serde::Deserialize;
use schemars::JsonSchema;

// ============================================================================
// docker
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateAndRunDockerArgs {
    /// The GitHub repository URL
    pub github_url: String,
    /// Type of project ('python' or 'nodejs')
    pub project_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KillContainerArgs {
    /// The container ID or name to kill
    pub container_id: String,
}

// ============================================================================
// git_clone
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GithubCloneRepoArgs {
    /// The GitHub repository URL (e.g., https://github.com/user/repo.git)
    pub github_url: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CleanupCloneArgs {
    /// The local path to the cloned repository
    pub local_path: String,
}

// ============================================================================
// dependencies
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InstallPythonArgs {
    /// The local path to the cloned repository
    pub cloned_path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InstallNodeArgs {
    /// The local path to the cloned repository
    pub cloned_path: String,
    /// The package manager to use ('npm' or 'yarn'). Defaults to 'npm'
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
}

fn default_package_manager() -> String { "npm".to_string() }

// ============================================================================
// mysql_query
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateMysqlEnvironmentArgs {
    /// Name of the database to create (default: contest_db)
    #[serde(default = "default_mysql_database")]
    pub database_name: String,
    /// Host port to expose MySQL on (default: 3306)
    #[serde(default = "default_mysql_port")]
    pub mysql_port: u16,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateMysqlDatabaseArgs {
    /// MySQL container ID
    pub container_id: String,
    /// Name of the database to create
    #[serde(default = "default_mysql_database")]
    pub database_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetupContestDatabaseArgs {
    /// MySQL container ID
    pub container_id: String,
    /// SQL statements to run in order
    pub setup_queries: Vec<String>,
    /// Database to run them against (default: contest_db)
    #[serde(default = "default_mysql_database")]
    pub database_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EvaluateMysqlQueryArgs {
    /// MySQL container ID
    pub container_id: String,
    /// SQL query to evaluate
    pub user_query: String,
    /// Expected result rows for comparison
    #[serde(default)]
    pub expected_result: Option<serde_json::Value>,
    /// Query timeout in seconds (default: 30)
    #[serde(default = "default_query_timeout")]
    pub timeout_seconds: u64,
    /// Database to query (default: contest_db)
    #[serde(default = "default_mysql_database")]
    pub database_name: String,
    /// Require rows in the same order as expected (default: false)
    #[serde(default)]
    pub order_sensitive: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CleanupMysqlEnvironmentArgs {
    /// MySQL container ID to clean up
    pub container_id: String,
}

fn default_mysql_database() -> String { "contest_db".to_string() }
fn default_mysql_port() -> u16 { 3306 }
fn default_query_timeout() -> u64 { 30 }

// ============================================================================
// mongodb
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateMongoEnvironmentArgs {
    /// Host port to expose MongoDB on (default: 27017)
    #[serde(default = "default_mongo_port")]
    pub mongo_port: u16,
}

/// The MongoDB server container and its mongosh sidecar
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MongoTarget {
    /// Name of the MongoDB server container
    pub db_mongo_container_name: String,
    /// Name of the mongosh sidecar container
    pub sh_mongo_container_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MongoCreateDatabaseArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    /// Database name (default: mcp_database)
    #[serde(default = "default_mongo_database")]
    pub database_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MongoDeleteDatabaseArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    /// Database to drop
    pub database_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateCollectionArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    pub database_name: String,
    /// Comma-separated collection names (e.g., 'col1' or 'col1,col2,col3')
    pub collection_names: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CollectionsArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    pub database_name: String,
    /// A single collection name
    #[serde(default)]
    pub collection_name: Option<String>,
    /// Several collection names; takes precedence over collection_name
    #[serde(default)]
    pub collection_names: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateCollectionArgs {
    #[serde(flatten)]
    pub collections: CollectionsArgs,
    /// Filter in mongosh syntax (default: {})
    #[serde(default = "default_empty_query")]
    pub filter_query: String,
    /// Update in mongosh syntax (default: {})
    #[serde(default = "default_empty_query")]
    pub update_query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateDocumentArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    pub database_name: String,
    pub collection_name: String,
    /// One document in mongosh syntax
    #[serde(default)]
    pub document: Option<String>,
    /// Several documents; takes precedence over document
    #[serde(default)]
    pub documents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FilterDocumentArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    pub database_name: String,
    pub collection_name: String,
    /// One filter in mongosh syntax (default: {})
    #[serde(default = "default_filter_query")]
    pub filter_query: Option<String>,
    /// Several filters; takes precedence over filter_query
    #[serde(default)]
    pub filter_queries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateDocumentArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    pub database_name: String,
    pub collection_name: String,
    #[serde(default = "default_filter_query")]
    pub filter_query: Option<String>,
    #[serde(default = "default_filter_query")]
    pub update_query: Option<String>,
    /// Filters paired with update_queries; both lists must be the same length
    #[serde(default)]
    pub filter_queries: Option<Vec<String>>,
    #[serde(default)]
    pub update_queries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CleanupMongoEnvironmentArgs {
    #[serde(flatten)]
    pub target: MongoTarget,
    /// Network created alongside the containers
    pub network_name: String,
}

fn default_mongo_port() -> u16 { 27017 }
fn default_mongo_database() -> String { "mcp_database".to_string() }
fn default_empty_query() -> String { "{}".to_string() }
fn default_filter_query() -> Option<String> { Some("{}".to_string()) }

// ============================================================================
// image_processing
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunImageProcessingArgs {
    /// GitHub repo with image processing code (must contain main.py)
    pub github_url: String,
    /// File name the program expects under /input/
    #[serde(default = "default_image_filename")]
    pub image_filename: String,
    /// Host path of the input image
    #[serde(default = "default_input_image_path")]
    pub input_image_path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct OutputImagesArgs {
    /// Repository/run name to collect images from
    pub repo_name: String,
}

fn default_image_filename() -> String { "input.png".to_string() }
fn default_input_image_path() -> String { "./sample_problems/input.png".to_string() }

// ============================================================================
// fastapi
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFastapiContainerArgs {
    /// Host port mapped to container port 8000 (default: 8080)
    #[serde(default = "default_fastapi_port")]
    pub port: u16,
}

fn default_fastapi_port() -> u16 { 8080 }

// ============================================================================
// react_contest
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunReactContestArgs {
    /// GitHub repo of the React app
    pub github_url: String,
    /// Port the app listens on (default: 5173)
    #[serde(default = "default_react_port")]
    pub port: u16,
    /// Run the browser headless (default: true)
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Build command run during the image build
    #[serde(default)]
    pub build_command: Option<String>,
    /// Command that starts the app, instead of preview/dev/start detection
    #[serde(default)]
    pub start_command: Option<String>,
    /// Leave the container in place after the run (default: false)
    #[serde(default)]
    pub keep_container_running: bool,
}

fn default_react_port() -> u16 { 5173 }
fn default_true() -> bool { true }

// ============================================================================
// nodejs
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ApiRequestArgs {
    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,
    /// Target URL for the request
    pub url: String,
    /// Optional JSON payload string for POST/PUT requests
    #[serde(default)]
    pub payload: Option<String>,
}

// ============================================================================
// database_query
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DbConfig {
    /// 'mysql' or 'mongodb'
    pub db_type: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteQueryArgs {
    /// Database connection settings
    pub db_config: DbConfig,
    /// SQL for MySQL; a JSON object {collection, operation, filter, document, update} for MongoDB
    pub query: String,
    /// Positional parameters bound to '?' placeholders (MySQL only)
    #[serde(default)]
    pub params: Option<Vec<serde_json::Value>>,
}

/// Parsed MongoDB query for execute_query
#[derive(Debug, Deserialize)]
pub struct MongoQuery {
    pub collection: String,
    pub operation: String,
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    #[serde(default)]
    pub document: Option<serde_json::Value>,
    #[serde(default)]
    pub update: Option<serde_json::Value>,
}
