//! Configuration for the ATF tools MCP hub

use std::path::PathBuf;
use std::time::Duration;
use clap::{Parser, ValueEnum};

/// Every mount the hub knows about, in registration order.
pub const ALL_SERVERS: &[&str] = &[
    "docker",
    "git_clone",
    "dependencies",
    "mysql_query",
    "mongodb",
    "image_processing",
    "fastapi",
    "react_contest",
    "nodejs",
    "database_query",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Streamable HTTP, one endpoint per mount plus a combined endpoint
    Http,
    /// Combined handler over stdin/stdout
    Stdio,
}

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "atf-tools")]
#[command(about = "MCP tool hub for Docker, database evaluation, dependency installs and frontend contests")]
#[command(version)]
pub struct Args {
    /// Transport to serve on
    #[arg(long, value_enum, default_value = "http")]
    pub transport: Transport,

    /// Bind address for the HTTP transport
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port for the HTTP transport
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Mounts to enable, comma separated (default: all)
    #[arg(long, value_delimiter = ',')]
    pub servers: Vec<String>,

    /// Base directory for clones, generated Dockerfiles and contest runs
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// MySQL image for evaluation containers
    #[arg(long, default_value = "mysql")]
    pub mysql_image: String,

    /// MongoDB server image
    #[arg(long, default_value = "mongo")]
    pub mongo_image: String,

    /// mongosh sidecar image
    #[arg(long, default_value = "alpine/mongosh:2.0.2")]
    pub mongosh_image: String,

    /// Python image for FastAPI containers
    #[arg(long, default_value = "python:3.13-slim")]
    pub fastapi_image: String,

    /// Timeout for git clone and package installs, in seconds
    #[arg(long, default_value_t = 300)]
    pub command_timeout_secs: u64,

    /// Timeout for docker image builds, in seconds
    #[arg(long, default_value_t = 900)]
    pub build_timeout_secs: u64,

    /// Timeout for a React contest container run, in seconds
    #[arg(long, default_value_t = 120)]
    pub react_timeout_secs: u64,

    /// How long to wait for a freshly started app port, in seconds
    #[arg(long, default_value_t = 30)]
    pub port_wait_secs: u64,

    /// Host override for direct MySQL queries
    #[arg(long, env = "MYSQL_HOST")]
    pub mysql_host: Option<String>,

    /// Connection string override for direct MongoDB queries
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log file path (defaults to stderr)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub servers: Vec<String>,
    pub work_dir: PathBuf,
    pub mysql_image: String,
    pub mongo_image: String,
    pub mongosh_image: String,
    pub fastapi_image: String,
    pub command_timeout: Duration,
    pub build_timeout: Duration,
    pub react_timeout: Duration,
    pub port_wait: Duration,
    pub mysql_host: Option<String>,
    pub mongodb_uri: Option<String>,
}

impl Config {
    pub fn from_args(args: &Args) -> Self {
        let servers = if args.servers.is_empty() {
            ALL_SERVERS.iter().map(|s| s.to_string()).collect()
        } else {
            args.servers.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
        };

        Self {
            host: args.host.clone(),
            port: args.port,
            servers,
            work_dir: args.work_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            mysql_image: args.mysql_image.clone(),
            mongo_image: args.mongo_image.clone(),
            mongosh_image: args.mongosh_image.clone(),
            fastapi_image: args.fastapi_image.clone(),
            command_timeout: Duration::from_secs(args.command_timeout_secs),
            build_timeout: Duration::from_secs(args.build_timeout_secs),
            react_timeout: Duration::from_secs(args.react_timeout_secs),
            port_wait: Duration::from_secs(args.port_wait_secs),
            mysql_host: args.mysql_host.clone(),
            mongodb_uri: args.mongodb_uri.clone(),
        }
    }

    /// Names in `servers` that are not known mounts
    pub fn unknown_servers(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter(|s| !ALL_SERVERS.contains(&s.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_enabled(&self, mount: &str) -> bool {
        self.servers.iter().any(|s| s == mount)
    }

    /// Path to cloned_repos/
    pub fn clone_dir(&self) -> PathBuf {
        self.work_dir.join("cloned_repos")
    }

    /// Path to docker_builds/
    pub fn docker_builds_dir(&self) -> PathBuf {
        self.work_dir.join("docker_builds")
    }

    /// Path to image_contest_runs/
    pub fn image_runs_dir(&self) -> PathBuf {
        self.work_dir.join("image_contest_runs")
    }

    /// Path to react_contest_runs/
    pub fn react_runs_dir(&self) -> PathBuf {
        self.work_dir.join("react_contest_runs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            servers: ALL_SERVERS.iter().map(|s| s.to_string()).collect(),
            work_dir: PathBuf::from("."),
            mysql_image: "mysql".to_string(),
            mongo_image: "mongo".to_string(),
            mongosh_image: "alpine/mongosh:2.0.2".to_string(),
            fastapi_image: "python:3.13-slim".to_string(),
            command_timeout: Duration::from_secs(300),
            build_timeout: Duration::from_secs(900),
            react_timeout: Duration::from_secs(120),
            port_wait: Duration::from_secs(30),
            mysql_host: None,
            mongodb_uri: None,
        }
    }
}
