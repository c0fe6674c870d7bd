//! ATF Tools MCP Hub: main entry point

use clap::Parser;
use tracing::{info, error, debug, warn};
use tracing_subscriber::{EnvFilter, fmt};
use rmcp::{ServiceExt, transport::stdio};

use atf_tools::{hub, Args, Config, HubHandler, Transport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Starting ATF Tools MCP Hub v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_args(&args);
    for name in config.unknown_servers() {
        warn!("Ignoring unknown server '{}'", name);
    }

    match args.transport {
        Transport::Http => {
            hub::serve_http(&config).await.inspect_err(|e| {
                error!("HTTP server error: {:?}", e);
            })?;
        }
        Transport::Stdio => {
            let service = HubHandler::new(&config)
                .serve(stdio()).await.inspect_err(|e| {
                    error!("Serving error: {:?}", e);
                })?;
            service.waiting().await?;
        }
    }
    Ok(())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false);

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        subscriber.with_writer(file).init();
    } else {
        // stdout carries the stdio transport
        subscriber.with_writer(std::io::stderr).init();
    }

    debug!("Logging initialized with level: {}", args.log_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use atf_tools::config::{Args, Config, Transport, ALL_SERVERS};
    use std::time::Duration;

    #[test]
    fn test_args_parsing_defaults() {
        let args = Args::parse_from(["atf-tools"]);
        assert_eq!(args.transport, Transport::Http);
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8000);
        assert!(args.servers.is_empty());
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_args_parsing_with_options() {
        let args = Args::parse_from([
            "atf-tools",
            "--transport", "stdio",
            "--servers", "docker,mysql_query",
            "--work-dir", "/tmp/atf",
            "--react-timeout-secs", "300",
        ]);
        assert_eq!(args.transport, Transport::Stdio);
        assert_eq!(args.servers, vec!["docker", "mysql_query"]);
        assert_eq!(args.react_timeout_secs, 300);
    }

    #[test]
    fn test_config_from_args() {
        let args = Args::parse_from([
            "atf-tools",
            "--servers", "docker, nodejs,,bogus",
            "--mongosh-image", "mongosh:latest",
            "--build-timeout-secs", "60",
        ]);
        let config = Config::from_args(&args);
        assert_eq!(config.servers, vec!["docker", "nodejs", "bogus"]);
        assert_eq!(config.unknown_servers(), vec!["bogus"]);
        assert_eq!(config.mongosh_image, "mongosh:latest");
        assert_eq!(config.build_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_args_enables_everything_by_default() {
        let config = Config::from_args(&Args::parse_from(["atf-tools"]));
        assert!(ALL_SERVERS.iter().all(|s| config.is_enabled(s)));
        assert!(config.unknown_servers().is_empty());
    }
}
