//! ATF Tools MCP Hub
//!
//! Thin MCP servers over the `docker`, `git`, `pip`/`npm`/`yarn` CLIs and
//! the MySQL/MongoDB drivers, used to stand up throwaway evaluation
//! environments: database query contests, image processing and React
//! contest runs. `hub` mounts them on one HTTP server or on stdio.

pub mod config;
pub mod docker_client;
pub mod error;
pub mod hub;
pub mod process;
pub mod query_result;
pub mod tools;

pub use config::{Args, Config, Transport, ALL_SERVERS};
pub use error::ToolError;
pub use hub::{HubHandler, MountHandler};
