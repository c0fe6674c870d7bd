//! Docker CLI wrapper for container lifecycle management
//!
//! Uses `docker` CLI (not Docker API) for simplicity.
//! Arguments are always passed as argv, never through a host shell.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::process::{self, ProcessError};
pub use crate::process::ExecResult;

/// Arguments for `docker run`
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub image: String,
    pub name: Option<String>,
    pub detach: bool,
    pub remove: bool,
    pub network: Option<String>,
    pub env: Vec<(String, String)>,
    /// (host, container)
    pub ports: Vec<(u16, u16)>,
    /// (host path, container path)
    pub volumes: Vec<(String, String)>,
    pub command: Vec<String>,
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn detached(mut self) -> Self {
        self.detach = true;
        self
    }

    pub fn auto_remove(mut self) -> Self {
        self.remove = true;
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn port(mut self, host: u16, container: u16) -> Self {
        self.ports.push((host, container));
        self
    }

    pub fn volume(mut self, host: impl Into<String>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Full argv after `docker`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if self.detach {
            args.push("-d".to_string());
        }
        if self.remove {
            args.push("--rm".to_string());
        }
        if let Some(name) = &self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if let Some(network) = &self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (host, container) in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", host, container));
        }
        for (host, container) in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host, container));
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

async fn docker<I, S>(args: I, timeout: Option<Duration>) -> Result<ExecResult, DockerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Ok(process::run("docker", args, None, timeout).await?)
}

/// Start a container; returns the container ID
pub async fn run_container(spec: &RunSpec, timeout: Option<Duration>) -> Result<String, DockerError> {
    info!(
        "Starting container '{}' from image '{}'",
        spec.name.as_deref().unwrap_or("<anonymous>"),
        spec.image
    );

    let result = docker(spec.to_args(), timeout).await?;
    if result.success {
        let container_id = result.stdout.trim().to_string();
        info!("Container started: {}", short_id(&container_id));
        Ok(container_id)
    } else {
        Err(DockerError::ContainerStartFailed(result.error_text()))
    }
}

/// `docker run` in the foreground; returns what the container printed
pub async fn run_attached(spec: &RunSpec, timeout: Option<Duration>) -> Result<ExecResult, DockerError> {
    info!("Running image '{}' to completion", spec.image);
    let result = docker(spec.to_args(), timeout).await?;
    if result.success {
        Ok(result)
    } else {
        Err(DockerError::CommandFailed(format!(
            "docker run {}: {}",
            spec.image,
            result.error_text()
        )))
    }
}

/// `docker stop`
pub async fn stop_container(container: &str) -> Result<(), DockerError> {
    info!("Stopping container '{}'", container);
    let result = docker(["stop", container], None).await?;
    if result.success {
        Ok(())
    } else {
        Err(DockerError::CommandFailed(format!(
            "docker stop {}: {}",
            container,
            result.error_text()
        )))
    }
}

/// `docker rm`, optionally with `-f`
pub async fn remove_container(container: &str, force: bool) -> Result<(), DockerError> {
    let mut args = vec!["rm"];
    if force {
        args.push("-f");
    }
    args.push(container);

    let result = docker(args, None).await?;
    if result.success {
        Ok(())
    } else {
        Err(DockerError::CommandFailed(format!(
            "docker rm {}: {}",
            container,
            result.error_text()
        )))
    }
}

/// `docker rm -f`, logging instead of failing
pub async fn force_remove(container: &str) {
    match remove_container(container, true).await {
        Ok(()) => debug!("Removed container '{}'", container),
        Err(e) => warn!("{}", e),
    }
}

/// Check the state of a container
pub async fn container_status(container: &str) -> Result<ContainerState, DockerError> {
    let result = docker(["inspect", "--format", "{{.State.Status}}", container], None).await?;

    if result.success {
        let status = result.stdout.trim().to_string();
        match status.as_str() {
            "running" => Ok(ContainerState::Running),
            "exited" => Ok(ContainerState::Exited),
            "created" => Ok(ContainerState::Created),
            other => Ok(ContainerState::Other(other.to_string())),
        }
    } else {
        Ok(ContainerState::NotFound)
    }
}

/// `docker inspect`, returning the first object of the JSON array
pub async fn inspect_container(container: &str) -> Result<serde_json::Value, DockerError> {
    let result = docker(["inspect", container], None).await?;
    if !result.success {
        return Err(DockerError::NotFound(container.to_string()));
    }

    let parsed: serde_json::Value = serde_json::from_str(&result.stdout)
        .map_err(|e| DockerError::CommandFailed(format!("Invalid inspect output: {}", e)))?;
    parsed
        .as_array()
        .and_then(|items| items.first())
        .cloned()
        .ok_or_else(|| DockerError::NotFound(container.to_string()))
}

/// Execute a command inside a running container
pub async fn exec<S: AsRef<str>>(
    container: &str,
    command: &[S],
    timeout: Option<Duration>,
) -> Result<ExecResult, DockerError> {
    let mut args = vec!["exec".to_string(), container.to_string()];
    args.extend(command.iter().map(|s| s.as_ref().to_string()));
    debug!("docker exec in '{}': {:?}", container, &args[2..]);
    docker(args, timeout).await
}

/// Execute a `bash -c` script inside a running container
pub async fn exec_shell(container: &str, script: &str) -> Result<ExecResult, DockerError> {
    exec(container, &["bash", "-c", script], None).await
}

/// `docker build -t <tag> <context>`
pub async fn build_image(
    tag: &str,
    context_dir: &Path,
    timeout: Option<Duration>,
) -> Result<ExecResult, DockerError> {
    info!("Building image '{}' from {}", tag, context_dir.display());
    let context = context_dir.display().to_string();
    let result = docker(
        ["build", "-t", tag, context.as_str(), "--progress=plain"],
        timeout,
    )
    .await?;

    if result.success {
        Ok(result)
    } else {
        Err(DockerError::BuildFailed(result.error_text()))
    }
}

/// Whether an image exists locally
pub async fn image_exists(tag: &str) -> Result<bool, DockerError> {
    Ok(docker(["image", "inspect", tag], None).await?.success)
}

/// `docker network create`
pub async fn create_network(name: &str) -> Result<(), DockerError> {
    let result = docker(["network", "create", name], None).await?;
    if result.success {
        Ok(())
    } else {
        Err(DockerError::CommandFailed(format!(
            "docker network create {}: {}",
            name,
            result.error_text()
        )))
    }
}

/// `docker network rm`
pub async fn remove_network(name: &str) -> Result<(), DockerError> {
    let result = docker(["network", "rm", name], None).await?;
    if result.success {
        Ok(())
    } else {
        Err(DockerError::CommandFailed(format!(
            "docker network rm {}: {}",
            name,
            result.error_text()
        )))
    }
}

/// Block until the container exits; returns its exit code
pub async fn wait_container(container: &str, timeout: Duration) -> Result<i64, DockerError> {
    let result = docker(["wait", container], Some(timeout)).await.map_err(|e| match e {
        DockerError::Process(ProcessError::Timeout { secs, .. }) => DockerError::Timeout(format!(
            "container '{}' still running after {} seconds",
            container, secs
        )),
        other => other,
    })?;

    if !result.success {
        return Err(DockerError::CommandFailed(format!(
            "docker wait {}: {}",
            container,
            result.error_text()
        )));
    }
    result
        .stdout
        .trim()
        .parse::<i64>()
        .map_err(|_| DockerError::CommandFailed(format!("Unexpected docker wait output: {}", result.stdout.trim())))
}

/// `docker logs`
pub async fn logs(container: &str) -> Result<ExecResult, DockerError> {
    docker(["logs", container], None).await
}

/// First 12 characters of a container ID
pub fn short_id(container_id: &str) -> &str {
    &container_id[..12.min(container_id.len())]
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerState {
    Running,
    Exited,
    Created,
    NotFound,
    Other(String),
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Created => write!(f, "created"),
            Self::NotFound => write!(f, "not found"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("Docker command failed: {0}")]
    CommandFailed(String),

    #[error("Container start failed: {0}")]
    ContainerStartFailed(String),

    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Container {0} not found")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}
