//! Subprocess execution with timeouts, and TCP port polling
//!
//! Every external tool (docker, git, pip, npm) goes through `run`.
//! Children are spawned with `kill_on_drop` so a timed-out command does not linger.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

/// Result of an external command
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// stderr if present, else stdout; used for error messages
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },
}

/// Run `program args...`, capturing output.
///
/// A non-zero exit is not an error here; callers inspect `ExecResult::success`.
pub async fn run<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<ExecResult, ProcessError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    debug!("exec {:?}", cmd.as_std());

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| ProcessError::Timeout {
                program: program.to_string(),
                secs: limit.as_secs(),
            })?,
        None => cmd.output().await,
    }
    .map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;

    Ok(ExecResult {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Poll until `host:port` accepts a TCP connection or `timeout` elapses.
pub async fn wait_for_port(host: &str, port: u16, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let attempt = tokio::time::timeout(
            Duration::from_secs(1),
            TcpStream::connect((host, port)),
        )
        .await;
        if let Ok(Ok(_)) = attempt {
            debug!("{}:{} is accepting connections", host, port);
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Quote a string for inclusion in a POSIX shell script.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_missing_program() {
        let result = run("definitely-not-a-real-binary-xyz", ["--version"], None, None).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("definitely-not-a-real-binary-xyz"));
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let result = run("sh", ["-c", "echo out; echo err >&2; exit 3"], None, None)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.trim(), "out");
        assert_eq!(result.error_text(), "err");
    }

    #[tokio::test]
    async fn test_run_respects_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = run("ls", Vec::<&str>::new(), Some(dir.path()), None).await.unwrap();
        assert!(result.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let result = run("sleep", ["5"], None, Some(Duration::from_millis(100))).await;
        match result {
            Err(ProcessError::Timeout { program, .. }) => assert_eq!(program, "sleep"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_for_port_open() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(wait_for_port("127.0.0.1", port, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_wait_for_port_closed() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!wait_for_port("127.0.0.1", port, Duration::from_millis(300)).await);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("npm start"), "'npm start'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_error_text_falls_back_to_stdout() {
        let result = ExecResult {
            success: false,
            stdout: "only stdout\n".to_string(),
            stderr: "  ".to_string(),
            exit_code: 1,
        };
        assert_eq!(result.error_text(), "only stdout");
    }
}
