//! Agent subprocess management
//!
//! Spawns the agent with a fully specified argument vector, keeps a bounded
//! tail of its stderr for diagnostics, and in socket mode waits for the
//! listening-port announcement on stdout.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{TetherError, TetherResult};

/// Lines of stderr kept for error reports
const STDERR_TAIL_LINES: usize = 200;

/// Time given to the process to exit after its streams close
const EXIT_GRACE: Duration = Duration::from_secs(5);

static PORT_ANNOUNCEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)listening on port (\d+)").expect("valid port announcement regex")
});

/// How the agent exposes its JSON-RPC stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnMode {
    /// The process's stdin/stdout carry the stream
    Stdio,
    /// The process prints `listening on port <n>` and accepts a TCP connection
    Socket { startup_timeout: Duration },
}

/// Everything needed to launch the agent
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Replaces the inherited environment when set
    pub env: Option<HashMap<String, String>>,
    /// Added on top of whichever environment is used
    pub extra_env: Vec<(String, String)>,
    pub mode: SpawnMode,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: None,
            extra_env: Vec::new(),
            mode: SpawnMode::Stdio,
        }
    }

    pub fn with_mode(mut self, mode: SpawnMode) -> Self {
        self.mode = mode;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &self.env {
            cmd.env_clear();
            cmd.envs(env);
        }
        for (key, value) in &self.extra_env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Bounded tail of the agent's stderr
#[derive(Clone, Default)]
pub struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl StderrTail {
    fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == STDERR_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Captured output joined with newlines
    pub fn contents(&self) -> String {
        let lines = self.lines.lock();
        lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// A running agent process
pub struct AgentProcess {
    child: Child,
    program: String,
    stderr: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
    stdin: Option<ChildStdin>,
}

impl AgentProcess {
    /// Spawn the process. Stdout is returned separately for the caller to
    /// use as the stream (stdio mode) or to scan for the port (socket mode).
    pub fn spawn(spec: &SpawnSpec) -> TetherResult<(Self, ChildStdin, ChildStdout)> {
        let mut child = spec.command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TetherError::CliNotFound {
                    path: spec.program.clone(),
                }
            } else {
                TetherError::Spawn {
                    message: format!("'{}': {}", spec.program, e),
                }
            }
        })?;
        info!(
            "spawned agent process '{}' (pid {:?})",
            spec.program,
            child.id()
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TetherError::Spawn {
                message: "failed to get stdin handle".into(),
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TetherError::Spawn {
                message: "failed to get stdout handle".into(),
            })?;

        let stderr = StderrTail::default();
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(capture_stderr(pipe, stderr.clone())));

        Ok((
            Self {
                child,
                program: spec.program.clone(),
                stderr,
                stderr_task,
                stdin: None,
            },
            stdin,
            stdout,
        ))
    }

    /// Keep stdin open for the lifetime of the process.
    pub fn hold_stdin(&mut self, stdin: ChildStdin) {
        self.stdin = Some(stdin);
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Captured stderr so far
    pub fn stderr_output(&self) -> String {
        self.stderr.contents()
    }

    /// If the process exits within `wait`, describe it as a `ProcessExited`
    /// error carrying its stderr.
    pub async fn exit_error(&mut self, wait: Duration) -> Option<TetherError> {
        let status = match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                debug!("failed to wait for agent process: {}", e);
                return None;
            }
            Err(_) => return None,
        };

        // Let the stderr reader drain what the process wrote before exiting
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_millis(500), task).await;
        }

        Some(TetherError::ProcessExited {
            status: status.to_string(),
            stderr: self.stderr.contents(),
        })
    }

    /// Wait for the process to exit on its own, then kill it.
    pub async fn shutdown(&mut self) {
        tokio::select! {
            result = self.child.wait() => {
                match result {
                    Ok(status) => debug!("agent process '{}' exited: {}", self.program, status),
                    Err(e) => warn!("failed to wait for agent process: {}", e),
                }
            }
            _ = tokio::time::sleep(EXIT_GRACE) => {
                debug!("agent process '{}' did not exit, killing it", self.program);
                self.kill().await;
            }
        }
    }

    /// Kill the process immediately.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("failed to kill agent process: {}", e);
        }
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

async fn capture_stderr<R: AsyncRead + Unpin>(pipe: R, tail: StderrTail) {
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "tether::agent", "[agent] {}", line);
                tail.push(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("stderr read failed: {}", e);
                break;
            }
        }
    }
}

/// Scan stdout for the port announcement. Output after the announcement is
/// drained to the debug log so the process never blocks on a full pipe.
pub async fn wait_for_port(
    process: &mut AgentProcess,
    stdout: ChildStdout,
    startup_timeout: Duration,
) -> TetherResult<u16> {
    let mut lines = BufReader::new(stdout).lines();

    let scan = async {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: "tether::agent", "[agent] {}", line);
                    if let Some(port) = parse_port_announcement(&line) {
                        return Ok(port);
                    }
                }
                Ok(None) => return Err(None),
                Err(e) => return Err(Some(TetherError::from(e))),
            }
        }
    };

    let outcome = tokio::time::timeout(startup_timeout, scan).await;
    match outcome {
        Ok(Ok(port)) => {
            tokio::spawn(async move {
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "tether::agent", "[agent] {}", line);
                }
            });
            Ok(port)
        }
        Ok(Err(read_error)) => {
            if let Some(exited) = process.exit_error(EXIT_GRACE).await {
                return Err(exited);
            }
            Err(read_error.unwrap_or_else(|| {
                TetherError::connection("agent closed stdout without announcing a port")
            }))
        }
        Err(_) => {
            if let Some(exited) = process.exit_error(Duration::from_millis(100)).await {
                return Err(exited);
            }
            Err(TetherError::timeout(startup_timeout))
        }
    }
}

/// Extract the port from a `listening on port <n>` line
pub fn parse_port_announcement(line: &str) -> Option<u16> {
    PORT_ANNOUNCEMENT
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_announcement() {
        assert_eq!(
            parse_port_announcement("Server listening on port 41234"),
            Some(41234)
        );
        assert_eq!(parse_port_announcement("LISTENING ON PORT 80"), Some(80));
        assert_eq!(parse_port_announcement("starting up"), None);
        assert_eq!(parse_port_announcement("listening on port 99999999"), None);
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let tail = StderrTail::default();
        for i in 0..(STDERR_TAIL_LINES + 10) {
            tail.push(format!("line {i}"));
        }
        let contents = tail.contents();
        assert!(!contents.contains("line 9\n"));
        assert!(contents.ends_with(&format!("line {}", STDERR_TAIL_LINES + 9)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_cli_not_found() {
        let spec = SpawnSpec::new("/nonexistent/tether-agent-binary", vec![]);
        match AgentProcess::spawn(&spec) {
            Err(TetherError::CliNotFound { path }) => {
                assert_eq!(path, "/nonexistent/tether-agent-binary")
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_surfaces_stderr() {
        let spec = SpawnSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo 'fatal: bad token' >&2; exit 3".to_string(),
            ],
        );
        let (mut process, _stdin, _stdout) = AgentProcess::spawn(&spec).unwrap();
        let err = process.exit_error(Duration::from_secs(5)).await.unwrap();
        match err {
            TetherError::ProcessExited { stderr, .. } => assert!(stderr.contains("fatal: bad token")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_for_port_reads_announcement() {
        let spec = SpawnSpec::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo booting; echo 'listening on port 5123'; sleep 5".to_string(),
            ],
        );
        let (mut process, _stdin, stdout) = AgentProcess::spawn(&spec).unwrap();
        let port = wait_for_port(&mut process, stdout, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(port, 5123);
        process.kill().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_for_port_reports_early_exit() {
        let spec = SpawnSpec::new(
            "sh",
            vec!["-c".to_string(), "echo 'no auth' >&2; exit 1".to_string()],
        );
        let (mut process, _stdin, stdout) = AgentProcess::spawn(&spec).unwrap();
        let err = wait_for_port(&mut process, stdout, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::ProcessExited { .. }), "{err:?}");
        assert!(err.to_string().contains("no auth"));
    }
}
