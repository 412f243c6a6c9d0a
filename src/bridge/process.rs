//! MCP server process management
//!
//! Spawns and supervises the Node.js MCP server subprocess, owning its
//! stdio pipes: a single serialized writer for stdin, one reader loop that
//! dispatches stdout lines to the correlator, and a watcher that detects
//! crashes and performs graceful shutdown.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use crate::bridge::correlate::{Correlator, FailureKind};
use crate::config::BridgeConfig;
use crate::framing::{self, Frame, RequestId};
use crate::{Error, Result};

/// Lifecycle state of the supervised subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Terminating,
    Stopped,
    /// The process exited on its own while it was supposed to be running.
    Crashed,
}

struct StopRequest {
    grace: Duration,
    done: oneshot::Sender<()>,
}

/// Owns the MCP server subprocess and its pipes.
pub struct ProcessSupervisor {
    pid: Option<u32>,
    state: Arc<Mutex<ProcessState>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stop_tx: Mutex<Option<mpsc::Sender<StopRequest>>>,
}

impl ProcessSupervisor {
    /// Spawn the MCP server and start its reader and watcher tasks.
    ///
    /// Replies read from stdout are dispatched into `correlator`; if the
    /// process dies unexpectedly, every pending request is failed there.
    pub async fn spawn(config: &BridgeConfig, correlator: Arc<Correlator>) -> Result<Self> {
        let runtime = match &config.runtime {
            Some(path) => path.clone(),
            None => find_node_binary()?,
        };
        if !config.server_path.exists() {
            return Err(Error::Startup(format!(
                "server script not found: {}",
                config.server_path.display()
            )));
        }

        tracing::info!(
            runtime = %runtime.display(),
            server = %config.server_path.display(),
            "spawning MCP server"
        );

        let state = Arc::new(Mutex::new(ProcessState::Starting));

        let mut child = Command::new(&runtime)
            .arg(&config.server_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Startup(format!("failed to spawn {}: {e}", runtime.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Startup("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Startup("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Startup("failed to capture stderr".to_string()))?;

        if let Some(status) = child.try_wait().map_err(|e| Error::Startup(e.to_string()))? {
            return Err(Error::Startup(format!(
                "MCP server exited immediately with {status}"
            )));
        }

        let pid = child.id();
        let (stop_tx, stop_rx) = mpsc::channel(1);

        tokio::spawn(read_stdout(stdout, Arc::clone(&correlator)));
        tokio::spawn(read_stderr(stderr));
        tokio::spawn(watch(child, Arc::clone(&state), correlator, stop_rx));

        *state.lock() = ProcessState::Running;
        tracing::info!(?pid, "MCP server started");

        Ok(Self {
            pid,
            state,
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// Write one framed line to the subprocess stdin.
    ///
    /// Writes are serialized through the stdin mutex so concurrent requests
    /// never interleave partial lines.
    pub async fn write_line(&self, line: &str) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(Error::NotRunning)?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|_| Error::BrokenPipe)?;
        stdin.flush().await.map_err(|_| Error::BrokenPipe)?;
        Ok(())
    }

    /// Stop the subprocess: close stdin to request a cooperative exit, wait
    /// up to `grace`, then kill. Idempotent; the second call is a no-op.
    pub async fn stop(&self, grace: Duration) {
        let Some(tx) = self.stop_tx.lock().take() else {
            return;
        };
        *self.state.lock() = ProcessState::Terminating;

        // Closing stdin asks the server to exit on its own.
        self.stdin.lock().await.take();

        let (done_tx, done_rx) = oneshot::channel();
        if tx
            .send(StopRequest {
                grace,
                done: done_tx,
            })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
        *self.state.lock() = ProcessState::Stopped;
    }
}

/// Reader loop: dispatch each stdout line to the correlator by id.
async fn read_stdout(stdout: ChildStdout, correlator: Arc<Correlator>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match framing::decode_line(&line) {
                Ok(Frame::Message(message)) => {
                    let id = message.id().map(RequestId::from_value);
                    match id {
                        Some(id) => {
                            correlator.resolve(&id, message);
                        }
                        None => {
                            tracing::debug!("dropping MCP server message without id");
                        }
                    }
                }
                Ok(Frame::Empty) => {}
                Err(e) => {
                    // Malformed line; the channel stays open for later lines.
                    tracing::warn!("skipping malformed line from MCP server: {e}");
                }
            },
            Ok(None) => {
                tracing::info!("MCP server stdout closed (EOF)");
                break;
            }
            Err(e) => {
                tracing::error!("error reading from MCP server stdout: {e}");
                break;
            }
        }
    }
}

/// Stderr is diagnostic only; surface it in the logs.
async fn read_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(target: "mcp_server", "{line}");
    }
}

/// Watcher: observes process exit. An unexpected exit while running marks
/// the process crashed and fails every pending request; a requested stop
/// waits out the grace period before killing.
async fn watch(
    mut child: Child,
    state: Arc<Mutex<ProcessState>>,
    correlator: Arc<Correlator>,
    mut stop_rx: mpsc::Receiver<StopRequest>,
) {
    tokio::select! {
        status = child.wait() => {
            let was_running = {
                let mut current = state.lock();
                let was = matches!(*current, ProcessState::Starting | ProcessState::Running);
                *current = if was {
                    ProcessState::Crashed
                } else {
                    ProcessState::Stopped
                };
                was
            };
            if was_running {
                tracing::warn!(?status, "MCP server exited unexpectedly");
                correlator.fail_all(FailureKind::ProcessCrashed);
            } else {
                tracing::info!(?status, "MCP server exited");
                correlator.fail_all(FailureKind::Shutdown);
            }
        }
        request = stop_rx.recv() => {
            if let Some(request) = request {
                *state.lock() = ProcessState::Terminating;
                match tokio::time::timeout(request.grace, child.wait()).await {
                    Ok(status) => {
                        tracing::info!(?status, "MCP server exited");
                    }
                    Err(_) => {
                        tracing::warn!("MCP server did not exit in time, killing");
                        let _ = child.kill().await;
                    }
                }
                *state.lock() = ProcessState::Stopped;
                correlator.fail_all(FailureKind::Shutdown);
                let _ = request.done.send(());
            }
        }
    }
}

/// Find the node binary in PATH or common locations
fn find_node_binary() -> Result<PathBuf> {
    if let Ok(path) = which::which("node") {
        return Ok(path);
    }

    let common_paths = [
        PathBuf::from("/usr/local/bin/node"),
        PathBuf::from("/opt/homebrew/bin/node"),
        PathBuf::from("/usr/bin/node"),
    ];

    for path in &common_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    Err(Error::Startup(
        "node runtime not found. Please install Node.js first.".to_string(),
    ))
}
