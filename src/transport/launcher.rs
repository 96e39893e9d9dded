//! Starting the sampler subprocess.

use crate::config::PORT_ENV;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

pub const SAMPLER_BIN_NAME: &str = "lobby-sampler";

/// A started sampler; `exit` resolves with a description of how it ended
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    pub exit: BoxFuture<'static, String>,
}

pub trait Launcher: Send + Sync {
    /// Start a sampler that will connect back to `addr`
    fn launch(&self, addr: SocketAddr) -> Result<LaunchedProcess>;
}

/// Launches the sampler executable as a child process.
///
/// The child is never killed by us: it exits when its link closes, and the
/// operating environment reaps it if the consumer goes away.
pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Use the configured binary, or `lobby-sampler` next to our executable
    pub fn from_config(sampler_bin: Option<&Path>) -> Result<Self> {
        if let Some(bin) = sampler_bin {
            return Ok(Self::new(bin.to_path_buf()));
        }
        let exe = std::env::current_exe().context("Could not locate current executable")?;
        let dir = exe
            .parent()
            .context("Current executable has no parent directory")?;
        let name = if cfg!(windows) {
            format!("{}.exe", SAMPLER_BIN_NAME)
        } else {
            SAMPLER_BIN_NAME.to_string()
        };
        Ok(Self::new(dir.join(name)))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Forward each line of a child stream into the log
fn forward_output<R>(stream: R, stream_name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(target: "lobby_relay::sampler_output", "[{}] {}", stream_name, line)
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Sampler {} read failed: {}", stream_name, e);
                    break;
                }
            }
        }
    });
}

impl Launcher for ProcessLauncher {
    fn launch(&self, addr: SocketAddr) -> Result<LaunchedProcess> {
        tracing::info!("Creating sampler process {}", self.program.display());

        let mut child = Command::new(&self.program)
            .env(PORT_ENV, addr.port().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program.display()))?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr");
        }

        tracing::info!(
            "Sampler process started (PID: {}), waiting for connection",
            pid.map(|id| id.to_string()).unwrap_or_else(|| "unknown".into())
        );

        let exit = async move {
            match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => format!("wait failed: {}", e),
            }
        }
        .boxed();

        Ok(LaunchedProcess { pid, exit })
    }
}
