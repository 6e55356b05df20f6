//! Engine subprocess with line-based pipe I/O

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::EngineSpec;
use crate::error::EngineLoadError;

pub struct UciProcess {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Bytes of the line being read; survives a cancelled read
    partial: Vec<u8>,
    exited: bool,
}

impl UciProcess {
    /// Spawn the engine with piped stdin/stdout; stderr is discarded.
    pub fn spawn(spec: &EngineSpec) -> Result<Self, EngineLoadError> {
        let spawn_error = |source| EngineLoadError::Spawn {
            path: spec.path.display().to_string(),
            source,
        };

        let mut process = Command::new(&spec.path)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("engine has no stdin")))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| spawn_error(std::io::Error::other("engine has no stdout")))?;

        debug!(pid = process.id(), path = %spec.path.display(), "Engine process spawned");

        Ok(Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            partial: Vec::new(),
            exited: false,
        })
    }

    /// Write one newline-terminated line.
    pub async fn send(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(format!("{line}\n").as_bytes()).await?;
        self.stdin.flush().await
    }

    /// Next line from the engine with the line terminator removed, or
    /// `None` once stdout is closed. Bytes that are not UTF-8 are replaced,
    /// never rejected. Cancel safe.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        if self.exited {
            return Ok(None);
        }
        let read = self.stdout.read_until(b'\n', &mut self.partial).await?;
        if read == 0 && self.partial.is_empty() {
            self.exited = true;
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.partial);
        let line = String::from_utf8_lossy(&bytes);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Wait up to `timeout` for the process to exit on its own.
    pub async fn wait(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.process.wait()).await,
            Ok(Ok(_))
        )
    }

    /// Force-terminate and reap the process.
    pub async fn kill(&mut self) {
        if let Err(e) = self.process.kill().await {
            debug!(error = %e, "Engine kill failed (already exited?)");
        }
        self.exited = true;
    }

    pub fn id(&self) -> Option<u32> {
        self.process.id()
    }
}
