//! UCI client: handshake, option setup, search commands and message framing
//! on top of [`UciProcess`].

use std::time::Duration;

use chess_core::Position;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{EngineSpec, EngineTimeouts};
use crate::error::{EngineError, EngineLoadError};
use crate::process::UciProcess;
use crate::protocol::{parse_line, Command, EngineMessage, GoMode};
use crate::resources::EngineOptions;

pub struct UciClient {
    process: UciProcess,
    name: String,
    declared_options: Vec<String>,
    timeouts: EngineTimeouts,
}

impl UciClient {
    /// Spawn the engine and complete the `uci` / `uciok` handshake.
    pub async fn start(spec: &EngineSpec, timeouts: EngineTimeouts) -> Result<Self, EngineLoadError> {
        let process = UciProcess::spawn(spec)?;
        let fallback_name = spec
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| spec.path.display().to_string());

        let mut client = Self {
            process,
            name: fallback_name,
            declared_options: Vec::new(),
            timeouts,
        };

        client.send(&Command::Uci).await?;

        let deadline = Instant::now() + timeouts.handshake;
        loop {
            let message = client
                .next_message_until(deadline, "uciok", timeouts.handshake)
                .await;
            match message {
                Ok(EngineMessage::Id { name }) => client.name = name,
                Ok(EngineMessage::Option { name }) => client.declared_options.push(name),
                Ok(EngineMessage::UciOk) => break,
                Ok(_) => {}
                Err(e) => {
                    client.process.kill().await;
                    return Err(e.into());
                }
            }
        }

        info!(
            name = %client.name,
            options = client.declared_options.len(),
            "Engine handshake complete"
        );
        Ok(client)
    }

    /// Send `Hash` and `Threads` (where the engine declares them), then
    /// confirm readiness.
    pub async fn configure(&mut self, options: &EngineOptions) -> Result<(), EngineError> {
        for (name, value) in options.as_uci_options() {
            if !self.declares(name) {
                debug!(option = name, "Engine does not declare option, skipping");
                continue;
            }
            self.send(&Command::SetOption {
                name: name.to_string(),
                value,
            })
            .await?;
        }
        self.ready().await
    }

    /// `isready` → `readyok` round-trip.
    pub async fn ready(&mut self) -> Result<(), EngineError> {
        self.send(&Command::IsReady).await?;
        let deadline = Instant::now() + self.timeouts.ready;
        loop {
            if let EngineMessage::ReadyOk = self
                .next_message_until(deadline, "readyok", self.timeouts.ready)
                .await?
            {
                return Ok(());
            }
        }
    }

    pub async fn new_game(&mut self) -> Result<(), EngineError> {
        self.send(&Command::UciNewGame).await?;
        self.ready().await
    }

    /// Set up `position` and start searching. Progress arrives through
    /// [`next_message`](Self::next_message).
    pub async fn go(&mut self, position: &Position, mode: GoMode) -> Result<(), EngineError> {
        self.send(&Command::position(position)).await?;
        self.send(&Command::Go(mode)).await
    }

    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.send(&Command::Stop).await
    }

    /// Ask the engine to exit; kill it if it has not exited within the quit
    /// timeout.
    pub async fn quit(&mut self) {
        if self.send(&Command::Quit).await.is_ok() && self.process.wait(self.timeouts.quit).await {
            debug!("Engine exited");
            return;
        }
        debug!("Engine did not exit in time, killing");
        self.process.kill().await;
    }

    pub async fn kill(&mut self) {
        self.process.kill().await;
    }

    /// Next recognized message. Unrecognized lines are skipped. Cancel safe.
    pub async fn next_message(&mut self) -> Result<EngineMessage, EngineError> {
        loop {
            let Some(line) = self.process.next_line().await? else {
                return Err(EngineError::Exited);
            };
            debug!(line = line.trim(), "engine >");
            if let Some(message) = parse_line(&line) {
                return Ok(message);
            }
        }
    }

    async fn next_message_until(
        &mut self,
        deadline: Instant,
        expected: &'static str,
        timeout: Duration,
    ) -> Result<EngineMessage, EngineError> {
        match tokio::time::timeout_at(deadline, self.next_message()).await {
            Ok(message) => message,
            Err(_) => Err(EngineError::Timeout { expected, timeout }),
        }
    }

    async fn send(&mut self, command: &Command) -> Result<(), EngineError> {
        let line = command.to_string();
        debug!(cmd = %line, "engine <");
        self.process.send(&line).await?;
        Ok(())
    }

    fn declares(&self, option: &str) -> bool {
        self.declared_options
            .iter()
            .any(|declared| declared.eq_ignore_ascii_case(option))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_options(&self) -> &[String] {
        &self.declared_options
    }

    pub fn timeouts(&self) -> EngineTimeouts {
        self.timeouts
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.id()
    }
}
