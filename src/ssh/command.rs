//! Command execution over a programmatic session
//!
//! Provides the `CommandOutput` struct and `run` for executing a single remote
//! command whose stdout and stderr are merged into one byte stream.

use std::time::Duration;

use russh::client;
use russh::{Channel, ChannelMsg};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::connection::ProgrammaticSession;
use crate::config::COMMAND_TIMEOUT_SECS;
use crate::error::{GsshError, Result};

/// Output from a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout and stderr, interleaved in arrival order
    pub combined: Vec<u8>,

    /// Exit code of the command (if available)
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// Create a new empty CommandOutput
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the command succeeded (exit code 0 or no exit code available)
    pub fn success(&self) -> bool {
        self.exit_code.is_none_or(|code| code == 0)
    }

    /// Combined output decoded lossily as UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.combined).into_owned()
    }
}

impl ProgrammaticSession {
    /// Execute a command and return its combined output.
    ///
    /// The remote exit status is reported, never interpreted: a non-zero exit
    /// still yields `Ok`.
    pub async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.run_with_input(command, None).await
    }

    /// Execute a command, optionally feeding `input` on its stdin first
    pub async fn run_with_input(&self, command: &str, input: Option<&[u8]>) -> Result<CommandOutput> {
        let timeout_duration = Duration::from_secs(COMMAND_TIMEOUT_SECS);
        let channel = self.open_channel().await?;

        debug!("Executing remote command ({} bytes)", command.len());
        channel
            .exec(true, command)
            .await
            .map_err(|e| GsshError::dial(format!("Failed to exec command: {}", e)))?;

        if let Some(bytes) = input {
            channel
                .data(bytes)
                .await
                .map_err(|e| GsshError::dial(format!("Failed to send command input: {}", e)))?;
            channel
                .eof()
                .await
                .map_err(|e| GsshError::dial(format!("Failed to close command input: {}", e)))?;
        }

        match timeout(timeout_duration, collect_channel_output(channel)).await {
            Ok(output) => Ok(output),
            Err(_) => {
                warn!(
                    "Command timed out after {}ms",
                    timeout_duration.as_millis()
                );
                Err(GsshError::CommandTimeout(timeout_duration.as_millis() as u64))
            }
        }
    }
}

/// Collect output from a channel until it closes
async fn collect_channel_output(mut channel: Channel<client::Msg>) -> CommandOutput {
    let mut output = CommandOutput::new();

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => output.combined.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, .. } => output.combined.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => output.exit_code = Some(exit_status),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    debug!(
        "Command completed: exit_code={:?}, output_len={}",
        output.exit_code,
        output.combined.len()
    );
    output
}
