//! Read-match-respond loop
//!
//! Drives a `TerminalClient` through one login: every chunk of client output is
//! shown to the user, appended to a match buffer and classified against the
//! prompt rules. The resulting events go through the `LoginMachine`, whose
//! actions are performed here. Nothing outside this loop holds login state.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::machine::{Action, LoginMachine};
use super::rules::{classify, PromptEvent};
use super::SessionOutcome;
use crate::config::LOGIN_TIMEOUT_SECS;
use crate::error::{GsshError, Result};
use crate::ssh::config::AuthDescriptor;

/// Upper bound on unmatched output kept for classification
const MATCH_BUFFER_LIMIT: usize = 4096;

/// A spawned terminal client as seen by the login loop
#[async_trait]
pub trait TerminalClient: Send {
    /// Next chunk of output, `None` once the stream has ended
    async fn read_chunk(&mut self) -> Option<Vec<u8>>;

    /// Write bytes to the client's input
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Show pre-login output to the user
    fn display(&mut self, bytes: &[u8]);

    /// Give the terminal to the user until the client exits
    async fn interact(&mut self) -> Result<()>;

    /// Stop the client
    async fn terminate(&mut self);
}

/// One login attempt over a terminal client
pub struct LoginDriver {
    machine: LoginMachine,
    password: Option<Zeroizing<String>>,
    ceiling: Duration,
}

impl LoginDriver {
    pub fn new(descriptor: &AuthDescriptor) -> Self {
        let password = descriptor
            .auto_password()
            .map(|pw| Zeroizing::new(pw.to_string()));
        Self {
            machine: LoginMachine::new(descriptor.mode, password.is_some()),
            password,
            ceiling: Duration::from_secs(LOGIN_TIMEOUT_SECS),
        }
    }

    /// Override the login ceiling
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Run until the login reaches a terminal state.
    ///
    /// On `LoggedIn` this returns only after the hand-off ends. Failures
    /// terminate the client before returning.
    pub async fn run<C>(mut self, client: &mut C) -> Result<SessionOutcome>
    where
        C: TerminalClient + ?Sized,
    {
        let deadline = Instant::now() + self.ceiling;
        let mut pending = Vec::new();
        let mut buffer = String::new();

        loop {
            let chunk = match timeout_at(deadline, client.read_chunk()).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    debug!("Terminal client output ended");
                    let action = self.machine.on_event(PromptEvent::StreamEnd);
                    let outcome = self.perform(action, client).await?;
                    return Ok(outcome.unwrap_or(SessionOutcome::ConnectionClosed));
                }
                Err(_) => {
                    warn!("No shell prompt within {}s", self.ceiling.as_secs());
                    let action = self.machine.on_timeout();
                    let outcome = self.perform(action, client).await?;
                    return Ok(outcome.unwrap_or(SessionOutcome::Timeout));
                }
            };

            client.display(&chunk);
            pending.extend_from_slice(&chunk);
            buffer.push_str(&take_decoded(&mut pending));

            while let Some((event, range)) = classify(&buffer) {
                debug!("Matched {:?}", event);
                buffer.drain(..range.end);
                let action = self.machine.on_event(event);
                if let Some(outcome) = self.perform(action, client).await? {
                    return Ok(outcome);
                }
            }

            trim_front(&mut buffer, MATCH_BUFFER_LIMIT);
        }
    }

    /// Perform `action`; `Some` once the login is over
    async fn perform<C>(&mut self, action: Action, client: &mut C) -> Result<Option<SessionOutcome>>
    where
        C: TerminalClient + ?Sized,
    {
        match action {
            Action::Continue => Ok(None),
            Action::SendLine(line) => {
                debug!("Answering prompt with {:?}", line);
                client.send(format!("{}\r", line).as_bytes()).await?;
                Ok(None)
            }
            Action::SendPassword => {
                let password = self
                    .password
                    .as_ref()
                    .ok_or_else(|| GsshError::invalid_params("no password configured"))?;
                let mut line = Zeroizing::new(String::with_capacity(password.len() + 1));
                line.push_str(password);
                line.push('\r');
                debug!("Sending password ({} bytes)", line.len());
                client.send(line.as_bytes()).await?;
                Ok(None)
            }
            Action::HandOff => {
                info!("Handing terminal to user");
                client.interact().await?;
                Ok(self.machine.outcome())
            }
            Action::Fail(kind) => {
                debug!("Login failed: {:?}", kind);
                client.terminate().await;
                Ok(self.machine.outcome())
            }
        }
    }
}

/// Decode the valid UTF-8 prefix of `pending`, keeping an incomplete trailing
/// sequence for the next chunk. Invalid bytes decode as U+FFFD.
fn take_decoded(pending: &mut Vec<u8>) -> String {
    let keep_from = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };
    let tail = pending.split_off(keep_from);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = tail;
    text
}

/// Drop leading text so at most `limit` bytes remain, on a char boundary
fn trim_front(buffer: &mut String, limit: usize) {
    if buffer.len() <= limit {
        return;
    }
    let mut cut = buffer.len() - limit;
    while !buffer.is_char_boundary(cut) {
        cut += 1;
    }
    buffer.drain(..cut);
}
