//! `expect` backend
//!
//! Renders a linear script from the prompt rule table and the machine's
//! response table, then runs it with the system `expect` sharing the caller's
//! terminal. The script has one `spawn`, one `expect` block with the rules in
//! priority order, and an `interact` gated on a confirmed login or a hand-off.

use std::fmt::Write as _;
use std::io::Write as _;

use tokio::process::Command;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::machine::{response, Action, FailureKind};
use super::rules::{PromptEvent, PROMPT_RULES};
use super::SessionOutcome;
use crate::error::{GsshError, Result};
use crate::ssh::config::AuthDescriptor;
use crate::ssh::sanitize::escape_for_script;

/// Exit status of the script for each failure
fn exit_code(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::AuthRejected => 2,
        FailureKind::StreamEnded => 3,
        FailureKind::TimedOut => 4,
    }
}

/// Map the script's exit status back to a session outcome
pub fn outcome_from_exit(code: Option<i32>) -> Result<SessionOutcome> {
    match code {
        Some(0) => Ok(SessionOutcome::LoggedIn),
        Some(2) => Ok(SessionOutcome::AuthFailed),
        Some(3) => Ok(SessionOutcome::ConnectionClosed),
        Some(4) => Ok(SessionOutcome::Timeout),
        Some(other) => Err(GsshError::spawn(format!("expect exited with status {}", other))),
        None => Err(GsshError::spawn("expect was terminated by a signal")),
    }
}

/// A rendered login script. Holds the password when one is auto-sent.
pub struct ExpectScript {
    text: Zeroizing<String>,
}

impl ExpectScript {
    /// Render the script that spawns `program args...` and logs in per
    /// `descriptor` within `ceiling_secs`.
    pub fn render(
        program: &str,
        args: &[String],
        descriptor: &AuthDescriptor,
        ceiling_secs: u64,
    ) -> Self {
        let password = descriptor.auto_password();
        let mut text = Zeroizing::new(String::with_capacity(1024));

        let _ = writeln!(text, "set timeout {}", ceiling_secs);
        text.push_str("set logged_in 0\nset handoff 0\nset password_sent 0\nlog_user 1\n");

        text.push_str("spawn -noecho ");
        text.push_str(&quoted(program));
        for arg in args {
            text.push(' ');
            text.push_str(&quoted(arg));
        }
        text.push('\n');

        text.push_str("expect {\n");
        for rule in PROMPT_RULES.iter() {
            let action = response(rule.event, descriptor.mode, password.is_some());
            let nocase = if rule.case_insensitive { "-nocase " } else { "" };
            let _ = writeln!(
                text,
                "    {}-re {} {{ {} }}",
                nocase,
                quoted(rule.pattern),
                render_action(rule.event, action, password)
            );
        }
        let on_eof = response(PromptEvent::StreamEnd, descriptor.mode, password.is_some());
        let _ = writeln!(
            text,
            "    eof {{ {} }}",
            render_action(PromptEvent::StreamEnd, on_eof, password)
        );
        let _ = writeln!(text, "    timeout {{ exit {} }}", exit_code(FailureKind::TimedOut));
        text.push_str("}\n");

        text.push_str("if {$logged_in || $handoff} {\n    interact\n    exit 0\n}\n");
        let _ = writeln!(text, "exit {}", exit_code(FailureKind::StreamEnded));

        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Write the script to a private temp file and run it with `expect`
    pub async fn run(&self) -> Result<SessionOutcome> {
        // NamedTempFile is created 0600 and removed on drop
        let mut file = tempfile::Builder::new()
            .prefix("gssh-")
            .suffix(".exp")
            .tempfile()?;
        file.write_all(self.text.as_bytes())?;
        file.flush()?;

        debug!("Running expect script {}", file.path().display());
        let status = Command::new("expect")
            .arg("-f")
            .arg(file.path())
            .status()
            .await
            .map_err(|e| {
                GsshError::spawn(format!(
                    "cannot run expect ({}); install it or use --driver native",
                    e
                ))
            })?;

        let outcome = outcome_from_exit(status.code());
        info!("expect finished with {:?}", status.code());
        outcome
    }
}

impl std::fmt::Debug for ExpectScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectScript").finish_non_exhaustive()
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", escape_for_script(s))
}

fn render_action(event: PromptEvent, action: Action, password: Option<&str>) -> String {
    match action {
        Action::Continue => "exp_continue -continue_timer".to_string(),
        Action::SendLine(line) => format!(
            "send -- \"{}\\r\"; exp_continue -continue_timer",
            escape_for_script(line)
        ),
        Action::SendPassword => match password {
            Some(pw) => format!(
                "if {{$password_sent}} {{ exit {} }}; set password_sent 1; send -- \"{}\\r\"; exp_continue -continue_timer",
                exit_code(FailureKind::AuthRejected),
                escape_for_script(pw)
            ),
            None => "set handoff 1".to_string(),
        },
        Action::HandOff if event == PromptEvent::ShellPromptDetected => "set logged_in 1".to_string(),
        Action::HandOff => "set handoff 1".to_string(),
        Action::Fail(kind) => format!("exit {}", exit_code(kind)),
    }
}
