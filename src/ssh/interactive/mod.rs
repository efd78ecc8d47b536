//! Interactive login
//!
//! Spawns the system `ssh` client, answers its prompts according to the
//! `AuthDescriptor`, and hands the terminal to the user once a shell prompt
//! is confirmed. Two backends share one rule table and one state machine:
//! `native` drives `ssh` on a pseudo-terminal in-process, `expect` renders the
//! same rules into a script for the system `expect`.

pub mod driver;
pub mod machine;
pub mod pty;
pub mod rules;
pub mod script;

use tracing::{info, warn};

use crate::config::LOGIN_TIMEOUT_SECS;
use crate::error::{GsshError, Result};
use crate::ssh::auth::{inspect_identity, KeyStatus, AGENT_SOCKET_ENV};
use crate::ssh::config::{expand_home, AuthDescriptor, AuthMode};
use crate::ssh::connection::SessionTarget;
use crate::ssh::sanitize::validate_argv_token;

pub use driver::{LoginDriver, TerminalClient};
pub use machine::{Action, FailureKind, LoginMachine, LoginState};
pub use pty::PtyClient;
pub use rules::{classify, PromptEvent, PromptRule, PROMPT_RULES};
pub use script::ExpectScript;

/// Terminal client spawned for interactive logins
pub const CLIENT_PROGRAM: &str = "ssh";

/// Terminal result of one login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Control was handed to the user
    LoggedIn,
    /// An explicit failure signal was seen
    AuthFailed,
    /// The stream ended before a shell prompt was observed
    ConnectionClosed,
    /// No terminal state within the login ceiling
    Timeout,
}

/// Which mechanism drives the terminal client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// In-process pseudo-terminal
    #[default]
    Native,
    /// System `expect` running a rendered script
    Expect,
}

/// Everything needed to spawn the terminal client for one login
#[derive(Debug, Clone)]
pub struct LoginPlan {
    pub target: SessionTarget,
    pub args: Vec<String>,
    /// Descriptor the login loop runs with, after identity pre-screening
    pub descriptor: AuthDescriptor,
    /// The identity file needs a passphrase that no agent can supply
    pub passphrase_hint: bool,
}

impl LoginPlan {
    /// Build the client argv: `-p <port> [-i <identity>] -- <user>@<host>`.
    ///
    /// `PasswordOnly` never passes `-i`. `AutoFallback` drops an identity file
    /// that cannot be read or parsed and continues as a password login.
    pub fn build(
        target: &SessionTarget,
        descriptor: &AuthDescriptor,
        agent_available: bool,
    ) -> Result<Self> {
        validate_argv_token("host", &target.host)?;
        validate_argv_token("user", &target.user)?;

        let mut args = vec!["-p".to_string(), target.port.to_string()];
        let mut effective = descriptor.clone();
        let mut passphrase_hint = false;

        if let Some(raw) = descriptor.identity() {
            let path = expand_home(raw);
            let status = inspect_identity(&path);
            let keep = match (&status, descriptor.mode) {
                (KeyStatus::Usable(_), _) => true,
                (KeyStatus::PassphraseRequired, _) => {
                    passphrase_hint = !agent_available;
                    true
                }
                (KeyStatus::Unreadable(e) | KeyStatus::Invalid(e), AuthMode::KeyOnly) => {
                    warn!("{}", e);
                    true
                }
                (KeyStatus::Unreadable(e) | KeyStatus::Invalid(e), _) => {
                    warn!("{}; falling back to password", e);
                    false
                }
            };

            if keep {
                args.push("-i".to_string());
                args.push(path.to_string_lossy().into_owned());
            } else {
                effective.identity_path = None;
                if effective.password.is_some() {
                    effective.mode = AuthMode::PasswordOnly;
                }
            }
        }

        args.push("--".to_string());
        args.push(format!("{}@{}", target.user, target.host));

        Ok(Self {
            target: target.clone(),
            args,
            descriptor: effective,
            passphrase_hint,
        })
    }

    /// Turn an outcome into the caller-facing result
    pub fn conclude(&self, outcome: SessionOutcome) -> Result<()> {
        match outcome {
            SessionOutcome::LoggedIn => Ok(()),
            SessionOutcome::AuthFailed => Err(GsshError::auth(format!(
                "{}@{} rejected the credentials ({} auth)",
                self.target.user, self.target.host, self.descriptor.mode
            ))),
            SessionOutcome::ConnectionClosed => Err(GsshError::StreamEndedBeforeLogin(format!(
                "connection to {}:{} closed",
                self.target.host, self.target.port
            ))),
            SessionOutcome::Timeout => {
                if self.passphrase_hint {
                    warn!("The identity file is passphrase protected; load it with ssh-add first");
                }
                Err(GsshError::SessionTimeout(LOGIN_TIMEOUT_SECS))
            }
        }
    }
}

/// Log in to `target` and hand the terminal to the user.
///
/// Returns once the user's session has ended, or with the failure that
/// prevented the login.
pub async fn login(target: &SessionTarget, descriptor: &AuthDescriptor, backend: Backend) -> Result<()> {
    let agent_available = std::env::var_os(AGENT_SOCKET_ENV).is_some_and(|v| !v.is_empty());
    let plan = LoginPlan::build(target, descriptor, agent_available)?;

    info!(
        "Logging in to {}@{}:{} ({} auth, {:?} backend)",
        target.user, target.host, target.port, plan.descriptor.mode, backend
    );

    let outcome = match backend {
        Backend::Native => {
            let mut client = PtyClient::spawn(CLIENT_PROGRAM, &plan.args)?;
            LoginDriver::new(&plan.descriptor).run(&mut client).await?
        }
        Backend::Expect => {
            ExpectScript::render(CLIENT_PROGRAM, &plan.args, &plan.descriptor, LOGIN_TIMEOUT_SECS)
                .run()
                .await?
        }
    };

    plan.conclude(outcome)
}
