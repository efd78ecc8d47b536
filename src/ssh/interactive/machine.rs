//! Login state machine
//!
//! Pure transition logic for one interactive login. It owns no I/O: the
//! driver feeds it events and performs the returned actions. All state that
//! matters across events (password already sent, login confirmed) lives in the
//! `LoginMachine` value threaded through the read loop.

use super::rules::PromptEvent;
use super::SessionOutcome;
use crate::ssh::config::AuthMode;

/// Why a login failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An explicit failure signal was seen
    AuthRejected,
    /// The stream ended before a shell prompt
    StreamEnded,
    /// The login ceiling elapsed
    TimedOut,
}

/// Login state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Spawned,
    AwaitingHostKeyDecision,
    AwaitingAuthPrompt,
    LoggedIn,
    Failed(FailureKind),
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::LoggedIn | LoginState::Failed(_))
    }
}

/// What the driver must do in response to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Keep watching the stream
    Continue,
    /// Send a fixed reply followed by `\r`
    SendLine(&'static str),
    /// Send the configured password followed by `\r`
    SendPassword,
    /// Give the terminal to the user
    HandOff,
    /// Stop and terminate the client
    Fail(FailureKind),
}

/// Static response table: the action an event maps to under `mode`.
///
/// `has_password` is whether a password is configured; `KeyOnly` ignores it.
pub fn response(event: PromptEvent, mode: AuthMode, has_password: bool) -> Action {
    match event {
        PromptEvent::HostKeyConfirmation => Action::SendLine("yes"),
        PromptEvent::AuthFailureSignal => Action::Fail(FailureKind::AuthRejected),
        // the passphrase is never stored; the user types it
        PromptEvent::PassphrasePrompt => Action::HandOff,
        PromptEvent::PasswordPrompt => match mode {
            AuthMode::KeyOnly => Action::HandOff,
            AuthMode::AutoFallback | AuthMode::PasswordOnly if has_password => {
                Action::SendPassword
            }
            AuthMode::AutoFallback | AuthMode::PasswordOnly => Action::HandOff,
        },
        PromptEvent::ShellPromptDetected => Action::HandOff,
        PromptEvent::StreamEnd => Action::Fail(FailureKind::StreamEnded),
    }
}

/// State carried through one login attempt
#[derive(Debug, Clone)]
pub struct LoginMachine {
    mode: AuthMode,
    has_password: bool,
    state: LoginState,
    password_sent: bool,
    login_confirmed: bool,
}

impl LoginMachine {
    pub fn new(mode: AuthMode, has_password: bool) -> Self {
        Self {
            mode,
            has_password: has_password && mode != AuthMode::KeyOnly,
            state: LoginState::Spawned,
            password_sent: false,
            login_confirmed: false,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    /// Whether a shell prompt was observed
    pub fn login_confirmed(&self) -> bool {
        self.login_confirmed
    }

    /// Apply one event and return the action to perform.
    ///
    /// Events after a terminal state are ignored.
    pub fn on_event(&mut self, event: PromptEvent) -> Action {
        if self.state.is_terminal() {
            return Action::Continue;
        }

        let action = response(event, self.mode, self.has_password);
        match (event, action) {
            (PromptEvent::HostKeyConfirmation, _) => {
                self.state = LoginState::AwaitingHostKeyDecision;
                action
            }
            // A second password prompt means the first one was rejected.
            // Never resend: repeated failures can trip remote lockout policies.
            (PromptEvent::PasswordPrompt, Action::SendPassword) if self.password_sent => {
                self.fail(FailureKind::AuthRejected)
            }
            (PromptEvent::PasswordPrompt, Action::SendPassword) => {
                self.password_sent = true;
                self.state = LoginState::AwaitingAuthPrompt;
                action
            }
            (PromptEvent::ShellPromptDetected, _) => {
                self.login_confirmed = true;
                self.state = LoginState::LoggedIn;
                action
            }
            (_, Action::HandOff) => {
                self.state = LoginState::LoggedIn;
                action
            }
            (_, Action::Fail(kind)) => self.fail(kind),
            (_, other) => other,
        }
    }

    /// The login ceiling elapsed
    pub fn on_timeout(&mut self) -> Action {
        if self.state.is_terminal() {
            return Action::Continue;
        }
        self.fail(FailureKind::TimedOut)
    }

    fn fail(&mut self, kind: FailureKind) -> Action {
        self.state = LoginState::Failed(kind);
        Action::Fail(kind)
    }

    /// Outcome once a terminal state is reached
    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self.state {
            LoginState::LoggedIn => Some(SessionOutcome::LoggedIn),
            LoginState::Failed(FailureKind::AuthRejected) => Some(SessionOutcome::AuthFailed),
            LoginState::Failed(FailureKind::StreamEnded) => Some(SessionOutcome::ConnectionClosed),
            LoginState::Failed(FailureKind::TimedOut) => Some(SessionOutcome::Timeout),
            LoginState::Spawned
            | LoginState::AwaitingHostKeyDecision
            | LoginState::AwaitingAuthPrompt => None,
        }
    }
}
