//! Credential resolution for programmatic sessions
//!
//! Builds the ordered list of authentication methods a library-mediated
//! session will try: agent first, then the identity file, then the password.
//! Resolution never touches the network; the agent is only contacted when the
//! session actually authenticates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{self, PrivateKey};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::config::expand_home;
use crate::error::{GsshError, Result};

/// Environment variable naming the agent socket
pub const AGENT_SOCKET_ENV: &str = "SSH_AUTH_SOCK";

/// Where a candidate credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Agent,
    IdentityFile,
    Password,
}

/// Result of examining one credential source
#[derive(Debug)]
pub enum AttemptOutcome {
    /// A method was queued
    Success,
    /// Key material (or its passphrase) did not parse
    ParseError(GsshError),
    /// Key is encrypted and needs a passphrase
    PassphraseRequired,
    /// Source could not be used at all (unreadable file, no tty, ...)
    Unusable(GsshError),
}

/// One entry of the append-only resolution log
#[derive(Debug)]
pub struct CredentialAttempt {
    pub source: CredentialSource,
    pub outcome: AttemptOutcome,
}

impl CredentialAttempt {
    fn new(source: CredentialSource, outcome: AttemptOutcome) -> Self {
        Self { source, outcome }
    }

    /// Error carried by this attempt, if any
    pub fn error(&self) -> Option<&GsshError> {
        match &self.outcome {
            AttemptOutcome::ParseError(e) | AttemptOutcome::Unusable(e) => Some(e),
            AttemptOutcome::Success | AttemptOutcome::PassphraseRequired => None,
        }
    }
}

/// A resolved authentication method, in the order it will be tried
pub enum AuthMethod {
    /// Agent reachable at `socket`; connected lazily at authentication time
    Agent { socket: PathBuf },
    /// Parsed (and if needed decrypted) private key
    PublicKey { key: Arc<PrivateKey>, path: PathBuf },
    /// Account password
    Password(Zeroizing<String>),
}

impl AuthMethod {
    pub fn source(&self) -> CredentialSource {
        match self {
            AuthMethod::Agent { .. } => CredentialSource::Agent,
            AuthMethod::PublicKey { .. } => CredentialSource::IdentityFile,
            AuthMethod::Password(_) => CredentialSource::Password,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Agent { .. } => "agent",
            AuthMethod::PublicKey { .. } => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Agent { socket } => f.debug_struct("Agent").field("socket", socket).finish(),
            AuthMethod::PublicKey { path, .. } => {
                f.debug_struct("PublicKey").field("path", path).finish()
            }
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// Ordered methods plus the diagnostics collected while building them
#[derive(Debug)]
pub struct Resolution {
    pub methods: Vec<AuthMethod>,
    pub attempts: Vec<CredentialAttempt>,
}

/// Source of passphrases for encrypted identity files
pub trait PassphrasePrompt {
    /// Read a passphrase without echo
    fn read_passphrase(&mut self, key_path: &Path) -> std::io::Result<Zeroizing<String>>;
}

/// Prompts on the controlling terminal with echo disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PassphrasePrompt for TerminalPrompt {
    fn read_passphrase(&mut self, key_path: &Path) -> std::io::Result<Zeroizing<String>> {
        rpassword::prompt_password(format!(
            "Identity file {} is passphrase protected.\nEnter passphrase: ",
            key_path.display()
        ))
        .map(Zeroizing::new)
    }
}

/// Non-interactive verdict on an identity file
#[derive(Debug)]
pub enum KeyStatus {
    Usable(PrivateKey),
    PassphraseRequired,
    /// File could not be read
    Unreadable(GsshError),
    /// File was read but is not a private key we can parse
    Invalid(GsshError),
}

/// Read and parse an identity file without prompting
pub fn inspect_identity(path: &Path) -> KeyStatus {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            return KeyStatus::Unreadable(GsshError::KeyParse(format!(
                "cannot read identity file {}: {}",
                path.display(),
                e
            )))
        }
    };

    match keys::decode_secret_key(&text, None) {
        Ok(key) => KeyStatus::Usable(key),
        Err(keys::Error::KeyIsEncrypted) => KeyStatus::PassphraseRequired,
        Err(e) => KeyStatus::Invalid(GsshError::KeyParse(format!(
            "cannot parse identity file {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Builds ordered authentication methods from agent, identity file and password
pub struct CredentialResolver<P = TerminalPrompt> {
    agent_socket: Option<PathBuf>,
    prompt: P,
}

impl CredentialResolver<TerminalPrompt> {
    /// Resolver using `SSH_AUTH_SOCK` and the terminal prompt
    pub fn from_env() -> Self {
        let agent_socket = std::env::var_os(AGENT_SOCKET_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(agent_socket, TerminalPrompt)
    }
}

impl<P: PassphrasePrompt> CredentialResolver<P> {
    pub fn new(agent_socket: Option<PathBuf>, prompt: P) -> Self {
        Self {
            agent_socket,
            prompt,
        }
    }

    /// Resolve the ordered method list.
    ///
    /// Fails with `NoUsableCredential` only when zero methods were produced.
    pub fn resolve(
        &mut self,
        identity_path: Option<&str>,
        password: Option<&str>,
    ) -> Result<Resolution> {
        let mut methods = Vec::new();
        let mut attempts = Vec::new();

        if let Some(socket) = &self.agent_socket {
            debug!("Agent socket {} available, queueing agent method", socket.display());
            methods.push(AuthMethod::Agent {
                socket: socket.clone(),
            });
            attempts.push(CredentialAttempt::new(
                CredentialSource::Agent,
                AttemptOutcome::Success,
            ));
        }

        if let Some(raw) = identity_path.filter(|p| !p.is_empty()) {
            let path = expand_home(raw);
            self.resolve_identity(&path, &mut methods, &mut attempts);
        }

        if let Some(pw) = password.filter(|p| !p.is_empty()) {
            methods.push(AuthMethod::Password(Zeroizing::new(pw.to_string())));
            attempts.push(CredentialAttempt::new(
                CredentialSource::Password,
                AttemptOutcome::Success,
            ));
        }

        if methods.is_empty() {
            return Err(no_usable_credential(identity_path, password, &attempts));
        }

        info!(
            "Resolved {} authentication method(s): {}",
            methods.len(),
            methods.iter().map(AuthMethod::name).collect::<Vec<_>>().join(", ")
        );
        Ok(Resolution { methods, attempts })
    }

    fn resolve_identity(
        &mut self,
        path: &Path,
        methods: &mut Vec<AuthMethod>,
        attempts: &mut Vec<CredentialAttempt>,
    ) {
        let key = match inspect_identity(path) {
            KeyStatus::Usable(key) => key,
            KeyStatus::Unreadable(e) => {
                warn!("{}", e);
                attempts.push(CredentialAttempt::new(
                    CredentialSource::IdentityFile,
                    AttemptOutcome::Unusable(e),
                ));
                return;
            }
            KeyStatus::Invalid(e) => {
                warn!("{}", e);
                attempts.push(CredentialAttempt::new(
                    CredentialSource::IdentityFile,
                    AttemptOutcome::ParseError(e),
                ));
                return;
            }
            KeyStatus::PassphraseRequired => {
                attempts.push(CredentialAttempt::new(
                    CredentialSource::IdentityFile,
                    AttemptOutcome::PassphraseRequired,
                ));
                // An agent queued ahead of us is assumed to hold the decrypted key.
                if agent_queued(methods) {
                    debug!(
                        "Identity file {} is encrypted; agent already queued, not prompting",
                        path.display()
                    );
                    return;
                }
                match self.decrypt_with_prompt(path) {
                    Ok(key) => key,
                    Err(outcome) => {
                        attempts.push(CredentialAttempt::new(
                            CredentialSource::IdentityFile,
                            outcome,
                        ));
                        return;
                    }
                }
            }
        };

        debug!("Identity file {} parsed", path.display());
        methods.push(AuthMethod::PublicKey {
            key: Arc::new(key),
            path: path.to_path_buf(),
        });
        attempts.push(CredentialAttempt::new(
            CredentialSource::IdentityFile,
            AttemptOutcome::Success,
        ));
    }

    fn decrypt_with_prompt(&mut self, path: &Path) -> std::result::Result<PrivateKey, AttemptOutcome> {
        let passphrase = self.prompt.read_passphrase(path).map_err(|e| {
            AttemptOutcome::Unusable(GsshError::Passphrase(format!(
                "cannot read passphrase for {}: {}",
                path.display(),
                e
            )))
        })?;

        let text = std::fs::read_to_string(path).map_err(|e| {
            AttemptOutcome::Unusable(GsshError::KeyParse(format!(
                "cannot read identity file {}: {}",
                path.display(),
                e
            )))
        })?;

        keys::decode_secret_key(&text, Some(passphrase.as_str())).map_err(|e| {
            warn!("Passphrase did not decrypt {}", path.display());
            AttemptOutcome::ParseError(GsshError::Passphrase(format!(
                "cannot decrypt identity file {} (wrong passphrase?): {}",
                path.display(),
                e
            )))
        })
    }
}

fn agent_queued(methods: &[AuthMethod]) -> bool {
    methods
        .iter()
        .any(|m| m.source() == CredentialSource::Agent)
}

fn no_usable_credential(
    identity_path: Option<&str>,
    password: Option<&str>,
    attempts: &[CredentialAttempt],
) -> GsshError {
    let has_identity = identity_path.is_some_and(|p| !p.is_empty());
    let has_password = password.is_some_and(|p| !p.is_empty());

    let mut msg = String::from("no authentication method available.");
    if let Some(first) = attempts.iter().find_map(CredentialAttempt::error) {
        msg.push_str("\nkey authentication failed:\n  - ");
        msg.push_str(&first.to_string());
    }
    if !has_identity && !has_password {
        msg.push_str("\nconfigure an SSH key path or a password.");
    } else if !has_password {
        msg.push_str("\nno password is configured; check the key file or configure a password.");
    }
    GsshError::NoUsableCredential(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PLAIN_KEY: &str = include_str!("../../tests/fixtures/id_ed25519_plain");
    const LOCKED_KEY: &str = include_str!("../../tests/fixtures/id_ed25519_locked");
    const LOCKED_PASSPHRASE: &str = "hunter2";

    /// Prompt stub that counts no-echo reads
    struct CountingPrompt {
        reads: usize,
        answer: Option<&'static str>,
    }

    impl CountingPrompt {
        fn answering(answer: &'static str) -> Self {
            Self {
                reads: 0,
                answer: Some(answer),
            }
        }

        fn unavailable() -> Self {
            Self {
                reads: 0,
                answer: None,
            }
        }
    }

    impl PassphrasePrompt for CountingPrompt {
        fn read_passphrase(&mut self, _key_path: &Path) -> std::io::Result<Zeroizing<String>> {
            self.reads += 1;
            match self.answer {
                Some(a) => Ok(Zeroizing::new(a.to_string())),
                None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no tty")),
            }
        }
    }

    fn key_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn path_of(file: &tempfile::NamedTempFile) -> String {
        file.path().to_str().unwrap().to_string()
    }

    fn sources(resolution: &Resolution) -> Vec<CredentialSource> {
        resolution.methods.iter().map(AuthMethod::source).collect()
    }

    #[test]
    fn test_order_is_agent_key_password() {
        let key = key_file(PLAIN_KEY);
        let mut resolver =
            CredentialResolver::new(Some("/tmp/agent.sock".into()), CountingPrompt::unavailable());

        let resolution = resolver.resolve(Some(&path_of(&key)), Some("pw")).unwrap();
        assert_eq!(
            sources(&resolution),
            vec![
                CredentialSource::Agent,
                CredentialSource::IdentityFile,
                CredentialSource::Password
            ]
        );
    }

    #[test]
    fn test_encrypted_key_with_agent_never_prompts() {
        let key = key_file(LOCKED_KEY);
        let mut resolver = CredentialResolver::new(
            Some("/tmp/agent.sock".into()),
            CountingPrompt::answering(LOCKED_PASSPHRASE),
        );

        let resolution = resolver.resolve(Some(&path_of(&key)), None).unwrap();

        assert_eq!(resolver.prompt.reads, 0);
        assert_eq!(sources(&resolution), vec![CredentialSource::Agent]);
        assert!(resolution.attempts.iter().any(|a| {
            a.source == CredentialSource::IdentityFile
                && matches!(a.outcome, AttemptOutcome::PassphraseRequired)
        }));
    }

    #[test]
    fn test_encrypted_key_without_agent_prompts_once() {
        let key = key_file(LOCKED_KEY);
        let mut resolver =
            CredentialResolver::new(None, CountingPrompt::answering(LOCKED_PASSPHRASE));

        let resolution = resolver.resolve(Some(&path_of(&key)), None).unwrap();

        assert_eq!(resolver.prompt.reads, 1);
        assert_eq!(sources(&resolution), vec![CredentialSource::IdentityFile]);
    }

    #[test]
    fn test_wrong_passphrase_falls_through_to_password() {
        let key = key_file(LOCKED_KEY);
        let mut resolver = CredentialResolver::new(None, CountingPrompt::answering("nope"));

        let resolution = resolver.resolve(Some(&path_of(&key)), Some("pw")).unwrap();

        assert_eq!(sources(&resolution), vec![CredentialSource::Password]);
        assert!(resolution
            .attempts
            .iter()
            .any(|a| matches!(a.outcome, AttemptOutcome::ParseError(GsshError::Passphrase(_)))));
    }

    #[test]
    fn test_unparseable_key_falls_through_to_password() {
        let key = key_file("this is not a private key\n");
        let mut resolver = CredentialResolver::new(None, CountingPrompt::unavailable());

        let resolution = resolver.resolve(Some(&path_of(&key)), Some("x")).unwrap();

        assert_eq!(resolver.prompt.reads, 0);
        assert_eq!(sources(&resolution), vec![CredentialSource::Password]);
        assert!(matches!(
            resolution.attempts[0].outcome,
            AttemptOutcome::ParseError(GsshError::KeyParse(_))
        ));
    }

    #[test]
    fn test_missing_key_without_password_names_the_key_error() {
        let mut resolver = CredentialResolver::new(None, CountingPrompt::unavailable());

        let err = resolver
            .resolve(Some("/nonexistent/gssh/id_rsa"), None)
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, GsshError::NoUsableCredential(_)));
        assert!(msg.contains("/nonexistent/gssh/id_rsa"));
        assert!(msg.contains("no password is configured"));
    }

    #[test]
    fn test_nothing_configured() {
        let mut resolver = CredentialResolver::new(None, CountingPrompt::unavailable());
        let err = resolver.resolve(None, Some("")).unwrap_err();
        assert!(err.to_string().contains("configure an SSH key path or a password"));
    }

    #[test]
    fn test_prompt_failure_is_recorded_not_fatal() {
        let key = key_file(LOCKED_KEY);
        let mut resolver = CredentialResolver::new(None, CountingPrompt::unavailable());

        let resolution = resolver.resolve(Some(&path_of(&key)), Some("pw")).unwrap();

        assert_eq!(resolver.prompt.reads, 1);
        assert_eq!(sources(&resolution), vec![CredentialSource::Password]);
        assert!(resolution
            .attempts
            .iter()
            .any(|a| matches!(a.outcome, AttemptOutcome::Unusable(GsshError::Passphrase(_)))));
    }

    #[test]
    fn test_inspect_identity() {
        let plain = key_file(PLAIN_KEY);
        let locked = key_file(LOCKED_KEY);
        assert!(matches!(inspect_identity(plain.path()), KeyStatus::Usable(_)));
        assert!(matches!(
            inspect_identity(locked.path()),
            KeyStatus::PassphraseRequired
        ));
        assert!(matches!(
            inspect_identity(Path::new("/nonexistent/key")),
            KeyStatus::Unreadable(_)
        ));
    }

    #[test]
    fn test_password_method_debug_is_redacted() {
        let method = AuthMethod::Password(Zeroizing::new("s3cret".into()));
        assert_eq!(format!("{:?}", method), "Password(<redacted>)");
    }
}
