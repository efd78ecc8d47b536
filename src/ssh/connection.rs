//! Programmatic SSH sessions
//!
//! Opens a library-mediated session with an ordered list of resolved
//! authentication methods. Used for one-shot commands and config sync, never
//! for interactive login. Each session serves one purpose and is closed before
//! the caller returns; there is no pooling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::Channel;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::auth::AuthMethod;
use super::handler::{HostKeyPolicy, SshHandler};
use crate::config::CONNECTION_TIMEOUT_SECS;
use crate::error::{GsshError, Result};

#[cfg(unix)]
type AgentClient = russh::keys::agent::client::AgentClient<tokio::net::UnixStream>;

/// Destination of a programmatic session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl SessionTarget {
    pub fn new(host: impl Into<String>, user: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
        }
    }
}

/// An authenticated session
pub struct ProgrammaticSession {
    target: SessionTarget,
    handle: Handle<SshHandler>,

    /// Agent connection used during authentication.
    /// Kept open for the session's lifetime and closed with it.
    #[cfg(unix)]
    _agent: Option<AgentClient>,
}

impl ProgrammaticSession {
    /// Dial, verify the host key per `policy`, and authenticate with `methods`
    /// in order.
    pub async fn open(
        target: &SessionTarget,
        methods: Vec<AuthMethod>,
        policy: HostKeyPolicy,
    ) -> Result<Self> {
        info!(
            "Connecting to SSH server {}:{}...",
            target.host, target.port
        );

        if !policy.is_verifying() {
            warn!(
                "Host key of {} will not be verified (known_hosts unavailable)",
                target.host
            );
        }

        let connection_timeout = Duration::from_secs(CONNECTION_TIMEOUT_SECS);
        let ssh_config = Arc::new(client::Config::default());
        let handler = SshHandler::new(&target.host, target.port, policy);

        let addr = format!("{}:{}", target.host, target.port);
        let connect_result =
            timeout(connection_timeout, client::connect(ssh_config, addr.as_str(), handler)).await;

        let handle = match connect_result {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                error!("SSH connection failed: {}", e);
                return Err(GsshError::dial(format!("{}: {}", addr, e)));
            }
            Err(_) => {
                error!("SSH connection timeout after {}s", CONNECTION_TIMEOUT_SECS);
                return Err(GsshError::dial(format!(
                    "{}: connection timeout after {}s",
                    addr, CONNECTION_TIMEOUT_SECS
                )));
            }
        };

        let mut session = Self {
            target: target.clone(),
            handle,
            #[cfg(unix)]
            _agent: None,
        };

        if let Err(e) = session.authenticate(methods).await {
            session.close().await;
            return Err(e);
        }

        info!(
            "Successfully connected to {}@{}:{}",
            target.user, target.host, target.port
        );
        Ok(session)
    }

    /// Try each method in order until one is accepted
    async fn authenticate(&mut self, methods: Vec<AuthMethod>) -> Result<()> {
        let mut failures = Vec::new();

        for method in methods {
            let name = method.name();
            debug!(
                "Attempting {} authentication for user '{}'",
                name, self.target.user
            );

            let accepted = match method {
                AuthMethod::Agent { socket } => self.authenticate_agent(&socket).await,
                AuthMethod::PublicKey { key, path } => {
                    debug!("Using identity file {}", path.display());
                    self.authenticate_key(key).await
                }
                AuthMethod::Password(password) => self
                    .handle
                    .authenticate_password(&self.target.user, password.as_str())
                    .await
                    .map(|result| result.success())
                    .map_err(|e| e.to_string()),
            };

            match accepted {
                Ok(true) => {
                    info!("{} authentication successful", name);
                    return Ok(());
                }
                Ok(false) => {
                    debug!("{} authentication rejected", name);
                    failures.push(format!("{}: rejected", name));
                }
                Err(e) => {
                    debug!("{} authentication error: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }

        Err(GsshError::auth(format!(
            "{}@{} rejected every method ({})",
            self.target.user,
            self.target.host,
            failures.join("; ")
        )))
    }

    async fn authenticate_key(
        &mut self,
        key: Arc<russh::keys::PrivateKey>,
    ) -> std::result::Result<bool, String> {
        let hash_alg = self
            .handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();

        let key_with_alg = PrivateKeyWithHashAlg::new(key, hash_alg);
        self.handle
            .authenticate_publickey(&self.target.user, key_with_alg)
            .await
            .map(|result| result.success())
            .map_err(|e| e.to_string())
    }

    /// Connect to the agent now and try each of its identities.
    ///
    /// Failure to reach the agent is this method's failure only.
    #[cfg(unix)]
    async fn authenticate_agent(
        &mut self,
        socket: &std::path::Path,
    ) -> std::result::Result<bool, String> {
        let mut agent = AgentClient::connect_uds(socket)
            .await
            .map_err(|e| format!("cannot reach agent at {}: {}", socket.display(), e))?;

        let identities = agent
            .request_identities()
            .await
            .map_err(|e| format!("cannot list agent identities: {}", e))?;

        if identities.is_empty() {
            self._agent = Some(agent);
            return Err("agent holds no identities".to_string());
        }

        let mut accepted = false;
        for identity in identities {
            debug!("Trying agent identity: {:?}", identity.comment());

            let hash_alg = self
                .handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();

            match self
                .handle
                .authenticate_publickey_with(&self.target.user, identity.clone(), hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => {
                    accepted = true;
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!("Agent signing error: {}, trying next identity", e);
                    continue;
                }
            }
        }

        self._agent = Some(agent);
        Ok(accepted)
    }

    #[cfg(not(unix))]
    async fn authenticate_agent(
        &mut self,
        _socket: &std::path::Path,
    ) -> std::result::Result<bool, String> {
        Err("agent sockets are not supported on this platform".to_string())
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    /// Open a new session channel
    pub(crate) async fn open_channel(&self) -> Result<Channel<client::Msg>> {
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| GsshError::dial(format!("Failed to open channel: {}", e)))
    }

    /// Close the session (and with it the agent connection)
    pub async fn close(self) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await;
        debug!("SSH session to {} closed", self.target.host);
    }
}

impl std::fmt::Debug for ProgrammaticSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgrammaticSession")
            .field("host", &self.target.host)
            .field("port", &self.target.port)
            .field("user", &self.target.user)
            .finish()
    }
}

/// Future returned by a scoped session body
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Open a session, run `body` with it, and close it on every exit path.
///
/// # Example
///
/// ```ignore
/// let output = with_session(&target, methods, policy, |session| {
///     Box::pin(async move { session.run("uptime").await })
/// })
/// .await?;
/// ```
pub async fn with_session<T, F>(
    target: &SessionTarget,
    methods: Vec<AuthMethod>,
    policy: HostKeyPolicy,
    body: F,
) -> Result<T>
where
    F: for<'a> FnOnce(&'a ProgrammaticSession) -> SessionFuture<'a, T>,
{
    let session = ProgrammaticSession::open(target, methods, policy).await?;
    let result = body(&session).await;
    session.close().await;
    result
}
