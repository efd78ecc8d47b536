//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait to verify server host keys
//! against the user's known-hosts store.

use std::path::{Path, PathBuf};

use russh::keys::{self, HashAlg};
use tracing::{debug, warn};

/// How server host keys are verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Check against a known-hosts file; unknown or changed keys are rejected
    KnownHosts(PathBuf),
    /// Accept any host key
    ///
    /// # Security Note
    /// Used only when the known-hosts store cannot be opened. This trades
    /// man-in-the-middle protection for availability and is always announced
    /// to the user as a warning.
    AcceptAny,
}

impl HostKeyPolicy {
    /// Default policy: `~/.ssh/known_hosts`, degrading to `AcceptAny`
    pub fn from_default_store() -> Self {
        match dirs::home_dir() {
            Some(home) => Self::from_store(&home.join(".ssh").join("known_hosts")),
            None => {
                warn!("Could not determine home directory; host key verification disabled");
                HostKeyPolicy::AcceptAny
            }
        }
    }

    /// Policy for a specific store path
    pub fn from_store(path: &Path) -> Self {
        match std::fs::File::open(path) {
            Ok(_) => {
                debug!("Using known_hosts file: {}", path.display());
                HostKeyPolicy::KnownHosts(path.to_path_buf())
            }
            Err(e) => {
                warn!(
                    "Known hosts file {} cannot be opened ({}); host key verification disabled",
                    path.display(),
                    e
                );
                HostKeyPolicy::AcceptAny
            }
        }
    }

    pub fn is_verifying(&self) -> bool {
        matches!(self, HostKeyPolicy::KnownHosts(_))
    }
}

/// SSH client handler for russh
#[derive(Debug, Clone)]
pub struct SshHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
}

impl SshHandler {
    /// Create a new SSH handler for one destination
    pub fn new(host: impl Into<String>, port: u16, policy: HostKeyPolicy) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
        }
    }
}

impl russh::client::Handler for SshHandler {
    type Error = anyhow::Error;

    /// Verify the server's host key
    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let path = match &self.policy {
            HostKeyPolicy::AcceptAny => return Ok(true),
            HostKeyPolicy::KnownHosts(path) => path,
        };

        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);
        match keys::check_known_hosts_path(&self.host, self.port, server_public_key, path) {
            Ok(true) => {
                debug!("Host key for {} matches {}", self.host, path.display());
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    "Host {} ({}) is not in {}; connect once interactively to record it",
                    self.host,
                    fingerprint,
                    path.display()
                );
                Ok(false)
            }
            Err(e) => {
                warn!(
                    "Host key verification failed for {} ({}): {}",
                    self.host, fingerprint, e
                );
                Ok(false)
            }
        }
    }
}
