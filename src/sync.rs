//! Server list sync over SSH
//!
//! Pull reads the shared list with `cat` on the sync host; push writes it back
//! through the command's stdin. Both run over a scoped programmatic session
//! authenticated by the credential resolver in `auto` mode.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{GsshError, Result};
use crate::ssh::auth::{CredentialResolver, PassphrasePrompt};
use crate::ssh::config::expand_home;
use crate::ssh::connection::{with_session, SessionTarget};
use crate::ssh::handler::HostKeyPolicy;
use crate::ssh::sanitize::{quote_remote_path, remote_parent};
use crate::store::{now_rfc3339, Config, Server, SyncConfig};

/// The part of the store that is shared; sync settings stay local
#[derive(Debug, Serialize)]
struct SharedList<'a> {
    version: &'a str,
    servers: &'a [Server],
}

/// Serialize the shared part of `config`
pub fn shared_document(config: &Config) -> Result<String> {
    Ok(serde_yaml::to_string(&SharedList {
        version: &config.version,
        servers: &config.servers,
    })?)
}

/// Remote command that prints the list
pub fn pull_command(remote_path: &str) -> String {
    format!("cat {}", quote_remote_path(remote_path))
}

/// Remote command that stores its stdin as the list
pub fn push_command(remote_path: &str) -> String {
    let write = format!("cat > {}", quote_remote_path(remote_path));
    match remote_parent(remote_path) {
        Some(dir) => format!("mkdir -p {} && {}", quote_remote_path(dir), write),
        None => write,
    }
}

/// Replace the local list with `remote`, keeping local sync settings
pub fn merge_pulled(local: &mut Config, remote: Config) {
    local.version = if remote.version.is_empty() {
        local.version.clone()
    } else {
        remote.version
    };
    local.servers = remote.servers;
    local.sync.last_sync = now_rfc3339();
}

/// Sync endpoint built from the store's `sync` section
#[derive(Debug)]
pub struct SshSync<'a> {
    settings: &'a SyncConfig,
}

impl<'a> SshSync<'a> {
    /// Check the settings and build the endpoint
    pub fn new(settings: &'a SyncConfig) -> Result<Self> {
        if !settings.kind.eq_ignore_ascii_case("ssh") {
            return Err(GsshError::sync(format!(
                "unsupported sync type '{}'",
                settings.kind
            )));
        }

        let mut errors = Vec::new();

        if settings.ssh_host.is_empty() {
            errors.push("sync.ssh_host is not configured".to_string());
        }

        if settings.ssh_user.is_empty() {
            errors.push("sync.ssh_user is not configured".to_string());
        }

        if settings.ssh_key.is_empty() && settings.password.is_empty() {
            errors.push("configure sync.ssh_key or sync.password".to_string());
        }

        if !settings.ssh_key.is_empty() && !expand_home(&settings.ssh_key).exists() {
            errors.push(format!("SSH key file not found: {}", settings.ssh_key));
        }

        if settings.ssh_path.is_empty() {
            errors.push("sync.ssh_path is not configured".to_string());
        }

        if !errors.is_empty() {
            return Err(GsshError::sync(errors.join("; ")));
        }

        Ok(Self { settings })
    }

    fn identity(&self) -> Option<&str> {
        Some(self.settings.ssh_key.as_str()).filter(|v| !v.is_empty())
    }

    fn password(&self) -> Option<&str> {
        Some(self.settings.password.as_str()).filter(|v| !v.is_empty())
    }

    pub fn target(&self) -> SessionTarget {
        SessionTarget::new(
            &self.settings.ssh_host,
            &self.settings.ssh_user,
            self.settings.ssh_port,
        )
    }

    /// Fetch and parse the remote list
    pub async fn pull<P: PassphrasePrompt>(
        &self,
        resolver: &mut CredentialResolver<P>,
    ) -> Result<Config> {
        let command = pull_command(&self.settings.ssh_path);
        let resolution = resolver.resolve(self.identity(), self.password())?;

        info!(
            "Pulling server list from {}@{}",
            self.settings.ssh_user, self.settings.ssh_host
        );
        let output = with_session(
            &self.target(),
            resolution.methods,
            HostKeyPolicy::from_default_store(),
            move |session| Box::pin(async move { session.run(&command).await }),
        )
        .await?;

        if !output.success() {
            return Err(GsshError::sync(format!(
                "cannot read {} on {}: {}",
                self.settings.ssh_path,
                self.settings.ssh_host,
                output.text().trim()
            )));
        }

        let remote: Config = serde_yaml::from_slice(&output.combined)
            .map_err(|e| GsshError::sync(format!("cannot parse remote server list: {}", e)))?;
        info!("Pulled {} server(s)", remote.servers.len());
        Ok(remote)
    }

    /// Upload the shared part of `config`
    pub async fn push<P: PassphrasePrompt>(
        &self,
        resolver: &mut CredentialResolver<P>,
        config: &Config,
    ) -> Result<()> {
        let document = shared_document(config)?;
        let command = push_command(&self.settings.ssh_path);
        let resolution = resolver.resolve(self.identity(), self.password())?;

        info!(
            "Pushing {} server(s) to {}@{}",
            config.servers.len(),
            self.settings.ssh_user,
            self.settings.ssh_host
        );
        let output = with_session(
            &self.target(),
            resolution.methods,
            HostKeyPolicy::from_default_store(),
            move |session| {
                Box::pin(async move {
                    session
                        .run_with_input(&command, Some(document.as_bytes()))
                        .await
                })
            },
        )
        .await?;

        if !output.success() {
            warn!("Remote write exited with {:?}", output.exit_code);
            return Err(GsshError::sync(format!(
                "cannot write {} on {}: {}",
                self.settings.ssh_path,
                self.settings.ssh_host,
                output.text().trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Server;

    fn settings() -> SyncConfig {
        SyncConfig {
            enabled: true,
            ssh_host: "127.0.0.1".into(),
            ssh_user: "ops".into(),
            ssh_port: 1,
            password: "pw".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pull_command_keeps_tilde_expandable() {
        assert_eq!(
            pull_command("~/.gssh/config.yaml"),
            "cat \"$HOME\"/'.gssh/config.yaml'"
        );
        assert_eq!(pull_command("/srv/gssh/list.yaml"), "cat '/srv/gssh/list.yaml'");
    }

    #[test]
    fn test_push_command() {
        assert_eq!(
            push_command("~/.gssh/config.yaml"),
            "mkdir -p \"$HOME\"/'.gssh' && cat > \"$HOME\"/'.gssh/config.yaml'"
        );
        assert_eq!(push_command("list.yaml"), "cat > 'list.yaml'");
    }

    #[test]
    fn test_hostile_path_stays_quoted() {
        assert_eq!(
            pull_command("/tmp/x'; rm -rf ~; '"),
            "cat '/tmp/x'\"'\"'; rm -rf ~; '\"'\"''"
        );
    }

    #[test]
    fn test_shared_document_omits_sync_settings() {
        let mut config = Config::default();
        config.sync.password = "sync-secret".into();
        config.add_server(Server::new("web", "web.internal", "deploy")).unwrap();

        let doc = shared_document(&config).unwrap();

        assert!(doc.contains("web.internal"));
        assert!(!doc.contains("sync-secret"));
        assert!(!doc.contains("ssh_host"));
        let back: Config = serde_yaml::from_str(&doc).unwrap();
        assert_eq!(back.servers, config.servers);
    }

    #[test]
    fn test_merge_keeps_local_sync() {
        let mut local = Config::default();
        local.sync = settings();
        local.add_server(Server::new("old", "old.internal", "ops")).unwrap();

        let mut remote = Config::default();
        remote.version = "1.1".into();
        remote.sync.ssh_host = "attacker.example".into();
        remote.add_server(Server::new("new", "new.internal", "ops")).unwrap();

        merge_pulled(&mut local, remote);

        assert_eq!(local.version, "1.1");
        assert_eq!(local.sync.ssh_host, "127.0.0.1");
        assert!(!local.sync.last_sync.is_empty());
        assert_eq!(local.servers.len(), 1);
        assert_eq!(local.servers[0].name, "new");
    }

    #[test]
    fn test_unsupported_type() {
        let mut s = settings();
        s.kind = "http".into();
        let err = SshSync::new(&s).unwrap_err();
        assert!(err.to_string().contains("unsupported sync type 'http'"));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let s = SyncConfig {
            ssh_key: "/nonexistent/gssh/sync_key".into(),
            ..Default::default()
        };
        let msg = SshSync::new(&s).unwrap_err().to_string();
        assert!(msg.contains("ssh_host"));
        assert!(msg.contains("ssh_user"));
        assert!(msg.contains("SSH key file not found"));
    }

    #[test]
    fn test_empty_key_is_not_an_identity() {
        let s = settings();
        let sync = SshSync::new(&s).unwrap();
        assert_eq!(sync.identity(), None);
        assert_eq!(sync.password(), Some("pw"));
    }

    #[tokio::test]
    async fn test_pull_surfaces_dial_error() {
        let s = settings();
        let sync = SshSync::new(&s).unwrap();
        let mut resolver = CredentialResolver::new(None, crate::ssh::auth::TerminalPrompt);

        let err = sync.pull(&mut resolver).await.unwrap_err();

        assert!(matches!(err, GsshError::Dial(_)));
    }
}
