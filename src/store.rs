//! Host profile store
//!
//! Named server records and sync settings persisted as YAML at
//! `~/.gssh/config.yaml`. The previous file is copied to
//! `config.yaml.backup` before every save.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DEFAULT_PORT, DEFAULT_SYNC_PATH};
use crate::error::{GsshError, Result};
use crate::ssh::config::AuthDescriptor;
use crate::ssh::connection::SessionTarget;

/// Current store format version
pub const STORE_VERSION: &str = "1.0";

fn default_version() -> String {
    STORE_VERSION.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_auth_type() -> String {
    "auto".to_string()
}

fn default_sync_type() -> String {
    "ssh".to_string()
}

fn default_sync_path() -> String {
    DEFAULT_SYNC_PATH.to_string()
}

/// Current local time as RFC 3339
pub fn now_rfc3339() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Whole store document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub servers: Vec<Server>,
}

/// Where the shared server list lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Transport; only `ssh` is supported
    #[serde(rename = "type", default = "default_sync_type")]
    pub kind: String,

    #[serde(default)]
    pub ssh_host: String,

    #[serde(default)]
    pub ssh_user: String,

    #[serde(default = "default_port")]
    pub ssh_port: u16,

    #[serde(default = "default_sync_path")]
    pub ssh_path: String,

    #[serde(default)]
    pub ssh_key: String,

    #[serde(default)]
    pub password: String,

    /// Pull before `list` and `connect`
    #[serde(default)]
    pub auto_sync: bool,

    #[serde(default)]
    pub last_sync: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: default_sync_type(),
            ssh_host: String::new(),
            ssh_user: String::new(),
            ssh_port: DEFAULT_PORT,
            ssh_path: default_sync_path(),
            ssh_key: String::new(),
            password: String::new(),
            auto_sync: false,
            last_sync: String::new(),
        }
    }
}

/// Stored credentials of one server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// `auto`, `password` or `key`
    #[serde(rename = "type", default = "default_auth_type")]
    pub kind: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub identity_file: String,
}

impl Default for AuthRecord {
    fn default() -> Self {
        Self {
            kind: default_auth_type(),
            password: String::new(),
            identity_file: String::new(),
        }
    }
}

impl AuthRecord {
    /// Descriptor for this record; unknown types fall back per `AuthMode::parse`
    pub fn descriptor(&self) -> AuthDescriptor {
        AuthDescriptor::from_parts(
            &self.kind,
            Some(self.identity_file.as_str()),
            Some(self.password.as_str()),
        )
    }
}

impl std::fmt::Debug for AuthRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRecord")
            .field("kind", &self.kind)
            .field("identity_file", &self.identity_file)
            .field("password", &(!self.password.is_empty()).then_some("<redacted>"))
            .finish()
    }
}

/// One named host profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub name: String,

    pub hostname: String,

    pub user: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub group: String,

    #[serde(default)]
    pub auth: AuthRecord,

    #[serde(default)]
    pub last_used: String,

    #[serde(default)]
    pub created_at: String,
}

impl Server {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            user: user.into(),
            port: DEFAULT_PORT,
            description: String::new(),
            tags: Vec::new(),
            group: String::new(),
            auth: AuthRecord::default(),
            last_used: String::new(),
            created_at: String::new(),
        }
    }

    /// `host`, or `host:port` for non-default ports
    pub fn address(&self) -> String {
        if self.port != 0 && self.port != DEFAULT_PORT {
            format!("{}:{}", self.hostname, self.port)
        } else {
            self.hostname.clone()
        }
    }

    pub fn target(&self) -> SessionTarget {
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        SessionTarget::new(&self.hostname, &self.user, port)
    }

    pub fn descriptor(&self) -> AuthDescriptor {
        self.auth.descriptor()
    }

    /// Record a successful login
    pub fn touch(&mut self) {
        self.last_used = now_rfc3339();
    }

    fn matches(&self, needle: &str) -> bool {
        let fields = [&self.name, &self.hostname, &self.user, &self.description, &self.group];
        fields
            .into_iter()
            .chain(self.tags.iter())
            .any(|field| field.to_lowercase().contains(needle))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            sync: SyncConfig::default(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Add a server; names are unique
    pub fn add_server(&mut self, mut server: Server) -> Result<()> {
        if self.servers.iter().any(|s| s.name == server.name) {
            return Err(GsshError::invalid_params(format!(
                "Server '{}' already exists",
                server.name
            )));
        }

        if server.port == 0 {
            server.port = DEFAULT_PORT;
        }
        if server.auth.kind.is_empty() {
            server.auth.kind = default_auth_type();
        }
        if server.created_at.is_empty() {
            server.created_at = now_rfc3339();
        }

        self.servers.push(server);
        Ok(())
    }

    pub fn get_server(&self, name: &str) -> Result<&Server> {
        self.servers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| GsshError::ServerNotFound(name.to_string()))
    }

    pub fn get_server_mut(&mut self, name: &str) -> Result<&mut Server> {
        self.servers
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| GsshError::ServerNotFound(name.to_string()))
    }

    pub fn remove_server(&mut self, name: &str) -> Result<Server> {
        let idx = self
            .servers
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| GsshError::ServerNotFound(name.to_string()))?;
        Ok(self.servers.remove(idx))
    }

    /// Servers in `group` (when given) carrying any of `tags` (when given)
    pub fn filter(&self, tags: &[String], group: Option<&str>) -> Vec<&Server> {
        self.servers
            .iter()
            .filter(|s| group.is_none_or(|g| g.is_empty() || s.group == g))
            .filter(|s| tags.is_empty() || s.tags.iter().any(|t| tags.contains(t)))
            .collect()
    }

    /// Case-insensitive substring search
    pub fn search(&self, query: &str) -> Vec<&Server> {
        let needle = query.trim().to_lowercase();
        self.servers
            .iter()
            .filter(|s| needle.is_empty() || s.matches(&needle))
            .collect()
    }

    /// Distinct non-empty groups, sorted
    pub fn groups(&self) -> Vec<String> {
        self.servers
            .iter()
            .filter(|s| !s.group.is_empty())
            .map(|s| s.group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct tags, sorted
    pub fn tags(&self) -> Vec<String> {
        self.servers
            .iter()
            .flat_map(|s| s.tags.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// On-disk location of the store
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.gssh/config.yaml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".gssh").join("config.yaml"))
            .ok_or_else(|| GsshError::config("cannot determine home directory"))
    }

    /// Store at `path`, or at the default location
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Ok(Self::new(path)),
            None => Ok(Self::new(Self::default_path()?)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the store, creating a default one when the file is absent
    pub fn load(&self) -> Result<Config> {
        if !self.exists() {
            info!("Creating default config at {}", self.path.display());
            let config = Config::default();
            self.save(&config)?;
            return Ok(config);
        }

        let text = fs::read_to_string(&self.path)?;
        let mut config: Config = serde_yaml::from_str(&text).map_err(|e| {
            GsshError::config(format!("cannot parse {}: {}", self.path.display(), e))
        })?;
        if config.version.is_empty() {
            config.version = default_version();
        }
        debug!("Loaded {} server(s) from {}", config.servers.len(), self.path.display());
        Ok(config)
    }

    /// Save the store, keeping the previous file as a backup
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        if self.exists() {
            write_private(&self.backup_path(), &fs::read(&self.path)?)?;
        }

        let text = serde_yaml::to_string(config)?;
        write_private(&self.path, text.as_bytes())?;
        debug!("Saved {} server(s) to {}", config.servers.len(), self.path.display());
        Ok(())
    }
}

/// Write a file readable only by the owner; it holds passwords
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // the creation mode does not apply to a file that already exists
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    Ok(())
}
