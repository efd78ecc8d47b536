//! Configuration and CLI argument parsing for gssh

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{GsshError, Result};
use crate::ssh::interactive::Backend;

/// Connection timeout for programmatic sessions in seconds
pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

/// Timeout for one remote command on a programmatic session in seconds
pub const COMMAND_TIMEOUT_SECS: u64 = 60;

/// Ceiling on reaching a shell prompt during interactive login in seconds
pub const LOGIN_TIMEOUT_SECS: u64 = 30;

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Default max characters for a one-shot command (None = unlimited)
pub const DEFAULT_MAX_CHARS: Option<usize> = Some(4096);

/// Default remote location of the synced host list
pub const DEFAULT_SYNC_PATH: &str = "~/.gssh/config.yaml";

/// gssh CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "gssh")]
#[command(version)]
#[command(about = "Named SSH host profiles with one-command login")]
pub struct Args {
    /// Server to log in to (same as `gssh connect <NAME>`)
    #[arg(value_name = "NAME")]
    pub server: Option<String>,

    /// Host profile store
    #[arg(long, global = true, env = "GSSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interactive login backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Native, env = "GSSH_DRIVER")]
    pub driver: Backend,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List servers
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Log in to a server
    Connect {
        /// Server name
        name: String,
    },

    /// Run one command on a server and print its output
    Exec {
        /// Server name
        name: String,

        /// Maximum command length.
        /// Use "none", "0", or negative value to disable limit.
        #[arg(long = "max-chars")]
        max_chars: Option<String>,

        /// Command and arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Add a server
    Add(AddArgs),

    /// Remove a server
    #[command(visible_alias = "rm")]
    Remove {
        /// Server name
        name: String,
    },

    /// Create the host profile store
    Init(InitArgs),

    /// Replace the local server list with the remote copy
    Pull,

    /// Upload the local server list
    Push,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only servers carrying this tag (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Only servers in this group
    #[arg(short, long)]
    pub group: Option<String>,

    /// Case-insensitive search over name, host, user, description, group and tags
    #[arg(short, long)]
    pub search: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AddArgs {
    /// Server name
    pub name: String,

    /// Host name or address
    #[arg(long)]
    pub host: String,

    /// Login user
    #[arg(long)]
    pub user: String,

    /// SSH port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Authentication method: key, password or auto
    #[arg(long, default_value = "auto")]
    pub auth: String,

    /// Path to SSH private key file
    #[arg(long)]
    pub key: Option<String>,

    /// Account password
    #[arg(long, env = "GSSH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Free-form description
    #[arg(long, default_value = "")]
    pub description: String,

    /// Tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Group name
    #[arg(long)]
    pub group: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct InitArgs {
    /// Overwrite an existing store
    #[arg(long)]
    pub force: bool,

    /// Host holding the shared server list
    #[arg(long)]
    pub sync_host: Option<String>,

    /// User on the sync host
    #[arg(long)]
    pub sync_user: Option<String>,

    /// SSH port of the sync host
    #[arg(long)]
    pub sync_port: Option<u16>,

    /// Path of the server list on the sync host
    #[arg(long)]
    pub sync_path: Option<String>,

    /// Private key for the sync host
    #[arg(long)]
    pub sync_key: Option<String>,

    /// Password for the sync host
    #[arg(long, env = "GSSH_SYNC_PASSWORD", hide_env_values = true)]
    pub sync_password: Option<String>,

    /// Pull before `list` and `connect`
    #[arg(long)]
    pub auto_sync: bool,
}

impl Args {
    /// Subcommand to run; a bare name means `connect`, nothing means `list`
    pub fn resolved_command(&self) -> Command {
        match (&self.command, &self.server) {
            (Some(command), _) => command.clone(),
            (None, Some(name)) => Command::Connect { name: name.clone() },
            (None, None) => Command::List(ListArgs::default()),
        }
    }

    /// Log filter directive for the `-v` count
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl InitArgs {
    /// Whether any sync option was given
    pub fn wants_sync(&self) -> bool {
        self.sync_host.is_some() || self.sync_user.is_some()
    }

    /// Validate sync options
    pub fn validate(&self) -> Result<()> {
        if !self.wants_sync() {
            return Ok(());
        }

        let mut errors = Vec::new();

        if self.sync_host.as_deref().unwrap_or_default().is_empty() {
            errors.push("Missing required --sync-host".to_string());
        }

        if self.sync_user.as_deref().unwrap_or_default().is_empty() {
            errors.push("Missing required --sync-user".to_string());
        }

        // Must have either password or key
        if self.sync_password.as_deref().unwrap_or_default().is_empty()
            && self.sync_key.as_deref().unwrap_or_default().is_empty()
        {
            errors.push("Must provide either --sync-password or --sync-key".to_string());
        }

        if !errors.is_empty() {
            return Err(GsshError::Config(format!(
                "Configuration error:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// Parse max_chars argument
///
/// - "none" (case-insensitive) → None (unlimited)
/// - "0" or negative → None (unlimited)
/// - positive integer → Some(value)
/// - None (not provided) → DEFAULT_MAX_CHARS
pub fn parse_max_chars(value: Option<&str>) -> Option<usize> {
    match value {
        None => DEFAULT_MAX_CHARS,
        Some(s) => {
            if s.eq_ignore_ascii_case("none") {
                return None;
            }

            match s.parse::<i64>() {
                Ok(n) if n <= 0 => None,
                Ok(n) => Some(n as usize),
                Err(_) => DEFAULT_MAX_CHARS,
            }
        }
    }
}

/// Sanitize a password: return None if empty
pub fn sanitize_password(password: Option<String>) -> Option<String> {
    password.filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("gssh").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_bare_invocation_lists() {
        assert!(matches!(parse(&[]).resolved_command(), Command::List(_)));
    }

    #[test]
    fn test_bare_name_connects() {
        match parse(&["db-01"]).resolved_command() {
            Command::Connect { name } => assert_eq!(name, "db-01"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_wins_over_name() {
        assert!(matches!(parse(&["pull"]).resolved_command(), Command::Pull));
    }

    #[test]
    fn test_exec_keeps_hyphenated_arguments() {
        match parse(&["exec", "db-01", "ls", "-la", "/var/log"]).resolved_command() {
            Command::Exec { name, command, .. } => {
                assert_eq!(name, "db-01");
                assert_eq!(command, vec!["ls", "-la", "/var/log"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_list_filters() {
        match parse(&["list", "-t", "prod", "-t", "db", "-g", "backend"]).resolved_command() {
            Command::List(list) => {
                assert_eq!(list.tags, vec!["prod", "db"]);
                assert_eq!(list.group.as_deref(), Some("backend"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_driver_flag() {
        assert_eq!(parse(&["--driver", "expect", "db-01"]).driver, Backend::Expect);
        assert_eq!(parse(&["db-01"]).driver, Backend::Native);
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&[]).log_level(), "warn");
        assert_eq!(parse(&["-v"]).log_level(), "info");
        assert_eq!(parse(&["-vv"]).log_level(), "debug");
        assert_eq!(parse(&["-vvvv"]).log_level(), "trace");
    }

    #[test]
    fn test_add_defaults() {
        match parse(&["add", "web", "--host", "10.0.0.5", "--user", "deploy"]).resolved_command() {
            Command::Add(add) => {
                assert_eq!(add.port, DEFAULT_PORT);
                assert_eq!(add.auth, "auto");
                assert!(add.key.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_init_validation() {
        assert!(InitArgs::default().validate().is_ok());

        let missing_credential = InitArgs {
            sync_host: Some("sync.example.com".into()),
            sync_user: Some("ops".into()),
            ..Default::default()
        };
        let err = missing_credential.validate().unwrap_err().to_string();
        assert!(err.contains("--sync-password or --sync-key"));

        let missing_user = InitArgs {
            sync_host: Some("sync.example.com".into()),
            sync_key: Some("~/.ssh/id_ed25519".into()),
            ..Default::default()
        };
        assert!(missing_user.validate().unwrap_err().to_string().contains("--sync-user"));
    }

    #[test]
    fn test_init_validation_treats_empty_values_as_missing() {
        let blank = InitArgs {
            sync_host: Some(String::new()),
            sync_user: Some("ops".into()),
            sync_password: Some(String::new()),
            ..Default::default()
        };
        let err = blank.validate().unwrap_err().to_string();
        assert!(err.contains("--sync-host"));
        assert!(err.contains("--sync-password or --sync-key"));
        assert!(!err.contains("--sync-user"));
    }

    #[test]
    fn test_parse_max_chars_none_string() {
        assert_eq!(parse_max_chars(Some("none")), None);
        assert_eq!(parse_max_chars(Some("NONE")), None);
    }

    #[test]
    fn test_parse_max_chars_zero_or_negative() {
        assert_eq!(parse_max_chars(Some("0")), None);
        assert_eq!(parse_max_chars(Some("-1")), None);
    }

    #[test]
    fn test_parse_max_chars_positive_or_invalid() {
        assert_eq!(parse_max_chars(Some("500")), Some(500));
        assert_eq!(parse_max_chars(Some("abc")), DEFAULT_MAX_CHARS);
        assert_eq!(parse_max_chars(None), DEFAULT_MAX_CHARS);
    }

    #[test]
    fn test_sanitize_password() {
        assert_eq!(
            sanitize_password(Some("secret".to_string())),
            Some("secret".to_string())
        );
        assert_eq!(sanitize_password(Some("".to_string())), None);
        assert_eq!(sanitize_password(None), None);
    }
}
