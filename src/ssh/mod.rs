//! SSH session establishment
//!
//! Two paths share the `AuthDescriptor` shape: programmatic sessions
//! (credential resolution, library-mediated transport, one command per
//! session) and interactive logins (system `ssh` driven through its prompts,
//! then handed to the user).

pub mod auth;
pub mod command;
pub mod config;
pub mod connection;
pub mod handler;
pub mod interactive;
pub mod sanitize;

// Re-exports
pub use auth::{CredentialAttempt, CredentialResolver, CredentialSource, Resolution};
pub use command::CommandOutput;
pub use config::{AuthDescriptor, AuthMode};
pub use connection::{with_session, ProgrammaticSession, SessionTarget};
pub use handler::{HostKeyPolicy, SshHandler};
pub use interactive::{login, Backend, SessionOutcome};
pub use sanitize::{escape_for_script, escape_for_shell, quote_remote_path};
