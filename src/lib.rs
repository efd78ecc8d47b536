//! gssh - named SSH host profiles with one-command login
//!
//! This crate stores named remote-host profiles and opens a terminal session to
//! one with a single command, resolving credentials automatically.
//!
//! # Features
//!
//! - Interactive login through the system `ssh`, answering host-key and
//!   password prompts per profile and handing the terminal over once a shell
//!   prompt is seen
//! - Credential resolution (agent, identity file, password) for programmatic
//!   sessions
//! - One-shot remote commands (`gssh exec`)
//! - Server list sync to and from a shared SSH host
//!
//! # Authentication modes
//!
//! - `key` - identity file only; a stored password is never sent automatically
//! - `auto` - identity file first, password as fallback
//! - `password` - password only; the identity file is ignored
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! gssh add db-01 --host 10.0.0.12 --user ops --auth password --password secret
//! gssh db-01
//! gssh exec db-01 uptime
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod ssh;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use config::{Args, Command};
pub use error::{GsshError, Result};
pub use ssh::{
    escape_for_script, escape_for_shell, login, AuthDescriptor, AuthMode, Backend, CommandOutput,
    CredentialResolver, ProgrammaticSession, SessionOutcome, SessionTarget,
};
pub use store::{Config, Server, Store};
