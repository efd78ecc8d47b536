//! Command dispatch
//!
//! Resolves host profiles from the store and hands them to the session
//! engine. Every command returns the process exit code.

use std::io::Write;
use std::process::ExitCode;

use tracing::{info, warn};

use crate::config::{
    parse_max_chars, sanitize_password, AddArgs, Args, Command, InitArgs, ListArgs, DEFAULT_PORT,
    DEFAULT_SYNC_PATH,
};
use crate::error::{GsshError, Result};
use crate::ssh::auth::CredentialResolver;
use crate::ssh::connection::with_session;
use crate::ssh::handler::HostKeyPolicy;
use crate::ssh::interactive::{login, Backend};
use crate::ssh::sanitize::{sanitize_command, validate_argv_token};
use crate::store::{AuthRecord, Config, Server, Store};
use crate::sync::{merge_pulled, SshSync};

/// Run the parsed command line
pub async fn run(args: Args) -> Result<ExitCode> {
    let store = Store::open(args.config.clone())?;

    match args.resolved_command() {
        Command::List(list) => {
            let config = load_with_auto_sync(&store).await?;
            list_servers(&config, &list);
            Ok(ExitCode::SUCCESS)
        }
        Command::Connect { name } => connect(&store, &name, args.driver).await,
        Command::Exec {
            name,
            max_chars,
            command,
        } => exec(&store, &name, max_chars.as_deref(), &command).await,
        Command::Add(add) => {
            add_server(&store, add)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Remove { name } => {
            remove_server(&store, &name)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Init(init) => {
            init_store(&store, &init)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Pull => {
            let mut config = store.load()?;
            pull_into(&mut config).await?;
            store.save(&config)?;
            println!("Pulled {} server(s)", config.servers.len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Push => {
            let config = store.load()?;
            let sync = SshSync::new(&config.sync)?;
            sync.push(&mut CredentialResolver::from_env(), &config).await?;
            println!("Pushed {} server(s)", config.servers.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the store, pulling first when auto-sync is on.
/// A failed pull is only a warning.
async fn load_with_auto_sync(store: &Store) -> Result<Config> {
    let mut config = store.load()?;
    if !config.sync.auto_sync {
        return Ok(config);
    }

    match pull_into(&mut config).await {
        Ok(()) => store.save(&config)?,
        Err(e) => {
            warn!("Auto-sync failed: {}", e);
            eprintln!("warning: auto-sync failed: {}", e);
        }
    }
    Ok(config)
}

async fn pull_into(config: &mut Config) -> Result<()> {
    let remote = {
        let sync = SshSync::new(&config.sync)?;
        sync.pull(&mut CredentialResolver::from_env()).await?
    };
    merge_pulled(config, remote);
    Ok(())
}

async fn connect(store: &Store, name: &str, backend: Backend) -> Result<ExitCode> {
    let mut config = load_with_auto_sync(store).await?;
    let server = config.get_server(name)?;
    let target = server.target();
    let descriptor = server.descriptor();

    login(&target, &descriptor, backend).await?;

    // the session may have run for hours; merge into the current file
    let mut latest = store.load().unwrap_or_else(|_| std::mem::take(&mut config));
    if let Ok(server) = latest.get_server_mut(name) {
        server.touch();
        store.save(&latest)?;
    }
    info!("Session with {} ended", name);
    Ok(ExitCode::SUCCESS)
}

async fn exec(
    store: &Store,
    name: &str,
    max_chars: Option<&str>,
    words: &[String],
) -> Result<ExitCode> {
    let command = sanitize_command(&words.join(" "), parse_max_chars(max_chars))?;
    let config = store.load()?;
    let server = config.get_server(name)?;
    let descriptor = server.descriptor();

    let resolution =
        CredentialResolver::from_env().resolve(descriptor.identity(), descriptor.auto_password())?;

    let output = with_session(
        &server.target(),
        resolution.methods,
        HostKeyPolicy::from_default_store(),
        move |session| Box::pin(async move { session.run(&command).await }),
    )
    .await?;

    let mut stdout = std::io::stdout();
    stdout.write_all(&output.combined)?;
    stdout.flush()?;

    Ok(match output.exit_code {
        Some(0) | None => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1).max(1)),
    })
}

fn add_server(store: &Store, add: AddArgs) -> Result<()> {
    validate_argv_token("host", &add.host)?;
    validate_argv_token("user", &add.user)?;

    let mut config = store.load()?;
    let mut server = Server::new(add.name, add.host, add.user);
    server.port = add.port;
    server.description = add.description;
    server.tags = add.tags;
    server.group = add.group.unwrap_or_default();
    server.auth = AuthRecord {
        kind: add.auth,
        password: sanitize_password(add.password).unwrap_or_default(),
        identity_file: add.key.unwrap_or_default(),
    };

    let name = server.name.clone();
    config.add_server(server)?;
    store.save(&config)?;
    println!("Added server '{}'", name);
    Ok(())
}

fn remove_server(store: &Store, name: &str) -> Result<()> {
    let mut config = store.load()?;
    config.remove_server(name)?;
    store.save(&config)?;
    println!("Removed server '{}'", name);
    Ok(())
}

fn init_store(store: &Store, init: &InitArgs) -> Result<()> {
    if store.exists() && !init.force {
        return Err(GsshError::config(format!(
            "{} already exists (use --force to overwrite)",
            store.path().display()
        )));
    }
    init.validate()?;

    let mut config = Config::default();
    if init.wants_sync() {
        let sync = &mut config.sync;
        sync.enabled = true;
        sync.ssh_host = init.sync_host.clone().unwrap_or_default();
        sync.ssh_user = init.sync_user.clone().unwrap_or_default();
        sync.ssh_port = init.sync_port.unwrap_or(DEFAULT_PORT);
        sync.ssh_path = init
            .sync_path
            .clone()
            .unwrap_or_else(|| DEFAULT_SYNC_PATH.to_string());
        sync.ssh_key = init.sync_key.clone().unwrap_or_default();
        sync.password = sanitize_password(init.sync_password.clone()).unwrap_or_default();
    }
    config.sync.auto_sync = init.auto_sync;

    store.save(&config)?;
    println!("Initialized {}", store.path().display());
    Ok(())
}

fn list_servers(config: &Config, list: &ListArgs) {
    let mut servers = config.filter(&list.tags, list.group.as_deref());
    if let Some(query) = list.search.as_deref() {
        let hits = config.search(query);
        servers.retain(|s| hits.iter().any(|h| h.name == s.name));
    }

    if servers.is_empty() {
        if config.servers.is_empty() {
            println!("No servers. Add one with `gssh add <NAME> --host <HOST> --user <USER>`.");
        } else {
            print!("{}", no_match_hint(config));
        }
        return;
    }
    print!("{}", render_table(&servers));
}

/// Known groups and tags, shown when a filter matched nothing
fn no_match_hint(config: &Config) -> String {
    let join = |values: Vec<String>| {
        if values.is_empty() {
            "-".to_string()
        } else {
            values.join(", ")
        }
    };
    format!(
        "No servers match. Groups: {}. Tags: {}.\n",
        join(config.groups()),
        join(config.tags())
    )
}

/// Render servers as an aligned table
pub fn render_table(servers: &[&Server]) -> String {
    const HEADER: [&str; 6] = ["NAME", "ADDRESS", "USER", "AUTH", "GROUP", "LAST USED"];

    let rows: Vec<[String; 6]> = servers
        .iter()
        .map(|s| {
            [
                s.name.clone(),
                s.address(),
                s.user.clone(),
                s.descriptor().mode.to_string(),
                s.group.clone(),
                if s.last_used.is_empty() {
                    "-".to_string()
                } else {
                    s.last_used.clone()
                },
            ]
        })
        .collect();

    let mut widths = HEADER.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: [&str; 6]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_row(HEADER);
    for row in &rows {
        push_row(row.each_ref().map(String::as_str));
    }
    out
}
