//! Native backend: the terminal client runs on a pseudo-terminal
//!
//! A blocking reader thread forwards pty output into a tokio channel so the
//! login loop can apply its deadline. After hand-off the local terminal is put
//! in raw mode and bytes are copied verbatim in both directions until the
//! client exits.

use std::io::{IsTerminal, Read, Write};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::terminal;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::driver::TerminalClient;
use crate::error::{GsshError, Result};

/// How often the local window size is compared against the pty's
const RESIZE_POLL: Duration = Duration::from_millis(250);

const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// A terminal client spawned on a pseudo-terminal
pub struct PtyClient {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    child: Box<dyn Child + Send + Sync>,
    size: (u16, u16),
}

impl PtyClient {
    /// Spawn `program` with `args` on a new pty sized like the local terminal
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        let size = local_size();
        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| GsshError::spawn(format!("cannot open pty: {}", e)))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| GsshError::spawn(format!("cannot start {}: {}", program, e)))?;
        // the child holds its own handle; ours would keep the pty open after it exits
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| GsshError::spawn(format!("cannot open pty writer: {}", e)))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| GsshError::spawn(format!("cannot open pty reader: {}", e)))?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if output_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        debug!("Spawned {} on a {}x{} pty", program, size.0, size.1);
        Ok(Self {
            master: pair.master,
            writer,
            output_rx,
            child,
            size,
        })
    }

    fn write_input(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn sync_size(&mut self) {
        let size = local_size();
        if size == self.size {
            return;
        }
        match self.master.resize(pty_size(size)) {
            Ok(()) => self.size = size,
            Err(e) => debug!("pty resize failed: {}", e),
        }
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

#[async_trait]
impl TerminalClient for PtyClient {
    async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        self.output_rx.recv().await
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_input(bytes)
    }

    fn display(&mut self, bytes: &[u8]) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(bytes).and_then(|_| stdout.flush());
    }

    async fn interact(&mut self) -> Result<()> {
        let _raw = RawModeGuard::enter()?;

        let (input_tx, mut input_rx) = mpsc::unbounded_channel();
        thread::spawn(move || {
            let mut stdin = std::io::stdin();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if input_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut stdout = std::io::stdout();
        let mut resize_tick = tokio::time::interval(RESIZE_POLL);
        let mut stdin_open = true;

        loop {
            tokio::select! {
                chunk = self.output_rx.recv() => match chunk {
                    Some(bytes) => {
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                    None => break,
                },
                input = input_rx.recv(), if stdin_open => match input {
                    Some(bytes) => self.write_input(&bytes)?,
                    None => stdin_open = false,
                },
                _ = resize_tick.tick() => self.sync_size(),
            }
        }

        match self.child.try_wait() {
            Ok(Some(status)) => debug!("Terminal client exited: {:?}", status),
            Ok(None) => debug!("Terminal output closed while client still running"),
            Err(e) => debug!("Cannot read terminal client status: {}", e),
        }
        Ok(())
    }

    async fn terminate(&mut self) {
        if self.is_running() {
            if let Err(e) = self.child.kill() {
                warn!("Failed to stop terminal client: {}", e);
            }
        }
    }
}

impl Drop for PtyClient {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
        }
    }
}

/// Raw mode on the local terminal for the guard's lifetime.
/// A no-op when stdin is not a terminal.
struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    fn enter() -> Result<Self> {
        if !std::io::stdin().is_terminal() {
            return Ok(Self { active: false });
        }
        terminal::enable_raw_mode()?;
        Ok(Self { active: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Local terminal size as (cols, rows)
fn local_size() -> (u16, u16) {
    match terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => (cols, rows),
        _ => FALLBACK_SIZE,
    }
}

fn pty_size((cols, rows): (u16, u16)) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
