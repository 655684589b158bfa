//! PTY (pseudo-terminal) handling for interactive SSH sessions.
//!
//! Opening the shell channel is transport plumbing; [`attach_terminal`] is the
//! local side used by the CLI to wire the channel to stdin/stdout.

use russh::client::Handle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DockError, Result};
use crate::ssh::client::ClientHandler;
use crate::ssh::transport::ShellStream;

/// Terminal geometry negotiated when a shell channel opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtySize {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
    pub pix_width: u32,
    pub pix_height: u32,
}

impl Default for PtySize {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            cols: 80,
            rows: 24,
            pix_width: 0,
            pix_height: 0,
        }
    }
}

impl PtySize {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self {
            cols,
            rows,
            ..Default::default()
        }
    }

    /// Size of the local terminal, falling back to 80x24.
    pub fn from_local_terminal() -> Self {
        let (cols, rows) = get_terminal_size();
        Self::new(cols as u32, rows as u32)
    }
}

/// Open a shell channel with a PTY and return it as a byte stream.
pub async fn open_shell(session: &Handle<ClientHandler>, pty: &PtySize) -> Result<ShellStream> {
    let channel = session
        .channel_open_session()
        .await
        .map_err(|e| DockError::ssh("Failed to open shell channel", e))?;

    channel
        .request_pty(
            true,
            &pty.term,
            pty.cols,
            pty.rows,
            pty.pix_width,
            pty.pix_height,
            &[], // No special modes
        )
        .await
        .map_err(|e| DockError::ssh("Failed to request PTY", e))?;

    channel
        .request_shell(true)
        .await
        .map_err(|e| DockError::ssh("Failed to request shell", e))?;

    Ok(ShellStream::new(channel.into_stream()))
}

/// Forward local stdin/stdout to `shell` until either side closes.
///
/// The local terminal is put in raw mode for the duration.
pub async fn attach_terminal(mut shell: ShellStream) -> Result<()> {
    let _raw_guard = setup_raw_terminal()?;

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    let mut input_buf = [0u8; 1024];
    let mut output_buf = [0u8; 4096];

    loop {
        tokio::select! {
            result = stdin.read(&mut input_buf) => {
                match result {
                    Ok(0) => break, // EOF
                    Ok(n) => {
                        shell.write_all(&input_buf[..n]).await?;
                    }
                    Err(e) => {
                        tracing::warn!("stdin read error: {}", e);
                        break;
                    }
                }
            }

            result = shell.read(&mut output_buf) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        stdout.write_all(&output_buf[..n]).await?;
                        stdout.flush().await.ok();
                    }
                    Err(e) => {
                        tracing::debug!("shell channel read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Get current terminal size.
fn get_terminal_size() -> (u16, u16) {
    crossterm::terminal::size().unwrap_or((80, 24))
}

/// Set up raw terminal mode.
fn setup_raw_terminal() -> Result<RawModeGuard> {
    crossterm::terminal::enable_raw_mode()
        .map_err(|e| DockError::Channel(format!("Failed to enable raw mode: {}", e)))?;

    Ok(RawModeGuard)
}

/// RAII guard to restore terminal mode on drop.
struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}
