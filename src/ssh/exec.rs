//! Remote command execution.
//!
//! Each command gets its own exec channel, so concurrent commands over one
//! connection do not interfere.

use russh::client::Handle;
use russh::ChannelMsg;

use crate::error::{ConnectionError, DockError, Result};
use crate::ssh::client::ClientHandler;

/// Execute a command on the remote host (non-interactive).
///
/// Returns stdout and stderr interleaved in arrival order. The exit status is
/// not reported; callers interpret the text.
pub async fn exec_command(session: &Handle<ClientHandler>, command: &str) -> Result<Vec<u8>> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| DockError::ssh("Failed to open exec channel", e))?;

    channel
        .exec(true, command.as_bytes())
        .await
        .map_err(|e| DockError::ssh("Failed to execute command", e))?;

    let mut output = ExecOutput::default();
    while let Some(msg) = channel.wait().await {
        if output.push(msg) {
            break;
        }
    }

    output.finish()
}

/// Output gathered from one exec channel.
#[derive(Default)]
struct ExecOutput {
    bytes: Vec<u8>,
    /// The remote side reported completion (exit status, EOF or close).
    finished: bool,
}

impl ExecOutput {
    /// Append channel data. Returns `true` once the channel is done.
    fn push(&mut self, msg: ChannelMsg) -> bool {
        match msg {
            ChannelMsg::Data { data } => {
                self.bytes.extend_from_slice(&data);
                false
            }
            ChannelMsg::ExtendedData { data, ext } => {
                if ext == 1 {
                    self.bytes.extend_from_slice(&data);
                }
                false
            }
            ChannelMsg::ExitStatus { exit_status } => {
                tracing::trace!("Remote command exited with {}", exit_status);
                self.finished = true;
                false
            }
            ChannelMsg::Eof | ChannelMsg::Close => {
                self.finished = true;
                true
            }
            _ => false,
        }
    }

    /// The collected bytes, or `Closed` when the channel went away before the
    /// command completed.
    fn finish(self) -> Result<Vec<u8>> {
        if !self.finished {
            return Err(ConnectionError::Closed(format!(
                "exec channel dropped after {} bytes without completing",
                self.bytes.len()
            ))
            .into());
        }
        Ok(self.bytes)
    }
}

/// Decode command output as UTF-8, replacing invalid sequences.
pub fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
