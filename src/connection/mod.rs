//! Connection lifecycle: one session to the current server, its observable
//! status, and the one-shot reconnect that hides transient transport loss.

mod event;
mod manager;
mod reconnect;
mod status;

pub use event::{ConnectionEvent, EVENT_CAPACITY};
pub use manager::{ConnectionManager, ShellTarget, DEFAULT_PROBE_TIMEOUT};
pub use reconnect::ReconnectPolicy;
pub use status::{ConnectionResult, ConnectionStatus};
