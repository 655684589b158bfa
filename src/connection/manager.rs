//! The connection state machine.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                           Connecting --err--> Failed --connect--> Connecting
//! Connected --disconnect / probe failure--> Disconnected / Failed
//! ```
//!
//! All state sits behind one mutex that is never held across an `.await`, so
//! every transition is a single critical section and pollers never see a
//! half-applied change. Each connect attempt is tagged with a fresh epoch; an
//! attempt only publishes its session while it is still the current attempt,
//! which is how a late reconnect loses to an explicit disconnect.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::event::{ConnectionEvent, EVENT_CAPACITY};
use super::reconnect::ReconnectPolicy;
use super::status::{ConnectionResult, ConnectionStatus};
use crate::error::{DockError, Result};
use crate::ssh::{Authenticator, PtySize, RemoteEntry, ServerDescriptor, Session, ShellStream};

/// Default time a liveness probe may take.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where an interactive shell should land once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellTarget {
    /// Container the shell enters, for logs.
    pub container: String,
    /// Written to the shell, followed by a newline, right after it opens.
    pub entry_command: String,
}

impl ShellTarget {
    pub fn new(container: impl Into<String>, entry_command: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            entry_command: entry_command.into(),
        }
    }
}

/// The link to the remote host. A reconnect token cannot live in
/// `Disconnected`, so "reconnecting after the user disconnected" cannot be
/// expressed.
enum Link {
    Disconnected,
    Connecting {
        attempt: u64,
        reconnect: Option<u64>,
    },
    Connected {
        session: Arc<Session>,
        reconnect: Option<u64>,
    },
    Failed {
        /// Session whose loss caused the failure; `None` when a connect
        /// attempt failed.
        lost: Option<u64>,
        reconnect: Option<u64>,
    },
}

impl Link {
    fn status(&self) -> ConnectionStatus {
        match self {
            Link::Disconnected => ConnectionStatus::Disconnected,
            Link::Connecting { .. } => ConnectionStatus::Connecting,
            Link::Connected { .. } => ConnectionStatus::Connected,
            Link::Failed { .. } => ConnectionStatus::Failed,
        }
    }

    fn reconnect_token(&self) -> Option<u64> {
        match self {
            Link::Connecting { reconnect, .. }
            | Link::Connected { reconnect, .. }
            | Link::Failed { reconnect, .. } => *reconnect,
            Link::Disconnected => None,
        }
    }

    fn session(&self) -> Option<&Arc<Session>> {
        match self {
            Link::Connected { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Replace the link, handing back the session it held, if any.
    fn replace(&mut self, next: Link) -> Option<Arc<Session>> {
        match std::mem::replace(self, next) {
            Link::Connected { session, .. } => Some(session),
            _ => None,
        }
    }
}

struct ManagerState {
    link: Link,
    server: Option<ServerDescriptor>,
    /// Set on the first successful connect and never cleared.
    ever_connected: bool,
    epoch: u64,
    reconnect_seq: u64,
    last_error: Option<String>,
}

/// Owns the single session to the current server.
///
/// Construct one per application and share it with `Arc`.
pub struct ConnectionManager {
    authenticator: Authenticator,
    probe_timeout: Duration,
    state: Mutex<ManagerState>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    pub fn new(authenticator: Authenticator) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            authenticator,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            state: Mutex::new(ManagerState {
                link: Link::Disconnected,
                server: None,
                ever_connected: false,
                epoch: 0,
                reconnect_seq: 0,
                last_error: None,
            }),
            events,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_status(&self, from: ConnectionStatus, to: ConnectionStatus) {
        if from != to {
            debug!("Connection status {} -> {}", from, to);
            self.publish(ConnectionEvent::StatusChanged { from, to });
        }
    }

    /// Receive status, server and reconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().link.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn current_server(&self) -> Option<ServerDescriptor> {
        self.state().server.clone()
    }

    pub fn ever_connected(&self) -> bool {
        self.state().ever_connected
    }

    pub fn is_reconnecting(&self) -> bool {
        self.state().link.reconnect_token().is_some()
    }

    /// Identity of the live session, if connected.
    pub fn session_id(&self) -> Option<u64> {
        self.state().link.session().map(|s| s.id())
    }

    /// Message of the most recent connect or probe failure.
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Whether a failed command may trigger a transparent reconnect.
    ///
    /// A reconnect is never attempted before the first successful connect:
    /// a bad first attempt must surface its error instead of retrying.
    pub fn reconnect_allowed(&self) -> bool {
        let state = self.state();
        state.link.reconnect_token().is_none() && state.ever_connected && state.server.is_some()
    }

    /// Connect to `descriptor`, replacing any existing session.
    pub async fn connect(&self, descriptor: ServerDescriptor) -> ConnectionResult {
        match self.establish(descriptor, None).await {
            Ok(_) => ConnectionResult::connected(),
            Err(e) => ConnectionResult::failed(e.to_string(), self.status()),
        }
    }

    /// Switch to `descriptor`. Always reconnects, even for the current server,
    /// so a dead transport is never kept.
    pub async fn switch_server(&self, descriptor: ServerDescriptor) -> ConnectionResult {
        let previous = self.state().server.clone();
        match &previous {
            Some(current) if current.same_server(&descriptor) => {
                info!("Reopening connection to {}", descriptor.id);
            }
            Some(current) => info!("Switching server {} -> {}", current.id, descriptor.id),
            None => info!("Switching to server {}", descriptor.id),
        }
        self.publish(ConnectionEvent::ServerChanged {
            previous: previous.map(|s| s.id),
            current: descriptor.id.clone(),
        });
        self.connect(descriptor).await
    }

    /// Close the session, if any. Idempotent.
    pub async fn disconnect(&self) {
        let (old, from) = {
            let mut state = self.state();
            let from = state.link.status();
            state.epoch += 1;
            (state.link.replace(Link::Disconnected), from)
        };

        if let Some(session) = old {
            info!("Disconnecting session {}", session.id());
            session.close().await;
        }
        self.publish_status(from, ConnectionStatus::Disconnected);
    }

    /// Open a session for `descriptor` and install it if this attempt is
    /// still current when it completes. `reconnect` carries the token of the
    /// reconnect sequence driving this attempt.
    pub(crate) async fn establish(
        &self,
        descriptor: ServerDescriptor,
        reconnect: Option<u64>,
    ) -> Result<Arc<Session>> {
        let (attempt, old, from) = {
            let mut state = self.state();
            let from = state.link.status();
            state.epoch += 1;
            let attempt = state.epoch;
            state.server = Some(descriptor.clone());
            let old = state.link.replace(Link::Connecting { attempt, reconnect });
            (attempt, old, from)
        };
        self.publish_status(from, ConnectionStatus::Connecting);

        if let Some(old) = old {
            debug!("Closing session {} before reconnecting", old.id());
            old.close().await;
        }

        info!("Connecting to {} (attempt {})", descriptor.target(), attempt);
        let opened = Session::open(&self.authenticator, &descriptor, attempt).await;

        let outcome = {
            let mut state = self.state();
            let current = matches!(
                state.link,
                Link::Connecting { attempt: a, .. } if a == attempt
            );
            if !current {
                Err(opened)
            } else {
                let reconnect = state.link.reconnect_token();
                Ok(match opened {
                    Ok(session) => {
                        let session = Arc::new(session);
                        state.link = Link::Connected {
                            session: session.clone(),
                            reconnect,
                        };
                        state.ever_connected = true;
                        state.last_error = None;
                        Ok(session)
                    }
                    Err(e) => {
                        state.link = Link::Failed {
                            lost: None,
                            reconnect: None,
                        };
                        state.last_error = Some(e.to_string());
                        Err(e)
                    }
                })
            }
        };

        match outcome {
            Ok(Ok(session)) => {
                info!("Connected to {} (session {})", descriptor.target(), session.id());
                self.publish_status(ConnectionStatus::Connecting, ConnectionStatus::Connected);
                Ok(session)
            }
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", descriptor.target(), e);
                self.publish_status(ConnectionStatus::Connecting, ConnectionStatus::Failed);
                Err(e)
            }
            Err(opened) => {
                debug!("Connect attempt {} superseded", attempt);
                if let Ok(session) = opened {
                    session.close().await;
                }
                Err(DockError::Superseded)
            }
        }
    }

    /// The live session, or `NotConnected` without doing any I/O.
    pub fn connected_session(&self) -> Result<Arc<Session>> {
        self.state()
            .link
            .session()
            .cloned()
            .ok_or(DockError::NotConnected)
    }

    /// Run `command` on the current server and return its output.
    ///
    /// A connection-level failure triggers at most one reconnect followed by
    /// one replay of the command; anything else is returned as is.
    pub async fn execute_command(&self, command: &str) -> Result<String> {
        let session = self.connected_session()?;

        match session.exec(command).await {
            Ok(output) => Ok(output),
            Err(e) if e.is_connection_class() => {
                match ReconnectPolicy::try_begin(self, session.id()) {
                    Some(policy) => {
                        warn!(
                            "Command failed on a lost connection ({}), reconnecting to {}",
                            e,
                            policy.server().target()
                        );
                        policy
                            .wrap(|session| async move { session.exec(command).await })
                            .await
                    }
                    None => {
                        debug!("Reconnect not allowed, surfacing: {}", e);
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Probe the live session. Never errors.
    ///
    /// A failed probe marks a connected manager as failed; any other state
    /// (notably an in-progress connect) is left alone.
    pub async fn test_connection(&self) -> bool {
        let session = match self.state().link.session() {
            Some(session) => session.clone(),
            None => return false,
        };

        if session.probe(self.probe_timeout).await {
            return true;
        }

        let dead = {
            let mut state = self.state();
            let same_session = state
                .link
                .session()
                .is_some_and(|current| current.id() == session.id());
            if same_session {
                state.last_error = Some("Liveness probe failed".to_string());
                let reconnect = state.link.reconnect_token();
                state.link.replace(Link::Failed {
                    lost: Some(session.id()),
                    reconnect,
                })
            } else {
                None
            }
        };

        if let Some(dead) = dead {
            warn!("Liveness probe failed for session {}", dead.id());
            dead.close().await;
            self.publish_status(ConnectionStatus::Connected, ConnectionStatus::Failed);
        }
        false
    }

    /// Open a shell on the current server, optionally dropping into a target
    /// (e.g. a container) by writing its entry command first.
    pub async fn open_interactive_session(
        &self,
        pty: &PtySize,
        target: Option<&ShellTarget>,
    ) -> Result<ShellStream> {
        let session = self.connected_session()?;
        let mut shell = session.shell(pty).await?;

        if let Some(target) = target {
            debug!("Entering {} via shell", target.container);
            shell
                .write_all(format!("{}\n", target.entry_command).as_bytes())
                .await?;
            shell.flush().await?;
        }
        Ok(shell)
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let files = self.connected_session()?.files().await?;
        files.list_dir(path).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let files = self.connected_session()?.files().await?;
        files.read_file(path).await
    }

    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let files = self.connected_session()?.files().await?;
        files.write_file(path, data).await
    }

    /// Claim the reconnect slot for a failure seen on session `failed_session`.
    ///
    /// Checks the gate and marks the reconnect in one critical section.
    /// Allowed while the failed session is still the connected one, or after
    /// its loss was already detected (e.g. by a liveness probe). Refused once
    /// the user disconnected or a newer attempt replaced the session.
    /// Returns the token and the server to reconnect to.
    pub(crate) fn claim_reconnect(&self, failed_session: u64) -> Option<(u64, ServerDescriptor)> {
        let mut state = self.state();
        if !state.ever_connected || state.link.reconnect_token().is_some() {
            return None;
        }
        let server = state.server.clone()?;

        state.reconnect_seq += 1;
        let token = state.reconnect_seq;
        match &mut state.link {
            Link::Connected { session, reconnect } if session.id() == failed_session => {
                *reconnect = Some(token);
                Some((token, server))
            }
            Link::Failed { lost, reconnect } if *lost == Some(failed_session) => {
                *reconnect = Some(token);
                Some((token, server))
            }
            // Someone already replaced or dropped the failed session
            _ => None,
        }
    }

    /// Release the reconnect slot if `token` still holds it.
    pub(crate) fn release_reconnect(&self, token: u64) {
        let mut state = self.state();
        match &mut state.link {
            Link::Connecting { reconnect, .. }
            | Link::Connected { reconnect, .. }
            | Link::Failed { reconnect, .. }
                if *reconnect == Some(token) =>
            {
                *reconnect = None;
            }
            _ => {}
        }
    }

    pub(crate) fn notify_reconnected(&self, server_id: &str, session_id: u64) {
        self.publish(ConnectionEvent::Reconnected {
            server_id: server_id.to_string(),
            session_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, ConnectionError};
    use crate::ssh::{Credential, Transport};
    use crate::testing::MockConnector;
    use tokio::io::AsyncReadExt;

    fn server(id: &str) -> ServerDescriptor {
        ServerDescriptor::new(id, "10.0.0.5", "root", Credential::Password("secret".into()))
    }

    fn manager() -> (Arc<MockConnector>, ConnectionManager) {
        let connector = MockConnector::new();
        let manager = ConnectionManager::new(Authenticator::new(connector.clone()));
        (connector, manager)
    }

    #[tokio::test]
    async fn test_connect_success() {
        let (connector, manager) = manager();
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);

        let result = manager.connect(server("a")).await;

        assert_eq!(result, ConnectionResult::connected());
        assert!(manager.is_connected());
        assert!(manager.ever_connected());
        assert_eq!(manager.current_server().unwrap().id, "a");
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_twice_leaves_one_live_session() {
        let (connector, manager) = manager();

        manager.connect(server("a")).await;
        let first = manager.session_id();
        manager.connect(server("a")).await;

        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.live_transports(), 1);
        assert_ne!(manager.session_id(), first);
        assert!(connector.transports()[0].is_closed());
    }

    #[tokio::test]
    async fn test_connect_failure_is_returned_not_raised() {
        let (connector, manager) = manager();
        connector.fail_next_connect(AuthError::Rejected("bad password".into()).into());

        let result = manager.connect(server("a")).await;

        assert!(!result.success);
        assert_eq!(result.status, ConnectionStatus::Failed);
        assert!(result.error.unwrap().contains("bad password"));
        assert_eq!(manager.status(), ConnectionStatus::Failed);
        assert!(manager.session_id().is_none());
        assert!(!manager.is_reconnecting());
        assert!(manager.last_error().is_some());
    }

    #[tokio::test]
    async fn test_missing_credential_never_reaches_network() {
        let (connector, manager) = manager();
        let descriptor =
            ServerDescriptor::new("a", "h", "root", Credential::Password(String::new()));

        let result = manager.connect(descriptor).await;

        assert!(!result.success);
        assert_eq!(connector.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (connector, manager) = manager();

        // Before ever connecting
        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);

        manager.connect(server("a")).await;
        for _ in 0..3 {
            manager.disconnect().await;
            assert_eq!(manager.status(), ConnectionStatus::Disconnected);
            assert!(manager.session_id().is_none());
            assert!(!manager.is_reconnecting());
        }
        assert_eq!(connector.live_transports(), 0);
        assert_eq!(connector.transports()[0].close_count(), 1);
    }

    #[tokio::test]
    async fn test_ever_connected_is_sticky() {
        let (connector, manager) = manager();
        assert!(!manager.ever_connected());

        connector.fail_next_connect(ConnectionError::Refused("nope".into()).into());
        manager.connect(server("a")).await;
        assert!(!manager.ever_connected());

        manager.connect(server("a")).await;
        assert!(manager.ever_connected());

        manager.disconnect().await;
        assert!(manager.ever_connected());

        connector.fail_next_connect(ConnectionError::Timeout("slow".into()).into());
        manager.connect(server("a")).await;
        assert_eq!(manager.status(), ConnectionStatus::Failed);
        assert!(manager.ever_connected());
    }

    #[tokio::test]
    async fn test_execute_before_connect_is_not_connected() {
        let (connector, manager) = manager();

        let err = manager.execute_command("docker ps").await.unwrap_err();

        assert!(matches!(err, DockError::NotConnected));
        assert_eq!(connector.connect_count(), 0);
        assert!(connector.transports().is_empty());
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let (connector, manager) = manager();
        connector.respond("docker ps", "CONTAINER ID\n");
        manager.connect(server("a")).await;

        let out = manager.execute_command("docker ps").await.unwrap();

        assert_eq!(out, "CONTAINER ID\n");
    }

    #[tokio::test]
    async fn test_command_output_mentioning_session_is_not_an_error() {
        let (connector, manager) = manager();
        connector.respond("cat notes", "session closed by timeout\n");
        manager.connect(server("a")).await;

        let out = manager.execute_command("cat notes").await.unwrap();

        assert_eq!(out, "session closed by timeout\n");
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_non_connection_error_is_not_retried() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        connector
            .last_transport()
            .unwrap()
            .fail_exec(DockError::Channel("permission denied".into()));

        let err = manager.execute_command("docker ps").await.unwrap_err();

        assert!(matches!(err, DockError::Channel(_)));
        assert_eq!(connector.connect_count(), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_lost_connection_reconnects_once_and_replays() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        let first = connector.last_transport().unwrap();
        first.fail_exec(ConnectionError::Closed("Broken pipe".into()).into());
        let mut events = manager.subscribe();

        let out = manager.execute_command("uptime").await.unwrap();

        assert_eq!(out, "ok\n");
        assert_eq!(connector.connect_count(), 2);
        assert!(first.is_closed());
        let second = connector.last_transport().unwrap();
        assert_eq!(second.commands(), vec!["uptime".to_string()]);
        assert!(manager.is_connected());
        assert!(!manager.is_reconnecting());

        let mut saw_reconnected = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, ConnectionEvent::Reconnected { .. }) {
                saw_reconnected = true;
            }
        }
        assert!(saw_reconnected);
    }

    #[tokio::test]
    async fn test_failed_reconnect_surfaces_error() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        connector
            .last_transport()
            .unwrap()
            .fail_exec(ConnectionError::Closed("socket closed".into()).into());
        connector.fail_next_connect(ConnectionError::Unreachable("no route".into()).into());

        let err = manager.execute_command("uptime").await.unwrap_err();

        assert!(err.to_string().contains("no route"));
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(manager.status(), ConnectionStatus::Failed);
        assert!(!manager.is_reconnecting());
        assert!(manager.ever_connected());
    }

    #[tokio::test]
    async fn test_only_one_retry_when_replay_also_fails() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        connector
            .last_transport()
            .unwrap()
            .fail_exec(ConnectionError::Closed("closed".into()).into());
        connector.fail_next_transport_exec(ConnectionError::Closed("closed again".into()).into());

        let err = manager.execute_command("uptime").await.unwrap_err();

        assert!(err.to_string().contains("closed again"));
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.last_transport().unwrap().exec_count(), 1);
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_concurrent_failures_start_one_reconnect() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        let first = connector.last_transport().unwrap();
        first.set_exec_delay(Some(Duration::from_millis(20)));
        first.kill();
        connector.set_connect_delay(Some(Duration::from_millis(20)));

        let (a, b) = tokio::join!(
            manager.execute_command("docker ps"),
            manager.execute_command("docker images")
        );

        // One command rode the reconnect, the other surfaced its failure
        assert_eq!(connector.connect_count(), 2);
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_no_reconnect_before_first_success() {
        let (connector, manager) = manager();
        connector.fail_next_connect(ConnectionError::Refused("refused".into()).into());
        manager.connect(server("a")).await;

        assert!(!manager.reconnect_allowed());
        let err = manager.execute_command("docker ps").await.unwrap_err();

        assert!(matches!(err, DockError::NotConnected));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_gate_without_history() {
        let (connector, manager) = manager();
        let transport = crate::testing::MockTransport::new();
        transport.fail_exec(ConnectionError::Closed("session lost".into()).into());
        let session = Arc::new(Session::from_transport(1, "a", transport.clone()));
        {
            let mut state = manager.state();
            state.server = Some(server("a"));
            state.link = Link::Connected {
                session,
                reconnect: None,
            };
        }

        let err = manager.execute_command("docker ps").await.unwrap_err();

        assert!(err.is_connection_class());
        assert_eq!(connector.connect_count(), 0);
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_switch_to_same_server_reopens() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        let before = manager.session_id().unwrap();
        let mut events = manager.subscribe();

        let result = manager.switch_server(server("a")).await;

        assert!(result.success);
        let after = manager.session_id().unwrap();
        assert_ne!(before, after);
        assert_eq!(connector.live_transports(), 1);
        assert_eq!(
            events.try_recv().unwrap(),
            ConnectionEvent::ServerChanged {
                previous: Some("a".into()),
                current: "a".into()
            }
        );
    }

    #[tokio::test]
    async fn test_switch_to_other_server() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;

        manager.switch_server(server("b")).await;

        assert_eq!(manager.current_server().unwrap().id, "b");
        assert_eq!(connector.last_transport().unwrap().server_id(), "b");
        assert_eq!(connector.live_transports(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_wins() {
        let connector = MockConnector::new();
        connector.set_connect_delay(Some(Duration::from_millis(30)));
        let manager = Arc::new(ConnectionManager::new(Authenticator::new(connector.clone())));

        let m = manager.clone();
        let pending = tokio::spawn(async move { m.connect(server("a")).await });
        while manager.status() != ConnectionStatus::Connecting {
            tokio::task::yield_now().await;
        }
        manager.disconnect().await;

        let result = pending.await.unwrap();

        assert!(!result.success);
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.live_transports(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_during_reconnect_is_not_undone() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        connector
            .last_transport()
            .unwrap()
            .fail_exec(ConnectionError::Closed("closed".into()).into());
        connector.set_connect_delay(Some(Duration::from_millis(30)));
        let manager = Arc::new(manager);

        let m = manager.clone();
        let pending = tokio::spawn(async move { m.execute_command("uptime").await });
        while !manager.is_reconnecting() {
            tokio::task::yield_now().await;
        }
        manager.disconnect().await;

        let result = pending.await.unwrap();

        assert!(matches!(result, Err(DockError::Superseded)));
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(!manager.is_reconnecting());
        assert_eq!(connector.live_transports(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_marks_failed() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        assert!(manager.test_connection().await);

        connector.last_transport().unwrap().kill();
        assert!(!manager.test_connection().await);

        assert_eq!(manager.status(), ConnectionStatus::Failed);
        assert!(manager.ever_connected());
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_command_reconnects_after_liveness_check_failed() {
        let connector = MockConnector::new();
        let manager = Arc::new(
            ConnectionManager::new(Authenticator::new(connector.clone()))
                .with_probe_timeout(Duration::from_millis(10)),
        );
        manager.connect(server("a")).await;
        let first = connector.last_transport().unwrap();
        first.set_exec_delay(Some(Duration::from_millis(60)));
        first.fail_exec(ConnectionError::Closed("broken pipe".into()).into());

        let m = manager.clone();
        let pending = tokio::spawn(async move { m.execute_command("docker ps").await });
        while first.exec_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!manager.test_connection().await);
        assert_eq!(manager.status(), ConnectionStatus::Failed);
        assert!(manager.reconnect_allowed());

        let out = pending.await.unwrap().unwrap();

        assert_eq!(out, "ok\n");
        assert_eq!(connector.connect_count(), 2);
        assert!(manager.is_connected());
        assert!(!manager.is_reconnecting());
        assert_eq!(
            connector.last_transport().unwrap().commands(),
            vec!["docker ps".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_connect_does_not_adopt_old_command_failures() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        let old_session = manager.session_id().unwrap();
        connector.fail_next_connect(ConnectionError::Refused("refused".into()).into());
        manager.connect(server("b")).await;
        assert_eq!(manager.status(), ConnectionStatus::Failed);

        assert!(ReconnectPolicy::try_begin(&manager, old_session).is_none());
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_probe_does_not_clobber_connecting() {
        let connector = MockConnector::new();
        connector.set_connect_delay(Some(Duration::from_millis(30)));
        let manager = Arc::new(ConnectionManager::new(Authenticator::new(connector.clone())));

        let m = manager.clone();
        let pending = tokio::spawn(async move { m.connect(server("a")).await });
        while manager.status() != ConnectionStatus::Connecting {
            tokio::task::yield_now().await;
        }

        assert!(!manager.test_connection().await);
        assert_eq!(manager.status(), ConnectionStatus::Connecting);

        assert!(pending.await.unwrap().success);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn test_interactive_session_writes_entry_command() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        let target = ShellTarget::new("web", "docker exec -it web sh");

        let shell = manager
            .open_interactive_session(&PtySize::new(120, 40), Some(&target))
            .await
            .unwrap();
        drop(shell);

        let mut remote = connector.last_transport().unwrap().take_shell_remote().unwrap();
        let mut written = String::new();
        remote.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "docker exec -it web sh\n");
    }

    #[tokio::test]
    async fn test_interactive_session_requires_connection() {
        let (_connector, manager) = manager();
        let err = manager
            .open_interactive_session(&PtySize::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DockError::NotConnected));
    }

    #[tokio::test]
    async fn test_file_operations_delegate_to_file_channel() {
        let (connector, manager) = manager();
        manager.connect(server("a")).await;
        let transport = connector.last_transport().unwrap();
        transport.put_file("/srv/app/compose.yml", "services: {}\n");

        manager.write_file("/srv/app/.env", b"A=1\n").await.unwrap();
        let listing = manager.list_files("/srv/app").await.unwrap();
        let content = manager.read_file("/srv/app/compose.yml").await.unwrap();

        let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".env", "compose.yml"]);
        assert_eq!(content, b"services: {}\n");
        assert_eq!(transport.file("/srv/app/.env").unwrap(), b"A=1\n");
        assert_eq!(transport.file_open_count(), 3);
    }

    #[tokio::test]
    async fn test_status_events_follow_transitions() {
        let (connector, manager) = manager();
        let mut events = manager.subscribe();

        manager.connect(server("a")).await;
        connector.fail_next_connect(ConnectionError::Timeout("t".into()).into());
        manager.connect(server("a")).await;
        manager.disconnect().await;

        let mut seen = Vec::new();
        while let Ok(ConnectionEvent::StatusChanged { to, .. }) = events.try_recv() {
            seen.push(to);
        }
        assert_eq!(
            seen,
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Failed,
                ConnectionStatus::Disconnected,
            ]
        );
    }
}
