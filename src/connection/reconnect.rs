//! One-shot transparent reconnect.
//!
//! A command that fails because the transport went away gets exactly one
//! reconnect followed by exactly one replay. The reconnect slot is claimed
//! atomically, so concurrent failures on the same session start at most one
//! reconnect; the losers surface their own errors.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use super::manager::ConnectionManager;
use crate::error::Result;
use crate::ssh::{ServerDescriptor, Session};

/// Releases the reconnect slot when dropped, whatever path the reconnect
/// took. A slot that has since been taken over by a newer token is left
/// alone.
struct ReconnectGuard<'a> {
    manager: &'a ConnectionManager,
    token: u64,
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_reconnect(self.token);
    }
}

/// A claimed reconnect for one failed operation.
pub struct ReconnectPolicy<'a> {
    guard: ReconnectGuard<'a>,
    server: ServerDescriptor,
}

impl<'a> ReconnectPolicy<'a> {
    /// Claim the reconnect slot for a failure observed on `failed_session`.
    ///
    /// Returns `None` when a reconnect is not allowed: nothing ever connected,
    /// no server is set, another reconnect is running, the user disconnected,
    /// or a newer attempt replaced the failed session.
    pub fn try_begin(manager: &'a ConnectionManager, failed_session: u64) -> Option<Self> {
        let (token, server) = manager.claim_reconnect(failed_session)?;
        debug!(
            "Claimed reconnect {} for {} (failed session {})",
            token, server.id, failed_session
        );
        Some(Self {
            guard: ReconnectGuard { manager, token },
            server,
        })
    }

    pub fn server(&self) -> &ServerDescriptor {
        &self.server
    }

    /// Reconnect, then run `op` once on the new session.
    ///
    /// A failed reconnect is returned without running `op`; a failed replay
    /// is returned without reconnecting again.
    pub async fn wrap<T, F, Fut>(self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let manager = self.guard.manager;
        let session = manager
            .establish(self.server.clone(), Some(self.guard.token))
            .await?;

        info!(
            "Reconnected to {} (session {})",
            self.server.target(),
            session.id()
        );
        manager.notify_reconnected(&self.server.id, session.id());

        let result = op(session).await;
        drop(self.guard);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionStatus;
    use crate::error::{ConnectionError, DockError};
    use crate::ssh::{Authenticator, Credential};
    use crate::testing::MockConnector;

    fn server() -> ServerDescriptor {
        ServerDescriptor::new("a", "10.0.0.5", "root", Credential::Password("pw".into()))
    }

    async fn connected() -> (Arc<MockConnector>, ConnectionManager) {
        let connector = MockConnector::new();
        let manager = ConnectionManager::new(Authenticator::new(connector.clone()));
        manager.connect(server()).await;
        (connector, manager)
    }

    #[tokio::test]
    async fn test_try_begin_is_exclusive() {
        let (_connector, manager) = connected().await;
        let session = manager.session_id().unwrap();

        let first = ReconnectPolicy::try_begin(&manager, session);
        assert!(first.is_some());
        assert!(manager.is_reconnecting());
        assert!(!manager.reconnect_allowed());
        assert!(ReconnectPolicy::try_begin(&manager, session).is_none());

        drop(first);
        assert!(!manager.is_reconnecting());
        assert!(ReconnectPolicy::try_begin(&manager, session).is_some());
    }

    #[tokio::test]
    async fn test_try_begin_refuses_stale_session() {
        let (_connector, manager) = connected().await;
        let stale = manager.session_id().unwrap();
        manager.connect(server()).await;

        assert!(ReconnectPolicy::try_begin(&manager, stale).is_none());
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_try_begin_refuses_after_disconnect() {
        let (_connector, manager) = connected().await;
        let session = manager.session_id().unwrap();
        manager.disconnect().await;

        assert!(manager.reconnect_allowed());
        assert!(ReconnectPolicy::try_begin(&manager, session).is_none());
    }

    #[tokio::test]
    async fn test_try_begin_after_detected_loss() {
        let (connector, manager) = connected().await;
        let session = manager.session_id().unwrap();
        connector.last_transport().unwrap().kill();
        assert!(!manager.test_connection().await);
        assert_eq!(manager.status(), ConnectionStatus::Failed);

        let policy = ReconnectPolicy::try_begin(&manager, session).unwrap();
        assert_eq!(policy.server().id, "a");
        assert!(manager.is_reconnecting());
        assert!(ReconnectPolicy::try_begin(&manager, session).is_none());

        drop(policy);
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_wrap_success_clears_flag() {
        let (connector, manager) = connected().await;
        let session = manager.session_id().unwrap();
        let policy = ReconnectPolicy::try_begin(&manager, session).unwrap();

        let out = policy
            .wrap(|s| async move { s.exec("hostname").await })
            .await
            .unwrap();

        assert_eq!(out, "ok\n");
        assert_eq!(connector.connect_count(), 2);
        assert!(manager.is_connected());
        assert!(!manager.is_reconnecting());
        assert_ne!(manager.session_id(), Some(session));
    }

    #[tokio::test]
    async fn test_wrap_reconnect_failure_skips_op() {
        let (connector, manager) = connected().await;
        let session = manager.session_id().unwrap();
        connector.fail_next_connect(ConnectionError::Refused("refused".into()).into());
        let policy = ReconnectPolicy::try_begin(&manager, session).unwrap();

        let mut ran = false;
        let result = policy
            .wrap(|_| {
                ran = true;
                async { Ok(()) }
            })
            .await;

        assert!(result.is_err());
        assert!(!ran);
        assert_eq!(manager.status(), ConnectionStatus::Failed);
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_wrap_op_failure_clears_flag() {
        let (_connector, manager) = connected().await;
        let session = manager.session_id().unwrap();
        let policy = ReconnectPolicy::try_begin(&manager, session).unwrap();

        let result: Result<()> = policy
            .wrap(|_| async { Err(DockError::Channel("exit 1".into())) })
            .await;

        assert!(matches!(result, Err(DockError::Channel(_))));
        assert!(manager.is_connected());
        assert!(!manager.is_reconnecting());
    }

    #[tokio::test]
    async fn test_dropped_policy_releases_slot() {
        let (_connector, manager) = connected().await;
        let session = manager.session_id().unwrap();

        {
            let _policy = ReconnectPolicy::try_begin(&manager, session).unwrap();
            assert!(manager.is_reconnecting());
        }

        assert!(!manager.is_reconnecting());
    }
}
