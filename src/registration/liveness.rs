//! Liveness watch for registration owners.
//!
//! A [`PeerHandle`] stands for the remote party that owns a registration.
//! When it is killed (process exit, dropped connection, whatever the
//! embedding layer observes) the watch task runs the same release path as
//! an explicit `release_role`.

use std::sync::Weak;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::lifecycle;
use super::table::RegistrationId;
use crate::client::ClientCore;
use crate::notify::LossReason;

/// Death signal for a registration owner.
///
/// Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct PeerHandle {
    token: CancellationToken,
}

impl PeerHandle {
    /// A live handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that the peer is gone.
    pub fn kill(&self) {
        self.token.cancel();
    }

    pub fn is_dead(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the peer is gone.
    pub async fn died(&self) {
        self.token.cancelled().await
    }
}

/// Watch `peer` on behalf of registration `id` until `unbind` fires.
pub(crate) fn spawn_watch(
    core: Weak<ClientCore>,
    id: RegistrationId,
    peer: PeerHandle,
    unbind: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = unbind.cancelled() => {
                tracing::trace!("Liveness watch for {} unbound", id);
            }
            _ = peer.died() => {
                let Some(core) = core.upgrade() else { return };
                tracing::info!("Owner of {} died, releasing", id);
                if let Err(e) = lifecycle::release(&core, id, LossReason::PeerDied).await {
                    tracing::debug!("Release after peer death of {}: {}", id, e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_peer_handle_clones_share_signal() {
        let peer = PeerHandle::new();
        let clone = peer.clone();
        assert!(!clone.is_dead());
        peer.kill();
        assert!(clone.is_dead());
        tokio::time::timeout(Duration::from_millis(100), clone.died())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unbind_stops_watch() {
        let peer = PeerHandle::new();
        let unbind = CancellationToken::new();
        let watch = spawn_watch(Weak::new(), RegistrationId(1), peer.clone(), unbind.clone());

        unbind.cancel();
        watch.await.unwrap();
        assert!(!peer.is_dead());
    }

    #[tokio::test]
    async fn test_death_without_client_is_noop() {
        let peer = PeerHandle::new();
        let watch = spawn_watch(
            Weak::new(),
            RegistrationId(1),
            peer.clone(),
            CancellationToken::new(),
        );
        peer.kill();
        watch.await.unwrap();
    }
}
