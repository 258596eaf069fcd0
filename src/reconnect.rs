//! Reconnect registry (C2): maps a durable token to the match slot
//! waiting for it to reattach.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::core::error::BeerError;
use crate::net::Transport;

/// Outcome of [`ReconnectRegistry::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A transport attached before the timeout elapsed.
    Attached,
    /// The timeout elapsed with no reattach.
    Expired,
}

/// One pending reconnect slot: a place for [`ReconnectRegistry::attach`]
/// to deposit a reattaching transport, and an event the waiting session
/// can block on.
struct PendingSlot {
    notify: Notify,
    transport: Mutex<Option<Arc<Transport>>>,
}

/// Process-wide `token -> pending slot` map.
///
/// At most one pending registration exists per token at any instant;
/// `register` enforces that, and `attach` atomically consumes the entry
/// so a second concurrent `attach` for the same token always loses the
/// race cleanly (the "Collision rule").
#[derive(Default)]
pub struct ReconnectRegistry {
    pending: Mutex<HashMap<String, Arc<PendingSlot>>>,
}

impl ReconnectRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as awaiting reattach. Fails with
    /// [`BeerError::TokenInUse`] if a registration for this token is
    /// already pending.
    pub async fn register(&self, token: &str) -> Result<(), BeerError> {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(token) {
            return Err(BeerError::TokenInUse(token.to_string()));
        }
        pending.insert(
            token.to_string(),
            Arc::new(PendingSlot {
                notify: Notify::new(),
                transport: Mutex::new(None),
            }),
        );
        Ok(())
    }

    /// Whether `token` currently has a pending registration. Used by the
    /// lobby's accept loop to decide whether an incoming handshake should
    /// be routed through [`ReconnectRegistry::attach`] at all.
    pub async fn contains(&self, token: &str) -> bool {
        self.pending.lock().await.contains_key(token)
    }

    /// Bind `new_transport` to the pending slot for `token`, signal the
    /// waiter, and atomically remove the registration. Fails with
    /// [`BeerError::UnknownToken`] if no registration is pending, which
    /// is also what a second, racing `attach` for the same token observes,
    /// since the first caller already consumed the entry (the
    /// "Collision rule").
    pub async fn attach(&self, token: &str, new_transport: Arc<Transport>) -> Result<(), BeerError> {
        let slot = {
            let mut pending = self.pending.lock().await;
            pending.remove(token)
        };
        match slot {
            Some(slot) => {
                *slot.transport.lock().await = Some(new_transport);
                slot.notify.notify_one();
                Ok(())
            }
            None => Err(BeerError::UnknownToken(token.to_string())),
        }
    }

    /// Block up to `timeout` for `token`'s slot to be attached.
    pub async fn wait(&self, token: &str, timeout: Duration) -> WaitOutcome {
        let slot = {
            let pending = self.pending.lock().await;
            pending.get(token).cloned()
        };
        let Some(slot) = slot else {
            // Already attached (and thus removed) between registration
            // and this call, or never registered; either way there's
            // nothing left to wait on.
            return WaitOutcome::Attached;
        };

        let notified = slot.notify.notified();
        if tokio::time::timeout(timeout, notified).await.is_ok() {
            WaitOutcome::Attached
        } else {
            self.cancel(token).await;
            WaitOutcome::Expired
        }
    }

    /// Take the transport deposited by a successful `attach`, if any.
    /// Returns `None` if called on a slot that never attached (e.g. after
    /// `wait` returned `Expired`).
    pub async fn take_attached(&self, token: &str) -> Option<Arc<Transport>> {
        let slot = {
            let pending = self.pending.lock().await;
            pending.get(token).cloned()
        };
        match slot {
            Some(slot) => slot.transport.lock().await.take(),
            None => None,
        }
    }

    /// Remove `token`'s registration without signalling anyone (used to
    /// clean up on cancellation, e.g. a match terminating while a
    /// `wait` is still outstanding).
    pub async fn cancel(&self, token: &str) {
        self.pending.lock().await.remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn dummy_transport() -> Arc<Transport> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accept, connect) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (stream, _) = accept.unwrap();
        let _keep_alive = connect.unwrap();
        Arc::new(Transport::new(stream, None).unwrap())
    }

    #[tokio::test]
    async fn register_then_attach_wakes_waiter() {
        let registry = Arc::new(ReconnectRegistry::new());
        registry.register("PID1").await.unwrap();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait("PID1", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let transport = dummy_transport().await;
        registry.attach("PID1", transport).await.unwrap();

        assert_eq!(waiter.await.unwrap(), WaitOutcome::Attached);
        assert!(registry.take_attached("PID1").await.is_some());
    }

    #[tokio::test]
    async fn second_register_is_rejected() {
        let registry = ReconnectRegistry::new();
        registry.register("PID1").await.unwrap();
        assert!(matches!(
            registry.register("PID1").await.unwrap_err(),
            BeerError::TokenInUse(_)
        ));
    }

    #[tokio::test]
    async fn attach_without_registration_is_unknown_token() {
        let registry = ReconnectRegistry::new();
        let transport = dummy_transport().await;
        assert!(matches!(
            registry.attach("ghost", transport).await.unwrap_err(),
            BeerError::UnknownToken(_)
        ));
    }

    #[tokio::test]
    async fn wait_without_attach_expires() {
        let registry = ReconnectRegistry::new();
        registry.register("PID1").await.unwrap();
        let outcome = registry.wait("PID1", Duration::from_millis(20)).await;
        assert_eq!(outcome, WaitOutcome::Expired);
        assert!(!registry.contains("PID1").await);
    }

    #[tokio::test]
    async fn only_one_of_two_concurrent_attaches_binds() {
        let registry = Arc::new(ReconnectRegistry::new());
        registry.register("PID1").await.unwrap();

        let t1 = dummy_transport().await;
        let t2 = dummy_transport().await;

        let r1 = registry.attach("PID1", t1).await;
        let r2 = registry.attach("PID1", t2).await;

        assert!(r1.is_ok() ^ r2.is_ok(), "exactly one attach should bind");
    }
}
