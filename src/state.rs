//! Connection readiness signal.
//!
//! A single-slot flag over a watch channel: `false` until the server accepts
//! a peer, `true` afterwards. Any number of handles may wait concurrently.
//! The flag never auto-resets on peer disconnect; only a new accept attempt
//! resets it.

use std::time::Duration;

use tokio::sync::watch;

/// Cloneable handle for observing whether a peer connection is established.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    rx: watch::Receiver<bool>,
}

impl ConnectionState {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Current value, no waiting.
    pub fn is_connected(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspends until a peer connection is established or `timeout` elapses,
    /// returning whether it happened within the window. Pure wait —
    /// acceptance is driven by `ChannelServer::accept`, not by this call.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.rx.clone();
        match tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await {
            Ok(Ok(_)) => true,
            // Server dropped while still disconnected.
            Ok(Err(_)) => false,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_current_value_without_waiting() {
        let (tx, rx) = watch::channel(false);
        let state = ConnectionState::new(rx);
        assert!(!state.is_connected());
        tx.send_replace(true);
        assert!(state.is_connected());
    }

    #[tokio::test]
    async fn wait_times_out_while_disconnected() {
        let (_tx, rx) = watch::channel(false);
        let state = ConnectionState::new(rx);
        assert!(!state.wait_connected(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn all_waiters_unblock_on_connect() {
        let (tx, rx) = watch::channel(false);
        let state = ConnectionState::new(rx);

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let state = state.clone();
            waiters.push(tokio::spawn(async move {
                state.wait_connected(Duration::from_secs(5)).await
            }));
        }

        tx.send_replace(true);
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test]
    async fn wait_is_false_when_server_dropped_disconnected() {
        let (tx, rx) = watch::channel(false);
        let state = ConnectionState::new(rx);
        drop(tx);
        assert!(!state.wait_connected(Duration::from_secs(5)).await);
    }
}
