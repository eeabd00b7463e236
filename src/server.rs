//! Server transport: hosts an ephemeral loopback port and accepts one peer.
//!
//! Flow:
//! 1. `bind` — listener on 127.0.0.1:0, OS-assigned port read back
//! 2. host reports the port to whatever launches the worker process
//! 3. `accept` runs as a task, suspended until the worker connects
//! 4. waiters on [`ConnectionState`] unblock, send/recv begin on the endpoint

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::ChannelConfig;
use crate::endpoint::ChannelEndpoint;
use crate::state::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind loopback listener: {0}")]
    Bind(#[source] io::Error),
    #[error("listener failed while accepting: {0}")]
    Accept(#[source] io::Error),
    #[error("server is stopped")]
    Stopped,
    #[error("a peer connection is already live")]
    AlreadyConnected,
}

/// Hosts the listener for one point-to-point channel. Each server instance
/// is an independent channel; nothing here is process-global.
pub struct ChannelServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: ChannelConfig,
    connected_tx: watch::Sender<bool>,
    // Upgrades only while the endpoint from the last accept is alive.
    live_conn: Weak<()>,
}

impl ChannelServer {
    pub async fn bind() -> Result<Self, ServerError> {
        Self::bind_with_config(ChannelConfig::default()).await
    }

    /// Binds the loopback interface on port 0 and reads back the
    /// OS-assigned port.
    pub async fn bind_with_config(config: ChannelConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(ServerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ServerError::Bind)?;
        tracing::debug!(port = local_addr.port(), "Server listening");

        let (connected_tx, _) = watch::channel(false);
        Ok(Self {
            listener: Some(listener),
            local_addr,
            config,
            connected_tx,
            live_conn: Weak::new(),
        })
    }

    /// The OS-assigned port, for handing to the worker's launcher.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A waiter handle on the readiness signal. Clones may wait concurrently.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::new(self.connected_tx.subscribe())
    }

    /// Accepts exactly one peer and returns the endpoint for it.
    ///
    /// Resets the readiness signal, suspends until an inbound connection
    /// arrives, then flips the signal once the endpoint is built. There is
    /// no intrinsic timeout; cancel by dropping the future. While an
    /// endpoint from a previous call is still alive this fails with
    /// `AlreadyConnected` rather than silently replacing the tracked
    /// connection.
    pub async fn accept(&mut self) -> Result<ChannelEndpoint, ServerError> {
        let listener = self.listener.as_ref().ok_or(ServerError::Stopped)?;
        if self.live_conn.upgrade().is_some() {
            return Err(ServerError::AlreadyConnected);
        }
        self.connected_tx.send_replace(false);

        let (stream, peer) = listener.accept().await.map_err(ServerError::Accept)?;
        tracing::debug!(%peer, "Peer connected");

        let live = Arc::new(());
        self.live_conn = Arc::downgrade(&live);
        let endpoint =
            ChannelEndpoint::from_stream(stream, &self.config, live).map_err(ServerError::Accept)?;

        self.connected_tx.send_replace(true);
        Ok(endpoint)
    }

    /// Stops listening. Idempotent and infallible; an endpoint already
    /// returned by `accept` stays usable until shut down or dropped.
    pub fn stop(&mut self) {
        if self.listener.take().is_some() {
            tracing::debug!(port = self.local_addr.port(), "Server stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn bound_port_is_connectable_before_accept() {
        let mut server = ChannelServer::bind().await.unwrap();
        let port = server.port();
        assert_ne!(port, 0);

        // The listener backlog holds the connection until accept runs.
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        let endpoint = server.accept().await.unwrap();
        assert_eq!(endpoint.peer_addr(), stream.local_addr().unwrap());
    }

    #[tokio::test]
    async fn wait_connected_times_out_without_peer() {
        let server = ChannelServer::bind().await.unwrap();
        let state = server.connection_state();
        assert!(!state.wait_connected(Duration::from_millis(50)).await);
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn wait_connected_unblocks_once_accepted() {
        let mut server = ChannelServer::bind().await.unwrap();
        let port = server.port();
        let state = server.connection_state();

        let waiter = tokio::spawn(async move {
            state.wait_connected(Duration::from_secs(5)).await
        });

        let _peer = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        let _endpoint = server.accept().await.unwrap();

        assert!(waiter.await.unwrap());
        assert!(server.connection_state().is_connected());
    }

    #[tokio::test]
    async fn second_accept_while_endpoint_is_live_is_rejected() {
        let mut server = ChannelServer::bind().await.unwrap();
        let port = server.port();

        let _peer = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        let endpoint = server.accept().await.unwrap();

        assert!(matches!(
            server.accept().await,
            Err(ServerError::AlreadyConnected)
        ));
        drop(endpoint);

        // With the first endpoint gone, a new session may be accepted.
        let _peer2 = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        server.accept().await.unwrap();
    }

    #[tokio::test]
    async fn accept_resets_readiness_before_waiting() {
        let mut server = ChannelServer::bind().await.unwrap();
        let port = server.port();
        let state = server.connection_state();

        let _peer = TcpStream::connect((Ipv4Addr::LOCALHOST, port))
            .await
            .unwrap();
        let endpoint = server.accept().await.unwrap();
        assert!(state.is_connected());

        drop(endpoint);
        let accepting = tokio::spawn(async move { server.accept().await });
        // The new attempt resets the signal before suspending on the listener.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!state.is_connected());
        accepting.abort();
    }

    #[tokio::test]
    async fn stop_twice_is_safe() {
        let mut server = ChannelServer::bind().await.unwrap();
        server.stop();
        server.stop();
    }

    #[tokio::test]
    async fn accept_after_stop_is_an_error() {
        let mut server = ChannelServer::bind().await.unwrap();
        server.stop();
        assert!(matches!(server.accept().await, Err(ServerError::Stopped)));
    }

    #[tokio::test]
    async fn stopped_port_refuses_new_connections() {
        let mut server = ChannelServer::bind().await.unwrap();
        let port = server.port();
        server.stop();
        assert!(
            TcpStream::connect((Ipv4Addr::LOCALHOST, port))
                .await
                .is_err()
        );
    }
}
