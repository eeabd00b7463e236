//! Channel endpoint: the live socket bundle for one established connection.
//!
//! Returned as a value by `ChannelServer::accept` (host side) or built by
//! [`ChannelEndpoint::connect`] (worker side). Receives take `&mut self` —
//! the protocol assumes a single reader per connection. Sends go through one
//! mutex shared by every [`MessageSender`] clone, so concurrent senders emit
//! whole frames in some serial order instead of interleaving bytes.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::codec::TextCodec;
use crate::config::ChannelConfig;

type SharedWriter = Arc<tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, TextCodec>>>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connection closed")]
    Closed,
    #[error("connection closed mid-frame")]
    Truncated,
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),
    #[error("channel i/o error: {0}")]
    Io(#[from] io::Error),
}

/// One established connection: framed reader, shared framed writer, and the
/// read-timeout budget. Dropping the endpoint closes the socket.
pub struct ChannelEndpoint {
    reader: FramedRead<OwnedReadHalf, TextCodec>,
    writer: SharedWriter,
    read_timeout: Duration,
    peer: SocketAddr,
    // Dropped with the endpoint; the server holds the matching Weak to tell
    // whether the connection it handed out is still alive.
    _live: Arc<()>,
}

impl ChannelEndpoint {
    pub(crate) fn from_stream(
        stream: TcpStream,
        config: &ChannelConfig,
        live: Arc<()>,
    ) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, TextCodec::new(config.max_frame_len));
        let writer = Arc::new(tokio::sync::Mutex::new(FramedWrite::new(
            write_half,
            TextCodec::new(config.max_frame_len),
        )));
        Ok(Self {
            reader,
            writer,
            read_timeout: config.read_timeout,
            peer,
            _live: live,
        })
    }

    /// Worker-side constructor: connects to the host's loopback port and
    /// builds the same framed endpoint the host holds.
    pub async fn connect(port: u16, config: ChannelConfig) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await?;
        tracing::debug!(port, "Connected to host");
        Ok(Self::from_stream(stream, &config, Arc::new(()))?)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Receives one framed message, bounded by the configured read timeout.
    ///
    /// Returns either a complete message or an error — never a partial one.
    /// `Closed` is a clean end-of-stream between frames, `Truncated` an
    /// end-of-stream inside a frame.
    pub async fn recv(&mut self) -> Result<String, ChannelError> {
        let frame = tokio::time::timeout(self.read_timeout, self.reader.next())
            .await
            .map_err(|_| ChannelError::Timeout(self.read_timeout))?;
        match frame {
            Some(Ok(msg)) => {
                tracing::trace!(len = msg.len(), "Received message");
                Ok(msg)
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(ChannelError::Truncated)
            }
            Some(Err(e)) => Err(ChannelError::Io(e)),
            None => Err(ChannelError::Closed),
        }
    }

    /// Sends one framed message. The entire encode+flush sequence runs under
    /// the write mutex, so frames from concurrent senders never interleave.
    /// Sending on a closed or shut-down channel is an explicit error, not a
    /// silent drop.
    pub async fn send(&self, msg: &str) -> Result<(), ChannelError> {
        send_locked(&self.writer, msg).await
    }

    /// A cheap cloneable send-only handle sharing this endpoint's write
    /// mutex, for callers that send from several tasks while one receives.
    pub fn sender(&self) -> MessageSender {
        MessageSender {
            writer: Arc::clone(&self.writer),
        }
    }

    /// Half-closes the write side: subsequent sends fail and the peer's
    /// reader observes end-of-stream. Best-effort and idempotent.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = SinkExt::<&str>::close(&mut *writer).await {
            tracing::debug!(error = %e, "Write side already closed");
        }
    }
}

/// Send-only handle over a [`ChannelEndpoint`]'s write mutex.
#[derive(Clone)]
pub struct MessageSender {
    writer: SharedWriter,
}

impl MessageSender {
    pub async fn send(&self, msg: &str) -> Result<(), ChannelError> {
        send_locked(&self.writer, msg).await
    }
}

async fn send_locked(writer: &SharedWriter, msg: &str) -> Result<(), ChannelError> {
    let mut writer = writer.lock().await;
    tracing::trace!(len = msg.len(), "Sending message");
    writer.send(msg).await.map_err(|e| match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::NotConnected => ChannelError::Closed,
        _ => ChannelError::Io(e),
    })
}
