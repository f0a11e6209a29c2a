//! Connection abstraction over plain TCP and TLS-wrapped TCP.
//!
//! The dispatch loop reads/writes through this type uniformly; only TLS
//! setup and the zero-copy fallback for static file serving need to know
//! which variant is in play.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A bidirectional byte stream accepted by the listener: either a plain TCP
/// socket or one wrapped in a completed TLS handshake.
pub enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ClientConnection {
    pub fn is_tls(&self) -> bool {
        matches!(self, ClientConnection::Tls(_))
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            ClientConnection::Plain(s) => s.peer_addr(),
            ClientConnection::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }

    /// The plain TCP socket, when this connection is not TLS-wrapped.
    /// Used for the zero-copy static-file fallback (`sendfile`-like
    /// forwarding via `tokio::io::copy`) that only applies to plain TCP.
    pub fn raw_socket(&mut self) -> Option<&mut TcpStream> {
        match self {
            ClientConnection::Plain(s) => Some(s),
            ClientConnection::Tls(_) => None,
        }
    }
}

impl AsyncRead for ClientConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientConnection::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ClientConnection::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ClientConnection::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ClientConnection::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientConnection::Plain(s) => Pin::new(s).poll_flush(cx),
            ClientConnection::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ClientConnection::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ClientConnection::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
