//! Async NNTP session used by the triage pool
//!
//! The wire subset is deliberately small: AUTHINFO on connect, STAT and
//! BODY by message-id, QUIT on close.

mod articles;
mod auth;
mod connection;
mod io;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

/// Socket-like transport an NNTP session can run over.
///
/// Production connections are TCP or TLS-over-TCP; tests drive sessions
/// over in-memory duplex pipes.
pub trait NntpIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> NntpIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub(crate) enum NntpStream {
    Plain(BufReader<Box<dyn NntpIo>>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Ready,
    Authenticated,
}

/// Async NNTP client over a plain or TLS stream
#[must_use]
pub struct NntpClient {
    stream: NntpStream,
    state: SessionState,
}

impl NntpClient {
    /// Build a client from an established stream, consuming the server
    /// greeting.
    ///
    /// Used by [`connect`](Self::connect) and by tests that supply an
    /// in-memory transport.
    pub async fn from_stream(io: Box<dyn NntpIo>) -> crate::Result<Self> {
        let mut client = Self {
            stream: NntpStream::Plain(BufReader::new(io)),
            state: SessionState::Ready,
        };
        client.read_greeting().await?;
        Ok(client)
    }

    /// Check if the client is currently authenticated
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }
}

impl Drop for NntpClient {
    fn drop(&mut self) {
        debug!("NntpClient dropped");
    }
}
