//! TLS adapter (feature `tls`): wraps the handshake phase
//! around a plain stream before handing the resulting encrypted stream to
//! [`crate::session::StreamSession`], using `tokio-rustls` +
//! `rustls-pemfile`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::TransportError;

/// Monotonic attempt id so a replaced handshake can discard a stale
/// completion racing against a newer `connect`/`accept` call.
fn next_attempt_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    NotStarted,
    Handshaking,
    Handshaked,
}

/// Tracks the current handshake attempt for a single TLS-wrapped session.
/// `begin()` bumps the attempt id; `is_current(id)` lets a completion check
/// whether it is still the live attempt before acting on its result.
pub struct HandshakeGuard {
    state: std::sync::Mutex<HandshakeState>,
    current_attempt: AtomicU64,
}

impl Default for HandshakeGuard {
    fn default() -> Self {
        Self {
            state: std::sync::Mutex::new(HandshakeState::NotStarted),
            current_attempt: AtomicU64::new(0),
        }
    }
}

impl HandshakeGuard {
    pub fn begin(&self) -> u64 {
        let id = next_attempt_id();
        self.current_attempt.store(id, Ordering::Release);
        *self.state.lock().unwrap() = HandshakeState::Handshaking;
        id
    }

    pub fn is_current(&self, attempt: u64) -> bool {
        self.current_attempt.load(Ordering::Acquire) == attempt
    }

    pub fn complete(&self, attempt: u64) -> bool {
        if !self.is_current(attempt) {
            return false;
        }
        *self.state.lock().unwrap() = HandshakeState::Handshaked;
        true
    }

    pub fn state(&self) -> HandshakeState {
        *self.state.lock().unwrap()
    }
}

/// Client-side handshake: connects the TCP socket, performs the TLS
/// handshake, and returns the encrypted stream ready for
/// `StreamSession::connect`. No application read/write may occur before
/// this returns.
pub async fn client_handshake(
    stream: TcpStream,
    config: Arc<ClientConfig>,
    server_name: tokio_rustls::rustls::pki_types::ServerName<'static>,
    guard: &HandshakeGuard,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
    let attempt = guard.begin();
    let connector = TlsConnector::from(config);
    let tls = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

    if !guard.complete(attempt) {
        return Err(TransportError::HandshakeFailed(
            "stale handshake attempt discarded".into(),
        ));
    }
    Ok(tls)
}

/// Server-side handshake counterpart of [`client_handshake`].
pub async fn server_handshake(
    stream: TcpStream,
    config: Arc<ServerConfig>,
    guard: &HandshakeGuard,
) -> Result<tokio_rustls::server::TlsStream<TcpStream>, TransportError> {
    let attempt = guard.begin();
    let acceptor = TlsAcceptor::from(config);
    let tls = acceptor
        .accept(stream)
        .await
        .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;

    if !guard.complete(attempt) {
        return Err(TransportError::HandshakeFailed(
            "stale handshake attempt discarded".into(),
        ));
    }
    Ok(tls)
}

/// Cooperative shutdown: TLS close-notify first, then the socket itself.
/// `StreamSession::disconnect` already shuts the underlying transport down;
/// this just ensures the close-notify alert is attempted first when the
/// caller still holds the raw TLS stream (e.g. before handing it to a
/// session, or in tests).
pub async fn shutdown<S>(mut stream: S)
where
    S: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_attempt_is_discarded() {
        let guard = HandshakeGuard::default();
        let first = guard.begin();
        let second = guard.begin();
        assert!(!guard.complete(first));
        assert!(guard.complete(second));
        assert_eq!(guard.state(), HandshakeState::Handshaked);
    }
}
