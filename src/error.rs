//! Error taxonomy shared by every layer. One `thiserror`-derived enum per
//! layer: a flat enum surfaced through `Result`, never a panic on
//! attacker-controlled input.

use std::io;

/// Transport-level errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Peer went away (aborted/reset/refused/shutdown). Logged internally,
    /// never surfaced to the user `error` hook; disconnect follows silently.
    #[error("peer gone: {0}")]
    PeerGone(#[source] io::Error),

    /// Any other OS socket error. Surfaced via `error(code)`, disconnect follows.
    #[error("transport error: {0}")]
    Operational(#[source] io::Error),

    /// Send or receive buffer limit exceeded.
    #[error("no buffer space available")]
    NoBufferSpace,

    /// TLS handshake or WebSocket accept-key validation failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Attempted I/O on a session that is not connected.
    #[error("session not connected")]
    NotConnected,
}

impl TransportError {
    /// Classifies a raw `io::Error`: the listed kinds silently disconnect,
    /// everything else surfaces through `error`.
    pub fn classify(err: io::Error) -> TransportError {
        use io::ErrorKind::*;
        match err.kind() {
            ConnectionAborted | ConnectionRefused | ConnectionReset | NotConnected => {
                TransportError::PeerGone(err)
            }
            _ => TransportError::Operational(err),
        }
    }
}

/// HTTP codec/session errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("malformed start line")]
    MalformedStartLine,

    #[error("malformed header")]
    MalformedHeader,

    #[error("empty header name")]
    EmptyHeaderName,

    #[error("invalid status code")]
    InvalidStatusCode,

    #[error("body exceeds declared content-length")]
    BodyOverflow,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("request timed out")]
    Timeout,
}

/// WebSocket framing/handshake errors.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("reserved bits set")]
    ReservedBitsNotZero,

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("control frame must not be fragmented")]
    ControlFrameFragmented,

    #[error("control frame payload too large")]
    ControlFrameTooLarge,

    #[error("frame exceeds maximum message size")]
    FrameTooLarge,

    #[error("invalid close frame payload")]
    InvalidCloseFrame,

    #[error("continuation frame without a preceding fragment")]
    UnexpectedContinuation,

    #[error("invalid utf-8 in text frame")]
    InvalidUtf8,

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("connection already closed")]
    ConnectionClosed,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
