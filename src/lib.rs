//! Reusable stream-session endpoints: a TCP/TLS session engine, a stream
//! server/acceptor, an HTTP/1.1 incremental codec, and a WebSocket framing
//! engine, all built on one session abstraction so a handler installed on
//! a raw TCP session, an HTTP session, or a WebSocket session all share the
//! same connect/receive/disconnect lifecycle.
//!
//! # Example
//!
//! ```no_run
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use netkit::config::SocketConfig;
//! use netkit::server::StreamServer;
//! use netkit::session::{SessionHandle, SessionHandler};
//!
//! struct Echo;
//!
//! impl SessionHandler for Echo {
//!     fn on_received(&self, session: &dyn SessionHandle, data: &[u8]) {
//!         let _ = session.send_async(data);
//!     }
//! }
//!
//! async fn run(addr: SocketAddr) -> std::io::Result<()> {
//!     let server = StreamServer::new(SocketConfig::default());
//!     server.start(addr, || Arc::new(Echo)).await
//! }
//! ```
//!
//! ## HTTP
//!
//! [`http::HttpSession`] drives an [`http::HttpRequest`] or
//! [`http::HttpResponse`] incrementally as bytes arrive, dispatching
//! `received_header`/`received` hooks on an [`http::HttpSessionHandler`];
//! [`http::HttpClient`] is the task-based send/await counterpart.
//!
//! ## WebSocket
//!
//! [`ws::WebSocketEngine`] performs the RFC 6455 upgrade (as a server via
//! [`ws::handshake::server_accept`], or as a client via
//! [`ws::handshake::client_request`]/[`ws::handshake::client_validate`])
//! and then switches to incremental frame parsing, reassembling fragmented
//! messages while dispatching control frames inline. No WebSocket
//! extensions (permessage-deflate) are supported.

pub mod buffer;
pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod session;
#[cfg(feature = "tls")]
pub mod tls;
pub mod ws;

pub use config::SocketConfig;
pub use error::{HttpError, TransportError, WsError};
pub use server::StreamServer;
pub use session::{SessionHandle, SessionHandler, StreamSession};
