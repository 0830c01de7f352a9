//! WebSocket framing engine and handshake, layered on top of
//! the HTTP codec for the upgrade exchange.

pub mod engine;
pub mod frame;
pub mod handshake;

pub use engine::{Role, WebSocketEngine, WebSocketHandle, WebSocketHandler};
pub use frame::OpCode;
