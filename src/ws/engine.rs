//! WebSocket engine: installed as a [`SessionHandler`], it
//! drives the upgrade handshake and then switches the byte pipeline to
//! frame parsing, reassembling fragmented messages while delivering
//! control frames inline — a fragment in progress never disturbs
//! control-frame delivery and vice versa.
//!
//! The close/ping/pong dispatch order, auto-pong default, and `fin`+opcode
//! state machine follow RFC 6455, adapted from a pull-based
//! `read_frame().await` loop to the push-based `on_received` style every
//! session in this crate uses.

use std::sync::{Arc, Mutex as StdMutex};

use rand::RngCore;

use crate::error::WsError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::session::{SessionHandle, SessionHandler};
use crate::ws::frame::{self, OpCode};
use crate::ws::handshake;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Exposes frame-level send/close operations to [`WebSocketHandler`] hooks
/// without requiring them to know the engine's internal state.
pub trait WebSocketHandle {
    fn send_frame(&self, opcode: OpCode, payload: &[u8]) -> Result<(), WsError>;
    fn close(&self, status: u16);
}

struct WsCtx<'a> {
    engine: &'a WebSocketEngine,
    session: &'a dyn SessionHandle,
}

impl<'a> WebSocketHandle for WsCtx<'a> {
    fn send_frame(&self, opcode: OpCode, payload: &[u8]) -> Result<(), WsError> {
        self.engine.send_frame(self.session, opcode, payload)
    }

    fn close(&self, status: u16) {
        self.engine.close(self.session, status);
    }
}

/// Hooks fired by [`WebSocketEngine`]. Default `ws_ping`/
/// `ws_close` implement the protocol's mandated auto-reply behavior.
pub trait WebSocketHandler: Send + Sync {
    fn ws_connecting(&self, _session: &dyn SessionHandle) {}
    fn ws_connected(&self, _session: &dyn SessionHandle) {}
    fn ws_disconnecting(&self, _session: &dyn SessionHandle) {}
    fn ws_disconnected(&self, _session: &dyn SessionHandle) {}
    fn ws_received(&self, _session: &dyn SessionHandle, _opcode: OpCode, _data: &[u8]) {}

    /// Default: reply with our own close frame echoing the status, then
    /// disconnect, completing a two-way close.
    fn ws_close(&self, ws: &dyn WebSocketHandle, data: &[u8], status: u16) {
        let _ = ws.send_frame(OpCode::Close, data);
        ws.close(status);
    }

    /// Default: pong, echoing the ping payload.
    fn ws_ping(&self, ws: &dyn WebSocketHandle, data: &[u8]) {
        let _ = ws.send_frame(OpCode::Pong, data);
    }

    fn ws_pong(&self, _session: &dyn SessionHandle, _data: &[u8]) {}
    fn ws_error(&self, _session: &dyn SessionHandle, _err: &WsError) {}
}

enum EngineState {
    AwaitingRequest(HttpRequest),
    AwaitingResponse(HttpResponse, String),
    Frames {
        raw: Vec<u8>,
        /// In-progress fragmented text/binary message: (opcode of the
        /// first fragment, bytes accumulated so far).
        fragment: Option<(OpCode, Vec<u8>)>,
    },
    Closed,
}

/// Result of folding newly arrived bytes into the engine's state, decided
/// while holding the `state` lock so that everything after it — which may
/// call back into user code and `session.disconnect()` — runs lock-free.
enum Outcome {
    Pending,
    HandshakeRequest(HttpRequest),
    HandshakeResponse(HttpResponse, String),
    Frames(Vec<(OpCode, Vec<u8>)>),
    Error(WsError),
}

pub struct WebSocketEngine {
    role: Role,
    state: StdMutex<EngineState>,
    handler: Arc<dyn WebSocketHandler>,
}

impl WebSocketEngine {
    pub fn server(handler: Arc<dyn WebSocketHandler>) -> Arc<Self> {
        Arc::new(Self {
            role: Role::Server,
            state: StdMutex::new(EngineState::AwaitingRequest(HttpRequest::new())),
            handler,
        })
    }

    /// `client_key` is the nonce generated for the request this engine's
    /// session already sent (see [`handshake::client_request`]); the engine
    /// only parses the response and validates it.
    pub fn client(handler: Arc<dyn WebSocketHandler>, client_key: String) -> Arc<Self> {
        Arc::new(Self {
            role: Role::Client,
            state: StdMutex::new(EngineState::AwaitingResponse(HttpResponse::new(), client_key)),
            handler,
        })
    }

    fn send_frame(&self, session: &dyn SessionHandle, opcode: OpCode, payload: &[u8]) -> Result<(), WsError> {
        let mask = match self.role {
            Role::Client => {
                let mut key = [0u8; 4];
                rand::thread_rng().fill_bytes(&mut key);
                Some(key)
            }
            Role::Server => None,
        };
        let mut out = Vec::new();
        frame::encode_frame(true, opcode, mask, payload, &mut out);
        session.send_async(&out).map(|_| ()).map_err(WsError::Transport)
    }

    /// Emits a close frame carrying `status` as its 2-byte prefix, then
    /// disconnects the underlying session.
    pub fn close(&self, session: &dyn SessionHandle, status: u16) {
        let _ = self.send_frame(session, OpCode::Close, &status.to_be_bytes());
        session.disconnect();
    }

    /// Feeds newly arrived bytes into the post-handshake frame buffer,
    /// draining every complete frame and reassembling fragments. Pure
    /// state manipulation only — no handler callbacks — so it can run
    /// entirely under the `state` lock without risking a callback
    /// re-entering it.
    fn feed_frames(
        raw: &mut Vec<u8>,
        fragment: &mut Option<(OpCode, Vec<u8>)>,
        data: &[u8],
    ) -> Result<Vec<(OpCode, Vec<u8>)>, WsError> {
        raw.extend_from_slice(data);
        let mut ready = Vec::new();
        while let Some(header) = frame::parse_header(raw)? {
            if raw.len() < header.total_len() {
                break;
            }
            let frame_bytes: Vec<u8> = raw.drain(..header.total_len()).collect();
            let mut payload = frame_bytes[header.header_len..].to_vec();
            if let Some(mask) = header.mask {
                frame::apply_mask(&mut payload, mask);
            }
            if let Some(item) = Self::reassemble(header.fin, header.opcode, payload, fragment)? {
                ready.push(item);
            }
        }
        Ok(ready)
    }

    /// Folds one decoded frame into the fragment-reassembly state. Returns
    /// a complete `(opcode, payload)` once a message (control frame, or a
    /// non-fragmented/fully-reassembled data frame) is ready to deliver.
    fn reassemble(
        fin: bool,
        opcode: OpCode,
        payload: Vec<u8>,
        fragment: &mut Option<(OpCode, Vec<u8>)>,
    ) -> Result<Option<(OpCode, Vec<u8>)>, WsError> {
        if opcode.is_control() {
            if opcode == OpCode::Close && payload.len() == 1 {
                return Err(WsError::InvalidCloseFrame);
            }
            return Ok(Some((opcode, payload)));
        }
        match opcode {
            OpCode::Continuation => match fragment.as_mut() {
                Some((_, buf)) => {
                    buf.extend_from_slice(&payload);
                    if fin {
                        Ok(Some(fragment.take().unwrap()))
                    } else {
                        Ok(None)
                    }
                }
                None => Err(WsError::UnexpectedContinuation),
            },
            OpCode::Text | OpCode::Binary => {
                if fin {
                    if opcode == OpCode::Text && std::str::from_utf8(&payload).is_err() {
                        return Err(WsError::InvalidUtf8);
                    }
                    Ok(Some((opcode, payload)))
                } else {
                    *fragment = Some((opcode, payload));
                    Ok(None)
                }
            }
            _ => unreachable!("control opcodes handled above"),
        }
    }

    /// Dispatches one fully-reassembled message/control frame to the
    /// handler. Called with the `state` lock already released.
    fn deliver(&self, session: &dyn SessionHandle, opcode: OpCode, payload: Vec<u8>) {
        match opcode {
            OpCode::Close => {
                let status = if payload.len() >= 2 {
                    u16::from_be_bytes([payload[0], payload[1]])
                } else {
                    1000
                };
                let ctx = WsCtx { engine: self, session };
                self.handler.ws_close(&ctx, &payload, status);
            }
            OpCode::Ping => {
                let ctx = WsCtx { engine: self, session };
                self.handler.ws_ping(&ctx, &payload);
            }
            OpCode::Pong => self.handler.ws_pong(session, &payload),
            _ => self.handler.ws_received(session, opcode, &payload),
        }
    }

    /// Everything that can come out of one `on_received` call, decided
    /// entirely under the `state` lock so every subsequent handler
    /// callback runs with the lock already released — calling
    /// `session.disconnect()` from a hook re-enters `on_disconnecting`,
    /// which itself locks `state`, so no callback may run while we hold it.
    fn advance_state(&self, data: &[u8]) -> Outcome {
        let mut guard = self.state.lock().unwrap();
        match &mut *guard {
            EngineState::AwaitingRequest(request) => match request.feed_header(data) {
                Ok(true) => {
                    let completed = request.clone();
                    *guard = EngineState::Closed;
                    Outcome::HandshakeRequest(completed)
                }
                Ok(false) => Outcome::Pending,
                Err(e) => Outcome::Error(WsError::Http(e)),
            },
            EngineState::AwaitingResponse(response, client_key) => match response.feed_header(data) {
                Ok(true) => {
                    let completed = response.clone();
                    let key = client_key.clone();
                    *guard = EngineState::Closed;
                    Outcome::HandshakeResponse(completed, key)
                }
                Ok(false) => Outcome::Pending,
                Err(e) => Outcome::Error(WsError::Http(e)),
            },
            EngineState::Frames { raw, fragment } => match Self::feed_frames(raw, fragment, data) {
                Ok(ready) => Outcome::Frames(ready),
                Err(e) => Outcome::Error(e),
            },
            EngineState::Closed => Outcome::Pending,
        }
    }
}

impl SessionHandler for WebSocketEngine {
    fn on_connected(&self, session: &dyn SessionHandle) {
        if self.role == Role::Client {
            self.handler.ws_connecting(session);
        }
    }

    fn on_received(&self, session: &dyn SessionHandle, data: &[u8]) {
        match self.advance_state(data) {
            Outcome::Pending => {}
            Outcome::HandshakeRequest(request) => {
                self.handler.ws_connecting(session);
                match handshake::server_accept(&request) {
                    Ok(response) => {
                        let _ = session.send_async(response.wire_bytes());
                        *self.state.lock().unwrap() = EngineState::Frames { raw: Vec::new(), fragment: None };
                        self.handler.ws_connected(session);
                    }
                    Err(e) => {
                        self.handler.ws_error(session, &e);
                        session.disconnect();
                    }
                }
            }
            Outcome::HandshakeResponse(response, key) => match handshake::client_validate(&response, &key) {
                Ok(()) => {
                    *self.state.lock().unwrap() = EngineState::Frames { raw: Vec::new(), fragment: None };
                    self.handler.ws_connected(session);
                }
                Err(e) => {
                    self.handler.ws_error(session, &e);
                    session.disconnect();
                }
            },
            Outcome::Frames(ready) => {
                for (opcode, payload) in ready {
                    if !session.is_connected() {
                        break;
                    }
                    self.deliver(session, opcode, payload);
                }
            }
            Outcome::Error(e) => {
                self.handler.ws_error(session, &e);
                session.disconnect();
            }
        }
    }

    fn on_disconnecting(&self, session: &dyn SessionHandle) {
        self.handler.ws_disconnecting(session);
        *self.state.lock().unwrap() = EngineState::Closed;
    }

    fn on_disconnected(&self, session: &dyn SessionHandle) {
        self.handler.ws_disconnected(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketConfig;
    use crate::session::StreamSession;
    use std::sync::atomic::{AtomicU16, AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[derive(Default)]
    struct RecordingHandler {
        received: Mutex<Vec<u8>>,
        connected: AtomicBool,
        closed_status: AtomicU16,
    }

    impl WebSocketHandler for RecordingHandler {
        fn ws_connected(&self, _session: &dyn SessionHandle) {
            self.connected.store(true, Ordering::Relaxed);
        }
        fn ws_received(&self, _session: &dyn SessionHandle, _opcode: OpCode, data: &[u8]) {
            self.received.lock().unwrap().extend_from_slice(data);
        }
        fn ws_close(&self, ws: &dyn WebSocketHandle, data: &[u8], status: u16) {
            self.closed_status.store(status, Ordering::Relaxed);
            let _ = ws.send_frame(OpCode::Close, data);
            ws.close(status);
        }
    }

    #[tokio::test]
    async fn server_handshake_then_receives_fragmented_message() {
        let (client_io, mut raw_client) = duplex(8192);
        let handler = Arc::new(RecordingHandler::default());
        let engine: Arc<dyn SessionHandler> = WebSocketEngine::server(handler.clone());
        let session = StreamSession::connect(client_io, SocketConfig::default(), engine, None);

        let (request, _key) = handshake::client_request("/chat", "example.com");
        raw_client.write_all(request.wire_bytes()).await.unwrap();

        // Read the 101 response off the wire.
        let mut resp_buf = vec![0u8; 256];
        let n = raw_client.read(&mut resp_buf).await.unwrap();
        let mut response = HttpResponse::new();
        response.feed_header(&resp_buf[..n]).unwrap();
        assert_eq!(response.status(), 101);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(handler.connected.load(Ordering::Relaxed));

        // Two text fragments forming "Hello".
        let mut first = Vec::new();
        frame::encode_frame(false, OpCode::Text, Some([1, 2, 3, 4]), b"Hel", &mut first);
        let mut second = Vec::new();
        frame::encode_frame(true, OpCode::Continuation, Some([5, 6, 7, 8]), b"lo", &mut second);
        raw_client.write_all(&first).await.unwrap();
        raw_client.write_all(&second).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(handler.received.lock().unwrap().as_slice(), b"Hello");

        session.disconnect();
    }

    #[tokio::test]
    async fn close_frame_gets_default_reply_and_disconnects() {
        let (client_io, mut raw_client) = duplex(8192);
        let handler = Arc::new(RecordingHandler::default());
        let engine: Arc<dyn SessionHandler> = WebSocketEngine::server(handler.clone());
        let _session = StreamSession::connect(client_io, SocketConfig::default(), engine, None);

        let (request, _key) = handshake::client_request("/chat", "example.com");
        raw_client.write_all(request.wire_bytes()).await.unwrap();
        let mut resp_buf = vec![0u8; 256];
        raw_client.read(&mut resp_buf).await.unwrap();

        let mut close_frame = Vec::new();
        frame::encode_frame(true, OpCode::Close, Some([9, 9, 9, 9]), &1000u16.to_be_bytes(), &mut close_frame);
        raw_client.write_all(&close_frame).await.unwrap();

        let mut reply = vec![0u8; 16];
        let n = raw_client.read(&mut reply).await.unwrap();
        assert!(n >= 4);
        assert_eq!(handler.closed_status.load(Ordering::Relaxed), 1000);
    }
}
