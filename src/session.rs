//! The stream-session engine: owns one socket, drives an
//! async read loop and a double-buffered send queue, and fires lifecycle
//! hooks on the thread that completes each I/O operation.
//!
//! Generic over `S: AsyncRead + AsyncWrite + Unpin`, so a `StreamSession`
//! can own either a plain `tokio::net::TcpStream` or a TLS-wrapped stream
//! (`tls::TlsStream`) without duplicating the engine.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::buffer::ByteBuffer;
use crate::config::SocketConfig;
use crate::error::TransportError;

pub type SessionId = u64;

fn next_session_id() -> SessionId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased view of a session exposed to handlers, so hooks don't need to
/// know the concrete stream type `S`.
pub trait SessionHandle: Send + Sync {
    fn id(&self) -> SessionId;
    fn send_async(&self, bytes: &[u8]) -> Result<bool, TransportError>;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn bytes_pending(&self) -> u64;
    fn bytes_sending(&self) -> u64;
    fn bytes_sent(&self) -> u64;
    fn bytes_received(&self) -> u64;
}

/// Hooks fired by a session, all synchronous with respect to each other on a
/// given session.
pub trait SessionHandler: Send + Sync {
    fn on_connecting(&self, _session: &dyn SessionHandle) {}
    fn on_connected(&self, _session: &dyn SessionHandle) {}
    fn on_received(&self, _session: &dyn SessionHandle, _data: &[u8]) {}
    fn on_sent(&self, _session: &dyn SessionHandle, _sent: usize, _pending: usize) {}
    fn on_empty_send_buffer(&self, _session: &dyn SessionHandle) {}
    fn on_disconnecting(&self, _session: &dyn SessionHandle) {}
    fn on_disconnected(&self, _session: &dyn SessionHandle) {}
    fn on_error(&self, _session: &dyn SessionHandle, _err: &TransportError) {}
}

/// Non-owning back-reference from a session to its server:
/// the server owns the session strongly via its registry map, the session
/// only knows how to remove itself and fold its counters in.
pub trait SessionRegistry: Send + Sync {
    fn unregister(&self, id: SessionId);
    fn add_bytes_sent(&self, n: u64);
    fn add_bytes_received(&self, n: u64);
}

/// The main/flush double buffer, guarded independently of the write half so
/// that appends never wait on an in-flight OS write.
struct SendState {
    main: ByteBuffer,
    total_enqueued: u64,
    completions: VecDeque<(u64, oneshot::Sender<Result<(), TransportError>>)>,
}

pub struct StreamSession<S> {
    id: SessionId,
    connected: AtomicBool,
    disconnect_started: AtomicBool,
    write_half: AsyncMutex<Option<WriteHalf<S>>>,
    send_state: StdMutex<SendState>,
    notify: Notify,
    bytes_sending: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    send_buffer_limit: Option<usize>,
    receive_buffer_limit: Option<usize>,
    handler: Arc<dyn SessionHandler>,
    registry: Option<Weak<dyn SessionRegistry>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl<S> SessionHandle for StreamSession<S>
where
    S: Send + 'static,
{
    fn id(&self) -> SessionId {
        self.id
    }

    fn send_async(&self, bytes: &[u8]) -> Result<bool, TransportError> {
        StreamSession::send_async(self, bytes).map(|_| true)
    }

    fn disconnect(&self) {
        StreamSession::disconnect(self);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn bytes_pending(&self) -> u64 {
        self.send_state.lock().unwrap().main.size() as u64
    }

    fn bytes_sending(&self) -> u64 {
        self.bytes_sending.load(Ordering::Relaxed)
    }

    fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

impl<S> StreamSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Installs `stream`, fires the connect lifecycle, and spawns the recv
    /// loop and the send-queue pump: signal connected, fire the initial
    /// empty-send-buffer hook, then schedule the first receive.
    pub fn connect(
        stream: S,
        config: SocketConfig,
        handler: Arc<dyn SessionHandler>,
        registry: Option<Weak<dyn SessionRegistry>>,
    ) -> Arc<Self> {
        let id = next_session_id();
        handler.on_connecting(&PreConnectHandle(id));

        let (read_half, write_half) = split(stream);

        let session = Arc::new(StreamSession {
            id,
            connected: AtomicBool::new(true),
            disconnect_started: AtomicBool::new(false),
            write_half: AsyncMutex::new(Some(write_half)),
            send_state: StdMutex::new(SendState {
                main: ByteBuffer::new(),
                total_enqueued: 0,
                completions: VecDeque::new(),
            }),
            notify: Notify::new(),
            bytes_sending: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            send_buffer_limit: config.send_buffer_limit,
            receive_buffer_limit: config.receive_buffer_limit,
            handler,
            registry,
            tasks: StdMutex::new(Vec::new()),
        });

        session.handler.on_connected(session.as_ref());
        session.handler.on_empty_send_buffer(session.as_ref());

        let recv_task = tokio::spawn(recv_loop(session.clone(), read_half));
        let send_task = tokio::spawn(send_pump(session.clone()));
        session.tasks.lock().unwrap().push(recv_task);
        session.tasks.lock().unwrap().push(send_task);

        debug!(session_id = id, "session connected");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Non-blocking send: appends to the main buffer and wakes the pump.
    /// Rejects when not connected or when the send buffer limit would be
    /// exceeded.
    pub fn send_async(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        {
            let mut st = self.send_state.lock().unwrap();
            if let Some(limit) = self.send_buffer_limit {
                if st.main.size() + bytes.len() > limit {
                    return Err(TransportError::NoBufferSpace);
                }
            }
            st.main.append(bytes);
            st.total_enqueued += bytes.len() as u64;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// "Blocking" send: enqueues like `send_async` but awaits until every
    /// byte of this call has actually left via the pump, then fires `sent`
    /// before returning — functionally equivalent to the source's direct OS
    /// write, without risking a second writer racing the pump on the socket.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        let target = {
            let mut st = self.send_state.lock().unwrap();
            if let Some(limit) = self.send_buffer_limit {
                if st.main.size() + bytes.len() > limit {
                    return Err(TransportError::NoBufferSpace);
                }
            }
            st.main.append(bytes);
            st.total_enqueued += bytes.len() as u64;
            let target = st.total_enqueued;
            st.completions.push_back((target, tx));
            target
        };
        let _ = target;
        self.notify.notify_one();
        rx.await.unwrap_or(Err(TransportError::NotConnected))
    }

    /// Idempotent, re-entrant-safe disconnect.
    pub fn disconnect(&self) {
        if self
            .disconnect_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.handler.on_disconnecting(self as &dyn SessionHandle);
        self.connected.store(false, Ordering::Release);
        self.notify.notify_one();

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        {
            let mut st = self.send_state.lock().unwrap();
            st.main.clear();
            for (_, tx) in st.completions.drain(..) {
                let _ = tx.send(Err(TransportError::NotConnected));
            }
        }
        if let Some(registry) = self.registry.as_ref().and_then(Weak::upgrade) {
            registry.unregister(self.id);
        }
        self.handler.on_disconnected(self as &dyn SessionHandle);
        debug!(session_id = self.id, "session disconnected");
    }

    fn fail(&self, err: TransportError) {
        match &err {
            TransportError::PeerGone(_) => {
                trace!(session_id = self.id, "peer gone");
            }
            other => {
                warn!(session_id = self.id, error = %other, "session error");
                self.handler.on_error(self as &dyn SessionHandle, other);
            }
        }
        self.disconnect();
    }
}

/// Placeholder handle used only to report `connecting` before the session
/// object exists (the socket is not installed yet at that point).
struct PreConnectHandle(SessionId);

impl SessionHandle for PreConnectHandle {
    fn id(&self) -> SessionId {
        self.0
    }
    fn send_async(&self, _bytes: &[u8]) -> Result<bool, TransportError> {
        Err(TransportError::NotConnected)
    }
    fn disconnect(&self) {}
    fn is_connected(&self) -> bool {
        false
    }
    fn bytes_pending(&self) -> u64 {
        0
    }
    fn bytes_sending(&self) -> u64 {
        0
    }
    fn bytes_sent(&self) -> u64 {
        0
    }
    fn bytes_received(&self) -> u64 {
        0
    }
}

const INITIAL_RECV_CAPACITY: usize = 4096;

async fn recv_loop<S>(session: Arc<StreamSession<S>>, mut read_half: ReadHalf<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = ByteBuffer::with_capacity(INITIAL_RECV_CAPACITY);
    loop {
        if !session.is_connected() {
            return;
        }
        buf.resize(buf.capacity());
        let n = match read_half.read(buf.as_mut_slice()).await {
            Ok(0) => {
                session.disconnect();
                return;
            }
            Ok(n) => n,
            Err(e) => {
                session.fail(TransportError::classify(e));
                return;
            }
        };
        session.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        if let Some(registry) = session.registry.as_ref().and_then(Weak::upgrade) {
            registry.add_bytes_received(n as u64);
        }

        if n == buf.capacity() {
            let next_cap = buf.capacity() * 2;
            if let Some(limit) = session.receive_buffer_limit {
                if next_cap > limit {
                    session.fail(TransportError::NoBufferSpace);
                    return;
                }
            }
            buf.reserve(next_cap);
        }

        session.handler.on_received(session.as_ref(), &buf.as_slice()[..n]);
        buf.clear();
    }
}

async fn send_pump<S>(session: Arc<StreamSession<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut flush = ByteBuffer::new();
    let mut flush_offset = 0usize;

    loop {
        if !session.is_connected() {
            return;
        }

        if flush_offset >= flush.size() {
            let swapped = {
                let mut st = session.send_state.lock().unwrap();
                if st.main.is_empty() {
                    None
                } else {
                    let mut taken = ByteBuffer::new();
                    std::mem::swap(&mut taken, &mut st.main);
                    Some(taken)
                }
            };
            match swapped {
                Some(buf) => {
                    flush = buf;
                    flush_offset = 0;
                    session
                        .bytes_sending
                        .store(flush.size() as u64, Ordering::Relaxed);
                }
                None => {
                    session.bytes_sending.store(0, Ordering::Relaxed);
                    session.handler.on_empty_send_buffer(session.as_ref());
                    session.notify.notified().await;
                    continue;
                }
            }
        }

        let mut guard = session.write_half.lock().await;
        let write_half = match guard.as_mut() {
            Some(w) => w,
            None => return,
        };
        match write_half.write(&flush.as_slice()[flush_offset..]).await {
            Ok(0) => {
                drop(guard);
                session.disconnect();
                return;
            }
            Ok(n) => {
                drop(guard);
                flush_offset += n;
                session
                    .bytes_sending
                    .store((flush.size() - flush_offset) as u64, Ordering::Relaxed);
                session.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
                if let Some(registry) = session.registry.as_ref().and_then(Weak::upgrade) {
                    registry.add_bytes_sent(n as u64);
                }
                let pending_after = session.bytes_pending() as usize;
                session.handler.on_sent(session.as_ref(), n, pending_after);
                complete_drained_sends(&session);
            }
            Err(e) => {
                drop(guard);
                session.fail(TransportError::classify(e));
                return;
            }
        }
    }
}

/// Resolves any `send()` callers whose enqueued bytes have now fully left.
fn complete_drained_sends<S>(session: &Arc<StreamSession<S>>)
where
    S: Send + 'static,
{
    let sent_total = session.bytes_sent.load(Ordering::Relaxed);
    let mut st = session.send_state.lock().unwrap();
    while let Some((target, _)) = st.completions.front() {
        if *target > sent_total {
            break;
        }
        let (_, tx) = st.completions.pop_front().unwrap();
        let _ = tx.send(Ok(()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::duplex;

    #[derive(Default)]
    struct RecordingHandler {
        received: StdMutex<Vec<u8>>,
        sent_calls: AtomicUsize,
        disconnected: AtomicBool,
    }

    impl SessionHandler for RecordingHandler {
        fn on_received(&self, _session: &dyn SessionHandle, data: &[u8]) {
            self.received.lock().unwrap().extend_from_slice(data);
        }
        fn on_sent(&self, _session: &dyn SessionHandle, _sent: usize, _pending: usize) {
            self.sent_calls.fetch_add(1, Ordering::Relaxed);
        }
        fn on_disconnected(&self, _session: &dyn SessionHandle) {
            self.disconnected.store(true, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn echo_round_trip_updates_counters() {
        let (client_io, mut server_io) = duplex(4096);
        let handler = Arc::new(RecordingHandler::default());
        let session = StreamSession::connect(
            client_io,
            SocketConfig::default(),
            handler.clone(),
            None,
        );

        session.send(b"hello").await.unwrap();

        let mut echo_buf = [0u8; 5];
        server_io.read_exact(&mut echo_buf).await.unwrap();
        assert_eq!(&echo_buf, b"hello");
        server_io.write_all(b"hello").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(handler.received.lock().unwrap().as_slice(), b"hello");
        assert_eq!(session.bytes_sent.load(Ordering::Relaxed), 5);
        assert_eq!(session.bytes_received.load(Ordering::Relaxed), 5);

        session.disconnect();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(handler.disconnected.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn send_buffer_limit_rejects_oversized_append() {
        let (client_io, _server_io) = duplex(4096);
        let handler = Arc::new(RecordingHandler::default());
        let mut config = SocketConfig::default();
        config.send_buffer_limit = Some(4);
        let session = StreamSession::connect(client_io, config, handler, None);
        let err = session.send_async(b"too long").unwrap_err();
        assert!(matches!(err, TransportError::NoBufferSpace));
    }

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
}
