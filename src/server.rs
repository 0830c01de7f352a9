//! Stream server / acceptor: binds, listens, accepts in a
//! loop, registers sessions in a concurrent map, and fans out broadcast.
//!
//! Uses the generic tokio accept-loop idiom plus `dashmap` as the sharded
//! concurrent map fit for a registry mutated by many tasks at once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SocketConfig;
use crate::session::{SessionHandle, SessionHandler, SessionId, SessionRegistry, StreamSession};

/// Per-server aggregate counters, updated via atomic add/sub from any
/// completion thread.
#[derive(Default)]
struct Counters {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

/// A running TCP server. `make_handler` is the factory hook letting callers
/// plug in the handler used for each newly accepted connection — e.g. an
/// HTTP handler, or a raw echo handler.
pub struct StreamServer {
    sessions: Arc<DashMap<SessionId, Arc<dyn SessionHandle>>>,
    counters: Arc<Counters>,
    config: SocketConfig,
    accepting: Arc<AtomicBool>,
    accept_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry for StreamServer {
    fn unregister(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    fn add_bytes_sent(&self, n: u64) {
        self.counters.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    fn add_bytes_received(&self, n: u64) {
        self.counters.bytes_received.fetch_add(n, Ordering::Relaxed);
    }
}

impl StreamServer {
    pub fn new(config: SocketConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            config,
            accepting: Arc::new(AtomicBool::new(false)),
            accept_task: std::sync::Mutex::new(None),
        })
    }

    /// Binds, listens with the configured backlog, and spawns the
    /// continuous accept loop. `make_handler` is the session factory: it is
    /// invoked once per accepted connection to produce the handler driving
    /// that session.
    pub async fn start<F>(
        self: &Arc<Self>,
        addr: SocketAddr,
        make_handler: F,
    ) -> std::io::Result<()>
    where
        F: Fn() -> Arc<dyn SessionHandler> + Send + Sync + 'static,
    {
        let listener = self.config.bind_listener(addr)?;
        self.accepting.store(true, Ordering::Release);
        info!(%addr, "server listening");

        let server = self.clone();
        let accepting = self.accepting.clone();
        let task = tokio::spawn(async move {
            loop {
                if !accepting.load(Ordering::Acquire) {
                    return;
                }
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        if let Err(e) = server.config.apply_to_tcp(&stream) {
                            warn!(%peer, error = %e, "failed to apply socket options");
                        }
                        server.accept_stream(stream, make_handler());
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });
        *self.accept_task.lock().unwrap() = Some(task);
        Ok(())
    }

    fn accept_stream(self: &Arc<Self>, stream: TcpStream, handler: Arc<dyn SessionHandler>) {
        let registry: Weak<dyn SessionRegistry> = Arc::downgrade(self);
        let session = StreamSession::connect(stream, self.config.clone(), handler, Some(registry));
        self.sessions.insert(session.id(), session as Arc<dyn SessionHandle>);
    }

    /// Fans a payload out to every registered session via non-blocking
    /// send. Does not guarantee atomicity across sessions.
    pub fn broadcast(&self, bytes: &[u8]) {
        for entry in self.sessions.iter() {
            let _ = entry.value().send_async(bytes);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.counters.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.counters.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_pending(&self) -> u64 {
        self.sessions.iter().map(|e| e.value().bytes_pending()).sum()
    }

    /// Halts acceptance, disconnects every registered session, and
    /// idempotently releases the listener.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
        if let Some(task) = self.accept_task.lock().unwrap().take() {
            task.abort();
        }
        for entry in self.sessions.iter() {
            entry.value().disconnect();
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct EchoHandler;
    impl SessionHandler for EchoHandler {
        fn on_received(&self, session: &dyn SessionHandle, data: &[u8]) {
            let _ = session.send_async(data);
        }
    }

    #[tokio::test]
    async fn accepted_session_echoes_and_updates_server_counters() {
        let server = StreamServer::new(SocketConfig::default());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(addr).await.unwrap();
        let local_addr = listener.local_addr().unwrap();
        drop(listener);

        server
            .start(local_addr, || Arc::new(EchoHandler) as Arc<dyn SessionHandler>)
            .await
            .unwrap();

        let mut client = TcpStream::connect(local_addr).await.unwrap();
        client.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(server.bytes_received(), 5);
        assert_eq!(server.bytes_sent(), 5);

        server.stop();
    }
}
