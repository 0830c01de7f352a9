//! HTTP session layer: dispatches a [`StreamSession`]'s raw
//! byte stream through the header/body parser state machine, and consults
//! the static-content cache on GET.
//!
//! The header-complete flag gating which parser phase runs next is
//! generalized behind [`SessionHandler`] instead of being inlined into one
//! connection actor.

use std::sync::{Arc, Mutex as StdMutex};

use crate::error::HttpError;
use crate::http::cache::StaticContentCache;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::session::{SessionHandle, SessionHandler};

/// Common incremental-parse surface shared by [`HttpRequest`] and
/// [`HttpResponse`], so [`HttpSession`] can drive either without knowing
/// which one it holds.
pub trait IncrementalMessage: Default + Clone + Send + 'static {
    fn feed_header(&mut self, bytes: &[u8]) -> Result<bool, HttpError>;
    fn feed_body(&mut self, bytes: &[u8]) -> Result<bool, HttpError>;
    fn is_header_complete(&self) -> bool;
    fn content_length(&self) -> Option<usize>;
    fn clear(&mut self);

    /// `Some(path)` only for a GET request, letting [`HttpSession`] consult
    /// the static cache before dispatching to the handler. Responses and
    /// non-GET requests never hit the cache.
    fn cache_lookup_path(&self) -> Option<&str> {
        None
    }
}

impl IncrementalMessage for HttpRequest {
    fn feed_header(&mut self, bytes: &[u8]) -> Result<bool, HttpError> {
        HttpRequest::feed_header(self, bytes)
    }
    fn feed_body(&mut self, bytes: &[u8]) -> Result<bool, HttpError> {
        HttpRequest::feed_body(self, bytes)
    }
    fn is_header_complete(&self) -> bool {
        HttpRequest::is_header_complete(self)
    }
    fn content_length(&self) -> Option<usize> {
        HttpRequest::content_length(self)
    }
    fn clear(&mut self) {
        HttpRequest::clear(self)
    }
    fn cache_lookup_path(&self) -> Option<&str> {
        if self.method() == "GET" {
            Some(self.url())
        } else {
            None
        }
    }
}

impl IncrementalMessage for HttpResponse {
    fn feed_header(&mut self, bytes: &[u8]) -> Result<bool, HttpError> {
        HttpResponse::feed_header(self, bytes)
    }
    fn feed_body(&mut self, bytes: &[u8]) -> Result<bool, HttpError> {
        HttpResponse::feed_body(self, bytes)
    }
    fn is_header_complete(&self) -> bool {
        HttpResponse::is_header_complete(self)
    }
    fn content_length(&self) -> Option<usize> {
        HttpResponse::content_length(self)
    }
    fn clear(&mut self) {
        HttpResponse::clear(self)
    }
}

/// Hooks fired by [`HttpSession`] as a message arrives: header-complete,
/// body-complete, and parse-error.
pub trait HttpSessionHandler<M>: Send + Sync {
    fn on_received_header(&self, _session: &dyn SessionHandle, _message: &M) {}
    fn on_received(&self, _session: &dyn SessionHandle, _message: &M) {}
    fn on_received_error(&self, _session: &dyn SessionHandle, _err: &HttpError) {}
}

/// Installed as a [`SessionHandler`] on a [`StreamSession`]; owns the
/// in-progress message and routes each chunk of bytes to the right parser
/// phase.
pub struct HttpSession<M: IncrementalMessage> {
    state: StdMutex<M>,
    handler: Arc<dyn HttpSessionHandler<M>>,
    cache: Option<Arc<dyn StaticContentCache>>,
}

impl<M: IncrementalMessage> HttpSession<M> {
    pub fn new(handler: Arc<dyn HttpSessionHandler<M>>) -> Self {
        Self { state: StdMutex::new(M::default()), handler, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<dyn StaticContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn finalize_after_header(&self, session: &dyn SessionHandle, message: &mut M) {
        let cache_path = message.cache_lookup_path().map(|p| p.to_string());
        if let Some(path) = cache_path {
            if let Some(cache) = &self.cache {
                if let Some(bytes) = cache.find(&path) {
                    let _ = session.send_async(&bytes);
                    message.clear();
                    return;
                }
            }
        }
        self.handler.on_received_header(session, message);
        self.advance_body(session, message, &[]);
    }

    fn advance_body(&self, session: &dyn SessionHandle, message: &mut M, bytes: &[u8]) {
        match message.feed_body(bytes) {
            Ok(true) => {
                self.handler.on_received(session, message);
                message.clear();
            }
            Ok(false) => {}
            Err(e) => {
                self.handler.on_received_error(session, &e);
                session.disconnect();
            }
        }
    }
}

impl<M: IncrementalMessage> SessionHandler for HttpSession<M> {
    fn on_received(&self, session: &dyn SessionHandle, data: &[u8]) {
        let mut message = self.state.lock().unwrap();
        if !message.is_header_complete() {
            match message.feed_header(data) {
                Ok(true) => self.finalize_after_header(session, &mut message),
                Ok(false) => {}
                Err(e) => {
                    self.handler.on_received_error(session, &e);
                    session.disconnect();
                }
            }
        } else {
            self.advance_body(session, &mut message, data);
        }
    }

    /// Best-effort finalization: a length-less body (relying on
    /// connection-close as its terminator) that never got an explicit
    /// terminator still fires `received` with whatever arrived.
    fn on_disconnecting(&self, session: &dyn SessionHandle) {
        let mut message = self.state.lock().unwrap();
        if message.is_header_complete() && message.content_length().is_none() {
            self.handler.on_received(session, &message);
            message.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SocketConfig;
    use crate::http::cache::InMemoryCache;
    use crate::session::StreamSession;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::io::{duplex, AsyncWriteExt};

    struct RecordingHandler {
        got_header: AtomicBool,
        got_body: AtomicBool,
    }

    impl HttpSessionHandler<HttpRequest> for RecordingHandler {
        fn on_received_header(&self, _session: &dyn SessionHandle, _message: &HttpRequest) {
            self.got_header.store(true, Ordering::Relaxed);
        }
        fn on_received(&self, _session: &dyn SessionHandle, message: &HttpRequest) {
            self.got_body.store(true, Ordering::Relaxed);
            assert_eq!(message.body(), b"hello");
        }
    }

    #[tokio::test]
    async fn fragmented_request_fires_header_then_body_hooks() {
        let (client_io, mut server_io) = duplex(4096);
        let recording = Arc::new(RecordingHandler {
            got_header: AtomicBool::new(false),
            got_body: AtomicBool::new(false),
        });
        let http_handler = Arc::new(HttpSession::<HttpRequest>::new(recording.clone()));
        let session = StreamSession::connect(client_io, SocketConfig::default(), http_handler, None);

        server_io.write_all(b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(recording.got_header.load(Ordering::Relaxed));
        assert!(!recording.got_body.load(Ordering::Relaxed));

        server_io.write_all(b"hello").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(recording.got_body.load(Ordering::Relaxed));

        session.disconnect();
    }

    struct CacheProbeHandler {
        dispatched: AtomicBool,
    }
    impl HttpSessionHandler<HttpRequest> for CacheProbeHandler {
        fn on_received_header(&self, _session: &dyn SessionHandle, _message: &HttpRequest) {
            self.dispatched.store(true, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn get_served_from_cache_skips_handler_dispatch() {
        let (client_io, mut server_io) = duplex(4096);
        let probe = Arc::new(CacheProbeHandler { dispatched: AtomicBool::new(false) });
        let cache = Arc::new(InMemoryCache::new());
        cache.insert("/cached", b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec());
        let http_handler = Arc::new(HttpSession::<HttpRequest>::new(probe.clone()).with_cache(cache));
        let session = StreamSession::connect(client_io, SocketConfig::default(), http_handler, None);

        server_io.write_all(b"GET /cached HTTP/1.1\r\nHost: a\r\n\r\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!probe.dispatched.load(Ordering::Relaxed));

        session.disconnect();
    }
}
