//! Task-based HTTP client: a single in-flight request slot completed by
//! the `received` hook or a timer/timeout; cancellation disposes the timer.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::SocketConfig;
use crate::error::HttpError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::session::{HttpSession, HttpSessionHandler};
use crate::session::{SessionHandle, SessionHandler, StreamSession};

type PendingSlot = StdMutex<Option<oneshot::Sender<HttpResponse>>>;

struct ClientHandler {
    pending: Arc<PendingSlot>,
}

impl HttpSessionHandler<HttpResponse> for ClientHandler {
    fn on_received(&self, _session: &dyn SessionHandle, message: &HttpResponse) {
        if let Some(tx) = self.pending.lock().unwrap().take() {
            let _ = tx.send(message.clone());
        }
    }
}

/// One HTTP/1.1 connection used to issue requests and await their
/// responses. Only one request may be in flight at a time; pipelining is
/// not supported.
pub struct HttpClient<S> {
    session: Arc<StreamSession<S>>,
    pending: Arc<PendingSlot>,
}

impl<S> HttpClient<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    pub fn connect(stream: S, config: SocketConfig) -> Self {
        let pending = Arc::new(StdMutex::new(None));
        let handler: Arc<dyn SessionHandler> =
            Arc::new(HttpSession::<HttpResponse>::new(Arc::new(ClientHandler { pending: pending.clone() })));
        let session = StreamSession::connect(stream, config, handler, None);
        Self { session, pending }
    }

    /// Sends `request` and awaits its response, failing with
    /// [`HttpError::Timeout`] if `timeout` elapses first. The session is
    /// disconnected on timeout so a stale in-flight response can't complete
    /// a later call.
    pub async fn send(&self, request: &HttpRequest, timeout: Duration) -> Result<HttpResponse, HttpError> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock().unwrap() = Some(tx);

        self.session.send_async(request.wire_bytes())?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(HttpError::Transport(crate::error::TransportError::NotConnected)),
            Err(_) => {
                self.pending.lock().unwrap().take();
                self.session.disconnect();
                Err(HttpError::Timeout)
            }
        }
    }

    pub fn disconnect(&self) {
        self.session.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn send_completes_on_response() {
        let (client_io, mut server_io) = duplex(4096);
        let client = HttpClient::connect(client_io, SocketConfig::default());

        let request = HttpRequest::get("/x").with_header("Host", "a");
        let send = tokio::spawn({
            let request = request.clone();
            async move { client.send(&request, Duration::from_secs(1)).await }
        });

        let mut buf = vec![0u8; request.wire_bytes().len()];
        server_io.read_exact(&mut buf).await.unwrap();
        server_io.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK").await.unwrap();

        let response = send.await.unwrap().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), b"OK");
    }

    #[tokio::test]
    async fn send_times_out_without_response() {
        let (client_io, _server_io) = duplex(4096);
        let client = HttpClient::connect(client_io, SocketConfig::default());
        let request = HttpRequest::get("/x").with_header("Host", "a");
        let err = client.send(&request, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout));
    }
}
