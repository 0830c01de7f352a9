//! WebSocket upgrade handshake, built on the HTTP request/response codec.
//!
//! Accept-key derivation is `Sha1::new().chain(key).chain(GUID).finalize()`
//! per RFC 6455 §1.3; the `Connection`/`Upgrade` header check tolerates a
//! comma-separated token list rather than requiring an exact match.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::error::WsError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

fn accept_key(client_key: &str) -> String {
    let digest = Sha1::new().chain_update(client_key.as_bytes()).chain_update(WEBSOCKET_GUID.as_bytes()).finalize();
    BASE64.encode(digest)
}

/// A fresh client nonce: 16 random bytes, base64-encoded.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

fn header_contains_ignore_case(value: Option<&str>, needle: &str) -> bool {
    value.map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case(needle))).unwrap_or(false)
}

/// Builds the client-to-server upgrade request: `Upgrade: websocket`,
/// `Connection: Upgrade`, `Sec-WebSocket-Key`, `Sec-WebSocket-Version: 13`.
pub fn client_request(url: &str, host: &str) -> (HttpRequest, String) {
    let key = generate_key();
    let request = HttpRequest::get(url)
        .with_header("Host", host)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Key", &key)
        .with_header("Sec-WebSocket-Version", "13");
    (request, key)
}

/// Validates an incoming upgrade request and builds the `101` response, or
/// returns the rejection this request deserves.
pub fn server_accept(request: &HttpRequest) -> Result<HttpResponse, WsError> {
    if !header_contains_ignore_case(request.header("Upgrade"), "websocket") {
        return Err(WsError::HandshakeFailed("missing Upgrade: websocket".into()));
    }
    if !header_contains_ignore_case(request.header("Connection"), "upgrade") {
        return Err(WsError::HandshakeFailed("missing Connection: Upgrade".into()));
    }
    if request.header("Sec-WebSocket-Version") != Some("13") {
        return Err(WsError::HandshakeFailed("unsupported Sec-WebSocket-Version".into()));
    }
    let key = request
        .header("Sec-WebSocket-Key")
        .ok_or_else(|| WsError::HandshakeFailed("missing Sec-WebSocket-Key".into()))?;

    let response = HttpResponse::with_status(101)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Accept", &accept_key(key));
    Ok(response)
}

/// Recomputes the accept key from the original client nonce and compares
/// it against the server's response.
pub fn client_validate(response: &HttpResponse, client_key: &str) -> Result<(), WsError> {
    if response.status() != 101 {
        return Err(WsError::HandshakeFailed(format!("unexpected status {}", response.status())));
    }
    let expected = accept_key(client_key);
    match response.header("Sec-WebSocket-Accept") {
        Some(actual) if actual == expected => Ok(()),
        _ => Err(WsError::HandshakeFailed("Sec-WebSocket-Accept mismatch".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc6455_reference_accept_key() {
        // RFC 6455 §1.3 worked example.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn server_accept_round_trips_with_client_validate() {
        let (request, key) = client_request("/chat", "example.com");
        let response = server_accept(&request).unwrap();
        assert_eq!(response.status(), 101);
        client_validate(&response, &key).unwrap();
    }

    #[test]
    fn missing_upgrade_header_is_rejected() {
        let request = HttpRequest::get("/chat")
            .with_header("Host", "example.com")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Key", &generate_key())
            .with_header("Sec-WebSocket-Version", "13");
        assert!(server_accept(&request).is_err());
    }

    #[test]
    fn tampered_accept_key_fails_client_validate() {
        let (request, key) = client_request("/chat", "example.com");
        let response = server_accept(&request).unwrap().with_header("Sec-WebSocket-Accept", "bogus==");
        assert!(client_validate(&response, &key).is_err());
    }
}
