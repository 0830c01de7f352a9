//! Incremental HTTP request parser/emitter, sharing one
//! backing [`ByteBuffer`] between the two directions.
//!
//! Dispatches on a header-complete flag before moving to body bytes,
//! generalized here into a reusable type instead of being inlined in a
//! single connection actor.

use crate::buffer::ByteBuffer;
use crate::error::HttpError;
use crate::http::headers::{self, HeaderSpan, Span};

#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    buffer: ByteBuffer,
    cache_size: usize,
    method: Span,
    url: Span,
    protocol: Span,
    headers: Vec<HeaderSpan>,
    cookies: Vec<(String, String)>,
    body_index: usize,
    body_size: usize,
    content_length: Option<usize>,
    header_phase_done: bool,
    error_set: bool,
}

impl HttpRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cache_size = 0;
        self.method = Span::default();
        self.url = Span::default();
        self.protocol = Span::default();
        self.headers.clear();
        self.cookies.clear();
        self.body_index = 0;
        self.body_size = 0;
        self.content_length = None;
        self.header_phase_done = false;
        self.error_set = false;
    }

    pub fn error_set(&self) -> bool {
        self.error_set
    }

    pub fn is_header_complete(&self) -> bool {
        self.header_phase_done
    }

    pub fn method(&self) -> &str {
        self.method.as_str(&self.buffer)
    }

    pub fn url(&self) -> &str {
        self.url.as_str(&self.buffer)
    }

    pub fn protocol(&self) -> &str {
        self.protocol.as_str(&self.buffer)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        headers::header_value(&self.buffer, &self.headers, name)
    }

    pub fn headers(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|h| (h.name.as_str(&self.buffer), h.value.as_str(&self.buffer)))
            .collect()
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn body(&self) -> &[u8] {
        self.buffer.slice(self.body_index, self.body_size)
    }

    /// Feeds newly arrived bytes to the header parser. Returns `Ok(true)`
    /// once the header terminator has been found (idempotent afterwards).
    pub fn feed_header(&mut self, bytes: &[u8]) -> Result<bool, HttpError> {
        if self.header_phase_done {
            return Ok(true);
        }
        let from = self.cache_size;
        self.buffer.append(bytes);
        self.cache_size = self.buffer.size();
        let data = self.buffer.as_slice().to_vec();

        let Some(body_start) = headers::find_header_terminator(&data, from) else {
            return Ok(false);
        };

        let line_end = headers::find_crlf(&data, 0, data.len()).ok_or(HttpError::MalformedStartLine)?;
        self.parse_start_line(&data[..line_end])?;
        self.headers = headers::parse_headers(&data, line_end + 2, body_start)?;

        if let Some(v) = headers::header_value(&self.buffer, &self.headers, "content-length") {
            self.content_length = v.trim().parse::<usize>().ok();
        }
        if let Some(v) = headers::header_value(&self.buffer, &self.headers, "cookie") {
            self.cookies = headers::parse_cookie_header(v);
        }

        self.body_index = body_start;
        self.body_size = data.len().saturating_sub(body_start);
        self.header_phase_done = true;
        Ok(true)
    }

    fn parse_start_line(&mut self, line: &[u8]) -> Result<(), HttpError> {
        let mut parts = line.splitn(3, |&b| b == b' ');
        let method = parts.next().ok_or(HttpError::MalformedStartLine)?;
        let url = parts.next().ok_or(HttpError::MalformedStartLine)?;
        let protocol = parts.next().ok_or(HttpError::MalformedStartLine)?;
        if method.is_empty() || url.is_empty() || protocol.is_empty() {
            self.error_set = true;
            return Err(HttpError::MalformedStartLine);
        }
        let method_off = 0;
        let url_off = method.len() + 1;
        let protocol_off = url_off + url.len() + 1;
        self.method = Span::new(method_off, method.len());
        self.url = Span::new(url_off, url.len());
        self.protocol = Span::new(protocol_off, protocol.len());
        Ok(())
    }

    /// Feeds newly arrived body bytes. Returns `Ok(true)` once the body is
    /// complete (declared `Content-Length` reached, or immediately if no
    /// body was declared).
    pub fn feed_body(&mut self, bytes: &[u8]) -> Result<bool, HttpError> {
        if !bytes.is_empty() {
            self.buffer.append(bytes);
            self.body_size += bytes.len();
        }
        match self.content_length {
            Some(len) => {
                if self.body_size > len {
                    self.buffer.resize(self.body_index + len);
                    self.body_size = len;
                    return Err(HttpError::BodyOverflow);
                }
                Ok(self.body_size >= len)
            }
            None => Ok(true),
        }
    }

    fn start_line(method: &str, url: &str, protocol: &str) -> String {
        format!("{method} {url} {protocol}\r\n")
    }

    /// `has_body` distinguishes "no body concept at all" (no `Content-Length`
    /// emitted, e.g. `GET`) from "an explicitly-set body that happens to be
    /// empty" (`Content-Length: 0` emitted).
    fn build(method: &str, url: &str, headers: &[(&str, &str)], body: &[u8], has_body: bool) -> Self {
        let mut header_bytes = Self::start_line(method, url, "HTTP/1.1");
        for (name, value) in headers {
            header_bytes.push_str(&format!("{name}: {value}\r\n"));
        }
        if has_body {
            header_bytes.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        header_bytes.push_str("\r\n");

        // Feed the header portion first so the terminator scan sees only
        // header bytes, then append the body separately (keeps emit/parse
        // symmetric: accessors reflect the same spans a receiver would see).
        let mut req = Self::new();
        req.feed_header(header_bytes.as_bytes()).expect("self-built header is always well-formed");
        if !body.is_empty() {
            req.feed_body(body).expect("declared content-length matches appended body");
        }
        req
    }

    pub fn get(url: &str) -> Self {
        Self::build("GET", url, &[], &[], false)
    }

    pub fn head(url: &str) -> Self {
        Self::build("HEAD", url, &[], &[], false)
    }

    pub fn post(url: &str, body: &[u8]) -> Self {
        Self::build("POST", url, &[], body, true)
    }

    pub fn put(url: &str, body: &[u8]) -> Self {
        Self::build("PUT", url, &[], body, true)
    }

    pub fn delete(url: &str) -> Self {
        Self::build("DELETE", url, &[], &[], false)
    }

    pub fn options(url: &str) -> Self {
        Self::build("OPTIONS", url, &[], &[], false)
    }

    pub fn trace(url: &str) -> Self {
        Self::build("TRACE", url, &[], &[], false)
    }

    /// Appends one more header and re-derives the wire representation from
    /// scratch, keeping header bytes and body bytes fed through the parser
    /// separately (the terminator scan must never run past the body).
    pub fn with_header(self, name: &str, value: &str) -> Self {
        let method = self.method().to_string();
        let url = self.url().to_string();
        let has_body = self.content_length().is_some();
        let mut owned_headers: Vec<(String, String)> =
            self.headers().into_iter().map(|(n, v)| (n.to_string(), v.to_string())).collect();
        owned_headers.retain(|(n, _)| !n.eq_ignore_ascii_case("content-length"));
        owned_headers.push((name.to_string(), value.to_string()));
        let body = self.body().to_vec();

        let header_refs: Vec<(&str, &str)> =
            owned_headers.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        Self::build(&method, &url, &header_refs, &body, has_body)
    }

    pub fn wire_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_round_trips_through_parser() {
        let built = HttpRequest::get("/x").with_header("Host", "a");
        let wire = built.wire_bytes().to_vec();

        let mut parsed = HttpRequest::new();
        assert!(parsed.feed_header(&wire).unwrap());
        assert!(parsed.feed_body(&[]).unwrap());

        assert_eq!(parsed.method(), "GET");
        assert_eq!(parsed.url(), "/x");
        assert_eq!(parsed.protocol(), "HTTP/1.1");
        assert_eq!(parsed.header("Host"), Some("a"));
    }

    #[test]
    fn fragmented_header_arrival_matches_single_chunk() {
        let whole = b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n";
        let (first, second) = whole.split_at(18); // splits inside "Host"

        let mut fragmented = HttpRequest::new();
        assert!(!fragmented.feed_header(first).unwrap());
        assert!(fragmented.feed_header(second).unwrap());

        let mut whole_parsed = HttpRequest::new();
        assert!(whole_parsed.feed_header(whole).unwrap());

        assert_eq!(fragmented.method(), whole_parsed.method());
        assert_eq!(fragmented.url(), whole_parsed.url());
        assert_eq!(fragmented.header("Host"), whole_parsed.header("Host"));
    }

    #[test]
    fn empty_header_name_sets_error_flag_via_feed() {
        let data = b"GET / HTTP/1.1\r\n: bad\r\n\r\n";
        let mut req = HttpRequest::new();
        let err = req.feed_header(data).unwrap_err();
        assert!(matches!(err, HttpError::EmptyHeaderName));
    }

    #[test]
    fn body_completes_at_declared_content_length() {
        let mut req = HttpRequest::new();
        req.feed_header(b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\n").unwrap();
        assert!(!req.feed_body(b"he").unwrap());
        assert!(req.feed_body(b"llo").unwrap());
        assert_eq!(req.body(), b"hello");
    }

    #[test]
    fn cookies_preserve_order() {
        let mut req = HttpRequest::new();
        req.feed_header(b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\n\r\n").unwrap();
        assert_eq!(
            req.cookies(),
            &[("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn clear_resets_to_defaults() {
        let mut req = HttpRequest::new();
        req.feed_header(b"GET / HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
        req.clear();
        assert_eq!(req.buffer.size(), 0);
        assert_eq!(req.headers().len(), 0);
        assert!(!req.error_set());
        assert_eq!(req.method(), "");
    }
}
