//! Incremental HTTP response parser/emitter, mirroring
//! [`crate::http::request::HttpRequest`]'s shared-buffer design.

use crate::buffer::ByteBuffer;
use crate::error::HttpError;
use crate::http::headers::{self, HeaderSpan, SetCookie, Span};
use crate::http::{mime, status};

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    buffer: ByteBuffer,
    cache_size: usize,
    protocol: Span,
    status: u16,
    phrase: Span,
    headers: Vec<HeaderSpan>,
    body_index: usize,
    body_size: usize,
    content_length: Option<usize>,
    header_phase_done: bool,
    error_set: bool,
}

impl HttpResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cache_size = 0;
        self.protocol = Span::default();
        self.status = 0;
        self.phrase = Span::default();
        self.headers.clear();
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

    pub fn protocol(&self) -> &str {
        self.protocol.as_str(&self.buffer)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn phrase(&self) -> &str {
        self.phrase.as_str(&self.buffer)
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

    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn body(&self) -> &[u8] {
        self.buffer.slice(self.body_index, self.body_size)
    }

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
        self.parse_status_line(&data[..line_end])?;
        self.headers = headers::parse_headers(&data, line_end + 2, body_start)?;

        if let Some(v) = headers::header_value(&self.buffer, &self.headers, "content-length") {
            self.content_length = v.trim().parse::<usize>().ok();
        }

        self.body_index = body_start;
        self.body_size = data.len().saturating_sub(body_start);
        self.header_phase_done = true;
        Ok(true)
    }

    fn parse_status_line(&mut self, line: &[u8]) -> Result<(), HttpError> {
        let mut parts = line.splitn(3, |&b| b == b' ');
        let protocol = parts.next().ok_or(HttpError::MalformedStartLine)?;
        let code = parts.next().ok_or(HttpError::MalformedStartLine)?;
        let phrase = parts.next().unwrap_or(&[]);
        if protocol.is_empty() || code.is_empty() || !code.iter().all(|b| b.is_ascii_digit()) {
            self.error_set = true;
            return Err(HttpError::MalformedStartLine);
        }
        let status: u16 = std::str::from_utf8(code)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(HttpError::InvalidStatusCode)?;

        let protocol_off = 0;
        let code_off = protocol.len() + 1;
        let phrase_off = code_off + code.len() + 1;
        self.protocol = Span::new(protocol_off, protocol.len());
        self.status = status;
        self.phrase = Span::new(phrase_off, phrase.len());
        Ok(())
    }

    /// Feeds newly arrived body bytes. Without a declared `Content-Length`
    /// the body is considered complete once the trailing four bytes form
    /// `CRLFCRLF` — the fallback completion signal for length-less
    /// responses.
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
            None => {
                let data = self.buffer.as_slice();
                Ok(data.len() >= 4 && &data[data.len() - 4..] == b"\r\n\r\n")
            }
        }
    }

    fn status_line(protocol: &str, status: u16) -> String {
        format!("{protocol} {status} {}\r\n", status::reason_phrase(status))
    }

    /// Responses always declare their length explicitly, even when the body
    /// is empty: `Content-Length: 0`, no bytes after the blank line.
    fn build(status_code: u16, headers: &[(&str, &str)], body: &[u8]) -> Self {
        let mut header_bytes = Self::status_line("HTTP/1.1", status_code);
        for (name, value) in headers {
            header_bytes.push_str(&format!("{name}: {value}\r\n"));
        }
        header_bytes.push_str(&format!("Content-Length: {}\r\n", body.len()));
        header_bytes.push_str("\r\n");

        let mut resp = Self::new();
        resp.feed_header(header_bytes.as_bytes()).expect("self-built header is always well-formed");
        if !body.is_empty() {
            resp.feed_body(body).expect("declared content-length matches appended body");
        }
        resp
    }

    /// `200 OK` with no body.
    pub fn ok() -> Self {
        Self::build(200, &[], &[])
    }

    /// `200 OK` carrying a file's bytes, content-typed by extension via
    /// [`mime::from_path`].
    pub fn ok_with_content(path: &str, body: &[u8]) -> Self {
        let content_type = mime::from_path(path).to_string();
        Self::build(200, &[("Content-Type", content_type.as_str())], body)
    }

    /// `500 Internal Server Error` carrying a plain-text message.
    pub fn error(message: &str) -> Self {
        Self::build(500, &[("Content-Type", "text/plain; charset=utf-8")], message.as_bytes())
    }

    /// `200 OK` with an `Allow` header for `OPTIONS` responses.
    pub fn options(allowed_methods: &str) -> Self {
        Self::build(200, &[("Allow", allowed_methods)], &[])
    }

    /// `200 OK` echoing the original request back as the body, as RFC 7231
    /// requires for `TRACE`.
    pub fn trace_echo(request_bytes: &[u8]) -> Self {
        Self::build(200, &[("Content-Type", "message/http")], request_bytes)
    }

    /// Strips the body from an otherwise-complete response, for `HEAD`.
    pub fn head_from(mut other: Self) -> Self {
        other.buffer.resize(other.body_index);
        other.body_size = 0;
        other
    }

    pub fn with_status(status_code: u16) -> Self {
        Self::build(status_code, &[], &[])
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        let status_code = self.status();
        let mut owned_headers: Vec<(String, String)> =
            self.headers().into_iter().map(|(n, v)| (n.to_string(), v.to_string())).collect();
        owned_headers.retain(|(n, _)| !n.eq_ignore_ascii_case("content-length"));
        owned_headers.push((name.to_string(), value.to_string()));
        let body = self.body().to_vec();

        let header_refs: Vec<(&str, &str)> =
            owned_headers.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        Self::build(status_code, &header_refs, &body)
    }

    /// Appends a `Set-Cookie` header built from `cookie`. Multiple calls
    /// each add their own `Set-Cookie` line, as the header permits.
    pub fn with_cookie(self, cookie: SetCookie) -> Self {
        self.with_header("Set-Cookie", &cookie.to_header_value())
    }

    pub fn wire_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_with_content_round_trips() {
        let built = HttpResponse::ok_with_content("x.txt", b"OK");
        let wire = built.wire_bytes().to_vec();

        let mut parsed = HttpResponse::new();
        assert!(parsed.feed_header(&wire).unwrap());
        assert!(parsed.feed_body(&[]).unwrap());

        assert_eq!(parsed.status(), 200);
        assert_eq!(parsed.phrase(), "OK");
        assert_eq!(parsed.body(), b"OK");
        assert_eq!(parsed.content_length(), Some(2));
    }

    #[test]
    fn unknown_status_code_gets_fallback_phrase() {
        let built = HttpResponse::with_status(499);
        assert_eq!(built.phrase(), "Unknown");
    }

    #[test]
    fn body_without_content_length_completes_on_trailing_crlfcrlf() {
        let mut resp = HttpResponse::new();
        resp.feed_header(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
        assert!(!resp.feed_body(b"partial").unwrap());
        assert!(resp.feed_body(b"\r\n\r\n").unwrap());
    }

    #[test]
    fn head_strips_body_but_keeps_headers() {
        let built = HttpResponse::ok_with_content("x.txt", b"payload");
        let head = HttpResponse::head_from(built);
        assert_eq!(head.body(), b"");
        assert_eq!(head.header("Content-Type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn empty_body_emits_zero_content_length_and_no_trailing_bytes() {
        let built = HttpResponse::ok();
        assert_eq!(built.wire_bytes(), b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(built.content_length(), Some(0));
    }

    #[test]
    fn set_cookie_header_carries_all_attributes() {
        let cookie = crate::http::headers::SetCookie::new("session", "abc123")
            .max_age(3600)
            .domain("example.com")
            .path("/")
            .secure()
            .same_site(crate::http::headers::SameSite::Strict)
            .http_only();
        let built = HttpResponse::ok().with_cookie(cookie);
        assert_eq!(
            built.header("Set-Cookie"),
            Some("session=abc123; Max-Age=3600; Domain=example.com; Path=/; Secure; SameSite=Strict; HttpOnly")
        );
    }
}
