//! Low-level header-line scanning shared by the request and response
//! codecs, indexing into one shared [`ByteBuffer`] instead of owning
//! copies per header.

use crate::buffer::ByteBuffer;
use crate::error::HttpError;

/// A byte range (offset, length) into a message's backing buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    pub fn as_str<'b>(&self, buf: &'b ByteBuffer) -> &'b str {
        std::str::from_utf8(buf.slice(self.offset, self.len)).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One parsed header: (name span, value span).
#[derive(Debug, Clone, Copy)]
pub struct HeaderSpan {
    pub name: Span,
    pub value: Span,
}

/// Scans `data[from..]` for the CRLFCRLF header terminator. Returns the
/// index of the byte just after the terminator (the start of the body) if
/// found. Only the tail starting at `from` is re-examined, so repeated
/// calls as bytes trickle in amortize to O(n) total: only the un-scanned
/// tail is re-examined on each call.
pub fn find_header_terminator(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 4 {
        return None;
    }
    // Start up to 3 bytes before `from` in case the terminator straddles
    // the previous scan boundary.
    let start = from.saturating_sub(3);
    let window = &data[start..];
    for i in 0..window.len().saturating_sub(3) {
        if &window[i..i + 4] == b"\r\n\r\n" {
            return Some(start + i + 4);
        }
    }
    None
}

/// Splits `data[start..limit]` (the region between the start-line CRLF and
/// the header terminator) into header spans, one per CRLF-delimited line.
/// Empty header values are permitted; empty names are rejected.
pub fn parse_headers(data: &[u8], start: usize, limit: usize) -> Result<Vec<HeaderSpan>, HttpError> {
    let mut headers = Vec::new();
    let mut pos = start;
    while pos < limit {
        let line_end = find_crlf(data, pos, limit).ok_or(HttpError::MalformedHeader)?;
        let line = &data[pos..line_end];
        if line.is_empty() {
            break;
        }
        let colon = line.iter().position(|&b| b == b':').ok_or(HttpError::MalformedHeader)?;
        if colon == 0 {
            return Err(HttpError::EmptyHeaderName);
        }
        let name_span = Span::new(pos, colon);
        let mut value_start = colon + 1;
        while value_start < line.len() && (line[value_start] == b' ' || line[value_start] == b'\t') {
            value_start += 1;
        }
        let value_span = Span::new(pos + value_start, line.len() - value_start);
        headers.push(HeaderSpan { name: name_span, value: value_span });
        pos = line_end + 2;
    }
    Ok(headers)
}

pub(crate) fn find_crlf(data: &[u8], from: usize, limit: usize) -> Option<usize> {
    let end = limit.min(data.len());
    let mut i = from;
    while i + 1 < end {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

pub fn header_value<'b>(
    buf: &'b ByteBuffer,
    headers: &[HeaderSpan],
    name: &str,
) -> Option<&'b str> {
    headers
        .iter()
        .find(|h| h.name.as_str(buf).eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str(buf))
}

/// Splits a `Cookie: k1=v1; k2=v2` header value into ordered pairs,
/// splitting on `';'` then `'='`.
pub fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            match pair.split_once('=') {
                Some((k, v)) => Some((k.trim().to_string(), v.trim().to_string())),
                None => Some((pair.to_string(), String::new())),
            }
        })
        .collect()
}

/// `SameSite` attribute values for a [`SetCookie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Builds a single `Set-Cookie` header value: `name=value; Max-Age=N[;
/// Domain=d][; Path=p][; Secure][; SameSite=Strict][; HttpOnly]`.
#[derive(Debug, Clone)]
pub struct SetCookie {
    name: String,
    value: String,
    max_age: Option<i64>,
    domain: Option<String>,
    path: Option<String>,
    secure: bool,
    same_site: Option<SameSite>,
    http_only: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            max_age: None,
            domain: None,
            path: None,
            secure: false,
            same_site: None,
            http_only: false,
        }
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn same_site(mut self, policy: SameSite) -> Self {
        self.same_site = Some(policy);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    /// Renders the `Set-Cookie` header value in the fixed attribute order
    /// `Max-Age`, `Domain`, `Path`, `Secure`, `SameSite`, `HttpOnly`.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(age) = self.max_age {
            out.push_str(&format!("; Max-Age={age}"));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={path}"));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(policy) = self.same_site {
            out.push_str(&format!("; SameSite={}", policy.as_str()));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_found_once_fully_arrived() {
        let data = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";
        let idx = find_header_terminator(data, 0).unwrap();
        assert_eq!(idx, data.len());
    }

    #[test]
    fn terminator_absent_mid_header() {
        let data = b"GET / HTTP/1.1\r\nHost: a\r\n";
        assert!(find_header_terminator(data, 0).is_none());
    }

    #[test]
    fn empty_header_name_rejected() {
        let data = b"GET / HTTP/1.1\r\n: value\r\n\r\n";
        let start = 16; // after request line CRLF
        let limit = data.len() - 2;
        let err = parse_headers(data, start, limit).unwrap_err();
        assert!(matches!(err, HttpError::EmptyHeaderName));
    }

    #[test]
    fn empty_header_value_accepted() {
        let data = b"GET / HTTP/1.1\r\nX-Empty:\r\n\r\n";
        let start = 16;
        let limit = data.len() - 2;
        let headers = parse_headers(data, start, limit).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].value.len, 0);
    }

    #[test]
    fn cookie_header_preserves_order() {
        let pairs = parse_cookie_header("a=1; b=2; c=3");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
    }
}
