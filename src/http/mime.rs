//! Extension-to-MIME-type lookup for the static content cache.

const TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("txt", "text/plain; charset=utf-8"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("wasm", "application/wasm"),
    ("pdf", "application/pdf"),
];

/// Falls back to `application/octet-stream` for unrecognized or missing
/// extensions.
pub fn from_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extension_resolves() {
        assert_eq!(from_path("index.html"), "text/html; charset=utf-8");
        assert_eq!(from_path("style.css"), "text/css; charset=utf-8");
    }

    #[test]
    fn unknown_extension_falls_back() {
        assert_eq!(from_path("archive.tar.gz"), "application/octet-stream");
        assert_eq!(from_path("noext"), "application/octet-stream");
    }
}
