//! Growable byte container with explicit size/capacity/offset bookkeeping.
//!
//! Mirrors the role the HTTP codec needs: a single backing store that both the
//! incremental parser and the emitter read from and write into, with the size
//! tracked independently of the underlying allocation so `reserve`/`resize`
//! behave predictably for callers that slice into the buffer by index.

use std::str::Utf8Error;

/// A contiguous, growable region of bytes.
///
/// Not thread-safe: every owner (session, HTTP message, WS engine) must
/// serialize its own access, exactly as the components built on top of it do.
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    size: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new(), size: 0 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0u8; capacity], size: 0 }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.size]
    }

    /// Grows capacity geometrically (x2) until it is at least `n`. A no-op if
    /// capacity is already >= n.
    pub fn reserve(&mut self, n: usize) {
        if n <= self.data.len() {
            return;
        }
        let mut new_cap = self.data.len().max(1);
        while new_cap < n {
            new_cap *= 2;
        }
        self.data.resize(new_cap, 0);
    }

    /// Truncates to `n` if `n < size`, else zero-fills up to `n` (growing
    /// capacity first if needed).
    pub fn resize(&mut self, n: usize) {
        if n < self.size {
            self.size = n;
            return;
        }
        self.reserve(n);
        self.size = n;
    }

    pub fn clear(&mut self) {
        self.size = 0;
    }

    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let offset = self.size;
        self.reserve(self.size + bytes.len());
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
        offset
    }

    pub fn append_str(&mut self, text: &str) -> usize {
        self.append(text.as_bytes())
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.size {
            Some(self.data[index])
        } else {
            None
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn extract_string(&self, offset: usize, len: usize) -> Result<String, Utf8Error> {
        std::str::from_utf8(self.slice(offset, len)).map(|s| s.to_string())
    }

    /// Removes `n` bytes from the front, shifting the remainder down. Used by
    /// the send queue when swapping the flush buffer out from under a
    /// partially-written snapshot is not desired; most callers instead use
    /// `clear` plus a fresh append (see `session::SendQueue`).
    pub fn drain_front(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if n >= self.size {
            self.clear();
            return;
        }
        self.data.copy_within(n..self.size, 0);
        self.size -= n;
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = ByteBuffer::new();
        buf.append(bytes);
        buf
    }
}
