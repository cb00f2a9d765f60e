//! Smol utilities for logging

/// Make an Ascii-safe string
pub fn ascii_escape(s: &[u8]) -> String {
    s.escape_ascii().to_string()
}

/// Keeps the last `capacity` bytes written to it
///
/// Handlers can be chatty on stderr; only the tail is worth attaching to a
/// failure report.
#[derive(Debug)]
pub struct Tail {
    buf: Vec<u8>,
    capacity: usize
}

impl Tail {
    pub fn new(capacity: usize) -> Tail {
        Tail { buf: Vec::new(), capacity: capacity }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.len() >= self.capacity {
            self.buf.clear();
            self.buf.extend_from_slice(&bytes[bytes.len() - self.capacity ..]);
            return;
        }

        let overflow = (self.buf.len() + bytes.len())
            .saturating_sub(self.capacity);
        self.buf.drain(.. overflow);
        self.buf.extend_from_slice(bytes);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}
