//! Bump allocator over a fixed buffer.
//!
//! SRP service slots and resolved DNS-SD records copy their strings into a
//! private arena of fixed size. Allocations hand out [`Span`]s into the
//! arena; once any allocation fails the allocator remembers it so callers
//! can validate a whole batch with a single check.

/// Location of one allocation inside a [`FixedBufferAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    start: usize,
    len: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone)]
pub struct FixedBufferAllocator {
    buf: Box<[u8]>,
    used: usize,
    any_failed: bool,
}

impl FixedBufferAllocator {
    pub fn new(capacity: usize) -> Self {
        FixedBufferAllocator {
            buf: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
            any_failed: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.used
    }

    /// Forgets every allocation and zeroes the arena.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.used = 0;
        self.any_failed = false;
    }

    pub fn clone_bytes(&mut self, data: &[u8]) -> Option<Span> {
        if data.len() > self.remaining() {
            self.any_failed = true;
            return None;
        }
        let span = Span {
            start: self.used,
            len: data.len(),
        };
        self.buf[span.start..span.start + span.len].copy_from_slice(data);
        self.used += data.len();
        Some(span)
    }

    /// Copies a string, reserving a trailing NUL so the bytes can also be
    /// handed out as a C string.
    pub fn clone_str(&mut self, s: &str) -> Option<Span> {
        if s.len() + 1 > self.remaining() {
            self.any_failed = true;
            return None;
        }
        let span = self.clone_bytes(s.as_bytes())?;
        self.buf[self.used] = 0;
        self.used += 1;
        Some(span)
    }

    pub fn any_allocation_failed(&self) -> bool {
        self.any_failed
    }

    pub fn bytes(&self, span: Span) -> &[u8] {
        &self.buf[span.start..span.start + span.len]
    }

    /// Spans produced by [`FixedBufferAllocator::clone_str`] are valid UTF-8.
    pub fn str(&self, span: Span) -> &str {
        std::str::from_utf8(self.bytes(span)).unwrap_or_default()
    }
}
