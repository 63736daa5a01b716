//! Fixed-capacity accumulator for modem replies

use bytes::{Bytes, BytesMut};
use ntrip_shared::codec::contains_token;
use std::borrow::Cow;

/// Bounded reply buffer. Never grows past the capacity it was created with.
#[derive(Debug)]
pub struct ResponseBuffer {
    data: BytesMut,
    capacity: usize,
}

impl ResponseBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Copy as much of `src` as fits; returns the number of bytes taken
    pub fn fill(&mut self, src: &[u8]) -> usize {
        let take = src.len().min(self.remaining());
        self.data.extend_from_slice(&src[..take]);
        take
    }

    /// Substring search over the accumulated bytes
    pub fn contains(&self, token: &str) -> bool {
        contains_token(&self.data, token.as_bytes())
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    #[cfg(test)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data.freeze()
    }
}
