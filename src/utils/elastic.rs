use bytes::{Bytes, BytesMut};

use crate::codec::ParserError;

/// Growable accumulation buffer with a hard upper bound.
///
/// Used to stitch fragmented NAL units back together. Exceeding
/// `max_size` is reported as [`ParserError::BufferOverflow`] and the
/// buffer keeps its previous contents.
#[derive(Debug)]
pub struct ElasticBuffer {
    buffer: BytesMut,
    max_size: usize,
}

impl ElasticBuffer {
    /// Creates a buffer with `initial_size` bytes reserved.
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(initial_size),
            max_size,
        }
    }

    /// Appends `data`.
    pub fn add_bytes(&mut self, data: &[u8]) -> Result<(), ParserError> {
        let required = self.buffer.len() + data.len();
        if required > self.max_size {
            return Err(ParserError::BufferOverflow {
                required,
                max: self.max_size,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Returns the accumulated bytes without clearing them.
    pub fn accumulated(&self) -> &[u8] {
        &self.buffer
    }

    /// Takes the accumulated bytes, leaving the buffer empty.
    ///
    /// Capacity is reclaimed once the returned `Bytes` is dropped.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Takes the first `at` accumulated bytes and keeps the rest.
    pub fn split_to(&mut self, at: usize) -> Bytes {
        self.buffer.split_to(at.min(self.buffer.len())).freeze()
    }

    /// Discards the accumulated bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of accumulated bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true when nothing is accumulated.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
