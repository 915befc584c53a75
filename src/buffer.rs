//! Buffer type passed between filters.
//!
//! Payloads are reference-counted [`Bytes`], so cloning a buffer or taking a
//! sub-slice never copies the data. The [`DataPacker`](crate::demux::DataPacker)
//! relies on this to trim consumed prefixes in place.

use crate::metadata::Metadata;
use bytes::Bytes;

/// A chunk of media data with its metadata.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Bytes,
    metadata: Metadata,
}

impl Buffer {
    /// Create a new buffer.
    pub fn new(data: impl Into<Bytes>, metadata: Metadata) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// Create a buffer with default metadata.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(data, Metadata::default())
    }

    /// Create an empty end-of-stream buffer.
    pub fn eos() -> Self {
        Self::new(Bytes::new(), Metadata::default().with_eos())
    }

    /// Get the buffer's metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get mutable access to the buffer's metadata.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Replace the metadata, builder style.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Get the payload as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Create a view of `len` bytes starting at `offset`.
    ///
    /// The byte offset in the metadata is shifted accordingly.
    ///
    /// # Panics
    ///
    /// Panics if `offset + len > self.len()`.
    pub fn slice(&self, offset: usize, len: usize) -> Buffer {
        assert!(offset + len <= self.len(), "slice exceeds buffer bounds");
        let mut metadata = self.metadata.clone();
        metadata.offset = metadata.offset.map(|o| o + offset as u64);
        Buffer {
            data: self.data.slice(offset..offset + len),
            metadata,
        }
    }

    /// Drop the first `count` bytes in place.
    pub(crate) fn advance(&mut self, count: usize) {
        let count = count.min(self.data.len());
        self.data = self.data.slice(count..);
        if let Some(offset) = self.metadata.offset.as_mut() {
            *offset += count as u64;
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("offset", &self.metadata.offset)
            .field("pts", &self.metadata.pts)
            .field("eos", &self.metadata.flags.eos)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_slice_shifts_offset() {
        let buffer = Buffer::new(&b"0123456789"[..], Metadata::at_offset(100));
        let view = buffer.slice(3, 4);
        assert_eq!(view.as_bytes(), b"3456");
        assert_eq!(view.metadata().offset, Some(103));
    }

    #[test]
    fn test_buffer_advance() {
        let mut buffer = Buffer::new(&b"abcdef"[..], Metadata::at_offset(10));
        buffer.advance(2);
        assert_eq!(buffer.as_bytes(), b"cdef");
        assert_eq!(buffer.metadata().offset, Some(12));

        buffer.advance(100);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_with_metadata() {
        let buffer = Buffer::from_bytes(&b"frame"[..]).with_metadata(Metadata::new().with_track(2));
        assert_eq!(buffer.metadata().track_id, Some(2));
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_eos_buffer() {
        let buffer = Buffer::eos();
        assert!(buffer.is_empty());
        assert!(buffer.metadata().is_eos());
    }
}
