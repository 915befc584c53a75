//! Buffer metadata types.

use crate::clock::ClockTime;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer marks end of stream.
    pub eos: bool,
    /// Buffer contains a sync point (keyframe equivalent).
    pub sync_point: bool,
    /// Buffer follows a gap in the stream (e.g. after a flush or seek).
    pub discontinuity: bool,
}

/// Metadata associated with a buffer.
///
/// Contains timing information, the byte position in the source stream and
/// the elementary track the buffer belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub pts: ClockTime,

    /// Decode timestamp.
    pub dts: ClockTime,

    /// Duration of this buffer's content.
    pub duration: ClockTime,

    /// Byte offset of the first byte in the original source.
    pub offset: Option<u64>,

    /// Elementary track identifier.
    pub track_id: Option<u32>,

    /// Buffer flags.
    pub flags: BufferFlags,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            pts: ClockTime::NONE,
            dts: ClockTime::NONE,
            duration: ClockTime::NONE,
            offset: None,
            track_id: None,
            flags: BufferFlags::default(),
        }
    }
}

impl Metadata {
    /// Create new metadata with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata for bytes starting at `offset` in the source stream.
    pub fn at_offset(offset: u64) -> Self {
        Self {
            offset: Some(offset),
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = pts;
        self
    }

    /// Set the decode timestamp.
    pub fn with_dts(mut self, dts: ClockTime) -> Self {
        self.dts = dts;
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.duration = duration;
        self
    }

    /// Set the track identifier.
    pub fn with_track(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    /// Mark this buffer as end-of-stream.
    pub fn with_eos(mut self) -> Self {
        self.flags.eos = true;
        self
    }

    /// Check if this buffer marks end of stream.
    pub fn is_eos(&self) -> bool {
        self.flags.eos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_times_are_unset() {
        let meta = Metadata::new();
        assert!(meta.pts.is_none());
        assert!(meta.dts.is_none());
        assert!(meta.offset.is_none());
        assert!(!meta.is_eos());
    }

    #[test]
    fn test_builder() {
        let meta = Metadata::at_offset(42)
            .with_pts(ClockTime::from_millis(40))
            .with_track(1)
            .with_eos();
        assert_eq!(meta.offset, Some(42));
        assert_eq!(meta.pts.millis(), 40);
        assert_eq!(meta.track_id, Some(1));
        assert!(meta.is_eos());
    }
}
