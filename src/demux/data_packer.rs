//! Offset-addressable staging buffer for pull-mode demuxers.
//!
//! A [`DataPacker`] sits between a byte source and a parser. The source
//! pushes chunks of arbitrary size tagged with their stream offset; the
//! parser asks for exact ranges `[offset, offset + size)` which may start in
//! the middle of one chunk and end several chunks later.
//!
//! Queued chunks are always contiguous: chunk *i* ends where chunk *i + 1*
//! starts. A push that breaks contiguity discards the queue first.
//!
//! The packer keeps the data of the most recent read until a later read
//! moves past it, so a parser may re-read (rewind within) the last range it
//! consumed without going back to the source.

use crate::buffer::Buffer;
use crate::clock::ClockTime;
use crate::error::{Error, Result};
use crate::observability::{
    record_packer_depth, record_packer_flush, record_packer_push, record_packer_read,
};
use bytes::BytesMut;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Duration;

/// Configuration for a [`DataPacker`].
#[derive(Debug, Clone)]
pub struct DataPackerConfig {
    /// Maximum number of queued chunks before pushes block.
    pub capacity: usize,
    /// Period at which blocked callers re-check for stop.
    pub wait_interval: Duration,
}

impl Default for DataPackerConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            wait_interval: Duration::from_secs(1),
        }
    }
}

impl DataPackerConfig {
    /// Set the capacity in chunks.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set the wake-up period of blocked callers.
    pub fn with_wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }
}

/// Answer to [`DataPacker::is_data_available`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeStatus {
    /// Whether the requested range can be read now.
    pub available: bool,
    /// Where the caller should continue fetching from.
    pub cur_offset: u64,
}

/// A read position inside the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    index: usize,
    buffer_offset: usize,
    media_offset: u64,
}

struct PackerState {
    queue: VecDeque<Buffer>,
    media_offset: u64,
    pts: ClockTime,
    dts: ClockTime,
    size: usize,
    eos: bool,
    stopped: bool,
    prev_get: Option<Position>,
    current_get: Option<Position>,
}

impl PackerState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            media_offset: 0,
            pts: ClockTime::NONE,
            dts: ClockTime::NONE,
            size: 0,
            eos: false,
            stopped: false,
            prev_get: None,
            current_get: None,
        }
    }

    fn end_offset(&self) -> u64 {
        self.media_offset + self.size as u64
    }

    fn flush(&mut self) {
        self.queue.clear();
        self.size = 0;
        self.media_offset = 0;
        self.pts = ClockTime::NONE;
        self.dts = ClockTime::NONE;
        self.prev_get = None;
        self.current_get = None;
        record_packer_flush();
        record_packer_depth(0);
    }

    /// Find the chunk holding `offset`, scanning from the front.
    fn locate(&self, offset: u64) -> Option<Position> {
        if offset < self.media_offset || offset >= self.end_offset() {
            return None;
        }
        let mut start = self.media_offset;
        for (index, buffer) in self.queue.iter().enumerate() {
            let end = start + buffer.len() as u64;
            if offset < end {
                return Some(Position {
                    index,
                    buffer_offset: (offset - start) as usize,
                    media_offset: offset,
                });
            }
            start = end;
        }
        None
    }

    /// Copy up to `size` bytes starting at `offset`.
    ///
    /// Returns the data and the position just past the last byte copied.
    /// A range inside one chunk is returned without copying.
    fn copy_range(&self, offset: u64, size: usize) -> Option<(Buffer, Position)> {
        let start = self.locate(offset)?;
        let available = (self.end_offset() - offset) as usize;
        let wanted = size.min(available);

        let first = &self.queue[start.index];
        let first_len = wanted.min(first.len() - start.buffer_offset);
        if first_len == wanted {
            let out = first.slice(start.buffer_offset, wanted);
            let end = Position {
                index: start.index,
                buffer_offset: start.buffer_offset + wanted,
                media_offset: offset + wanted as u64,
            };
            return Some((out, end));
        }

        let metadata = first.slice(start.buffer_offset, 0).metadata().clone();
        let mut data = BytesMut::with_capacity(wanted);
        data.extend_from_slice(&first.as_bytes()[start.buffer_offset..start.buffer_offset + first_len]);
        let mut end = Position {
            index: start.index,
            buffer_offset: start.buffer_offset + first_len,
            media_offset: offset + first_len as u64,
        };
        for (index, buffer) in self.queue.iter().enumerate().skip(start.index + 1) {
            let remaining = wanted - data.len();
            if remaining == 0 {
                break;
            }
            let take = remaining.min(buffer.len());
            data.extend_from_slice(&buffer.as_bytes()[..take]);
            end = Position {
                index,
                buffer_offset: take,
                media_offset: end.media_offset + take as u64,
            };
        }
        Some((Buffer::new(data.freeze(), metadata), end))
    }

    /// Drop every byte before `boundary`.
    fn evict_before(&mut self, boundary: u64) {
        while let Some(front) = self.queue.front_mut() {
            let front_end = self.media_offset + front.len() as u64;
            if front_end <= boundary {
                self.size -= front.len();
                self.media_offset = front_end;
                self.queue.pop_front();
            } else {
                if boundary > self.media_offset {
                    let trim = (boundary - self.media_offset) as usize;
                    front.advance(trim);
                    self.size -= trim;
                    self.media_offset = boundary;
                }
                break;
            }
        }
        if let Some(front) = self.queue.front() {
            self.pts = front.metadata().pts;
            self.dts = front.metadata().dts;
        } else {
            self.media_offset = 0;
            self.pts = ClockTime::NONE;
            self.dts = ClockTime::NONE;
        }
        record_packer_depth(self.queue.len());
    }

    fn relocate(&self, position: Position) -> Position {
        self.locate(position.media_offset).unwrap_or(Position {
            index: self.queue.len(),
            buffer_offset: 0,
            media_offset: position.media_offset,
        })
    }

    /// Trim data the previous read delivered, once a read moves past it.
    fn remove_old_data(&mut self) {
        let Some(current) = self.current_get else {
            return;
        };
        match self.prev_get {
            None => self.prev_get = Some(current),
            Some(prev) if current.media_offset > prev.media_offset => {
                self.evict_before(prev.media_offset);
                self.prev_get = Some(self.relocate(current));
                self.current_get = self.prev_get;
            }
            Some(_) => {}
        }
    }
}

/// Bounded, offset-addressable byte staging buffer.
///
/// All state sits behind one mutex. Pushes block while the queue is full
/// and reads block while it is empty; both wake periodically so a
/// concurrent [`stop`](Self::stop) is seen promptly.
///
/// # Example
///
/// ```rust
/// use cadence::buffer::Buffer;
/// use cadence::demux::DataPacker;
///
/// let packer = DataPacker::new();
/// packer.push_data(Buffer::from_bytes(&b"1234567890"[..]), 0);
/// packer.push_data(Buffer::from_bytes(&b"abcd"[..]), 10);
///
/// let status = packer.is_data_available(3, 2);
/// assert!(status.available);
/// assert_eq!(status.cur_offset, 10);
/// assert_eq!(packer.get_range(3, 2).unwrap().as_bytes(), b"45");
/// ```
pub struct DataPacker {
    config: DataPackerConfig,
    state: Mutex<PackerState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl DataPacker {
    /// Create a packer with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DataPackerConfig::default())
    }

    /// Create a packer with explicit configuration.
    pub fn with_config(config: DataPackerConfig) -> Self {
        let config = DataPackerConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            config,
            state: Mutex::new(PackerState::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &DataPackerConfig {
        &self.config
    }

    /// Queue `buffer`, whose first byte sits at stream offset `offset`.
    ///
    /// Blocks while the queue is full. Returns `false` without queuing if
    /// the packer is stopped. Empty buffers are ignored.
    pub fn push_data(&self, mut buffer: Buffer, offset: u64) -> bool {
        let mut state = self.state.lock();
        while state.queue.len() >= self.config.capacity && !state.stopped {
            self.not_full.wait_for(&mut state, self.config.wait_interval);
        }
        if state.stopped {
            tracing::debug!("data packer stopped, dropping {} bytes at {}", buffer.len(), offset);
            return false;
        }
        if buffer.is_empty() {
            return true;
        }

        if !state.queue.is_empty() && offset != state.end_offset() {
            tracing::warn!(
                "discontinuous push at {} (queue ends at {}), flushing",
                offset,
                state.end_offset()
            );
            state.flush();
        }
        if state.queue.is_empty() {
            state.media_offset = offset;
            state.pts = buffer.metadata().pts;
            state.dts = buffer.metadata().dts;
        }

        buffer.metadata_mut().offset = Some(offset);
        record_packer_push(buffer.len());
        state.size += buffer.len();
        state.queue.push_back(buffer);
        record_packer_depth(state.queue.len());
        self.not_empty.notify_all();
        true
    }

    /// Check whether `[offset, offset + size)` is buffered.
    ///
    /// On a hit, `cur_offset` is the end of the chunk the range ends in. On
    /// a partial hit it is the end of the buffered data, where the caller
    /// should fetch the rest. If `offset` lies outside the buffered span the
    /// queue is discarded and `cur_offset` is `offset`.
    ///
    /// Once end of stream is set a partial hit counts as available, since
    /// no more data will arrive and a short read is the final answer.
    pub fn is_data_available(&self, offset: u64, size: usize) -> RangeStatus {
        let mut state = self.state.lock();
        let end = state.end_offset();
        if state.queue.is_empty() || offset < state.media_offset || offset > end {
            state.flush();
            self.not_full.notify_all();
            return RangeStatus {
                available: false,
                cur_offset: offset,
            };
        }

        let wanted_end = offset + size as u64;
        let mut chunk_end = state.media_offset;
        for buffer in &state.queue {
            chunk_end += buffer.len() as u64;
            if chunk_end >= wanted_end {
                return RangeStatus {
                    available: true,
                    cur_offset: chunk_end,
                };
            }
        }
        RangeStatus {
            available: state.eos,
            cur_offset: end,
        }
    }

    fn wait_for_data(&self, state: &mut MutexGuard<'_, PackerState>) -> Result<()> {
        while state.queue.is_empty() && !state.eos && !state.stopped {
            self.not_empty.wait_for(state, self.config.wait_interval);
        }
        if state.stopped {
            return Err(Error::InvalidOperation);
        }
        if state.queue.is_empty() {
            return Err(Error::EndOfStream);
        }
        Ok(())
    }

    fn read_at(state: &PackerState, offset: u64, size: usize) -> Result<(Buffer, Position)> {
        match state.copy_range(offset, size) {
            Some(found) => Ok(found),
            None if state.eos && offset >= state.end_offset() => Err(Error::EndOfStream),
            None => Err(Error::NotExisted),
        }
    }

    /// Read `[offset, offset + size)` in seekable mode.
    ///
    /// Call [`is_data_available`](Self::is_data_available) first. Blocks
    /// while the queue is empty. The result may be shorter than `size` when
    /// the buffered data ends first; check its length.
    ///
    /// Data from the previous read is dropped once this read moves past it.
    /// When end of stream is set and the read reaches the end of the
    /// buffered data, the queue is discarded.
    ///
    /// # Errors
    ///
    /// - [`Error::EndOfStream`] if end of stream is set and nothing is
    ///   buffered at `offset`.
    /// - [`Error::NotExisted`] if `offset` is not buffered.
    /// - [`Error::InvalidOperation`] if the packer is stopped.
    pub fn get_range(&self, offset: u64, size: usize) -> Result<Buffer> {
        let mut state = self.state.lock();
        self.wait_for_data(&mut state)?;
        let (out, end) = Self::read_at(&state, offset, size)?;

        if state.eos && end.media_offset >= state.end_offset() {
            state.flush();
        } else {
            state.current_get = Some(end);
            state.remove_old_data();
        }
        record_packer_read(out.len());
        self.not_full.notify_all();
        Ok(out)
    }

    /// Read up to `size` bytes from the front of the queue in live mode.
    ///
    /// Consumed data is removed immediately. Blocks while the queue is
    /// empty, unless end of stream is set.
    ///
    /// # Errors
    ///
    /// - [`Error::EndOfStream`] if the queue is empty at end of stream.
    /// - [`Error::InvalidOperation`] if the packer is stopped.
    pub fn get_range_live(&self, size: usize) -> Result<Buffer> {
        let mut state = self.state.lock();
        self.wait_for_data(&mut state)?;
        let offset = state.media_offset;
        let (out, end) = Self::read_at(&state, offset, size)?;
        state.evict_before(end.media_offset);
        state.prev_get = None;
        state.current_get = None;
        record_packer_read(out.len());
        self.not_full.notify_all();
        Ok(out)
    }

    /// Read `[offset, offset + size)` without consuming anything.
    ///
    /// Blocks and fails like [`get_range`](Self::get_range).
    pub fn peek_range(&self, offset: u64, size: usize) -> Result<Buffer> {
        let mut state = self.state.lock();
        self.wait_for_data(&mut state)?;
        Self::read_at(&state, offset, size).map(|(out, _)| out)
    }

    /// Discard all queued data and clear end of stream.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        state.flush();
        state.eos = false;
        self.not_full.notify_all();
    }

    /// Mark end of stream and wake blocked readers.
    pub fn set_eos(&self) {
        self.state.lock().eos = true;
        self.not_empty.notify_all();
    }

    /// Wake every blocked caller and refuse further work until
    /// [`start`](Self::start).
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Accept work again after [`stop`](Self::stop).
    ///
    /// End of stream survives a restart; only [`flush`](Self::flush)
    /// clears it.
    pub fn start(&self) {
        self.state.lock().stopped = false;
    }

    /// Check if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of queued bytes.
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    /// Stream offset of the first queued byte, or 0 when empty.
    pub fn media_offset(&self) -> u64 {
        self.state.lock().media_offset
    }

    /// Presentation time of the first queued chunk.
    pub fn pts(&self) -> ClockTime {
        self.state.lock().pts
    }

    /// Decode time of the first queued chunk.
    pub fn dts(&self) -> ClockTime {
        self.state.lock().dts
    }

    /// Check if end of stream is set.
    pub fn is_eos(&self) -> bool {
        self.state.lock().eos
    }

    /// Describe the queue and read cursors, for logs.
    pub fn debug_string(&self) -> String {
        let state = self.state.lock();
        let mut out = format!(
            "DataPacker(size={}, buffers={}, media_offset={}, eos={}, stopped={}, prev_get={:?}, current_get={:?})",
            state.size,
            state.queue.len(),
            state.media_offset,
            state.eos,
            state.stopped,
            state.prev_get.map(|p| (p.index, p.buffer_offset, p.media_offset)),
            state.current_get.map(|p| (p.index, p.buffer_offset, p.media_offset)),
        );
        let mut start = state.media_offset;
        for buffer in &state.queue {
            let end = start + buffer.len() as u64;
            let _ = write!(out, " [{}..{})", start, end);
            start = end;
        }
        out
    }
}

impl Default for DataPacker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataPacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.debug_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn chunk(data: &'static [u8]) -> Buffer {
        Buffer::from_bytes(data)
    }

    #[test]
    fn test_first_push_sets_base() {
        let packer = DataPacker::new();
        let buffer = Buffer::new(
            &b"abc"[..],
            Metadata::new()
                .with_pts(ClockTime::from_millis(40))
                .with_dts(ClockTime::from_millis(20)),
        );
        assert!(packer.push_data(buffer, 100));
        assert_eq!(packer.media_offset(), 100);
        assert_eq!(packer.pts(), ClockTime::from_millis(40));
        assert_eq!(packer.dts(), ClockTime::from_millis(20));
        assert_eq!(packer.size(), 3);
    }

    #[test]
    fn test_single_chunk_read_is_zero_copy() {
        let packer = DataPacker::new();
        let data = bytes::Bytes::from_static(b"0123456789");
        packer.push_data(Buffer::from_bytes(data.clone()), 0);
        let out = packer.get_range(2, 3).unwrap();
        assert_eq!(out.as_bytes(), b"234");
        assert_eq!(out.as_bytes().as_ptr(), data[2..].as_ptr());
        assert_eq!(out.metadata().offset, Some(2));
    }

    #[test]
    fn test_discontinuous_push_flushes() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"abcd"), 0);
        packer.push_data(chunk(b"wxyz"), 50);
        assert_eq!(packer.media_offset(), 50);
        assert_eq!(packer.size(), 4);
        assert_eq!(packer.len(), 1);
    }

    #[test]
    fn test_empty_push_ignored() {
        let packer = DataPacker::new();
        assert!(packer.push_data(Buffer::default(), 0));
        assert!(packer.is_empty());
    }

    #[test]
    fn test_cache_miss_flushes() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"abcd"), 10);

        let status = packer.is_data_available(2, 4);
        assert_eq!(
            status,
            RangeStatus {
                available: false,
                cur_offset: 2
            }
        );
        assert!(packer.is_empty());
        assert_eq!(packer.media_offset(), 0);
    }

    #[test]
    fn test_partial_hit_reports_buffered_end() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"abcd"), 0);
        packer.push_data(chunk(b"efgh"), 4);

        let status = packer.is_data_available(6, 10);
        assert!(!status.available);
        assert_eq!(status.cur_offset, 8);
        assert_eq!(packer.size(), 8);

        packer.set_eos();
        assert!(packer.is_data_available(6, 10).available);
    }

    #[test]
    fn test_rewind_keeps_previous_read() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"aaaa"), 0);
        packer.push_data(chunk(b"bbbb"), 4);
        packer.push_data(chunk(b"cccc"), 8);

        assert_eq!(packer.get_range(0, 4).unwrap().as_bytes(), b"aaaa");
        assert_eq!(packer.get_range(0, 2).unwrap().as_bytes(), b"aa");
        assert_eq!(packer.media_offset(), 0);

        // Reading past the previous end drops everything before that end.
        assert_eq!(packer.get_range(2, 4).unwrap().as_bytes(), b"aabb");
        assert_eq!(packer.media_offset(), 4);

        assert_eq!(packer.get_range(6, 4).unwrap().as_bytes(), b"bbcc");
        assert_eq!(packer.media_offset(), 6);
        assert_eq!(packer.size(), 6);
    }

    #[test]
    fn test_eos_read_to_end_flushes() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"tail"), 0);
        packer.set_eos();

        let out = packer.get_range(1, 10).unwrap();
        assert_eq!(out.as_bytes(), b"ail");
        assert!(packer.is_empty());
        assert_eq!(packer.get_range(4, 1), Err(Error::EndOfStream));
    }

    #[test]
    fn test_unbuffered_offset() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"abcd"), 0);
        assert_eq!(packer.get_range(9, 1), Err(Error::NotExisted));
        assert_eq!(packer.peek_range(9, 1), Err(Error::NotExisted));
    }

    #[test]
    fn test_flush_clears_eos() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"abcd"), 0);
        packer.set_eos();
        packer.flush();
        assert!(packer.is_empty());
        assert!(!packer.is_eos());
    }

    #[test]
    fn test_debug_string() {
        let packer = DataPacker::new();
        packer.push_data(chunk(b"abcd"), 0);
        packer.push_data(chunk(b"ef"), 4);
        let text = packer.debug_string();
        assert!(text.contains("size=6"));
        assert!(text.contains("[0..4)"));
        assert!(text.contains("[4..6)"));
    }
}
