//! Integration tests for the DataPacker staging buffer.

use cadence::buffer::Buffer;
use cadence::demux::{DataPacker, DataPackerConfig, RangeStatus};
use cadence::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TEXT: &[u8] = b"the quick brown fox jumps over";

fn chunk(bytes: &[u8]) -> Buffer {
    Buffer::from_bytes(bytes.to_vec())
}

/// Push `data` split by cycling through `sizes`.
fn push_chunked(packer: &DataPacker, data: &[u8], sizes: &[usize]) {
    let mut offset = 0;
    for size in sizes.iter().cycle() {
        if offset >= data.len() {
            break;
        }
        let end = (offset + size).min(data.len());
        assert!(packer.push_data(chunk(&data[offset..end]), offset as u64));
        offset = end;
    }
}

fn roomy() -> DataPacker {
    DataPacker::with_config(DataPackerConfig::default().with_capacity(64))
}

fn quick() -> DataPackerConfig {
    DataPackerConfig::default()
        .with_capacity(1)
        .with_wait_interval(Duration::from_millis(10))
}

// ============================================================================
// Seekable reads
// ============================================================================

#[test]
fn test_range_across_chunk_boundary() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"1234567890"), 0);
    packer.push_data(chunk(b"abcd"), 10);

    assert_eq!(
        packer.is_data_available(3, 2),
        RangeStatus {
            available: true,
            cur_offset: 10
        }
    );
    assert_eq!(packer.get_range(3, 2).unwrap().as_bytes(), b"45");

    assert_eq!(packer.is_data_available(8, 4).cur_offset, 14);
    let spanning = packer.get_range(8, 4).unwrap();
    assert_eq!(spanning.as_bytes(), b"90ab");
    assert_eq!(spanning.metadata().offset, Some(8));

    // The first read's data is gone once the second moved past it.
    assert_eq!(packer.media_offset(), 5);
    assert_eq!(packer.size(), 9);
}

#[test]
fn test_any_chunking_reads_back_the_stream() {
    for sizes in [&[1][..], &[3], &[2, 5, 1], &[30], &[7, 11]] {
        let packer = roomy();
        push_chunked(&packer, TEXT, sizes);
        packer.set_eos();

        let mut out = Vec::new();
        let mut offset = 0u64;
        loop {
            match packer.get_range(offset, 4) {
                Ok(buffer) => {
                    assert_eq!(buffer.metadata().offset, Some(offset), "{:?}", sizes);
                    offset += buffer.len() as u64;
                    out.extend_from_slice(buffer.as_bytes());
                }
                Err(Error::EndOfStream) => break,
                Err(e) => panic!("unexpected {:?} at {} for {:?}", e, offset, sizes),
            }
        }
        assert_eq!(out, TEXT, "{:?}", sizes);
        assert!(packer.is_empty());
    }
}

#[test]
fn test_media_offset_never_moves_back() {
    let packer = roomy();
    push_chunked(&packer, TEXT, &[4, 3]);

    let mut last = packer.media_offset();
    let mut offset = 0u64;
    for size in [5, 2, 9, 3, 6] {
        let buffer = packer.get_range(offset, size).unwrap();
        offset += buffer.len() as u64;
        let now = packer.media_offset();
        assert!(now >= last, "media offset went from {} to {}", last, now);
        last = now;
    }
}

#[test]
fn test_rewind_within_last_read() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abcdef"), 0);
    packer.push_data(chunk(b"ghij"), 6);

    assert_eq!(packer.get_range(0, 6).unwrap().as_bytes(), b"abcdef");
    assert_eq!(packer.get_range(2, 3).unwrap().as_bytes(), b"cde");
    assert_eq!(packer.size(), 10);
}

#[test]
fn test_miss_flushes_queue() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abc"), 10);

    assert_eq!(
        packer.is_data_available(0, 2),
        RangeStatus {
            available: false,
            cur_offset: 0
        }
    );
    assert!(packer.is_empty());
}

#[test]
fn test_partial_hit_counts_at_eos() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abcd"), 0);

    assert_eq!(
        packer.is_data_available(2, 10),
        RangeStatus {
            available: false,
            cur_offset: 4
        }
    );
    packer.set_eos();
    assert!(packer.is_data_available(2, 10).available);

    let tail = packer.get_range(2, 10).unwrap();
    assert_eq!(tail.as_bytes(), b"cd");
    assert!(packer.is_empty());
    assert_eq!(packer.get_range(4, 1).map(|b| b.len()), Err(Error::EndOfStream));
}

#[test]
fn test_discontinuous_push_restarts_queue() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abc"), 0);
    packer.push_data(chunk(b"xyz"), 100);

    assert_eq!(packer.media_offset(), 100);
    assert_eq!(packer.size(), 3);
    assert_eq!(packer.get_range(0, 1).map(|b| b.len()), Err(Error::NotExisted));
    assert_eq!(packer.get_range(101, 2).unwrap().as_bytes(), b"yz");
}

#[test]
fn test_peek_does_not_consume() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abc"), 0);
    packer.push_data(chunk(b"def"), 3);

    for _ in 0..2 {
        assert_eq!(packer.peek_range(1, 4).unwrap().as_bytes(), b"bcde");
    }
    assert_eq!(packer.size(), 6);
    assert_eq!(packer.len(), 2);
}

// ============================================================================
// Live reads
// ============================================================================

#[test]
fn test_live_reads_consume_from_front() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abc"), 0);
    packer.push_data(chunk(b"defg"), 3);

    let first = packer.get_range_live(2).unwrap();
    assert_eq!(first.as_bytes(), b"ab");
    assert_eq!(first.metadata().offset, Some(0));

    let second = packer.get_range_live(4).unwrap();
    assert_eq!(second.as_bytes(), b"cdef");
    assert_eq!(second.metadata().offset, Some(2));
    assert_eq!(packer.media_offset(), 6);
    assert_eq!(packer.size(), 1);

    packer.set_eos();
    assert_eq!(packer.get_range_live(10).unwrap().as_bytes(), b"g");
    assert_eq!(packer.get_range_live(1).map(|b| b.len()), Err(Error::EndOfStream));
}

// ============================================================================
// Blocking and stop
// ============================================================================

#[test]
fn test_full_queue_blocks_push_until_read() {
    let packer = Arc::new(DataPacker::with_config(quick()));
    assert!(packer.push_data(chunk(b"a"), 0));

    let pusher = {
        let packer = packer.clone();
        thread::spawn(move || packer.push_data(chunk(b"b"), 1))
    };
    thread::sleep(Duration::from_millis(50));
    assert_eq!(packer.len(), 1);

    assert_eq!(packer.get_range_live(1).unwrap().as_bytes(), b"a");
    assert!(pusher.join().unwrap());
    assert_eq!(packer.get_range_live(1).unwrap().as_bytes(), b"b");
}

#[test]
fn test_stop_releases_blocked_push() {
    let packer = Arc::new(DataPacker::with_config(quick()));
    assert!(packer.push_data(chunk(b"a"), 0));

    let pusher = {
        let packer = packer.clone();
        thread::spawn(move || packer.push_data(chunk(b"b"), 1))
    };
    thread::sleep(Duration::from_millis(30));
    packer.stop();

    assert!(!pusher.join().unwrap());
    assert_eq!(packer.get_range(0, 1).map(|b| b.len()), Err(Error::InvalidOperation));

    packer.start();
    assert_eq!(packer.get_range(0, 1).unwrap().as_bytes(), b"a");
}

#[test]
fn test_empty_read_waits_for_push() {
    let packer = Arc::new(DataPacker::with_config(quick()));
    let reader = {
        let packer = packer.clone();
        thread::spawn(move || packer.get_range(0, 3))
    };
    thread::sleep(Duration::from_millis(30));
    packer.push_data(chunk(b"xyz"), 0);

    assert_eq!(reader.join().unwrap().unwrap().as_bytes(), b"xyz");
}

#[test]
fn test_eos_wakes_blocked_reader() {
    let packer = Arc::new(DataPacker::with_config(quick()));
    let reader = {
        let packer = packer.clone();
        thread::spawn(move || packer.get_range_live(8).map(|b| b.len()))
    };
    thread::sleep(Duration::from_millis(30));
    packer.set_eos();

    assert_eq!(reader.join().unwrap(), Err(Error::EndOfStream));
}

#[test]
fn test_restart_keeps_eos() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abcd"), 0);
    packer.set_eos();
    packer.stop();
    packer.start();

    assert!(packer.is_eos());
    assert_eq!(packer.get_range(0, 10).unwrap().as_bytes(), b"abcd");
    assert_eq!(packer.get_range(4, 1).map(|b| b.len()), Err(Error::EndOfStream));
}

#[test]
fn test_flush_clears_eos() {
    let packer = DataPacker::new();
    packer.push_data(chunk(b"abc"), 0);
    packer.set_eos();
    packer.flush();

    assert!(packer.is_empty());
    assert!(!packer.is_eos());
    assert_eq!(packer.media_offset(), 0);
}
