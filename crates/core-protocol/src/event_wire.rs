//! Event-batch wire layout.
//!
//! Batches flow from the consumer engine back to the builder side. A batch is
//! a 24-byte header followed by variable-size records, all little-endian:
//!
//! ```text
//! header:  magic  version  total_size  event_count  batch_flags  dropped
//! record:  type   size     time_ms     flags        payload...
//! ```
//!
//! `size` is the padded total record size including the 16-byte record head.
//! The reserved header word carries the per-batch dropped-event count (events
//! the consumer discarded under pressure before encoding).

use crate::error::{CoreError, CoreResult};

/// `"RZEV"` interpreted little-endian.
pub const EVENT_MAGIC: u32 = u32::from_le_bytes(*b"RZEV");
pub const EVENT_VERSION: u32 = 1;
pub const BATCH_HEADER_SIZE: u32 = 24;
pub const EVENT_RECORD_HEAD: u32 = 16;

// Record types. Mouse kinds are record types of their own.
pub const EV_RESIZE: u32 = 1;
pub const EV_KEY: u32 = 2;
pub const EV_MOUSE_DOWN: u32 = 3;
pub const EV_MOUSE_UP: u32 = 4;
pub const EV_MOUSE_WHEEL: u32 = 5;
pub const EV_FOCUS: u32 = 6;
pub const EV_PASTE: u32 = 7;
pub const EV_USER: u32 = 8;

/// Raw record view: head words plus the payload slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEventRecord<'a> {
    pub record_type: u32,
    pub time_ms: u32,
    pub flags: u32,
    pub payload: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHeader {
    pub total_size: u32,
    pub event_count: u32,
    pub batch_flags: u32,
    pub dropped: u32,
}

/// Validate the header and return it plus the records region.
pub fn parse_batch(bytes: &[u8]) -> CoreResult<(BatchHeader, &[u8])> {
    if bytes.len() < BATCH_HEADER_SIZE as usize {
        return Err(CoreError::format(format!(
            "event batch shorter than header: {} bytes",
            bytes.len()
        )));
    }
    let word = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    if word(0) != EVENT_MAGIC {
        return Err(CoreError::format("bad event batch magic"));
    }
    if word(4) != EVENT_VERSION {
        return Err(CoreError::format(format!(
            "unsupported event batch version {}",
            word(4)
        )));
    }
    let header = BatchHeader {
        total_size: word(8),
        event_count: word(12),
        batch_flags: word(16),
        dropped: word(20),
    };
    if header.total_size as usize != bytes.len() {
        return Err(CoreError::format(format!(
            "batch total_size {} != buffer length {}",
            header.total_size,
            bytes.len()
        )));
    }
    Ok((header, &bytes[BATCH_HEADER_SIZE as usize..]))
}

/// Split the next raw record off the front of `buf`.
pub fn next_record(buf: &[u8]) -> CoreResult<(RawEventRecord<'_>, &[u8])> {
    if buf.len() < EVENT_RECORD_HEAD as usize {
        return Err(CoreError::format("truncated event record head"));
    }
    let word = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
    let record_type = word(0);
    let size = word(4);
    if size < EVENT_RECORD_HEAD || size % 4 != 0 || size as usize > buf.len() {
        return Err(CoreError::format(format!(
            "event record size {size} invalid (type {record_type})"
        )));
    }
    let record = RawEventRecord {
        record_type,
        time_ms: word(8),
        flags: word(12),
        payload: &buf[EVENT_RECORD_HEAD as usize..size as usize],
    };
    Ok((record, &buf[size as usize..]))
}

/// Append a batch header to an empty buffer. `total_size` is patched by
/// `finish_batch` once all records are appended.
pub fn begin_batch(out: &mut Vec<u8>, batch_flags: u32, dropped: u32) {
    debug_assert!(out.is_empty());
    out.extend_from_slice(&EVENT_MAGIC.to_le_bytes());
    out.extend_from_slice(&EVENT_VERSION.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // total_size placeholder
    out.extend_from_slice(&0u32.to_le_bytes()); // event_count placeholder
    out.extend_from_slice(&batch_flags.to_le_bytes());
    out.extend_from_slice(&dropped.to_le_bytes());
}

/// Append one record head + payload, padding to 4 bytes.
pub fn push_record(out: &mut Vec<u8>, record_type: u32, time_ms: u32, flags: u32, payload: &[u8]) {
    let size = EVENT_RECORD_HEAD + crate::drawlist::pad4(payload.len() as u32);
    out.extend_from_slice(&record_type.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&time_ms.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(payload);
    let pad = (size - EVENT_RECORD_HEAD) as usize - payload.len();
    out.extend_from_slice(&[0u8; 3][..pad]);
}

/// Patch the header counters after the last record.
pub fn finish_batch(out: &mut [u8], event_count: u32) {
    let total = out.len() as u32;
    out[8..12].copy_from_slice(&total.to_le_bytes());
    out[12..16].copy_from_slice(&event_count.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_round_trip() {
        let mut buf = Vec::new();
        begin_batch(&mut buf, 0, 2);
        push_record(&mut buf, EV_RESIZE, 10, 0, &[80, 0, 0, 0, 24, 0, 0, 0]);
        push_record(&mut buf, EV_FOCUS, 11, 1, &[1, 0, 0, 0]);
        finish_batch(&mut buf, 2);

        let (header, mut rest) = parse_batch(&buf).unwrap();
        assert_eq!(header.event_count, 2);
        assert_eq!(header.dropped, 2);
        let mut seen = Vec::new();
        while !rest.is_empty() {
            let (rec, next) = next_record(rest).unwrap();
            seen.push((rec.record_type, rec.time_ms, rec.flags, rec.payload.len()));
            rest = next;
        }
        assert_eq!(seen, vec![(EV_RESIZE, 10, 0, 8), (EV_FOCUS, 11, 1, 4)]);
    }

    #[test]
    fn odd_payload_is_padded() {
        let mut buf = Vec::new();
        begin_batch(&mut buf, 0, 0);
        push_record(&mut buf, EV_PASTE, 0, 0, &[4, 0, 0, 0, b'a']);
        finish_batch(&mut buf, 1);
        assert_eq!(buf.len() % 4, 0);
        let (_, rest) = parse_batch(&buf).unwrap();
        let (rec, tail) = next_record(rest).unwrap();
        assert_eq!(rec.payload.len(), 8);
        assert!(tail.is_empty());
    }

    #[test]
    fn truncated_batch_is_format_error() {
        let err = parse_batch(&[0u8; 8]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Format);
    }
}
