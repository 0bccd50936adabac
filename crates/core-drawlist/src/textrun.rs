//! Text-run blob payload.
//!
//! A text run freezes a shaped line into a reusable blob: per-segment string
//! refs with byte ranges, cell offsets, and measured widths. The engine can
//! then repaint the run without re-shaping, and the blob's string deps keep
//! the referenced strings alive for as long as the run is.
//!
//! Payload layout (little-endian): `u32 segment_count`, then per segment
//! `u32 string_id, u32 byte_off, u32 byte_len, i32 dx, u32 width`.

use core_protocol::{CoreError, CoreResult};

pub const SEGMENT_WIRE_SIZE: usize = 20;

/// One segment of a text run, fully resolved against the intern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSegment {
    pub string_id: u32,
    pub byte_off: u32,
    pub byte_len: u32,
    /// Cell offset from the run origin.
    pub dx: i32,
    /// Measured cell width of the segment text.
    pub width: u32,
}

pub(crate) fn encode_payload(segments: &[ResolvedSegment]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + segments.len() * SEGMENT_WIRE_SIZE);
    out.extend_from_slice(&(segments.len() as u32).to_le_bytes());
    for seg in segments {
        out.extend_from_slice(&seg.string_id.to_le_bytes());
        out.extend_from_slice(&seg.byte_off.to_le_bytes());
        out.extend_from_slice(&seg.byte_len.to_le_bytes());
        out.extend_from_slice(&seg.dx.to_le_bytes());
        out.extend_from_slice(&seg.width.to_le_bytes());
    }
    out
}

/// Decode a text-run blob payload; used by the consumer side and tests.
pub fn decode_payload(bytes: &[u8]) -> CoreResult<Vec<ResolvedSegment>> {
    if bytes.len() < 4 {
        return Err(CoreError::format("text run shorter than its count word"));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let expected = 4 + count * SEGMENT_WIRE_SIZE;
    if bytes.len() != expected {
        return Err(CoreError::format(format!(
            "text run of {count} segments needs {expected} bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let base = 4 + i * SEGMENT_WIRE_SIZE;
        let word = |off: usize| {
            u32::from_le_bytes(bytes[base + off..base + off + 4].try_into().unwrap())
        };
        out.push(ResolvedSegment {
            string_id: word(0),
            byte_off: word(4),
            byte_len: word(8),
            dx: word(12) as i32,
            width: word(16),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let segs = vec![
            ResolvedSegment {
                string_id: 1,
                byte_off: 0,
                byte_len: 5,
                dx: 0,
                width: 5,
            },
            ResolvedSegment {
                string_id: 2,
                byte_off: 0,
                byte_len: 6,
                dx: -3,
                width: 4,
            },
        ];
        let bytes = encode_payload(&segs);
        assert_eq!(bytes.len(), 4 + 2 * SEGMENT_WIRE_SIZE);
        assert_eq!(decode_payload(&bytes).unwrap(), segs);
    }

    #[test]
    fn truncated_payload_is_format_error() {
        let segs = vec![ResolvedSegment {
            string_id: 1,
            byte_off: 0,
            byte_len: 1,
            dx: 0,
            width: 1,
        }];
        let mut bytes = encode_payload(&segs);
        bytes.pop();
        assert!(decode_payload(&bytes).is_err());
        assert!(decode_payload(&[]).is_err());
    }
}
