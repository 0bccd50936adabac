//! Read-side drawlist parser.
//!
//! Contract:
//! * Input: a complete built frame as bytes.
//! * Output: the validated header plus an iterator of typed records in wire
//!   order (prelude first, then body).
//! * Malformed input yields a `Format` error; the parser never panics and
//!   never reads past the declared sizes.
//!
//! The consumer engine and the test suite both parse through this type, so
//! encoder drift is caught by a single authority.

use crate::drawlist::{
    DRAWLIST_MAGIC, DRAWLIST_VERSION, HEADER_SIZE, OFF_CMD_BYTES, OFF_CMD_COUNT, OFF_CMD_OFFSET,
    OFF_HEADER_SIZE, OFF_MAGIC, OFF_TOTAL_SIZE, OFF_VERSION, Opcode, RECORD_HEAD, STYLE_SIZE,
    StyleWire,
};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawlistHeader {
    pub total_size: u32,
    pub cmd_offset: u32,
    pub cmd_bytes: u32,
    pub cmd_count: u32,
}

/// One decoded command record. Byte payloads borrow from the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record<'a> {
    Clear,
    FillRect {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        style: StyleWire,
    },
    DrawText {
        x: i32,
        y: i32,
        string_id: u32,
        byte_off: u32,
        byte_len: u32,
        style: StyleWire,
    },
    PushClip {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
    },
    PopClip,
    DrawTextRun {
        x: i32,
        y: i32,
        blob_id: u32,
    },
    SetCursor {
        x: i32,
        y: i32,
        shape: u8,
        visible: bool,
        blink: bool,
    },
    DrawCanvas {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        blob_id: u32,
        px_w: u32,
        px_h: u32,
        format: u32,
    },
    DrawImage {
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        blob_id: u32,
        px_w: u32,
        px_h: u32,
        z: i32,
        format: u32,
    },
    DefString {
        id: u32,
        bytes: &'a [u8],
    },
    DefBlob {
        id: u32,
        bytes: &'a [u8],
    },
    FreeString {
        id: u32,
    },
    FreeBlob {
        id: u32,
    },
}

#[derive(Debug)]
pub struct DrawlistReader<'a> {
    header: DrawlistHeader,
    cmds: &'a [u8],
}

impl<'a> DrawlistReader<'a> {
    pub fn parse(bytes: &'a [u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(CoreError::format(format!(
                "drawlist shorter than header: {} bytes",
                bytes.len()
            )));
        }
        let word = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        if word(OFF_MAGIC) != DRAWLIST_MAGIC {
            return Err(CoreError::format("bad drawlist magic"));
        }
        if word(OFF_VERSION) != DRAWLIST_VERSION {
            return Err(CoreError::format(format!(
                "unsupported drawlist version {}",
                word(OFF_VERSION)
            )));
        }
        if word(OFF_HEADER_SIZE) != HEADER_SIZE {
            return Err(CoreError::format("bad header size"));
        }
        let header = DrawlistHeader {
            total_size: word(OFF_TOTAL_SIZE),
            cmd_offset: word(OFF_CMD_OFFSET),
            cmd_bytes: word(OFF_CMD_BYTES),
            cmd_count: word(OFF_CMD_COUNT),
        };
        if header.total_size as usize != bytes.len() {
            return Err(CoreError::format(format!(
                "total_size {} != buffer length {}",
                header.total_size,
                bytes.len()
            )));
        }
        if header.total_size != HEADER_SIZE + header.cmd_bytes {
            return Err(CoreError::format("total_size != header_size + cmd_bytes"));
        }
        let expected_offset = if header.cmd_count == 0 { 0 } else { HEADER_SIZE };
        if header.cmd_offset != expected_offset {
            return Err(CoreError::format(format!(
                "cmd_offset {} with cmd_count {}",
                header.cmd_offset, header.cmd_count
            )));
        }
        if header.cmd_bytes % 4 != 0 {
            return Err(CoreError::format("cmd_bytes not 4-byte aligned"));
        }
        let cmds = &bytes[HEADER_SIZE as usize..];
        Ok(Self { header, cmds })
    }

    pub fn header(&self) -> DrawlistHeader {
        self.header
    }

    /// Decode all records. Record count mismatches against the header are
    /// `Format` errors.
    pub fn records(&self) -> CoreResult<Vec<Record<'a>>> {
        let mut out = Vec::with_capacity(self.header.cmd_count as usize);
        let mut cur = self.cmds;
        while !cur.is_empty() {
            let (record, rest) = decode_record(cur)?;
            out.push(record);
            cur = rest;
        }
        if out.len() as u32 != self.header.cmd_count {
            return Err(CoreError::format(format!(
                "cmd_count {} but decoded {} records",
                self.header.cmd_count,
                out.len()
            )));
        }
        Ok(out)
    }
}

fn decode_record(buf: &[u8]) -> CoreResult<(Record<'_>, &[u8])> {
    if buf.len() < RECORD_HEAD as usize {
        return Err(CoreError::format("truncated record head"));
    }
    let opcode_raw = u16::from_le_bytes(buf[0..2].try_into().unwrap());
    let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    if size < RECORD_HEAD || size % 4 != 0 || size as usize > buf.len() {
        return Err(CoreError::format(format!(
            "record size {size} invalid (opcode {opcode_raw})"
        )));
    }
    let opcode = Opcode::from_u16(opcode_raw)
        .ok_or_else(|| CoreError::format(format!("unknown opcode {opcode_raw}")))?;
    let payload = &buf[RECORD_HEAD as usize..size as usize];
    let rest = &buf[size as usize..];

    let need = |n: usize| -> CoreResult<()> {
        if payload.len() < n {
            Err(CoreError::format(format!(
                "opcode {opcode_raw}: payload {} shorter than {n}",
                payload.len()
            )))
        } else {
            Ok(())
        }
    };
    let i32_at = |off: usize| i32::from_le_bytes(payload[off..off + 4].try_into().unwrap());
    let u32_at = |off: usize| u32::from_le_bytes(payload[off..off + 4].try_into().unwrap());

    let record = match opcode {
        Opcode::Clear => Record::Clear,
        Opcode::PopClip => Record::PopClip,
        Opcode::FillRect => {
            need(16 + STYLE_SIZE as usize)?;
            Record::FillRect {
                x: i32_at(0),
                y: i32_at(4),
                w: i32_at(8),
                h: i32_at(12),
                style: StyleWire::read_from(&payload[16..]),
            }
        }
        Opcode::DrawText => {
            need(20 + STYLE_SIZE as usize)?;
            Record::DrawText {
                x: i32_at(0),
                y: i32_at(4),
                string_id: u32_at(8),
                byte_off: u32_at(12),
                byte_len: u32_at(16),
                style: StyleWire::read_from(&payload[20..]),
            }
        }
        Opcode::PushClip => {
            need(16)?;
            Record::PushClip {
                x: i32_at(0),
                y: i32_at(4),
                w: i32_at(8),
                h: i32_at(12),
            }
        }
        Opcode::DrawTextRun => {
            need(12)?;
            Record::DrawTextRun {
                x: i32_at(0),
                y: i32_at(4),
                blob_id: u32_at(8),
            }
        }
        Opcode::SetCursor => {
            need(12)?;
            Record::SetCursor {
                x: i32_at(0),
                y: i32_at(4),
                shape: payload[8],
                visible: payload[9] != 0,
                blink: payload[10] != 0,
            }
        }
        Opcode::DrawCanvas => {
            need(32)?;
            Record::DrawCanvas {
                x: i32_at(0),
                y: i32_at(4),
                w: i32_at(8),
                h: i32_at(12),
                blob_id: u32_at(16),
                px_w: u32_at(20),
                px_h: u32_at(24),
                format: u32_at(28),
            }
        }
        Opcode::DrawImage => {
            need(40)?;
            Record::DrawImage {
                x: i32_at(0),
                y: i32_at(4),
                w: i32_at(8),
                h: i32_at(12),
                blob_id: u32_at(16),
                px_w: u32_at(20),
                px_h: u32_at(24),
                z: i32_at(28),
                format: u32_at(32),
            }
        }
        Opcode::DefString | Opcode::DefBlob => {
            need(8)?;
            let id = u32_at(0);
            let byte_len = u32_at(4) as usize;
            if payload.len() < 8 + byte_len {
                return Err(CoreError::format(format!(
                    "def record byte_len {byte_len} exceeds payload"
                )));
            }
            let bytes = &payload[8..8 + byte_len];
            match opcode {
                Opcode::DefString => Record::DefString { id, bytes },
                _ => Record::DefBlob { id, bytes },
            }
        }
        Opcode::FreeString => {
            need(4)?;
            Record::FreeString { id: u32_at(0) }
        }
        Opcode::FreeBlob => {
            need(4)?;
            Record::FreeBlob { id: u32_at(0) }
        }
    };
    Ok((record, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawlist::pad4;

    fn header_bytes(total: u32, offset: u32, cmd_bytes: u32, count: u32) -> Vec<u8> {
        let mut h = Vec::with_capacity(HEADER_SIZE as usize);
        for w in [
            DRAWLIST_MAGIC,
            DRAWLIST_VERSION,
            HEADER_SIZE,
            total,
            offset,
            cmd_bytes,
            count,
        ] {
            h.extend_from_slice(&w.to_le_bytes());
        }
        h.resize(HEADER_SIZE as usize, 0);
        h
    }

    #[test]
    fn empty_frame_parses() {
        let bytes = header_bytes(HEADER_SIZE, 0, 0, 0);
        let reader = DrawlistReader::parse(&bytes).unwrap();
        assert_eq!(reader.header().cmd_count, 0);
        assert!(reader.records().unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header_bytes(HEADER_SIZE, 0, 0, 0);
        bytes[0] = b'X';
        let err = DrawlistReader::parse(&bytes).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Format);
    }

    #[test]
    fn rejects_nonzero_offset_for_empty_frame() {
        let bytes = header_bytes(HEADER_SIZE, HEADER_SIZE, 0, 0);
        assert!(DrawlistReader::parse(&bytes).is_err());
    }

    #[test]
    fn decodes_def_string_then_clear() {
        let text = b"hello";
        let def_size = RECORD_HEAD + pad4(8 + text.len() as u32);
        let clear_size = RECORD_HEAD;
        let cmd_bytes = def_size + clear_size;
        let mut bytes = header_bytes(HEADER_SIZE + cmd_bytes, HEADER_SIZE, cmd_bytes, 2);
        // DEF_STRING { id: 3, "hello" }
        bytes.extend_from_slice(&(Opcode::DefString as u16).to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&def_size.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&(text.len() as u32).to_le_bytes());
        bytes.extend_from_slice(text);
        bytes.resize(bytes.len() + (pad4(text.len() as u32) - text.len() as u32) as usize, 0);
        // CLEAR
        bytes.extend_from_slice(&(Opcode::Clear as u16).to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&clear_size.to_le_bytes());

        let reader = DrawlistReader::parse(&bytes).unwrap();
        let records = reader.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            Record::DefString {
                id: 3,
                bytes: b"hello"
            }
        );
        assert_eq!(records[1], Record::Clear);
    }

    #[test]
    fn truncated_record_is_format_error() {
        let cmd_bytes = 4;
        let mut bytes = header_bytes(HEADER_SIZE + cmd_bytes, HEADER_SIZE, cmd_bytes, 1);
        bytes.extend_from_slice(&[1, 0, 0, 0]);
        let reader = DrawlistReader::parse(&bytes).unwrap();
        assert!(reader.records().is_err());
    }
}
