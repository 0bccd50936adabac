//! Drawlist wire layout: header, record framing, opcodes, style encoding.
//!
//! All integers are little-endian. Command records are 4-byte aligned; the
//! `size` field of every record is the padded total record size including the
//! 8-byte record head. The builder and the reader in this crate are the two
//! authorities on this layout; nothing else hand-rolls offsets.
//!
//! Layout invariants:
//! * `total_size == HEADER_SIZE + cmd_bytes` for every built frame.
//! * `cmd_offset` is `HEADER_SIZE` when `cmd_count > 0`, else `0`.
//! * `cmd_count` counts prelude records (frees, defs) plus body records.
//! * Record payload sizes below are the unpadded payload byte counts; the
//!   framed size is `RECORD_HEAD + pad4(payload)`.

/// `"RZDL"` interpreted little-endian.
pub const DRAWLIST_MAGIC: u32 = u32::from_le_bytes(*b"RZDL");
pub const DRAWLIST_VERSION: u32 = 1;
/// Fixed header size in bytes: seven meaningful words plus nine reserved.
pub const HEADER_SIZE: u32 = 64;
/// Bytes of the `opcode | reserved | size` record head.
pub const RECORD_HEAD: u32 = 8;

// Header word offsets.
pub const OFF_MAGIC: usize = 0;
pub const OFF_VERSION: usize = 4;
pub const OFF_HEADER_SIZE: usize = 8;
pub const OFF_TOTAL_SIZE: usize = 12;
pub const OFF_CMD_OFFSET: usize = 16;
pub const OFF_CMD_BYTES: usize = 20;
pub const OFF_CMD_COUNT: usize = 24;

/// Round up to the next multiple of four.
#[inline]
pub const fn pad4(len: u32) -> u32 {
    (len + 3) & !3
}

/// Command opcodes. The numeric values are wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Clear = 1,
    FillRect = 2,
    DrawText = 3,
    PushClip = 4,
    PopClip = 5,
    DrawTextRun = 6,
    SetCursor = 7,
    DrawCanvas = 8,
    DrawImage = 9,
    DefString = 10,
    DefBlob = 11,
    FreeString = 12,
    FreeBlob = 13,
}

impl Opcode {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => Opcode::Clear,
            2 => Opcode::FillRect,
            3 => Opcode::DrawText,
            4 => Opcode::PushClip,
            5 => Opcode::PopClip,
            6 => Opcode::DrawTextRun,
            7 => Opcode::SetCursor,
            8 => Opcode::DrawCanvas,
            9 => Opcode::DrawImage,
            10 => Opcode::DefString,
            11 => Opcode::DefBlob,
            12 => Opcode::FreeString,
            13 => Opcode::FreeBlob,
            _ => return None,
        })
    }
}

// Unpadded payload sizes for the fixed-shape records.
pub const PAYLOAD_CLEAR: u32 = 0;
pub const PAYLOAD_FILL_RECT: u32 = 16 + STYLE_SIZE;
pub const PAYLOAD_DRAW_TEXT: u32 = 8 + 12 + STYLE_SIZE + 4;
pub const PAYLOAD_PUSH_CLIP: u32 = 16;
pub const PAYLOAD_POP_CLIP: u32 = 0;
pub const PAYLOAD_DRAW_TEXT_RUN: u32 = 16;
pub const PAYLOAD_SET_CURSOR: u32 = 12;
pub const PAYLOAD_DRAW_CANVAS: u32 = 32;
pub const PAYLOAD_DRAW_IMAGE: u32 = 40;
pub const PAYLOAD_FREE: u32 = 4;

// -------------------------------------------------------------------------
// Encoded style: 28-byte fixed layout appended to FILL_RECT and DRAW_TEXT.
// -------------------------------------------------------------------------
// Word 0: packed foreground, word 1: packed background. A packed color is
// `COLOR_SET | 0xRRGGBB`; an all-zero word means "no override".
// Word 2: attribute bitfield (ATTR_*). Word 3: reserved word whose low three
// bits carry the underline style (UNDERLINE_*). Word 4: packed underline
// color. Words 5 and 6: link URI and link id string refs; both zero means
// "no link".

pub const STYLE_SIZE: u32 = 28;
pub const COLOR_SET: u32 = 1 << 24;

pub const ATTR_BOLD: u32 = 1 << 0;
pub const ATTR_ITALIC: u32 = 1 << 1;
pub const ATTR_UNDERLINE: u32 = 1 << 2;
pub const ATTR_INVERSE: u32 = 1 << 3;
pub const ATTR_DIM: u32 = 1 << 4;
pub const ATTR_STRIKETHROUGH: u32 = 1 << 5;
pub const ATTR_OVERLINE: u32 = 1 << 6;
pub const ATTR_BLINK: u32 = 1 << 7;
pub const ATTR_MASK: u32 = 0xFF;

pub const UNDERLINE_STYLE_MASK: u32 = 0b111;
pub const UNDERLINE_STRAIGHT: u32 = 1;
pub const UNDERLINE_DOUBLE: u32 = 2;
pub const UNDERLINE_CURLY: u32 = 3;
pub const UNDERLINE_DOTTED: u32 = 4;
pub const UNDERLINE_DASHED: u32 = 5;

/// Raw 28-byte style record as seven little-endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleWire {
    pub fg: u32,
    pub bg: u32,
    pub attrs: u32,
    pub reserved: u32,
    pub underline_rgb: u32,
    pub link_uri_ref: u32,
    pub link_id_ref: u32,
}

impl StyleWire {
    /// True when no word overrides anything: no colors, no attributes, no
    /// underline style, no link refs.
    pub fn is_empty(&self) -> bool {
        self.fg == 0
            && self.bg == 0
            && self.attrs == 0
            && self.reserved & UNDERLINE_STYLE_MASK == 0
            && self.underline_rgb == 0
            && self.link_uri_ref == 0
            && self.link_id_ref == 0
    }

    pub fn underline_style(&self) -> u32 {
        self.reserved & UNDERLINE_STYLE_MASK
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.fg.to_le_bytes());
        out.extend_from_slice(&self.bg.to_le_bytes());
        out.extend_from_slice(&self.attrs.to_le_bytes());
        out.extend_from_slice(&self.reserved.to_le_bytes());
        out.extend_from_slice(&self.underline_rgb.to_le_bytes());
        out.extend_from_slice(&self.link_uri_ref.to_le_bytes());
        out.extend_from_slice(&self.link_id_ref.to_le_bytes());
    }

    /// Precondition: `bytes.len() >= STYLE_SIZE`.
    pub fn read_from(bytes: &[u8]) -> Self {
        let w = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            fg: w(0),
            bg: w(1),
            attrs: w(2),
            reserved: w(3),
            underline_rgb: w(4),
            link_uri_ref: w(5),
            link_id_ref: w(6),
        }
    }
}
