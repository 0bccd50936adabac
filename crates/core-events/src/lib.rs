//! Typed input events and the event-batch codec.
//!
//! The consumer engine encodes batches of input events (keyboard, mouse,
//! resize, focus, paste, user-posted) into the wire layout defined by
//! `core_protocol::event_wire`; the builder side decodes them back into the
//! `InputEvent` sum type. Batches are size-bounded: exceeding the configured
//! ceiling on either side is an error the transport treats as fatal.
//!
//! Encoding discipline mirrors the drawlist: little-endian, padded records,
//! decode never panics and surfaces `Format` on malformed bytes.

use core_protocol::event_wire::{
    self as wire, EV_FOCUS, EV_KEY, EV_MOUSE_DOWN, EV_MOUSE_UP, EV_MOUSE_WHEEL, EV_PASTE,
    EV_RESIZE, EV_USER,
};
use core_protocol::{CoreError, CoreResult};

bitflags::bitflags! {
    /// Keyboard modifier mask, wire-stable.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ModMask: u32 {
        const CTRL  = 1 << 0;
        const ALT   = 1 << 1;
        const SHIFT = 1 << 2;
        const META  = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Mouse button state mask, wire-stable.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u32 {
        const LEFT   = 1 << 0;
        const MIDDLE = 1 << 1;
        const RIGHT  = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

/// Logical key identity: a printable character or a named key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Named(NamedKey),
}

// Named keys live above the Unicode scalar range so the two encodings can
// share one u32.
const NAMED_BIT: u32 = 0x8000_0000;
const NAMED_F_BASE: u32 = 0x100;

impl KeyCode {
    fn wire(self) -> u32 {
        match self {
            KeyCode::Char(c) => c as u32,
            KeyCode::Named(k) => {
                NAMED_BIT
                    | match k {
                        NamedKey::Enter => 1,
                        NamedKey::Esc => 2,
                        NamedKey::Backspace => 3,
                        NamedKey::Tab => 4,
                        NamedKey::Up => 5,
                        NamedKey::Down => 6,
                        NamedKey::Left => 7,
                        NamedKey::Right => 8,
                        NamedKey::Home => 9,
                        NamedKey::End => 10,
                        NamedKey::PageUp => 11,
                        NamedKey::PageDown => 12,
                        NamedKey::Insert => 13,
                        NamedKey::Delete => 14,
                        NamedKey::F(n) => NAMED_F_BASE + n as u32,
                    }
            }
        }
    }

    fn from_wire(v: u32) -> CoreResult<Self> {
        if v & NAMED_BIT == 0 {
            return char::from_u32(v)
                .map(KeyCode::Char)
                .ok_or_else(|| CoreError::format(format!("key code {v:#x} is not a scalar")));
        }
        let named = match v & !NAMED_BIT {
            1 => NamedKey::Enter,
            2 => NamedKey::Esc,
            3 => NamedKey::Backspace,
            4 => NamedKey::Tab,
            5 => NamedKey::Up,
            6 => NamedKey::Down,
            7 => NamedKey::Left,
            8 => NamedKey::Right,
            9 => NamedKey::Home,
            10 => NamedKey::End,
            11 => NamedKey::PageUp,
            12 => NamedKey::PageDown,
            13 => NamedKey::Insert,
            14 => NamedKey::Delete,
            n if (NAMED_F_BASE..NAMED_F_BASE + 25).contains(&n) => {
                NamedKey::F((n - NAMED_F_BASE) as u8)
            }
            n => return Err(CoreError::format(format!("unknown named key {n:#x}"))),
        };
        Ok(KeyCode::Named(named))
    }
}

/// Input events flowing from the consumer engine back to the builder side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Terminal resize (columns, rows).
    Resize { cols: u32, rows: u32 },
    Key { code: KeyCode, mods: ModMask },
    MouseDown { x: i32, y: i32, buttons: MouseButtons, mods: ModMask },
    MouseUp { x: i32, y: i32, buttons: MouseButtons, mods: ModMask },
    MouseWheel { x: i32, y: i32, delta_x: i32, delta_y: i32, mods: ModMask },
    Focus { gained: bool },
    /// Bracketed paste content. Callers must not log the text verbatim;
    /// instrument with lengths only.
    Paste { text: String },
    /// Application-posted event: an opaque tag plus payload bytes.
    User { tag: u32, payload: Vec<u8> },
}

/// An event plus the consumer-side timestamp (milliseconds since the
/// consumer's epoch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    pub time_ms: u32,
    pub event: InputEvent,
}

impl TimedEvent {
    pub fn new(time_ms: u32, event: InputEvent) -> Self {
        Self { time_ms, event }
    }
}

/// Encode a batch. `dropped` is the number of events the producer discarded
/// under pressure before this batch. Fails `TooLarge` when the encoded batch
/// would exceed `max_bytes`.
pub fn encode_batch(events: &[TimedEvent], dropped: u32, max_bytes: usize) -> CoreResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_batch_into(&mut out, events, dropped, max_bytes)?;
    Ok(out)
}

/// Encode into a caller-owned buffer (cleared first) so producers can reuse
/// released batch buffers instead of allocating per batch.
pub fn encode_batch_into(
    out: &mut Vec<u8>,
    events: &[TimedEvent],
    dropped: u32,
    max_bytes: usize,
) -> CoreResult<()> {
    out.clear();
    wire::begin_batch(out, 0, dropped);
    for te in events {
        let (record_type, payload) = encode_event(&te.event);
        wire::push_record(out, record_type, te.time_ms, 0, &payload);
        if out.len() > max_bytes {
            return Err(CoreError::too_large(format!(
                "event batch exceeds max_event_bytes {max_bytes}"
            )));
        }
    }
    wire::finish_batch(out, events.len() as u32);
    if out.len() > max_bytes {
        return Err(CoreError::too_large(format!(
            "event batch exceeds max_event_bytes {max_bytes}"
        )));
    }
    Ok(())
}

fn put(p: &mut Vec<u8>, v: u32) {
    p.extend_from_slice(&v.to_le_bytes());
}

fn encode_event(event: &InputEvent) -> (u32, Vec<u8>) {
    let mut p = Vec::new();
    match event {
        InputEvent::Resize { cols, rows } => {
            put(&mut p, *cols);
            put(&mut p, *rows);
            (EV_RESIZE, p)
        }
        InputEvent::Key { code, mods } => {
            put(&mut p, code.wire());
            put(&mut p, mods.bits());
            (EV_KEY, p)
        }
        InputEvent::MouseDown { x, y, buttons, mods } => {
            put(&mut p, *x as u32);
            put(&mut p, *y as u32);
            put(&mut p, buttons.bits());
            put(&mut p, mods.bits());
            (EV_MOUSE_DOWN, p)
        }
        InputEvent::MouseUp { x, y, buttons, mods } => {
            put(&mut p, *x as u32);
            put(&mut p, *y as u32);
            put(&mut p, buttons.bits());
            put(&mut p, mods.bits());
            (EV_MOUSE_UP, p)
        }
        InputEvent::MouseWheel { x, y, delta_x, delta_y, mods } => {
            put(&mut p, *x as u32);
            put(&mut p, *y as u32);
            put(&mut p, *delta_x as u32);
            put(&mut p, *delta_y as u32);
            put(&mut p, mods.bits());
            (EV_MOUSE_WHEEL, p)
        }
        InputEvent::Focus { gained } => {
            put(&mut p, *gained as u32);
            (EV_FOCUS, p)
        }
        InputEvent::Paste { text } => {
            put(&mut p, text.len() as u32);
            p.extend_from_slice(text.as_bytes());
            (EV_PASTE, p)
        }
        InputEvent::User { tag, payload } => {
            put(&mut p, *tag);
            put(&mut p, payload.len() as u32);
            p.extend_from_slice(payload);
            (EV_USER, p)
        }
    }
}

/// Decoded batch: the events plus the producer's dropped count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    pub events: Vec<TimedEvent>,
    pub dropped: u32,
}

/// Decode a batch. `max_bytes` guards against oversized input before any
/// parsing happens.
pub fn decode_batch(bytes: &[u8], max_bytes: usize) -> CoreResult<EventBatch> {
    if bytes.len() > max_bytes {
        return Err(CoreError::too_large(format!(
            "event batch of {} bytes exceeds max_event_bytes {max_bytes}",
            bytes.len()
        )));
    }
    let (header, mut rest) = wire::parse_batch(bytes)?;
    let mut events = Vec::with_capacity(header.event_count as usize);
    while !rest.is_empty() {
        let (raw, next) = wire::next_record(rest)?;
        events.push(TimedEvent {
            time_ms: raw.time_ms,
            event: decode_event(raw.record_type, raw.payload)?,
        });
        rest = next;
    }
    if events.len() as u32 != header.event_count {
        return Err(CoreError::format(format!(
            "batch declares {} events but carries {}",
            header.event_count,
            events.len()
        )));
    }
    Ok(EventBatch {
        events,
        dropped: header.dropped,
    })
}

fn decode_event(record_type: u32, payload: &[u8]) -> CoreResult<InputEvent> {
    let need = |n: usize| -> CoreResult<()> {
        if payload.len() < n {
            Err(CoreError::format(format!(
                "event type {record_type}: payload {} shorter than {n}",
                payload.len()
            )))
        } else {
            Ok(())
        }
    };
    let word = |off: usize| u32::from_le_bytes(payload[off..off + 4].try_into().unwrap());
    Ok(match record_type {
        EV_RESIZE => {
            need(8)?;
            InputEvent::Resize {
                cols: word(0),
                rows: word(4),
            }
        }
        EV_KEY => {
            need(8)?;
            InputEvent::Key {
                code: KeyCode::from_wire(word(0))?,
                mods: ModMask::from_bits_truncate(word(4)),
            }
        }
        EV_MOUSE_DOWN | EV_MOUSE_UP => {
            need(16)?;
            let (x, y) = (word(0) as i32, word(4) as i32);
            let buttons = MouseButtons::from_bits_truncate(word(8));
            let mods = ModMask::from_bits_truncate(word(12));
            if record_type == EV_MOUSE_DOWN {
                InputEvent::MouseDown { x, y, buttons, mods }
            } else {
                InputEvent::MouseUp { x, y, buttons, mods }
            }
        }
        EV_MOUSE_WHEEL => {
            need(20)?;
            InputEvent::MouseWheel {
                x: word(0) as i32,
                y: word(4) as i32,
                delta_x: word(8) as i32,
                delta_y: word(12) as i32,
                mods: ModMask::from_bits_truncate(word(16)),
            }
        }
        EV_FOCUS => {
            need(4)?;
            InputEvent::Focus {
                gained: word(0) != 0,
            }
        }
        EV_PASTE => {
            need(4)?;
            let len = word(0) as usize;
            need(4 + len)?;
            let text = std::str::from_utf8(&payload[4..4 + len])
                .map_err(|_| CoreError::format("paste payload is not UTF-8"))?;
            InputEvent::Paste {
                text: text.to_string(),
            }
        }
        EV_USER => {
            need(8)?;
            let len = word(4) as usize;
            need(8 + len)?;
            InputEvent::User {
                tag: word(0),
                payload: payload[8..8 + len].to_vec(),
            }
        }
        other => {
            return Err(CoreError::format(format!("unknown event type {other}")));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_events() -> Vec<TimedEvent> {
        vec![
            TimedEvent::new(1, InputEvent::Resize { cols: 80, rows: 24 }),
            TimedEvent::new(
                2,
                InputEvent::Key {
                    code: KeyCode::Char('é'),
                    mods: ModMask::CTRL | ModMask::SHIFT,
                },
            ),
            TimedEvent::new(
                3,
                InputEvent::Key {
                    code: KeyCode::Named(NamedKey::F(5)),
                    mods: ModMask::empty(),
                },
            ),
            TimedEvent::new(
                4,
                InputEvent::MouseDown {
                    x: 10,
                    y: -2,
                    buttons: MouseButtons::LEFT,
                    mods: ModMask::ALT,
                },
            ),
            TimedEvent::new(
                5,
                InputEvent::MouseWheel {
                    x: 0,
                    y: 0,
                    delta_x: 0,
                    delta_y: -3,
                    mods: ModMask::empty(),
                },
            ),
            TimedEvent::new(6, InputEvent::Focus { gained: true }),
            TimedEvent::new(
                7,
                InputEvent::Paste {
                    text: "pasted 漢字".to_string(),
                },
            ),
            TimedEvent::new(
                8,
                InputEvent::User {
                    tag: 42,
                    payload: vec![1, 2, 3],
                },
            ),
        ]
    }

    #[test]
    fn batch_round_trip() {
        let events = sample_events();
        let bytes = encode_batch(&events, 7, 64 << 10).unwrap();
        let decoded = decode_batch(&bytes, 64 << 10).unwrap();
        assert_eq!(decoded.events, events);
        assert_eq!(decoded.dropped, 7);
    }

    #[test]
    fn empty_batch_round_trip() {
        let bytes = encode_batch(&[], 0, 1024).unwrap();
        let decoded = decode_batch(&bytes, 1024).unwrap();
        assert!(decoded.events.is_empty());
        assert_eq!(decoded.dropped, 0);
    }

    #[test]
    fn oversized_batch_is_too_large_on_encode() {
        let big = TimedEvent::new(
            0,
            InputEvent::Paste {
                text: "x".repeat(4096),
            },
        );
        let err = encode_batch(&[big], 0, 256).unwrap_err();
        assert_eq!(err.kind, core_protocol::ErrorKind::TooLarge);
    }

    #[test]
    fn oversized_batch_is_too_large_on_decode() {
        let events = sample_events();
        let bytes = encode_batch(&events, 0, 64 << 10).unwrap();
        let err = decode_batch(&bytes, 32).unwrap_err();
        assert_eq!(err.kind, core_protocol::ErrorKind::TooLarge);
    }

    #[test]
    fn malformed_bytes_are_format_errors() {
        assert_eq!(
            decode_batch(&[1, 2, 3], 1024).unwrap_err().kind,
            core_protocol::ErrorKind::Format
        );
        // Valid header, truncated record.
        let mut bytes = encode_batch(&sample_events()[..1], 0, 1024).unwrap();
        bytes.truncate(bytes.len() - 4);
        let len = bytes.len() as u32;
        bytes[8..12].copy_from_slice(&len.to_le_bytes());
        assert_eq!(
            decode_batch(&bytes, 1024).unwrap_err().kind,
            core_protocol::ErrorKind::Format
        );
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        let mut out = Vec::new();
        core_protocol::event_wire::begin_batch(&mut out, 0, 0);
        core_protocol::event_wire::push_record(&mut out, 999, 0, 0, &[0u8; 4]);
        core_protocol::event_wire::finish_batch(&mut out, 1);
        assert_eq!(
            decode_batch(&out, 1024).unwrap_err().kind,
            core_protocol::ErrorKind::Format
        );
    }

    #[test]
    fn named_key_wire_codes_are_distinct() {
        let keys = [
            NamedKey::Enter,
            NamedKey::Esc,
            NamedKey::Backspace,
            NamedKey::Tab,
            NamedKey::Up,
            NamedKey::Down,
            NamedKey::Left,
            NamedKey::Right,
            NamedKey::Home,
            NamedKey::End,
            NamedKey::PageUp,
            NamedKey::PageDown,
            NamedKey::Insert,
            NamedKey::Delete,
            NamedKey::F(1),
            NamedKey::F(12),
        ];
        let mut seen = std::collections::HashSet::new();
        for k in keys {
            let wire = KeyCode::Named(k).wire();
            assert!(seen.insert(wire), "duplicate wire code for {k:?}");
            assert_eq!(KeyCode::from_wire(wire).unwrap(), KeyCode::Named(k));
        }
    }
}
