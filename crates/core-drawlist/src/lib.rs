//! Drawlist builder: a stateful encoder producing the versioned binary
//! command stream consumed by the rendering engine.
//!
//! The builder owns its intern tables ([`core_intern`]) and encodes against
//! the wire contracts in [`core_protocol`]. Upstream widget/layout code
//! calls draw operations during a frame; `build()` serializes header +
//! prelude + body; the caller ships the bytes through the frame transport
//! and calls `reset()` to start the next frame.
//!
//! The builder is single-threaded cooperative: all calls on one instance
//! happen on one thread, every operation is synchronous, and nothing here
//! blocks on the consumer.

mod audit;
pub mod builder;
pub mod style;
pub mod textrun;

pub use builder::{CursorShape, DrawlistBuilder, NULL_ID, PixelFormat, TextRunSegment};
pub use style::{LinkRefs, Rgb, Style, StyleAttrs, UnderlineStyle};
pub use textrun::{ResolvedSegment, decode_payload as decode_text_run};
