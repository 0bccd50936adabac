//! Frame transport: moves built drawlists from the builder to the consumer
//! engine and event batches back, with latest-wins mailbox handoff and
//! two-phase acknowledgments.
//!
//! Two data paths, selected per frame:
//! * [`mailbox`] — a shared ring of fixed-size slots with an atomic control
//!   block; under load the publisher overwrites unconsumed slots so the
//!   consumer only sees the newest frame;
//! * transfer fallback — ownership handoff of a freshly copied buffer, used
//!   when the mailbox is disabled or the frame exceeds slot capacity.
//!
//! The builder-side surface is [`FrameTransport`]; the consumer side
//! implements [`FrameSink`] and publishes events through [`EventPublisher`].

pub mod acks;
pub mod consumer;
pub mod events;
pub mod mailbox;
pub mod transport;

pub use acks::{FrameHandle, FrameOutcome};
pub use consumer::{EngineCaps, FrameSink, SinkCaps};
pub use events::EventPublisher;
pub use mailbox::{ConsumedFrame, Mailbox, PublishError};
pub use transport::FrameTransport;
