//! Consumer-to-builder event publishing with buffer reuse.
//!
//! The consumer side owns an `EventPublisher`. Each publish encodes a batch
//! into a buffer drawn from a small pool; after the builder side decodes a
//! batch, the buffer flows back into the pool. The pool is bounded — when it
//! is empty the publisher allocates, when it is full returned buffers are
//! dropped — so the steady state reuses a handful of buffers without either
//! side ever blocking on the other.

use crate::consumer::UpMsg;
use core_events::TimedEvent;
use core_protocol::{CoreError, CoreResult};
use crossbeam_channel::{Receiver, Sender};

pub struct EventPublisher {
    pub(crate) up: Sender<UpMsg>,
    pub(crate) pool: Receiver<Vec<u8>>,
    pub(crate) max_event_bytes: usize,
}

impl EventPublisher {
    /// Encode and ship one batch. `dropped` counts events the producer
    /// discarded under pressure before this batch. A batch exceeding the
    /// configured ceiling fails `TooLarge` without being sent — the builder
    /// side treats an oversized batch on the wire as fatal, so the producer
    /// must split instead.
    pub fn publish(&self, events: &[TimedEvent], dropped: u32) -> CoreResult<()> {
        let mut buf = self.pool.try_recv().unwrap_or_default();
        core_events::encode_batch_into(&mut buf, events, dropped, self.max_event_bytes)?;
        self.up
            .send(UpMsg::Events(buf))
            .map_err(|_| CoreError::internal("transport is shut down"))
    }

    /// Ship pre-encoded batch bytes (testing and replay hook).
    pub fn publish_raw(&self, bytes: Vec<u8>) -> CoreResult<()> {
        self.up
            .send(UpMsg::Events(bytes))
            .map_err(|_| CoreError::internal("transport is shut down"))
    }
}
