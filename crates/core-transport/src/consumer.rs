//! Consumer-side worker.
//!
//! The engine is modeled as a `FrameSink` driven by a dedicated worker
//! thread. Frames arrive either through the mailbox (a doorbell message says
//! "something is published") or as owned transfer buffers. For every frame
//! the worker emits the two-phase acks upstream: accepted on receipt,
//! completed (or failed) once the sink returns.
//!
//! The worker never touches builder state; its only channels to the rest of
//! the system are `WorkerMsg` (down) and `UpMsg` (up).

use crate::mailbox::Mailbox;
use core_protocol::{CoreError, CoreResult};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// Consumer capabilities reported through `caps()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCaps {
    /// Effective frame pacing for the consumer.
    pub fps_cap: u32,
    /// Whether the mailbox path is active for this session.
    pub mailbox: bool,
    /// Mailbox slot capacity (0 when the mailbox is inactive).
    pub slot_bytes: usize,
}

/// Capabilities a sink contributes to the negotiated `EngineCaps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkCaps {
    /// Pacing the renderer can actually sustain, when it knows better than
    /// the configured hint.
    pub fps_cap: Option<u32>,
}

/// The rendering engine boundary: consumes drawlist bytes, frame by frame.
pub trait FrameSink: Send + 'static {
    /// Process one frame. `Ok` resolves the frame's completed ack as
    /// rendered; `Err` surfaces on the completed ack as a backend failure.
    fn on_frame(&mut self, seq: u64, bytes: &[u8]) -> CoreResult<()>;

    fn caps(&self) -> SinkCaps {
        SinkCaps::default()
    }
}

pub(crate) enum WorkerMsg {
    /// A frame was published into the mailbox.
    Doorbell,
    /// Ownership handoff of a frame too large (or not eligible) for the
    /// mailbox.
    Transfer { seq: u64, bytes: Vec<u8> },
    Stop,
}

pub(crate) enum UpMsg {
    Caps(EngineCaps),
    Accepted(u64),
    Completed(u64),
    Failed(u64, CoreError),
    /// Encoded event batch from the consumer side.
    Events(Vec<u8>),
    /// Terminate the pump thread (stop/dispose).
    Shutdown,
}

pub(crate) fn spawn_worker<S: FrameSink>(
    mut sink: S,
    mailbox: Option<Arc<Mailbox>>,
    rx: Receiver<WorkerMsg>,
    up: Sender<UpMsg>,
    fps_cap: u32,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("frame-consumer".to_string())
        .spawn(move || {
            let caps = EngineCaps {
                fps_cap: sink.caps().fps_cap.unwrap_or(fps_cap),
                mailbox: mailbox.is_some(),
                slot_bytes: mailbox.as_ref().map(|m| m.slot_bytes()).unwrap_or(0),
            };
            let _ = up.send(UpMsg::Caps(caps));
            loop {
                match rx.recv() {
                    // Transport dropped its sender (dispose): exit without
                    // draining.
                    Err(_) => break,
                    Ok(WorkerMsg::Stop) => break,
                    Ok(WorkerMsg::Doorbell) => {
                        // Doorbells coalesce; drain everything published.
                        while let Some(frame) =
                            mailbox.as_ref().and_then(|m| m.consume())
                        {
                            deliver(&mut sink, frame.seq, &frame.bytes, &up);
                        }
                    }
                    Ok(WorkerMsg::Transfer { seq, bytes }) => {
                        deliver(&mut sink, seq, &bytes, &up);
                    }
                }
            }
            tracing::debug!(target: "transport.consumer", "frame consumer exited");
        })
        .expect("spawn frame consumer thread")
}

fn deliver<S: FrameSink>(sink: &mut S, seq: u64, bytes: &[u8], up: &Sender<UpMsg>) {
    let _ = up.send(UpMsg::Accepted(seq));
    match sink.on_frame(seq, bytes) {
        Ok(()) => {
            let _ = up.send(UpMsg::Completed(seq));
        }
        Err(e) => {
            tracing::warn!(
                target: "transport.consumer",
                seq,
                code = e.kind.code(),
                detail = %e.detail,
                "sink failed frame"
            );
            let _ = up.send(UpMsg::Failed(seq, e));
        }
    }
}
