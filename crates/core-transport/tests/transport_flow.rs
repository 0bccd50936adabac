//! End-to-end transport flow: frames down, acks and events back.

use core_config::{FrameTransportMode, TransportConfig};
use core_events::{InputEvent, TimedEvent};
use core_protocol::{CoreError, CoreResult, ErrorKind};
use core_transport::{FrameOutcome, FrameSink, FrameTransport, SinkCaps};
use crossbeam_channel::{Receiver, Sender, unbounded};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every frame it sees; optionally blocks on a gate per frame.
struct RecordingSink {
    frames: Sender<(u64, Vec<u8>)>,
    gate: Option<Receiver<()>>,
    fail_on: Option<u64>,
}

impl FrameSink for RecordingSink {
    fn on_frame(&mut self, seq: u64, bytes: &[u8]) -> CoreResult<()> {
        let _ = self.frames.send((seq, bytes.to_vec()));
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if self.fail_on == Some(seq) {
            return Err(CoreError::backend("simulated render failure"));
        }
        Ok(())
    }

    fn caps(&self) -> SinkCaps {
        SinkCaps { fps_cap: Some(30) }
    }
}

fn config(mode: FrameTransportMode) -> TransportConfig {
    TransportConfig {
        frame_transport: mode,
        frame_sab_slot_count: 2,
        frame_sab_slot_bytes: 4096,
        ..TransportConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn frame_round_trip_over_mailbox() {
    init_tracing();
    let (frames_tx, frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();

    let payload = b"drawlist-frame-bytes".to_vec();
    let mut handle = transport.request_frame(&payload).await.unwrap();
    handle.accepted().await.unwrap();
    assert_eq!(handle.completed().await.unwrap(), FrameOutcome::Rendered);

    let (seq, bytes) = frames_rx.recv().unwrap();
    assert_eq!(seq, 1);
    assert_eq!(bytes, payload);
    transport.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_mode_and_oversized_frames_deliver() {
    let (frames_tx, frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Transfer));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();
    let mut h = transport.request_frame(b"via-transfer").await.unwrap();
    h.completed().await.unwrap();
    assert_eq!(frames_rx.recv().unwrap().1, b"via-transfer");
    transport.stop().await.unwrap();

    // Mailbox mode, frame larger than a slot: falls back to transfer.
    let (frames_tx, frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();
    let big = vec![0xAB; 8192];
    let mut h = transport.request_frame(&big).await.unwrap();
    assert_eq!(h.completed().await.unwrap(), FrameOutcome::Rendered);
    assert_eq!(frames_rx.recv().unwrap().1, big);
    transport.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn superseded_frames_complete_as_coalesced() {
    init_tracing();
    let (frames_tx, frames_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: Some(gate_rx),
            fail_on: None,
        })
        .await
        .unwrap();

    // Frame 1 reaches the sink and blocks on the gate.
    let mut h1 = transport.request_frame(b"frame-1").await.unwrap();
    let first = frames_rx.recv().unwrap();
    assert_eq!(first.0, 1);

    // With the consumer busy, three more frames hit a two-slot mailbox:
    // at least one unconsumed slot is stolen.
    let mut h2 = transport.request_frame(b"frame-2").await.unwrap();
    let mut h3 = transport.request_frame(b"frame-3").await.unwrap();
    let mut h4 = transport.request_frame(b"frame-4").await.unwrap();
    assert!(transport.frames_coalesced_in_mailbox() >= 1);

    // Release the sink for frame 1 and everything after.
    for _ in 0..8 {
        let _ = gate_tx.send(());
    }

    assert_eq!(h1.completed().await.unwrap(), FrameOutcome::Rendered);
    // The newest frame renders; the middle ones settle as coalesced.
    assert_eq!(h4.completed().await.unwrap(), FrameOutcome::Rendered);
    assert_eq!(h2.completed().await.unwrap(), FrameOutcome::Coalesced);
    assert_eq!(h3.completed().await.unwrap(), FrameOutcome::Coalesced);
    // Accepted order matches request order.
    h2.accepted().await.unwrap();
    h3.accepted().await.unwrap();
    h4.accepted().await.unwrap();

    let consumed = frames_rx.recv().unwrap();
    assert_eq!(consumed.0, 4, "consumer sees only the newest published frame");
    transport.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_failure_surfaces_on_completed_ack() {
    let (frames_tx, _frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: Some(1),
        })
        .await
        .unwrap();
    let mut h = transport.request_frame(b"doomed").await.unwrap();
    h.accepted().await.unwrap();
    let err = h.completed().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendError);
    // A per-frame failure is not fatal: the next frame still renders.
    let mut h2 = transport.request_frame(b"fine").await.unwrap();
    assert_eq!(h2.completed().await.unwrap(), FrameOutcome::Rendered);
    transport.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn event_batches_flow_back() {
    let (frames_tx, _frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    let publisher = transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();

    let events = vec![
        TimedEvent::new(5, InputEvent::Resize { cols: 120, rows: 40 }),
        TimedEvent::new(6, InputEvent::Focus { gained: false }),
    ];
    publisher.publish(&events, 3).unwrap();

    let batches = transport.poll_events().await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].events, events);
    assert_eq!(batches[0].dropped, 3);
    transport.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_event_batch_is_fatal() {
    let (frames_tx, _frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    let publisher = transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();

    publisher.publish_raw(vec![1, 2, 3, 4]).unwrap();
    let err = transport.poll_events().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Format);
    // Poisoned: further calls reject with the same fatal error.
    let err = transport.request_frame(b"nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Format);
}

#[tokio::test(flavor = "multi_thread")]
async fn caps_report_consumer_capabilities() {
    let (frames_tx, _frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();
    let caps = transport.caps().await.unwrap();
    assert_eq!(caps.fps_cap, 30, "sink override wins over config hint");
    assert!(caps.mailbox);
    assert_eq!(caps.slot_bytes, 4096);
    transport.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn dispose_settles_in_flight_acks() {
    let (frames_tx, frames_rx) = unbounded();
    let (gate_tx, gate_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: Some(gate_rx),
            fail_on: None,
        })
        .await
        .unwrap();

    let mut h = transport.request_frame(b"in-flight").await.unwrap();
    // The sink is now holding the frame; dispose settles without draining.
    let _ = frames_rx.recv().unwrap();
    transport.dispose();
    let err = h.completed().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendError);
    assert_eq!(err.detail, "disposed");
    // Unblock the detached worker thread so it can exit.
    let _ = gate_tx.send(());

    let err = transport.request_frame(b"after-dispose").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BackendError);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_rejects_subsequent_requests() {
    let (frames_tx, _frames_rx) = unbounded();
    let mut transport = FrameTransport::new(config(FrameTransportMode::Sab));
    transport
        .start(RecordingSink {
            frames: frames_tx,
            gate: None,
            fail_on: None,
        })
        .await
        .unwrap();
    transport.stop().await.unwrap();
    let err = transport.request_frame(b"late").await.unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::BackendError | ErrorKind::Internal
    ));
}
