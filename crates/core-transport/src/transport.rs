//! Builder-side transport front.
//!
//! `FrameTransport` straddles the builder thread and the consumer worker:
//! frames go down through the mailbox (or transfer fallback), acks and event
//! batches come back up through a pump thread that resolves ack futures and
//! queues raw batches for `poll_events`.
//!
//! Thread shape:
//! * caller thread — `request_frame` / `poll_events` / `caps` (async, never
//!   blocking on the consumer);
//! * consumer worker — drives the `FrameSink` (see `consumer`);
//! * pump thread — drains `UpMsg`s, settles acks, queues events, records
//!   fatal state.
//!
//! Fatal discipline: an event batch that fails to decode, or a worker that
//! vanishes, poisons the transport. Every in-flight ack settles with the
//! fatal error, and every subsequent call returns it.

use crate::acks::{AckTracker, FrameHandle};
use crate::consumer::{EngineCaps, FrameSink, UpMsg, WorkerMsg, spawn_worker};
use crate::events::EventPublisher;
use crate::mailbox::{Mailbox, PublishError};
use core_config::{FrameTransportMode, TransportConfig};
use core_events::EventBatch;
use core_protocol::{CoreError, CoreResult};
use crossbeam_channel::{Sender, unbounded};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Shared {
    tracker: Mutex<AckTracker>,
    fatal: Mutex<Option<CoreError>>,
    /// Raw encoded batches awaiting decode on the builder side.
    events: Mutex<VecDeque<Vec<u8>>>,
    caps: Mutex<Option<EngineCaps>>,
    /// Wakes `poll_events` / `caps` waiters on events, caps, or fatal.
    notify: Notify,
}

impl Shared {
    fn set_fatal(&self, error: CoreError) {
        let mut fatal = self.fatal.lock().unwrap();
        if fatal.is_none() {
            tracing::error!(
                target: "transport",
                code = error.kind.code(),
                detail = %error.detail,
                "transport entered fatal state"
            );
            self.tracker.lock().unwrap().fail_all(&error);
            *fatal = Some(error);
        }
        drop(fatal);
        self.notify.notify_waiters();
    }

    fn fatal(&self) -> Option<CoreError> {
        self.fatal.lock().unwrap().clone()
    }
}

pub struct FrameTransport {
    config: TransportConfig,
    shared: Arc<Shared>,
    mailbox: Option<Arc<Mailbox>>,
    worker_tx: Option<Sender<WorkerMsg>>,
    up_tx: Option<Sender<UpMsg>>,
    pool_tx: Option<Sender<Vec<u8>>>,
    worker: Option<std::thread::JoinHandle<()>>,
    pump: Option<std::thread::JoinHandle<()>>,
    next_seq: u64,
    started: bool,
}

impl FrameTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config: config.clamped(),
            shared: Arc::new(Shared {
                tracker: Mutex::new(AckTracker::new()),
                fatal: Mutex::new(None),
                events: Mutex::new(VecDeque::new()),
                caps: Mutex::new(None),
                notify: Notify::new(),
            }),
            mailbox: None,
            worker_tx: None,
            up_tx: None,
            pool_tx: None,
            worker: None,
            pump: None,
            next_seq: 0,
            started: false,
        }
    }

    pub fn config(&self) -> TransportConfig {
        self.config
    }

    /// Mailbox steal count (frames superseded before consumption); 0 on the
    /// transfer path.
    pub fn frames_coalesced_in_mailbox(&self) -> u64 {
        self.mailbox.as_ref().map(|m| m.steal_count()).unwrap_or(0)
    }

    /// Spawn the consumer worker around `sink` and the ack/event pump.
    /// Returns the publisher handle the consumer side uses for event
    /// batches.
    pub async fn start<S: FrameSink>(&mut self, sink: S) -> CoreResult<EventPublisher> {
        if self.started {
            return Err(CoreError::internal("transport already started"));
        }
        let mailbox = match self.config.frame_transport {
            FrameTransportMode::Transfer => None,
            FrameTransportMode::Auto | FrameTransportMode::Sab => Some(Arc::new(Mailbox::new(
                self.config.frame_sab_slot_count,
                self.config.frame_sab_slot_bytes,
            ))),
        };
        let (worker_tx, worker_rx) = unbounded::<WorkerMsg>();
        let (up_tx, up_rx) = unbounded::<UpMsg>();
        let (pool_tx, pool_rx) = crossbeam_channel::bounded::<Vec<u8>>(8);

        self.worker = Some(spawn_worker(
            sink,
            mailbox.clone(),
            worker_rx,
            up_tx.clone(),
            self.config.fps_cap,
        ));

        let shared = Arc::clone(&self.shared);
        self.pump = Some(
            std::thread::Builder::new()
                .name("transport-pump".to_string())
                .spawn(move || {
                    loop {
                        let msg = match up_rx.recv() {
                            Ok(msg) => msg,
                            Err(_) => break,
                        };
                        match msg {
                            UpMsg::Shutdown => break,
                            UpMsg::Caps(caps) => {
                                *shared.caps.lock().unwrap() = Some(caps);
                                shared.notify.notify_waiters();
                            }
                            UpMsg::Accepted(seq) => {
                                shared.tracker.lock().unwrap().on_accepted(seq);
                            }
                            UpMsg::Completed(seq) => {
                                shared.tracker.lock().unwrap().on_completed(seq);
                            }
                            UpMsg::Failed(seq, error) => {
                                shared.tracker.lock().unwrap().on_failed(seq, error);
                            }
                            UpMsg::Events(bytes) => {
                                shared.events.lock().unwrap().push_back(bytes);
                                shared.notify.notify_waiters();
                            }
                        }
                    }
                    tracing::debug!(target: "transport", "pump exited");
                })
                .expect("spawn transport pump thread"),
        );

        self.mailbox = mailbox;
        self.worker_tx = Some(worker_tx);
        self.up_tx = Some(up_tx.clone());
        self.pool_tx = Some(pool_tx);
        self.started = true;
        Ok(EventPublisher {
            up: up_tx,
            pool: pool_rx,
            max_event_bytes: self.config.max_event_bytes,
        })
    }

    /// Ship one built frame. Returns the two-phase ack handle. Calls are
    /// serialized by the caller; sequences ascend by one per call.
    pub async fn request_frame(&mut self, bytes: &[u8]) -> CoreResult<FrameHandle> {
        self.ensure_live()?;
        let seq = self.next_seq + 1;
        let handle = self.shared.tracker.lock().unwrap().register(seq);
        let worker_tx = self.worker_tx.as_ref().expect("started");

        let published = match (self.config.frame_transport, &self.mailbox) {
            (FrameTransportMode::Transfer, _) | (_, None) => false,
            (_, Some(mailbox)) => match mailbox.publish(bytes, seq, seq as u32) {
                Ok(()) => true,
                // Frame exceeds slot capacity: hand it over whole instead.
                Err(PublishError::TooLarge) => false,
            },
        };
        let msg = if published {
            WorkerMsg::Doorbell
        } else {
            WorkerMsg::Transfer {
                seq,
                bytes: bytes.to_vec(),
            }
        };
        if worker_tx.send(msg).is_err() {
            let error = CoreError::internal("frame consumer is gone");
            self.shared.set_fatal(error.clone());
            return Err(error);
        }
        self.next_seq = seq;
        tracing::trace!(
            target: "transport",
            seq,
            bytes = bytes.len(),
            mailbox = published,
            "frame requested"
        );
        Ok(handle)
    }

    /// Await the next event batches. Resolves immediately when batches are
    /// queued; otherwise waits. Decode failures are fatal: the transport
    /// poisons itself and every pending waiter rejects.
    pub async fn poll_events(&mut self) -> CoreResult<Vec<EventBatch>> {
        loop {
            if let Some(e) = self.shared.fatal() {
                return Err(e);
            }
            let raw: Vec<Vec<u8>> = {
                let mut q = self.shared.events.lock().unwrap();
                q.drain(..).collect()
            };
            if !raw.is_empty() {
                let mut batches = Vec::with_capacity(raw.len());
                for buf in raw {
                    match core_events::decode_batch(&buf, self.config.max_event_bytes) {
                        Ok(batch) => {
                            batches.push(batch);
                            // Release the buffer for producer reuse.
                            if let Some(pool) = &self.pool_tx {
                                let _ = pool.try_send(buf);
                            }
                        }
                        Err(e) => {
                            self.shared.set_fatal(e.clone());
                            return Err(e);
                        }
                    }
                }
                return Ok(batches);
            }
            let notified = self.shared.notify.notified();
            // Re-check after registering the waiter so a concurrent push is
            // never lost.
            if self.shared.fatal().is_some() || !self.shared.events.lock().unwrap().is_empty() {
                continue;
            }
            notified.await;
        }
    }

    /// Consumer capabilities, reported once by the worker at startup.
    pub async fn caps(&mut self) -> CoreResult<EngineCaps> {
        loop {
            if let Some(e) = self.shared.fatal() {
                return Err(e);
            }
            if let Some(caps) = *self.shared.caps.lock().unwrap() {
                return Ok(caps);
            }
            let notified = self.shared.notify.notified();
            if self.shared.caps.lock().unwrap().is_some() || self.shared.fatal().is_some() {
                continue;
            }
            notified.await;
        }
    }

    /// Drain and shut down. In-flight acks settle with a "stopped" error.
    pub async fn stop(&mut self) -> CoreResult<()> {
        if !self.started {
            return Ok(());
        }
        if let Some(tx) = &self.worker_tx {
            let _ = tx.send(WorkerMsg::Stop);
        }
        if let Some(tx) = &self.up_tx {
            let _ = tx.send(UpMsg::Shutdown);
        }
        let worker = self.worker.take();
        let pump = self.pump.take();
        tokio::task::spawn_blocking(move || {
            if let Some(w) = worker {
                let _ = w.join();
            }
            if let Some(p) = pump {
                let _ = p.join();
            }
        })
        .await
        .map_err(|_| CoreError::internal("join on transport threads failed"))?;
        self.teardown("stopped");
        Ok(())
    }

    /// Immediate teardown: settle everything with a "disposed" error and
    /// detach the worker without draining.
    pub fn dispose(&mut self) {
        if !self.started {
            return;
        }
        if let Some(tx) = &self.up_tx {
            let _ = tx.send(UpMsg::Shutdown);
        }
        // Dropping the channel ends the worker at its next receive.
        self.worker_tx = None;
        self.worker = None;
        self.pump = None;
        self.teardown("disposed");
    }

    fn teardown(&mut self, reason: &str) {
        let error = CoreError::backend(reason);
        {
            let mut fatal = self.shared.fatal.lock().unwrap();
            self.shared.tracker.lock().unwrap().fail_all(&error);
            *fatal = Some(error);
        }
        self.shared.notify.notify_waiters();
        self.worker_tx = None;
        self.up_tx = None;
        self.pool_tx = None;
        self.started = false;
        tracing::debug!(target: "transport", reason, "transport torn down");
    }

    fn ensure_live(&self) -> CoreResult<()> {
        if !self.started {
            return Err(CoreError::internal("transport not started"));
        }
        if let Some(e) = self.shared.fatal() {
            return Err(e);
        }
        Ok(())
    }
}

impl Drop for FrameTransport {
    fn drop(&mut self) {
        if self.started {
            self.dispose();
        }
    }
}
