//! Two-phase frame acknowledgments.
//!
//! Every `request_frame` registers a pending entry with two one-shot
//! futures: accepted (the consumer received the frame) and completed (the
//! consumer rendered it, it was coalesced away, or it failed). The tracker
//! enforces the ordering contract:
//!
//! * accepted acks resolve in `request_frame` call order — accepting
//!   sequence `n` accepts every pending sequence `<= n`;
//! * a sequence superseded by a newer accepted sequence completes as
//!   `Coalesced` (latest-wins frames the consumer never saw);
//! * `fail_all` settles everything in flight, used for stop/dispose and for
//!   fatal transport errors.

use core_protocol::{CoreError, CoreResult};
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// How a frame finished. `Coalesced` is "not failed": a newer frame
/// superseded this one before the consumer rendered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    Coalesced,
}

/// Handle returned by `request_frame`. Await each ack at most once.
#[derive(Debug)]
pub struct FrameHandle {
    pub seq: u64,
    accepted: oneshot::Receiver<CoreResult<()>>,
    completed: oneshot::Receiver<CoreResult<FrameOutcome>>,
}

impl FrameHandle {
    /// Resolves when the consumer has received the frame.
    pub async fn accepted(&mut self) -> CoreResult<()> {
        match (&mut self.accepted).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::internal("transport dropped the accepted ack")),
        }
    }

    /// Resolves when the frame was rendered, coalesced, or failed.
    pub async fn completed(&mut self) -> CoreResult<FrameOutcome> {
        match (&mut self.completed).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::internal("transport dropped the completed ack")),
        }
    }
}

struct Pending {
    seq: u64,
    accepted: Option<oneshot::Sender<CoreResult<()>>>,
    completed: Option<oneshot::Sender<CoreResult<FrameOutcome>>>,
}

#[derive(Default)]
pub struct AckTracker {
    pending: VecDeque<Pending>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Register a new sequence. Sequences must be registered in ascending
    /// order (the transport serializes `request_frame` calls).
    pub fn register(&mut self, seq: u64) -> FrameHandle {
        debug_assert!(self.pending.back().is_none_or(|p| p.seq < seq));
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (completed_tx, completed_rx) = oneshot::channel();
        self.pending.push_back(Pending {
            seq,
            accepted: Some(accepted_tx),
            completed: Some(completed_tx),
        });
        FrameHandle {
            seq,
            accepted: accepted_rx,
            completed: completed_rx,
        }
    }

    /// The consumer received `seq`: accept it and everything older, and
    /// complete everything strictly older as coalesced.
    pub fn on_accepted(&mut self, seq: u64) {
        for p in self.pending.iter_mut() {
            if p.seq > seq {
                break;
            }
            if let Some(tx) = p.accepted.take() {
                let _ = tx.send(Ok(()));
            }
            if p.seq < seq {
                if let Some(tx) = p.completed.take() {
                    let _ = tx.send(Ok(FrameOutcome::Coalesced));
                }
            }
        }
        self.drop_settled();
    }

    /// The consumer finished rendering `seq`.
    pub fn on_completed(&mut self, seq: u64) {
        for p in self.pending.iter_mut() {
            if p.seq > seq {
                break;
            }
            if let Some(tx) = p.completed.take() {
                let outcome = if p.seq == seq {
                    FrameOutcome::Rendered
                } else {
                    FrameOutcome::Coalesced
                };
                let _ = tx.send(Ok(outcome));
            }
        }
        self.drop_settled();
    }

    /// The consumer failed on `seq`: both acks carry the error (accepted
    /// may already have resolved).
    pub fn on_failed(&mut self, seq: u64, error: CoreError) {
        for p in self.pending.iter_mut() {
            if p.seq != seq {
                continue;
            }
            if let Some(tx) = p.accepted.take() {
                let _ = tx.send(Err(error.clone()));
            }
            if let Some(tx) = p.completed.take() {
                let _ = tx.send(Err(error.clone()));
            }
        }
        self.drop_settled();
    }

    /// Settle everything in flight with `error` (stop, dispose, fatal).
    pub fn fail_all(&mut self, error: &CoreError) {
        for p in self.pending.iter_mut() {
            if let Some(tx) = p.accepted.take() {
                let _ = tx.send(Err(error.clone()));
            }
            if let Some(tx) = p.completed.take() {
                let _ = tx.send(Err(error.clone()));
            }
        }
        self.pending.clear();
    }

    fn drop_settled(&mut self) {
        while let Some(front) = self.pending.front() {
            if front.accepted.is_none() && front.completed.is_none() {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready<T>(rx: &mut oneshot::Receiver<T>) -> Option<T> {
        rx.try_recv().ok()
    }

    #[test]
    fn accept_resolves_in_call_order() {
        let mut t = AckTracker::new();
        let mut h1 = t.register(1);
        let mut h2 = t.register(2);
        t.on_accepted(2);
        assert!(matches!(ready(&mut h1.accepted), Some(Ok(()))));
        assert!(matches!(ready(&mut h2.accepted), Some(Ok(()))));
        // Frame 1 was superseded: completed as coalesced.
        assert!(matches!(
            ready(&mut h1.completed),
            Some(Ok(FrameOutcome::Coalesced))
        ));
        assert!(ready(&mut h2.completed).is_none());
    }

    #[test]
    fn completion_renders_exact_sequence() {
        let mut t = AckTracker::new();
        let mut h = t.register(1);
        t.on_accepted(1);
        t.on_completed(1);
        assert!(matches!(ready(&mut h.accepted), Some(Ok(()))));
        assert!(matches!(
            ready(&mut h.completed),
            Some(Ok(FrameOutcome::Rendered))
        ));
        assert_eq!(t.in_flight(), 0);
    }

    #[test]
    fn failure_carries_error_to_both_acks() {
        let mut t = AckTracker::new();
        let mut h = t.register(3);
        t.on_failed(3, CoreError::backend("render device lost"));
        assert!(matches!(ready(&mut h.accepted), Some(Err(_))));
        let err = ready(&mut h.completed).unwrap().unwrap_err();
        assert_eq!(err.kind, core_protocol::ErrorKind::BackendError);
    }

    #[test]
    fn fail_all_settles_everything() {
        let mut t = AckTracker::new();
        let mut h1 = t.register(1);
        let mut h2 = t.register(2);
        t.fail_all(&CoreError::backend("stopped"));
        assert!(matches!(ready(&mut h1.accepted), Some(Err(_))));
        assert!(matches!(ready(&mut h2.completed), Some(Err(_))));
        assert_eq!(t.in_flight(), 0);
    }
}
