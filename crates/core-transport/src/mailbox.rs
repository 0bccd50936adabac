//! Latest-wins frame mailbox.
//!
//! A fixed array of slots, each holding up to `slot_bytes` of drawlist data,
//! shared between the publisher (builder thread) and one consumer (engine
//! thread). Slots move through a small state machine driven by CAS:
//!
//! ```text
//! FREE -> WRITING -> READY -> CONSUMING -> FREE
//!           ^          |
//!           +- steal --+   (publisher reclaims the oldest READY slot)
//! ```
//!
//! The control block is a handful of atomics: the published sequence is the
//! release/acquire synchronization point — the publisher stores it last with
//! `Release`, the consumer loads it first with `Acquire`, which orders the
//! slot payload writes before the consumer's reads.
//!
//! Latest-wins: when every slot is occupied the publisher steals the oldest
//! READY slot, so a slow consumer observes only the newest frames. Stolen
//! sequences are never observed by the consumer; the ack layer settles them
//! as coalesced when a newer sequence is accepted.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const SLOT_FREE: u32 = 0;
const SLOT_WRITING: u32 = 1;
const SLOT_READY: u32 = 2;
const SLOT_CONSUMING: u32 = 3;

struct Slot {
    state: AtomicU32,
    /// Valid byte count while READY.
    len: AtomicU32,
    /// Sequence of the frame the slot holds while READY.
    seq: AtomicU64,
    data: UnsafeCell<Box<[u8]>>,
}

// SAFETY: `data` is only touched by the thread that owns the slot's current
// exclusive state (WRITING for the publisher, CONSUMING for the consumer);
// the CAS transitions establish the necessary happens-before edges together
// with the published-seq release/acquire pair.
unsafe impl Sync for Slot {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// Frame exceeds the slot capacity; callers fall back to the transfer
    /// path.
    TooLarge,
}

/// A consumed frame, copied out of its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedFrame {
    pub seq: u64,
    pub token: u32,
    pub bytes: Vec<u8>,
}

pub struct Mailbox {
    slots: Box<[Slot]>,
    slot_bytes: usize,
    published_seq: AtomicU64,
    published_slot: AtomicU32,
    published_len: AtomicU32,
    published_token: AtomicU32,
    consumed_seq: AtomicU64,
    steals: AtomicU64,
}

impl Mailbox {
    pub fn new(slot_count: usize, slot_bytes: usize) -> Self {
        assert!(slot_count >= 2, "latest-wins needs a slot to steal");
        let slots = (0..slot_count)
            .map(|_| Slot {
                state: AtomicU32::new(SLOT_FREE),
                len: AtomicU32::new(0),
                seq: AtomicU64::new(0),
                data: UnsafeCell::new(vec![0u8; slot_bytes].into_boxed_slice()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            slot_bytes,
            published_seq: AtomicU64::new(0),
            published_slot: AtomicU32::new(0),
            published_len: AtomicU32::new(0),
            published_token: AtomicU32::new(0),
            consumed_seq: AtomicU64::new(0),
            steals: AtomicU64::new(0),
        }
    }

    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    /// Number of READY slots the publisher has reclaimed.
    pub fn steal_count(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }

    /// Publish a frame under `seq`. Called only from the publisher thread.
    pub fn publish(&self, bytes: &[u8], seq: u64, token: u32) -> Result<(), PublishError> {
        if bytes.len() > self.slot_bytes {
            return Err(PublishError::TooLarge);
        }
        let idx = self.acquire_slot();
        let slot = &self.slots[idx];
        // SAFETY: the slot is in WRITING, which this thread owns exclusively
        // until it stores READY below.
        unsafe {
            let data = &mut *slot.data.get();
            data[..bytes.len()].copy_from_slice(bytes);
        }
        slot.len.store(bytes.len() as u32, Ordering::Relaxed);
        slot.seq.store(seq, Ordering::Relaxed);
        slot.state.store(SLOT_READY, Ordering::Release);

        self.published_slot.store(idx as u32, Ordering::Relaxed);
        self.published_len.store(bytes.len() as u32, Ordering::Relaxed);
        self.published_token.store(token, Ordering::Relaxed);
        // Release-store last: consumers that observe this seq also observe
        // the slot contents.
        self.published_seq.store(seq, Ordering::Release);
        Ok(())
    }

    /// Find a FREE slot, or steal the oldest READY one.
    fn acquire_slot(&self) -> usize {
        loop {
            for (i, slot) in self.slots.iter().enumerate() {
                if slot
                    .state
                    .compare_exchange(SLOT_FREE, SLOT_WRITING, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return i;
                }
            }
            // No FREE slot: steal the READY slot with the oldest sequence.
            let mut oldest: Option<(usize, u64)> = None;
            for (i, slot) in self.slots.iter().enumerate() {
                if slot.state.load(Ordering::Relaxed) == SLOT_READY {
                    let seq = slot.seq.load(Ordering::Relaxed);
                    if oldest.is_none_or(|(_, s)| seq < s) {
                        oldest = Some((i, seq));
                    }
                }
            }
            if let Some((i, _)) = oldest {
                if self.slots[i]
                    .state
                    .compare_exchange(
                        SLOT_READY,
                        SLOT_WRITING,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    self.steals.fetch_add(1, Ordering::Relaxed);
                    return i;
                }
            }
            // The consumer is mid-claim on every candidate; it will free a
            // slot imminently.
            std::hint::spin_loop();
        }
    }

    /// Claim and copy out the most recently published unconsumed frame.
    /// Called only from the consumer thread. `None` when nothing new is
    /// published.
    pub fn consume(&self) -> Option<ConsumedFrame> {
        loop {
            let seq = self.published_seq.load(Ordering::Acquire);
            if seq == 0 || seq == self.consumed_seq.load(Ordering::Relaxed) {
                return None;
            }
            let idx = self.published_slot.load(Ordering::Relaxed) as usize;
            let slot = &self.slots[idx];
            if slot
                .state
                .compare_exchange(
                    SLOT_READY,
                    SLOT_CONSUMING,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_err()
            {
                // The publisher is rewriting this slot; a newer publication
                // is imminent. Re-read the control block.
                std::hint::spin_loop();
                continue;
            }
            let slot_seq = slot.seq.load(Ordering::Relaxed);
            if slot_seq < seq && slot_seq <= self.consumed_seq.load(Ordering::Relaxed) {
                // Stale claim: the published frame moved to another slot and
                // this one was already consumed or superseded. Release it.
                slot.state.store(SLOT_FREE, Ordering::Release);
                continue;
            }
            let len = slot.len.load(Ordering::Relaxed) as usize;
            // SAFETY: CONSUMING grants exclusive read access; the Acquire
            // CAS above pairs with the publisher's Release store of READY.
            let bytes = unsafe { (&(*slot.data.get()))[..len].to_vec() };
            let token = self.published_token.load(Ordering::Relaxed);
            slot.state.store(SLOT_FREE, Ordering::Release);
            self.consumed_seq.store(slot_seq, Ordering::Relaxed);
            return Some(ConsumedFrame {
                seq: slot_seq,
                token,
                bytes,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_consume_round_trips() {
        let mb = Mailbox::new(3, 64);
        mb.publish(b"frame-1", 1, 11).unwrap();
        let got = mb.consume().unwrap();
        assert_eq!(got.seq, 1);
        assert_eq!(got.token, 11);
        assert_eq!(got.bytes, b"frame-1");
        assert!(mb.consume().is_none(), "same seq is not consumed twice");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mb = Mailbox::new(2, 8);
        assert_eq!(mb.publish(&[0u8; 9], 1, 0), Err(PublishError::TooLarge));
    }

    #[test]
    fn unconsumed_frames_are_overwritten_latest_wins() {
        let mb = Mailbox::new(2, 16);
        for seq in 1..=5u64 {
            mb.publish(format!("f{seq}").as_bytes(), seq, seq as u32)
                .unwrap();
        }
        // Two slots, five publications: three steals, and the consumer sees
        // the newest frame first.
        assert_eq!(mb.steal_count(), 3);
        let got = mb.consume().unwrap();
        assert_eq!(got.seq, 5);
        assert_eq!(got.bytes, b"f5");
    }

    #[test]
    fn consume_is_none_when_empty() {
        let mb = Mailbox::new(2, 16);
        assert!(mb.consume().is_none());
        mb.publish(b"x", 1, 0).unwrap();
        mb.consume().unwrap();
        assert!(mb.consume().is_none());
    }
}
