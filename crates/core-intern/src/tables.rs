//! Resource table orchestration: frames, generations, eviction, pending
//! frees.
//!
//! One `ResourceTables` instance is owned by one builder; there is no
//! process-global sharing. The builder drives the frame lifecycle:
//!
//! * `begin_frame()` at reset — bumps the frame sequence and clears the
//!   per-frame definition sets.
//! * operations during the frame — intern/touch pin entries to the current
//!   frame and record stale ones for definition.
//! * `commit_submitted_frame()` at the next reset when the built frame was
//!   handed to the transport — marks everything in the definition sets as
//!   defined in the current engine generation and drops the shipped frees.
//! * `mark_engine_store_empty()` when the consumer store is known cleared —
//!   bumps the generation so every future reference redefines.
//!
//! Eviction invariants:
//! * an entry pinned in the current frame is never evicted;
//! * a string with a live blob reference is never evicted;
//! * when no candidate exists the originating operation fails `TooLarge`
//!   rather than silently dropping;
//! * evicting an entry defined in the current generation queues a `FREE_*`
//!   for the next prelude, so the consumer store stays in sync.

use crate::blobs::{BlobEntry, BlobNamespace, BlobTable, derive_key};
use crate::ids::IdAllocator;
use crate::strings::{StringEntry, StringTable};
use ahash::AHashSet;
use core_protocol::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternLimits {
    pub max_strings: usize,
    pub max_string_bytes: usize,
    pub max_blobs: usize,
    pub max_blob_bytes: usize,
}

impl Default for InternLimits {
    fn default() -> Self {
        Self {
            max_strings: 4096,
            max_string_bytes: 1 << 20,
            max_blobs: 512,
            max_blob_bytes: 8 << 20,
        }
    }
}

/// Per-frame definition sets: ids that must be (re)defined in the next
/// prelude, in first-reference order.
#[derive(Debug, Default)]
struct FrameDefs {
    strings: Vec<u32>,
    strings_set: AHashSet<u32>,
    blobs: Vec<u32>,
    blobs_set: AHashSet<u32>,
}

impl FrameDefs {
    fn clear(&mut self) {
        self.strings.clear();
        self.strings_set.clear();
        self.blobs.clear();
        self.blobs_set.clear();
    }

    fn push_string(&mut self, id: u32) {
        if self.strings_set.insert(id) {
            self.strings.push(id);
        }
    }

    fn push_blob(&mut self, id: u32) {
        if self.blobs_set.insert(id) {
            self.blobs.push(id);
        }
    }
}

#[derive(Debug)]
pub struct ResourceTables {
    pub strings: StringTable,
    pub blobs: BlobTable,
    string_ids: IdAllocator,
    blob_ids: IdAllocator,
    limits: InternLimits,
    tick: u64,
    frame_seq: u64,
    engine_generation: u64,
    pending_free_strings: Vec<u32>,
    pending_free_blobs: Vec<u32>,
    defs: FrameDefs,
    mutated: bool,
}

impl ResourceTables {
    pub fn new(limits: InternLimits) -> Self {
        Self {
            strings: StringTable::default(),
            blobs: BlobTable::default(),
            string_ids: IdAllocator::new(),
            blob_ids: IdAllocator::new(),
            limits,
            tick: 0,
            frame_seq: 1,
            engine_generation: 1,
            pending_free_strings: Vec::new(),
            pending_free_blobs: Vec::new(),
            defs: FrameDefs::default(),
            mutated: false,
        }
    }

    pub fn limits(&self) -> InternLimits {
        self.limits
    }

    pub fn frame_seq(&self) -> u64 {
        self.frame_seq
    }

    pub fn engine_generation(&self) -> u64 {
        self.engine_generation
    }

    /// True when the current frame has added, touched-stale, or evicted any
    /// resource. Drives the conservative path at reset time.
    pub fn frame_mutated(&self) -> bool {
        self.mutated
    }

    pub fn pending_free_strings(&self) -> &[u32] {
        &self.pending_free_strings
    }

    pub fn pending_free_blobs(&self) -> &[u32] {
        &self.pending_free_blobs
    }

    pub fn frame_def_strings(&self) -> &[u32] {
        &self.defs.strings
    }

    pub fn frame_def_blobs(&self) -> &[u32] {
        &self.defs.blobs
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    // ---------------------------------------------------------------------
    // Frame lifecycle
    // ---------------------------------------------------------------------

    /// Start a new frame: bump the sequence, drop the per-frame definition
    /// sets. Pending frees survive — they ship in the next built prelude.
    pub fn begin_frame(&mut self) {
        self.frame_seq += 1;
        self.defs.clear();
        self.mutated = false;
    }

    /// The previous frame was built and handed to the transport: everything
    /// in its definition sets is now defined in the current generation, and
    /// the frees that shipped in its prelude are done.
    pub fn commit_submitted_frame(&mut self) {
        for &id in &self.defs.strings {
            if let Some(entry) = self.strings.get_mut(id) {
                entry.generation_defined = self.engine_generation;
            }
        }
        for &id in &self.defs.blobs {
            if let Some(entry) = self.blobs.get_mut(id) {
                entry.generation_defined = self.engine_generation;
            }
        }
        self.pending_free_strings.clear();
        self.pending_free_blobs.clear();
        self.defs.clear();
        self.mutated = false;
    }

    /// The consumer-side resource store is known to be empty (engine
    /// restart). Everything defined so far is stale; frees for dead ids are
    /// moot.
    pub fn mark_engine_store_empty(&mut self) {
        self.engine_generation += 1;
        self.pending_free_strings.clear();
        self.pending_free_blobs.clear();
        self.defs.clear();
        tracing::debug!(
            target: "intern.generation",
            generation = self.engine_generation,
            "engine resource store marked empty"
        );
    }

    // ---------------------------------------------------------------------
    // Strings
    // ---------------------------------------------------------------------

    pub fn intern_string(&mut self, text: &str) -> CoreResult<u32> {
        let bytes = text.as_bytes();
        if let Some(id) = self.strings.lookup(bytes) {
            self.touch_string(id)?;
            return Ok(id);
        }
        self.ensure_string_capacity(bytes.len())?;
        let id = self.string_ids.alloc();
        let tick = self.next_tick();
        self.strings.insert(StringEntry {
            id,
            bytes: bytes.into(),
            last_used: tick,
            generation_defined: 0,
            pinned_frame: self.frame_seq,
            blob_ref_count: 0,
        });
        self.defs.push_string(id);
        self.mutated = true;
        Ok(id)
    }

    /// Update recency, pin to the current frame, and schedule definition if
    /// the entry is stale for the current generation.
    pub fn touch_string(&mut self, id: u32) -> CoreResult<()> {
        let tick = self.next_tick();
        let frame = self.frame_seq;
        let generation = self.engine_generation;
        let entry = self
            .strings
            .get_mut(id)
            .ok_or_else(|| CoreError::bad_params(format!("unknown string id {id}")))?;
        entry.last_used = tick;
        entry.pinned_frame = frame;
        if entry.generation_defined < generation {
            self.defs.push_string(id);
            self.mutated = true;
        }
        Ok(())
    }

    fn ensure_string_capacity(&mut self, incoming: usize) -> CoreResult<()> {
        if incoming > self.limits.max_string_bytes {
            return Err(CoreError::too_large(format!(
                "string of {incoming} bytes exceeds table capacity {}",
                self.limits.max_string_bytes
            )));
        }
        while self.strings.len() + 1 > self.limits.max_strings
            || self.strings.bytes_total() + incoming > self.limits.max_string_bytes
        {
            self.evict_lru_string()?;
        }
        Ok(())
    }

    fn evict_lru_string(&mut self) -> CoreResult<()> {
        let candidate = self
            .strings
            .iter()
            .filter(|e| e.pinned_frame < self.frame_seq && e.blob_ref_count == 0)
            .min_by_key(|e| e.last_used)
            .map(|e| e.id);
        let id = candidate.ok_or_else(|| {
            CoreError::too_large("string table full and no entry is evictable")
        })?;
        let entry = self.strings.remove(id).expect("candidate is live");
        if entry.generation_defined == self.engine_generation {
            self.pending_free_strings.push(id);
        }
        self.string_ids.release(id);
        self.mutated = true;
        tracing::trace!(target: "intern.evict", id, bytes = entry.bytes.len(), "evicted string");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Blobs
    // ---------------------------------------------------------------------

    /// Intern a blob. `key` is the caller-supplied stable key plus its
    /// namespace; `None` derives a content key. `string_deps` are string ids
    /// the blob's content references; they gain a reference count for the
    /// blob's lifetime.
    pub fn add_blob(
        &mut self,
        bytes: &[u8],
        key: Option<(&str, BlobNamespace)>,
        string_deps: &[u32],
    ) -> CoreResult<u32> {
        let key = derive_key(bytes, key);
        if let Some(existing) = self.blobs.lookup(&key) {
            let entry = self.blobs.get(existing).expect("maps agree");
            if entry.bytes.as_ref() == bytes {
                self.touch_blob(existing)?;
                return Ok(existing);
            }
            if entry.pinned_frame == self.frame_seq {
                return Err(CoreError::bad_params(format!(
                    "stable key {key:?} reused with different bytes in the same frame"
                )));
            }
            // Cross-frame redefinition under the same key: retire the old
            // entry, then fall through to a fresh insert.
            self.evict_blob(existing);
        }
        for &dep in string_deps {
            if !self.strings.contains(dep) {
                return Err(CoreError::bad_params(format!(
                    "blob depends on unknown string id {dep}"
                )));
            }
        }
        self.ensure_blob_capacity(bytes.len())?;
        let id = self.blob_ids.alloc();
        let tick = self.next_tick();
        for &dep in string_deps {
            let entry = self.strings.get_mut(dep).expect("validated above");
            entry.blob_ref_count += 1;
        }
        self.blobs.insert(BlobEntry {
            id,
            key,
            bytes: bytes.into(),
            last_used: tick,
            generation_defined: 0,
            pinned_frame: self.frame_seq,
            string_deps: string_deps.into(),
        });
        self.defs.push_blob(id);
        self.mutated = true;
        // The blob's strings must be live and defined wherever the blob is;
        // touching them here keeps the indirect references in generation.
        for &dep in string_deps {
            self.touch_string(dep)?;
        }
        Ok(id)
    }

    pub fn touch_blob(&mut self, id: u32) -> CoreResult<()> {
        let tick = self.next_tick();
        let frame = self.frame_seq;
        let generation = self.engine_generation;
        let entry = self
            .blobs
            .get_mut(id)
            .ok_or_else(|| CoreError::bad_params(format!("unknown blob id {id}")))?;
        entry.last_used = tick;
        entry.pinned_frame = frame;
        let stale = entry.generation_defined < generation;
        let deps: Vec<u32> = entry.string_deps.to_vec();
        if stale {
            self.defs.push_blob(id);
            self.mutated = true;
        }
        // A referenced blob keeps its strings referenced: pin them and
        // schedule redefinition when they are stale.
        for dep in deps {
            self.touch_string(dep)?;
        }
        Ok(())
    }

    fn ensure_blob_capacity(&mut self, incoming: usize) -> CoreResult<()> {
        if incoming > self.limits.max_blob_bytes {
            return Err(CoreError::too_large(format!(
                "blob of {incoming} bytes exceeds table capacity {}",
                self.limits.max_blob_bytes
            )));
        }
        while self.blobs.len() + 1 > self.limits.max_blobs
            || self.blobs.bytes_total() + incoming > self.limits.max_blob_bytes
        {
            self.evict_lru_blob()?;
        }
        Ok(())
    }

    fn evict_lru_blob(&mut self) -> CoreResult<()> {
        let candidate = self
            .blobs
            .iter()
            .filter(|e| e.pinned_frame < self.frame_seq)
            .min_by_key(|e| e.last_used)
            .map(|e| e.id);
        let id = candidate
            .ok_or_else(|| CoreError::too_large("blob table full and no entry is evictable"))?;
        self.evict_blob(id);
        Ok(())
    }

    fn evict_blob(&mut self, id: u32) {
        let entry = self.blobs.remove(id).expect("caller verified id is live");
        for &dep in entry.string_deps.iter() {
            if let Some(s) = self.strings.get_mut(dep) {
                debug_assert!(s.blob_ref_count > 0);
                s.blob_ref_count -= 1;
            }
        }
        if entry.generation_defined == self.engine_generation {
            self.pending_free_blobs.push(id);
        }
        self.blob_ids.release(id);
        self.mutated = true;
        tracing::trace!(target: "intern.evict", id, bytes = entry.bytes.len(), "evicted blob");
    }

    /// Test/debug hook: verify cross-table invariants.
    pub fn check_invariants(&self) {
        self.strings.check_invariants();
        self.blobs.check_invariants();
        // Reference counts agree with the live blobs' dependency lists.
        let mut expected: ahash::AHashMap<u32, u32> = ahash::AHashMap::new();
        for blob in self.blobs.iter() {
            for &dep in blob.string_deps.iter() {
                *expected.entry(dep).or_default() += 1;
                assert!(self.strings.contains(dep), "blob dep must be live");
            }
        }
        for entry in self.strings.iter() {
            assert_eq!(
                entry.blob_ref_count,
                expected.get(&entry.id).copied().unwrap_or(0),
                "blob_ref_count mismatch for string {}",
                entry.id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ResourceTables {
        ResourceTables::new(InternLimits {
            max_strings: 3,
            max_string_bytes: 64,
            max_blobs: 2,
            max_blob_bytes: 64,
        })
    }

    #[test]
    fn intern_is_idempotent_within_a_frame() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.intern_string("hello").unwrap();
        let b = t.intern_string("hello").unwrap();
        assert_eq!(a, b);
        assert_eq!(t.frame_def_strings(), &[a]);
        t.check_invariants();
    }

    #[test]
    fn distinct_strings_get_distinct_ids() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.intern_string("a").unwrap();
        let b = t.intern_string("b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn reuse_across_frames_defines_once() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.intern_string("hi").unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        let b = t.intern_string("hi").unwrap();
        assert_eq!(a, b);
        assert!(t.frame_def_strings().is_empty(), "already defined this generation");
    }

    #[test]
    fn generation_bump_forces_redefinition() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.intern_string("hi").unwrap();
        t.commit_submitted_frame();
        t.mark_engine_store_empty();
        t.begin_frame();
        let b = t.intern_string("hi").unwrap();
        assert_eq!(a, b);
        assert_eq!(t.frame_def_strings(), &[a]);
    }

    #[test]
    fn lru_eviction_prefers_oldest_unpinned() {
        let mut t = small();
        t.intern_string("one").unwrap();
        let two = t.intern_string("two").unwrap();
        let three = t.intern_string("three").unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        // Refresh "two" and "three"; "one" is now LRU and unpinned.
        t.touch_string(two).unwrap();
        t.touch_string(three).unwrap();
        let four = t.intern_string("four").unwrap();
        assert_eq!(t.strings.len(), 3);
        assert!(t.strings.lookup(b"one").is_none());
        assert!(t.strings.contains(four));
        t.check_invariants();
    }

    #[test]
    fn eviction_fails_when_everything_is_pinned() {
        let mut t = small();
        t.intern_string("one").unwrap();
        t.intern_string("two").unwrap();
        t.intern_string("three").unwrap();
        // All three were interned this frame, so nothing is evictable.
        let err = t.intern_string("four").unwrap_err();
        assert_eq!(err.kind, core_protocol::ErrorKind::TooLarge);
    }

    #[test]
    fn blob_ref_count_blocks_string_eviction() {
        let mut t = ResourceTables::new(InternLimits {
            max_strings: 1,
            max_string_bytes: 64,
            max_blobs: 4,
            max_blob_bytes: 64,
        });
        let s = t.intern_string("seg").unwrap();
        t.add_blob(b"run", None, &[s]).unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        // The only string is unpinned but referenced by a live blob.
        let err = t.intern_string("other").unwrap_err();
        assert_eq!(err.kind, core_protocol::ErrorKind::TooLarge);
        t.check_invariants();
    }

    #[test]
    fn evicting_blob_releases_string_refs() {
        let mut t = small();
        let s = t.intern_string("seg").unwrap();
        t.add_blob(b"a", Some(("a", BlobNamespace::User)), &[s]).unwrap();
        t.add_blob(b"b", Some(("b", BlobNamespace::User)), &[s]).unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        // Third blob evicts the LRU one, dropping one of the two refs.
        t.add_blob(b"c", Some(("c", BlobNamespace::User)), &[s]).unwrap();
        assert_eq!(t.strings.get(s).unwrap().blob_ref_count, 2);
        t.check_invariants();
    }

    #[test]
    fn same_frame_key_collision_is_bad_params() {
        let mut t = ResourceTables::new(InternLimits::default());
        t.add_blob(b"aaaa", Some(("k", BlobNamespace::User)), &[]).unwrap();
        let err = t
            .add_blob(b"bbbb", Some(("k", BlobNamespace::User)), &[])
            .unwrap_err();
        assert_eq!(err.kind, core_protocol::ErrorKind::BadParams);
    }

    #[test]
    fn cross_frame_key_collision_evicts_and_queues_free() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.add_blob(b"aaaa", Some(("k", BlobNamespace::User)), &[]).unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        let b = t.add_blob(b"bbbb", Some(("k", BlobNamespace::User)), &[]).unwrap();
        assert_ne!(a, b);
        assert_eq!(t.pending_free_blobs(), &[a]);
        assert_eq!(t.frame_def_blobs(), &[b]);
        t.check_invariants();
    }

    #[test]
    fn identical_bytes_under_same_key_reuse_id() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.add_blob(b"same", Some(("k", BlobNamespace::User)), &[]).unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        let b = t.add_blob(b"same", Some(("k", BlobNamespace::User)), &[]).unwrap();
        assert_eq!(a, b);
        assert!(t.frame_def_blobs().is_empty());
    }

    #[test]
    fn auto_keyed_blobs_dedupe_by_content() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.add_blob(b"payload", None, &[]).unwrap();
        let b = t.add_blob(b"payload", None, &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn eviction_of_undefined_entry_queues_no_free() {
        let mut t = small();
        // Never committed: generation_defined stays 0.
        t.intern_string("one").unwrap();
        t.begin_frame();
        t.intern_string("aa").unwrap();
        t.intern_string("bb").unwrap();
        t.intern_string("cc").unwrap(); // evicts "one"
        assert!(t.pending_free_strings().is_empty());
    }

    #[test]
    fn touching_stale_blob_schedules_deps() {
        let mut t = ResourceTables::new(InternLimits::default());
        let s = t.intern_string("seg").unwrap();
        let blob = t.add_blob(b"run", None, &[s]).unwrap();
        t.commit_submitted_frame();
        t.mark_engine_store_empty();
        t.begin_frame();
        t.touch_blob(blob).unwrap();
        assert_eq!(t.frame_def_blobs(), &[blob]);
        assert_eq!(t.frame_def_strings(), &[s]);
    }

    #[test]
    fn mark_empty_clears_pending_frees() {
        let mut t = ResourceTables::new(InternLimits::default());
        let a = t.add_blob(b"aaaa", Some(("k", BlobNamespace::User)), &[]).unwrap();
        t.commit_submitted_frame();
        t.begin_frame();
        t.add_blob(b"bbbb", Some(("k", BlobNamespace::User)), &[]).unwrap();
        assert_eq!(t.pending_free_blobs(), &[a]);
        t.mark_engine_store_empty();
        assert!(t.pending_free_blobs().is_empty());
    }
}
