//! Interned UTF-8 string storage.
//!
//! Invariants maintained by this module:
//! * `by_value` and `by_id` agree: every live entry is reachable through
//!   both maps.
//! * `bytes_total` equals the sum of entry byte lengths.
//!
//! Eviction policy and generation bookkeeping live in
//! [`crate::tables::ResourceTables`]; this module only keeps the two maps
//! and the byte total coherent.

use ahash::AHashMap;

#[derive(Debug)]
pub struct StringEntry {
    pub id: u32,
    pub bytes: Box<[u8]>,
    pub last_used: u64,
    /// Engine-store generation this string was last defined in; 0 = never.
    pub generation_defined: u64,
    /// Frame sequence that last referenced this string.
    pub pinned_frame: u64,
    /// Number of live blobs whose content references this string.
    pub blob_ref_count: u32,
}

#[derive(Debug, Default)]
pub struct StringTable {
    pub(crate) by_value: AHashMap<Box<[u8]>, u32>,
    pub(crate) by_id: AHashMap<u32, StringEntry>,
    pub(crate) bytes_total: usize,
}

impl StringTable {
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn bytes_total(&self) -> usize {
        self.bytes_total
    }

    pub fn lookup(&self, bytes: &[u8]) -> Option<u32> {
        self.by_value.get(bytes).copied()
    }

    pub fn get(&self, id: u32) -> Option<&StringEntry> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut StringEntry> {
        self.by_id.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, entry: StringEntry) {
        debug_assert!(!self.by_id.contains_key(&entry.id));
        self.bytes_total += entry.bytes.len();
        self.by_value.insert(entry.bytes.clone(), entry.id);
        self.by_id.insert(entry.id, entry);
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<StringEntry> {
        let entry = self.by_id.remove(&id)?;
        self.by_value.remove(&entry.bytes);
        self.bytes_total -= entry.bytes.len();
        Some(entry)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &StringEntry> {
        self.by_id.values()
    }

    /// Test/debug hook: verify the module invariants hold.
    pub fn check_invariants(&self) {
        assert_eq!(self.by_value.len(), self.by_id.len());
        let mut total = 0;
        for entry in self.by_id.values() {
            assert_eq!(self.by_value.get(&entry.bytes), Some(&entry.id));
            total += entry.bytes.len();
        }
        assert_eq!(total, self.bytes_total);
    }
}
