//! Interned opaque blob storage.
//!
//! Blobs are looked up by a stable key rather than by value: caller-supplied
//! keys are prefixed with a namespace (`"u:"` user, `"tr:"` text run) and
//! unkeyed blobs derive `"a:<len>:<fnv1a32>"` from their content. The
//! namespace byte prevents a user key from colliding with an auto or
//! text-run key of the same spelling.
//!
//! `by_key` and `by_id` agree, and `bytes_total` equals the sum of entry
//! byte lengths, exactly as for strings. A blob's `string_deps` list is
//! fixed at creation; ref-count maintenance happens in
//! [`crate::tables::ResourceTables`] where both tables are in scope.

use ahash::AHashMap;

/// Namespace for caller-supplied blob keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobNamespace {
    User,
    TextRun,
}

impl BlobNamespace {
    pub fn prefix(self) -> &'static str {
        match self {
            BlobNamespace::User => "u:",
            BlobNamespace::TextRun => "tr:",
        }
    }
}

/// 32-bit FNV-1a over the blob content; the value is part of the auto-key
/// format and therefore wire-stable.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Derive the lookup key: namespaced when the caller supplied one,
/// content-derived otherwise.
pub fn derive_key(bytes: &[u8], key: Option<(&str, BlobNamespace)>) -> String {
    match key {
        Some((k, ns)) => format!("{}{}", ns.prefix(), k),
        None => format!("a:{}:{}", bytes.len(), fnv1a32(bytes)),
    }
}

#[derive(Debug)]
pub struct BlobEntry {
    pub id: u32,
    pub key: String,
    pub bytes: Box<[u8]>,
    pub last_used: u64,
    pub generation_defined: u64,
    pub pinned_frame: u64,
    /// String ids referenced by the blob content; set at creation, never
    /// mutated.
    pub string_deps: Box<[u32]>,
}

#[derive(Debug, Default)]
pub struct BlobTable {
    pub(crate) by_key: AHashMap<String, u32>,
    pub(crate) by_id: AHashMap<u32, BlobEntry>,
    pub(crate) bytes_total: usize,
}

impl BlobTable {
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn bytes_total(&self) -> usize {
        self.bytes_total
    }

    pub fn lookup(&self, key: &str) -> Option<u32> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, id: u32) -> Option<&BlobEntry> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut BlobEntry> {
        self.by_id.get_mut(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.by_id.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, entry: BlobEntry) {
        debug_assert!(!self.by_id.contains_key(&entry.id));
        self.bytes_total += entry.bytes.len();
        self.by_key.insert(entry.key.clone(), entry.id);
        self.by_id.insert(entry.id, entry);
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<BlobEntry> {
        let entry = self.by_id.remove(&id)?;
        self.by_key.remove(&entry.key);
        self.bytes_total -= entry.bytes.len();
        Some(entry)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &BlobEntry> {
        self.by_id.values()
    }

    /// Test/debug hook: verify the module invariants hold.
    pub fn check_invariants(&self) {
        assert_eq!(self.by_key.len(), self.by_id.len());
        let mut total = 0;
        for entry in self.by_id.values() {
            assert_eq!(self.by_key.get(&entry.key), Some(&entry.id));
            total += entry.bytes.len();
        }
        assert_eq!(total, self.bytes_total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a32_reference_vectors() {
        // Standard FNV-1a test vectors.
        assert_eq!(fnv1a32(b""), 0x811c9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn auto_key_embeds_length_and_hash() {
        let key = derive_key(b"abc", None);
        assert_eq!(key, format!("a:3:{}", fnv1a32(b"abc")));
    }

    #[test]
    fn namespaces_prevent_cross_collisions() {
        let user = derive_key(b"x", Some(("run", BlobNamespace::User)));
        let text = derive_key(b"x", Some(("run", BlobNamespace::TextRun)));
        assert_eq!(user, "u:run");
        assert_eq!(text, "tr:run");
        assert_ne!(user, text);
    }
}
