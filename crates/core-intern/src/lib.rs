//! Per-builder resource intern tables.
//!
//! Strings and blobs referenced by drawlist commands are interned here: an
//! identical value maps to a stable nonzero id, the consumer engine receives
//! each value at most once per generation (as a `DEF_*` prelude record), and
//! bounded-memory eviction keeps the tables under four configured limits.
//!
//! Ownership model: one `ResourceTables` per builder, owned by the builder's
//! thread. The consumer engine keeps an independent store, synchronized only
//! through `DEF_*` / `FREE_*` records and the engine generation counter.

pub mod blobs;
pub mod ids;
pub mod strings;
pub mod tables;

pub use blobs::{BlobEntry, BlobNamespace, BlobTable, derive_key, fnv1a32};
pub use strings::{StringEntry, StringTable};
pub use tables::{InternLimits, ResourceTables};
