//! Deterministic text measurement for the drawlist pipeline.
//!
//! Everything upstream that lays out, truncates, or positions text relies on
//! cell widths computed here being byte-for-byte reproducible across
//! processes. The crate therefore pins its Unicode data to the vendored
//! tables of `unicode-segmentation` / `unicode-width` and keeps every entry
//! point pure: same input, same policy, same answer.
//!
//! Modules:
//! * [`width`] — per-cluster and per-string cell width under an emoji policy.
//! * [`segment`] — grapheme segmentation with byte ranges and widths.
//! * [`truncate`] — end / middle / start ellipsis truncation.
//! * [`cache`] — bounded LRU width cache.
//! * [`policy`] — env / probe resolution of the emoji width policy.
//! * [`width_probe`] — feature-gated CPR terminal probe.

pub mod cache;
pub mod policy;
pub mod segment;
pub mod truncate;
pub mod width;
#[cfg(feature = "term-probe")]
pub mod width_probe;

pub use cache::WidthCache;
pub use policy::resolve_policy;
pub use segment::{Segment, segment_cells};
pub use truncate::{ELLIPSIS, truncate_end, truncate_middle, truncate_start};
pub use width::{EmojiWidthPolicy, cluster_width, measure_cells, measure_cells_lossy};
