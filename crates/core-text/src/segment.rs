//! Grapheme segmentation with byte ranges and cell widths.
//!
//! Contract:
//! - Input: any `&str` plus a concrete emoji width policy.
//! - Output: segments in order, non-overlapping, covering the entire input;
//!   each segment is one grapheme cluster with absolute byte offsets and its
//!   terminal cell width.
//! - Callers that need the cluster text slice it from the input; segments
//!   hold offsets only, so segmentation allocates a single `Vec`.

use crate::width::{EmojiWidthPolicy, cluster_width};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset of the cluster start (inclusive).
    pub start: usize,
    /// Byte offset of the cluster end (exclusive).
    pub end: usize,
    /// Terminal cell width of the cluster.
    pub width: usize,
}

/// Segment into grapheme clusters with widths and byte ranges.
pub fn segment_cells(text: &str, policy: EmojiWidthPolicy) -> Vec<Segment> {
    let mut out = Vec::new();
    for (start, g) in text.grapheme_indices(true) {
        out.push(Segment {
            start,
            end: start + g.len(),
            width: cluster_width(g, policy),
        });
    }
    out
}
