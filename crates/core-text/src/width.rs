//! Grapheme-cluster display width engine.
//!
//! A single authoritative function `cluster_width` returns the terminal
//! column width of one grapheme cluster; `measure_cells` sums it over a
//! string. Every layout and truncation decision upstream depends on these
//! being byte-for-byte reproducible, so the computation is pure: the same
//! input and policy always produce the same answer, with no locale or
//! environment input.
//!
//! Width rules, in precedence order per cluster:
//! 1. Segment per UAX #29 (the `unicode-segmentation` crate pins the
//!    dataset).
//! 2. Base width is the maximum per-codepoint width within the cluster.
//! 3. Per codepoint: ASCII control (< 0x20, 0x7f) and other control/CR/LF
//!    are 0; extend marks and ZWJ are 0; East-Asian wide is 2; pictographic
//!    codepoints contribute 1 (the cluster-level emoji rule decides their
//!    final width); everything else is 1.
//! 4. A cluster classified as emoji is clamped up to the policy minimum:
//!    `Wide` guarantees 2 cells, `Narrow` guarantees 1.
//!
//! Invariants:
//! * No caller computes display width without going through this module.
//! * Invalid input is replaced (U+FFFD, width 1), never an error.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthChar;

/// How emoji-classified clusters are counted.
///
/// `Auto` resolves to a concrete policy before measurement (env override,
/// optional terminal probe, else `Wide`); the measurement core only ever
/// sees `Wide` or `Narrow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EmojiWidthPolicy {
    #[default]
    Auto,
    Wide,
    Narrow,
}

impl EmojiWidthPolicy {
    /// Minimum cell count for an emoji cluster. `Auto` measures as `Wide`.
    pub fn emoji_min(self) -> usize {
        match self {
            EmojiWidthPolicy::Narrow => 1,
            EmojiWidthPolicy::Wide | EmojiWidthPolicy::Auto => 2,
        }
    }
}

impl std::str::FromStr for EmojiWidthPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(EmojiWidthPolicy::Auto),
            "wide" => Ok(EmojiWidthPolicy::Wide),
            "narrow" => Ok(EmojiWidthPolicy::Narrow),
            _ => Err(()),
        }
    }
}

const ZWJ: char = '\u{200D}';
const VS16: char = '\u{FE0F}';
const KEYCAP_COMBINING: char = '\u{20E3}';

fn is_regional_indicator(c: char) -> bool {
    ('\u{1F1E6}'..='\u{1F1FF}').contains(&c)
}

fn is_skin_tone_modifier(c: char) -> bool {
    ('\u{1F3FB}'..='\u{1F3FF}').contains(&c)
}

// Primary emoji blocks plus the Misc Symbols / Dingbats ranges where legacy
// emoji live. Heuristic range checks keep the dataset pinned without a large
// property-table dependency.
fn is_extended_pictographic(c: char) -> bool {
    ('\u{1F300}'..='\u{1FAFF}').contains(&c)
        || ('\u{2600}'..='\u{27BF}').contains(&c)
        || c == '\u{2B50}'
        || c == '\u{2B55}'
}

/// Per-codepoint width contribution inside a cluster.
#[inline]
fn codepoint_width(c: char) -> usize {
    let cp = c as u32;
    if cp < 0x20 || cp == 0x7f {
        return 0;
    }
    if c == ZWJ {
        return 0;
    }
    if is_extended_pictographic(c) {
        // Cluster-level emoji classification decides the final width.
        return 1;
    }
    // `width()` is None for other control codepoints and 0 for extend marks,
    // matching the zero-width rules; wide East-Asian codepoints report 2.
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// True when the cluster should be counted under the emoji policy.
fn is_emoji_cluster(cluster: &str) -> bool {
    let mut ri_count = 0usize;
    let mut has_keycap = false;
    let mut has_vs16 = false;
    let mut keycap_base = false;
    for c in cluster.chars() {
        if is_extended_pictographic(c) || is_skin_tone_modifier(c) {
            return true;
        }
        if is_regional_indicator(c) {
            ri_count += 1;
        }
        if c == KEYCAP_COMBINING {
            has_keycap = true;
        }
        if c == VS16 {
            has_vs16 = true;
        }
        if c.is_ascii_digit() || c == '#' || c == '*' {
            keycap_base = true;
        }
    }
    if ri_count >= 1 {
        return true;
    }
    if has_keycap && keycap_base {
        return true;
    }
    // VS16 on a non-pictographic base still requests emoji presentation.
    has_vs16
}

/// Display width of a single grapheme cluster.
///
/// Precondition: `cluster` is one UAX #29 cluster boundary slice. Callers
/// segment once and pass slices; the function does not re-segment.
pub fn cluster_width(cluster: &str, policy: EmojiWidthPolicy) -> usize {
    if cluster.is_empty() {
        return 0;
    }
    let base = cluster.chars().map(codepoint_width).max().unwrap_or(0);
    if is_emoji_cluster(cluster) {
        base.max(policy.emoji_min())
    } else {
        base
    }
}

/// Terminal-cell width of a string: the sum of its cluster widths.
pub fn measure_cells(text: &str, policy: EmojiWidthPolicy) -> usize {
    text.graphemes(true)
        .map(|g| cluster_width(g, policy))
        .sum()
}

/// Lossy entry point for byte callers: invalid UTF-8 sequences measure as
/// U+FFFD (width 1) rather than failing.
pub fn measure_cells_lossy(bytes: &[u8], policy: EmojiWidthPolicy) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(s) => measure_cells(s, policy),
        Err(_) => measure_cells(&String::from_utf8_lossy(bytes), policy),
    }
}
