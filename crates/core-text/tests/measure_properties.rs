//! Property coverage for measurement and truncation.

use core_text::{
    EmojiWidthPolicy, measure_cells, segment_cells, truncate_end, truncate_middle, truncate_start,
};
use proptest::prelude::*;

const WIDE: EmojiWidthPolicy = EmojiWidthPolicy::Wide;

proptest! {
    /// For ASCII-only strings the width equals the printable character count.
    #[test]
    fn ascii_width_is_printable_count(s in "[ -~]{0,64}") {
        prop_assert_eq!(measure_cells(&s, WIDE), s.chars().count());
    }

    /// Measurement is deterministic across repeated calls.
    #[test]
    fn measure_is_deterministic(s in "\\PC{0,32}") {
        prop_assert_eq!(measure_cells(&s, WIDE), measure_cells(&s, WIDE));
        prop_assert_eq!(
            measure_cells(&s, EmojiWidthPolicy::Narrow),
            measure_cells(&s, EmojiWidthPolicy::Narrow)
        );
    }

    /// Segment widths sum to the string width and cover the input exactly.
    #[test]
    fn segments_partition_input(s in "\\PC{0,32}") {
        let segs = segment_cells(&s, WIDE);
        let sum: usize = segs.iter().map(|seg| seg.width).sum();
        prop_assert_eq!(sum, measure_cells(&s, WIDE));
        let mut prev = 0;
        for seg in &segs {
            prop_assert_eq!(seg.start, prev);
            prev = seg.end;
        }
        prop_assert_eq!(prev, s.len());
    }

    /// Truncating to a string's own width returns it unchanged.
    #[test]
    fn truncate_to_own_width_is_identity(s in "\\PC{0,32}") {
        let w = measure_cells(&s, WIDE) as isize;
        prop_assert_eq!(truncate_end(&s, w, WIDE), s.clone());
        prop_assert_eq!(truncate_start(&s, w, WIDE), s.clone());
        prop_assert_eq!(truncate_middle(&s, w.max(4), WIDE), s);
    }

    /// Truncation output never exceeds the budget for any n >= 1.
    #[test]
    fn truncate_respects_budget(s in "\\PC{0,32}", n in 1isize..40) {
        for f in [truncate_end, truncate_middle, truncate_start] {
            let out = f(&s, n, WIDE);
            prop_assert!(measure_cells(&out, WIDE) <= n as usize);
        }
    }

    /// Narrow emoji policy never yields a wider answer than wide policy.
    #[test]
    fn narrow_never_exceeds_wide(s in "\\PC{0,32}") {
        prop_assert!(
            measure_cells(&s, EmojiWidthPolicy::Narrow) <= measure_cells(&s, WIDE)
        );
    }
}
