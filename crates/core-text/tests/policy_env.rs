//! Environment override resolution.
//!
//! Kept in an integration test binary so the env mutation cannot race the
//! crate's unit tests.

use core_text::policy::{ENV_POLICY, resolve_policy};
use core_text::EmojiWidthPolicy;

#[test]
fn env_override_wins_over_configured_policy() {
    // SAFETY: this test binary runs these cases sequentially in one thread
    // of control over the variable; no other test in the binary reads it.
    unsafe { std::env::set_var(ENV_POLICY, "narrow") };
    assert_eq!(
        resolve_policy(EmojiWidthPolicy::Wide, None),
        EmojiWidthPolicy::Narrow
    );

    unsafe { std::env::set_var(ENV_POLICY, "wide") };
    assert_eq!(
        resolve_policy(EmojiWidthPolicy::Narrow, None),
        EmojiWidthPolicy::Wide
    );

    // Unknown values fall back to the configured policy.
    unsafe { std::env::set_var(ENV_POLICY, "sideways") };
    assert_eq!(
        resolve_policy(EmojiWidthPolicy::Narrow, None),
        EmojiWidthPolicy::Narrow
    );

    unsafe { std::env::remove_var(ENV_POLICY) };
    assert_eq!(
        resolve_policy(EmojiWidthPolicy::Auto, None),
        EmojiWidthPolicy::Wide
    );
}
