//! Emoji width policy resolution.
//!
//! Precedence, highest first:
//! 1. `ZRUI_EMOJI_WIDTH_POLICY` environment override (`wide` / `narrow` /
//!    `auto`).
//! 2. With the `term-probe` feature and `ZRUI_EMOJI_WIDTH_PROBE=1`, a CPR
//!    probe result supplied by the caller.
//! 3. The configured policy.
//! 4. `Auto` resolves to `Wide` — over-estimating an emoji width costs a
//!    blank cell, under-estimating causes render drift.

use crate::width::EmojiWidthPolicy;

pub const ENV_POLICY: &str = "ZRUI_EMOJI_WIDTH_POLICY";
pub const ENV_PROBE: &str = "ZRUI_EMOJI_WIDTH_PROBE";

/// True when `ZRUI_EMOJI_WIDTH_PROBE=1` requests the terminal probe.
pub fn probe_requested() -> bool {
    std::env::var(ENV_PROBE).is_ok_and(|v| v == "1")
}

/// Resolve the effective policy from the configured value and environment.
/// `probed` is the result of a terminal probe when one ran, else `None`.
pub fn resolve_policy(
    configured: EmojiWidthPolicy,
    probed: Option<EmojiWidthPolicy>,
) -> EmojiWidthPolicy {
    let from_env = std::env::var(ENV_POLICY)
        .ok()
        .and_then(|v| v.parse::<EmojiWidthPolicy>().ok());
    let chosen = from_env.unwrap_or(configured);
    let chosen = match chosen {
        EmojiWidthPolicy::Auto => probed.unwrap_or(EmojiWidthPolicy::Auto),
        concrete => concrete,
    };
    match chosen {
        EmojiWidthPolicy::Auto => EmojiWidthPolicy::Wide,
        concrete => concrete,
    }
}
