//! CPR-based terminal emoji width probe.
//!
//! Feature gated behind `term-probe` so normal builds pay zero cost. The
//! probe decides between the wide and narrow emoji policies by asking the
//! terminal where the cursor lands after printing a reference emoji:
//!
//! 1. Emit CSI 6n (cursor position report) to record the starting column.
//! 2. Print a probe cluster (U+1F600) and emit CSI 6n again.
//! 3. The column delta is the terminal's rendered width for the cluster;
//!    2 selects `Wide`, 1 selects `Narrow`.
//!
//! Transport is abstracted behind `ProbeIo` so the sequence emission and the
//! CPR response parser are testable without a tty. The caller is responsible
//! for having the terminal in a mode where responses arrive on its reader
//! (raw mode on a real tty); a probe that cannot complete returns `None` and
//! the caller falls back to the default policy.

use crate::width::EmojiWidthPolicy;

const CPR_QUERY: &[u8] = b"\x1b[6n";
const PROBE_CLUSTER: &str = "\u{1F600}";

/// Byte transport for the probe exchange.
pub trait ProbeIo {
    /// Write bytes toward the terminal.
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    /// Read one CPR response (blocking up to the implementation's deadline).
    /// Returns the raw bytes of the response, or `None` on timeout.
    fn recv_report(&mut self) -> Option<Vec<u8>>;
}

/// Parse a CPR response `ESC [ <row> ; <col> R`, returning (row, col).
pub fn parse_cpr(bytes: &[u8]) -> Option<(u32, u32)> {
    let s = std::str::from_utf8(bytes).ok()?;
    let body = s.strip_prefix("\x1b[")?.strip_suffix('R')?;
    let (row, col) = body.split_once(';')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}

/// Run the probe exchange. `None` when any step fails or times out.
pub fn probe_emoji_policy(io: &mut dyn ProbeIo) -> Option<EmojiWidthPolicy> {
    io.send(CPR_QUERY).ok()?;
    let (_, start_col) = parse_cpr(&io.recv_report()?)?;
    io.send(PROBE_CLUSTER.as_bytes()).ok()?;
    io.send(CPR_QUERY).ok()?;
    let (_, end_col) = parse_cpr(&io.recv_report()?)?;
    // Erase the probe output so the exchange leaves no visible residue.
    let _ = io.send(b"\r\x1b[K");
    match end_col.checked_sub(start_col)? {
        2 => Some(EmojiWidthPolicy::Wide),
        1 => Some(EmojiWidthPolicy::Narrow),
        _ => None,
    }
}
