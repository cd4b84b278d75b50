//! telemetry.rs — standardized "tlog" line emission
//!
//! Emits one structured event per observation, rendered as
//! `<emoji> <SUBSYSTEM:12> <STATE:20> <primary:16> | <meta>` on stdout via
//! `tracing`, mirroring the original agent's `tlog()` helper.

use tracing::info;

/// Emit a single telemetry line for `subsystem` entering `state`.
///
/// `primary` is the headline value (an IP, a transition, a reason); `meta`
/// is optional supplementary detail appended after a pipe.
pub fn emit(emoji: &str, subsystem: &str, state: &str, primary: &str, meta: Option<&str>) {
    match meta {
        Some(meta) => info!(
            "{emoji} {subsystem:<12} {state:<20} {primary:<16} | {meta}",
            emoji = emoji,
            subsystem = subsystem,
            state = state,
            primary = primary,
            meta = meta,
        ),
        None => info!(
            "{emoji} {subsystem:<12} {state:<20} {primary:<16}",
            emoji = emoji,
            subsystem = subsystem,
            state = state,
            primary = primary,
        ),
    }
}
