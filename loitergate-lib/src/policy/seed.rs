//! Seed derivation for the per-process generator.
//!
//! The generator is reseeded at two distinct lifecycle points: on
//! administrative restart and again at session start. Forked workers that
//! inherit a parent's generator state would otherwise roll correlated
//! sequences; mixing wall-clock time with the process id at session start
//! breaks that. The two derivations are kept separate on purpose.

use std::time::{SystemTime, UNIX_EPOCH};

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Seed for the restart-time reseed hook.
pub fn restart_seed() -> u64 {
    unix_time().wrapping_mul(u64::from(std::process::id()))
}

/// Seed for the session-start reseed hook.
pub fn session_seed() -> u64 {
    unix_time() ^ u64::from(std::process::id())
}
