//! On-disk layout of the shared counter region.
//!
//! Three little-endian `u32` counters in a fixed order. There is no version
//! field: a consumer changing this layout must pick a new identity path
//! rather than attempt an in-place upgrade, since concurrent readers could
//! observe a torn layout during a migration.

/// Byte offsets for the region wire format.
mod offsets {
    /// `u32` — total live connections across all worker processes.
    pub const CONN_COUNT: usize = 0;

    /// `u32` — subset of connections that have completed authentication.
    pub const AUTHD_COUNT: usize = 4;

    /// `u32` — lifetime count of rejected connections (diagnostic only).
    pub const REJECT_COUNT: usize = 8;
}

/// Total region size in bytes.
pub const REGION_SIZE: u64 = 12;

/// Names one of the three counters in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    /// Total live connections.
    Connections,
    /// Connections that have completed authentication.
    Authenticated,
    /// Connections rejected by the admission policy.
    Rejected,
}

impl CounterField {
    pub(crate) fn offset(self) -> usize {
        match self {
            CounterField::Connections => offsets::CONN_COUNT,
            CounterField::Authenticated => offsets::AUTHD_COUNT,
            CounterField::Rejected => offsets::REJECT_COUNT,
        }
    }
}

/// A snapshot of the region's counters, copied out under the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionCounts {
    pub conn_count: u32,
    pub authd_count: u32,
    pub reject_count: u32,
}

impl RegionCounts {
    /// Number of connections that are loitering: accepted but not yet
    /// authenticated. Saturating, never negative.
    pub fn unauthd_count(&self) -> u32 {
        self.conn_count.saturating_sub(self.authd_count)
    }

    pub(crate) fn decode(buf: &[u8; REGION_SIZE as usize]) -> Self {
        Self {
            conn_count: read_u32(buf, offsets::CONN_COUNT),
            authd_count: read_u32(buf, offsets::AUTHD_COUNT),
            reject_count: read_u32(buf, offsets::REJECT_COUNT),
        }
    }
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
