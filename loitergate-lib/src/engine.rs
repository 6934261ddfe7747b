//! Session/engine lifecycle context tying the counter store, the watermark
//! policy, the decision log, and the per-process random generator together.
//!
//! One [`AdmissionEngine`] is constructed per process at start and driven by
//! the host at its lifecycle points. There are no ambient globals: every
//! piece of state lives in this struct. Nothing here may terminate the host;
//! every store failure degrades to allowing the connection.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{LoiterError, Result};
use crate::log::DecisionLog;
use crate::policy::{self, Decision, Watermarks};
use crate::store::{CounterField, CounterStore, RegionCounts};

/// Message sent to a rejected client when the operator supplies none.
pub const DEFAULT_REJECT_MESSAGE: &str = "Too many loitering connections";

/// The role this process plays in the server's lifetime.
///
/// Destruction of the shared region is gated on this tag, determined once at
/// process start from the host's process model — never inferred from
/// reference counts, which are unreliable across processes that may crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// The long-lived process owning the server's lifetime; the only one
    /// allowed to destroy the region at final shutdown.
    RegionOwner,
    /// A transient per-connection worker.
    Worker,
}

/// The engine's verdict on an incoming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Let the connection proceed to authentication.
    Allow,
    /// Reject the connection; `message` is the text to send the client
    /// before disconnecting.
    Drop { message: String },
}

/// Per-process admission engine.
#[derive(Debug)]
pub struct AdmissionEngine {
    store: Option<CounterStore>,
    marks: Watermarks,
    rng: SmallRng,
    decision_log: DecisionLog,
    reject_message: String,
    is_region_owner: bool,
    has_authenticated: bool,
}

impl AdmissionEngine {
    /// Process start: attach to (or create) the shared region and snapshot
    /// the session's watermarks.
    ///
    /// A disabled config yields an inert engine that allows everything. An
    /// attach failure — including a size mismatch against a stale region —
    /// disables the engine for this session rather than failing the host;
    /// the cause is logged.
    pub fn new(config: &Config, role: ProcessRole) -> Self {
        let marks = config.rules.watermarks().rescale(config.capacity_limit);
        let reject_message = config
            .reject_message
            .clone()
            .unwrap_or_else(|| DEFAULT_REJECT_MESSAGE.to_string());

        let store = if config.enabled {
            match &config.table {
                Some(path) => match CounterStore::open_or_attach(path) {
                    Ok(store) => Some(store),
                    Err(err) => {
                        warn!(%err, "unable to open counter region, admission control disabled");
                        None
                    }
                },
                None => {
                    warn!("no table path configured, admission control disabled");
                    None
                }
            }
        } else {
            None
        };

        let decision_log = match config.log_path() {
            Some(path) if store.is_some() => DecisionLog::open(path),
            _ => DecisionLog::disabled(),
        };

        if let Some(store) = &store {
            debug!(
                table = %store.path().display(),
                low = marks.low,
                high = marks.high,
                rate = marks.rate,
                ?role,
                "admission engine ready"
            );
        }

        Self {
            store,
            marks,
            rng: SmallRng::seed_from_u64(policy::restart_seed()),
            decision_log,
            reject_message,
            is_region_owner: role == ProcessRole::RegionOwner,
            has_authenticated: false,
        }
    }

    /// Whether the engine is live (enabled and attached to the region).
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Session start: count this connection and decide whether to admit it.
    ///
    /// The connection is counted first so the decision sees it; on a drop
    /// verdict the host must still call [`session_end`](Self::session_end)
    /// after disconnecting, which pairs the decrement. Counter failures are
    /// logged and the decision fails open.
    pub fn session_start(&mut self) -> Admission {
        let Some(store) = &self.store else {
            return Admission::Allow;
        };

        if let Err(err) = store.adjust(CounterField::Connections, 1) {
            warn!(%err, "error incrementing connection count");
        }

        self.rng = SmallRng::seed_from_u64(policy::session_seed());

        let counts = match store.read_counts() {
            Ok(counts) => counts,
            Err(err) => {
                // Cannot determine the loitering population: fail open.
                warn!(%err, "error getting connection counts");
                return Admission::Allow;
            }
        };

        if counts.authd_count > counts.conn_count {
            self.decision_log.write_line("authenticated count exceeds connection count");
        }

        match policy::decide(&counts, &self.marks, &mut self.rng) {
            Decision::Allow => Admission::Allow,
            Decision::Drop => {
                info!(
                    conn_count = counts.conn_count,
                    authd_count = counts.authd_count,
                    "dropping connection"
                );
                self.decision_log.write_line("dropping connection");
                if let Err(err) = store.adjust(CounterField::Rejected, 1) {
                    warn!(%err, "error incrementing rejected connection count");
                }
                Admission::Drop { message: self.reject_message.clone() }
            }
        }
    }

    /// Successful authentication: this session is no longer loitering.
    pub fn authenticated(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        match store.adjust(CounterField::Authenticated, 1) {
            Ok(()) => self.has_authenticated = true,
            Err(err) => {
                warn!(%err, "error incrementing authenticated connection count");
            }
        }
    }

    /// Session end: release this session's counts.
    ///
    /// Must be called exactly once per session, including sessions that were
    /// dropped at admission.
    pub fn session_end(&mut self) {
        let Some(store) = &self.store else {
            return;
        };

        if self.has_authenticated {
            if let Err(err) = store.adjust(CounterField::Authenticated, -1) {
                warn!(%err, "error decrementing authenticated connection count");
            }
            self.has_authenticated = false;
        }

        if let Err(err) = store.adjust(CounterField::Connections, -1) {
            warn!(%err, "error decrementing connection count");
        }
    }

    /// Administrative restart: reseed the per-process generator.
    pub fn reseed_for_restart(&mut self) {
        self.rng = SmallRng::seed_from_u64(policy::restart_seed());
    }

    /// Current counters, for diagnostics.
    pub fn counts(&self) -> Result<RegionCounts> {
        match &self.store {
            Some(store) => store.read_counts(),
            None => Err(LoiterError::Config("admission engine is disabled".into())),
        }
    }

    /// Final process shutdown.
    ///
    /// Only the [`ProcessRole::RegionOwner`] destroys the backing region;
    /// workers merely detach by dropping their handle.
    pub fn shutdown(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };

        if self.is_region_owner {
            if let Err(err) = store.destroy() {
                warn!(%err, "error destroying counter region");
            }
        }
    }
}
