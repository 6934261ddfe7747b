#![forbid(unsafe_code)]

//! Admission control for connection-accepting servers.
//!
//! Bounds the number of clients that have connected but not yet completed
//! authentication ("loitering" connections), mitigating slow-connection
//! resource-exhaustion attacks. Worker processes coordinate through a small
//! file-backed counter region guarded by an advisory exclusive lock; a pure
//! watermark policy decides whether each new, not-yet-authenticated
//! connection should be rejected.
//!
//! The host server owns all network I/O and calls in at five points:
//! process start ([`AdmissionEngine::new`]), session start
//! ([`AdmissionEngine::session_start`]), successful authentication
//! ([`AdmissionEngine::authenticated`]), session end
//! ([`AdmissionEngine::session_end`]), and final shutdown
//! ([`AdmissionEngine::shutdown`]).

pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod policy;
pub mod store;

pub use config::{load_from_path, Config, RulesConfig};
pub use engine::{Admission, AdmissionEngine, ProcessRole};
pub use error::{LoiterError, Result};
pub use policy::{decide, Decision, Watermarks};
pub use store::{CounterField, CounterStore, RegionCounts};
