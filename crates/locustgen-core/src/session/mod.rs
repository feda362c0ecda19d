//! Per-connection session state: lifecycle phase, liveness and request rate.
//!
//! The registry is transport-agnostic. Callers pass `Instant`s in, which
//! keeps every timing rule testable without sleeping.

pub mod rate_limit;
pub mod registry;

pub use rate_limit::SlidingWindowLimiter;
pub use registry::{
    ConnectionPhase, SessionId, SessionLimits, SessionRegistry, SessionState, SweepAction,
};
