//! Dispatcher — bounded-concurrency admission, dispatch and drain
//!
//! The [`BoundedDispatcher`] issues calls against a [`ConnectionPool`] as fast as a
//! fixed concurrency budget allows, for a fixed wall-clock duration, and then
//! waits for every issued call to finish before reporting.
//!
//! # High-level flow
//! 1. The budget is a `tokio::sync::Semaphore` pre-loaded with `capacity` permits.
//!    One permit means "one call may be outstanding".
//! 2. A single coordinating task runs the admission loop. On every attempt it:
//!    - checks the deadline without blocking and stops admitting once it passed,
//!    - acquires one permit, suspending while `capacity` calls are outstanding,
//!    - checks the deadline again and hands the permit back if it passed while
//!      waiting,
//!    - assigns the next token to connection `token mod N`, counts it as admitted,
//!      and spawns a task that performs the call and then drops the permit.
//! 3. Once admission stops, the coordinator drains: it acquires all `capacity`
//!    permits back, which is only possible when every call task has released its
//!    own. No call is awaited by handle.
//! 4. `elapsed` runs from just before admission to just after the drain, so it
//!    includes the tail of in-flight calls.
//!
//! # Phases
//! Each run walks `Idle → Admitting → Draining → Done` without skipping a state.
//! The current [`Phase`] is published on a `watch` channel, see
//! [`BoundedDispatcher::phases`]. A [`RunResult`] only exists once `Done` is reached.
//!
//! # Tuning knobs
//! - `budget`: the concurrency cap. [`Budget::Unbounded`] removes the cap and only
//!   exists as a comparison baseline: it fans out as fast as the coordinator can
//!   spawn tasks and is never the default.
//! - `duration`: how long admission runs.
//! - `deadline`: how the coordinator notices the end of admission, see
//!   [`DeadlinePolicy`].
//!
//! # Counting
//! - `admitted` is written by the coordinator only. Call tasks never touch it; the
//!   only thing they signal back is the permit release.
//! - Call outcomes are tallied separately in atomic success/failure counters. A
//!   failed call is still admitted, so the reported rate is the *offered* rate.
//! - A call that panics is tallied as a failure; its permit is released during
//!   unwinding like any other.
//!
//! # Known limitation
//! There is no per-call timeout. A hung call holds its permit until it returns,
//! which shows up only as reduced throughput, and the drain waits for it.
pub mod bounded;
pub mod deadline;

pub use bounded::BoundedDispatcher;
pub use deadline::DeadlinePolicy;

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tokio::sync::Semaphore;

use crate::error::ConfigError;

#[cfg(doc)]
use crate::ConnectionPool;

/// The semaphore reserves 3 bits of `usize` for flags and drains with a `u32`
/// permit count, so an unbounded budget is capped at whichever is smaller.
const MAX_CAPACITY: u32 = if Semaphore::MAX_PERMITS < u32::MAX as usize {
    Semaphore::MAX_PERMITS as u32
} else {
    u32::MAX
};

/// How many calls may be outstanding at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Budget {
    /// At most this many calls in flight. Zero is rejected.
    Bounded(u32),
    /// No cap. Only meant as a baseline to compare bounded runs against.
    Unbounded,
}

impl Budget {
    /// The number of permits the budget starts with.
    pub fn capacity(&self) -> Result<u32, ConfigError> {
        match *self {
            Budget::Bounded(0) => Err(ConfigError::ZeroBudget),
            Budget::Bounded(n) => Ok(n.min(MAX_CAPACITY)),
            Budget::Unbounded => Ok(MAX_CAPACITY),
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::Bounded(n) => write!(f, "{n}"),
            Budget::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Lifecycle of a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Admitting,
    Draining,
    Done,
}

impl Phase {
    /// The only phase this one may move to. `Done` is terminal.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Idle => Some(Phase::Admitting),
            Phase::Admitting => Some(Phase::Draining),
            Phase::Draining => Some(Phase::Done),
            Phase::Done => None,
        }
    }
}

/// Outcome of one completed run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Calls launched. Unaffected by whether they succeeded.
    pub admitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// From just before admission to just after the drain.
    pub elapsed: Duration,
}

impl RunResult {
    /// Offered throughput in calls per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.admitted as f64 / secs
        } else {
            0.0
        }
    }
}
