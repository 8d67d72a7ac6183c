// crates/formwork-core/src/clock.rs
// ============================================================================
// Module: Clocks
// Description: Millisecond time sources for cache expiry.
// Purpose: Keep TTL logic independent of wall-clock time.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! The TTL cache reads time only through [`Clock`]. [`MonotonicClock`] is
//! based on `tokio::time::Instant`, so paused-time tests drive it with
//! `tokio::time::advance`. [`ManualClock`] is set explicitly.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::time::Instant;

/// Millisecond time source.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds from an arbitrary origin.
    fn now_ms(&self) -> u64;
}

/// Monotonic clock measured from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    /// Creation instant.
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in milliseconds.
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock at the given time.
    #[must_use]
    pub const fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    /// Advances the clock.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Sets the clock.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
