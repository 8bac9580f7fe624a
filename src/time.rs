//! Simulated time for the discrete-event kernel.
//!
//! Time is an integer count of nanoseconds. Nothing here reads the wall
//! clock: time advances only when the scheduler dispatches an event.

use serde::Serialize;

use crate::error::{SimError, SimResult};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// An absolute point on the simulated timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct SimTime(u64);

impl SimTime {
    /// The zero-point of simulation time.
    pub const ZERO: SimTime = SimTime(0);

    /// Create a `SimTime` from raw nanoseconds.
    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        SimTime(nanos)
    }

    /// Create a `SimTime` from seconds.
    ///
    /// Fails with `InvalidArgument` for negative or non-finite input.
    pub fn from_secs_f64(secs: f64) -> SimResult<Self> {
        SimDuration::from_secs_f64(secs).map(|d| SimTime(d.0))
    }

    /// Return the raw nanosecond value.
    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Return the time in (fractional) seconds.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC
    }

    /// Compute the absolute time that is `delay` after `self`.
    /// Returns `None` on overflow.
    #[inline]
    pub fn plus(self, delay: SimDuration) -> Option<SimTime> {
        self.0.checked_add(delay.0).map(SimTime)
    }

    /// Saturating variant of [`SimTime::plus`].
    #[inline]
    pub fn saturating_plus(self, delay: SimDuration) -> SimTime {
        SimTime(self.0.saturating_add(delay.0))
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: SimTime) -> bool {
        self.0 < other.0
    }

    /// Returns the span between two points in time.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: SimTime) -> Option<SimDuration> {
        self.0.checked_sub(earlier.0).map(SimDuration)
    }

    /// Span since `earlier`, or zero if `earlier` is in the future.
    #[inline]
    pub fn saturating_duration_since(self, earlier: SimTime) -> SimDuration {
        SimDuration(self.0.saturating_sub(earlier.0))
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// A non-negative span of simulated time, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct SimDuration(u64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    #[inline]
    pub fn from_nanos(nanos: u64) -> Self {
        SimDuration(nanos)
    }

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        SimDuration(micros.saturating_mul(1_000))
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        SimDuration(millis.saturating_mul(1_000_000))
    }

    #[inline]
    pub fn from_secs(secs: u64) -> Self {
        SimDuration(secs.saturating_mul(1_000_000_000))
    }

    /// Convert fractional seconds into a duration, rounding up to the next
    /// nanosecond so that a computed deadline is never early.
    ///
    /// Negative, NaN and infinite values are rejected with `InvalidArgument`.
    pub fn from_secs_f64(secs: f64) -> SimResult<Self> {
        if !secs.is_finite() {
            return Err(SimError::InvalidArgument(format!(
                "duration must be finite, got {}",
                secs
            )));
        }
        if secs < 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "duration must be non-negative, got {}",
                secs
            )));
        }
        let raw = secs * NANOS_PER_SEC;
        // Absorb float noise like 0.3 s -> 299999999.99999994 ns before rounding up.
        let nanos = if (raw - raw.round()).abs() < 1e-6 {
            raw.round()
        } else {
            raw.ceil()
        };
        if nanos >= u64::MAX as f64 {
            return Err(SimError::InvalidArgument(format!(
                "duration {} s overflows the simulation clock",
                secs
            )));
        }
        Ok(SimDuration(nanos as u64))
    }

    #[inline]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Multiply by an integer factor, saturating on overflow.
    #[inline]
    pub fn saturating_mul(self, factor: u64) -> SimDuration {
        SimDuration(self.0.saturating_mul(factor))
    }

    #[inline]
    pub fn saturating_add(self, other: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_add(other.0))
    }

    #[inline]
    pub fn saturating_sub(self, other: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for SimDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}
