//! Per-node energy accounting.
//!
//! An [`EnergySource`] is drained two ways: by discrete draws (a device
//! transmitting or receiving a frame) and by a continuous baseline
//! current (the radio idling). The baseline is integrated lazily, only
//! when the source is touched, and the owner predicts the depletion
//! instant with [`EnergySource::time_to_depletion`] so a single event can
//! be scheduled for it.

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::time::{SimDuration, SimTime};

/// Default supply voltage.
pub const DEFAULT_VOLTAGE: f64 = 3.0;

/// Remaining energy at or below this many joules counts as empty.
const DEPLETION_TOLERANCE_J: f64 = 1e-9;

/// Result of touching an energy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyUpdate {
    /// Still has energy, or was already depleted before this call.
    Ok,
    /// Reached zero during this call. Reported exactly once per source.
    Depleted,
}

/// Currents drawn by a device's radio in each state, in amperes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioEnergyModel {
    pub tx_current: f64,
    pub rx_current: f64,
    pub idle_current: f64,
}

impl RadioEnergyModel {
    pub fn validate(&self) -> SimResult<()> {
        for (name, value) in [
            ("tx_current", self.tx_current),
            ("rx_current", self.rx_current),
            ("idle_current", self.idle_current),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::Config(format!(
                    "radio {} must be a non-negative current, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for RadioEnergyModel {
    fn default() -> Self {
        RadioEnergyModel {
            tx_current: 0.0174,
            rx_current: 0.0174,
            idle_current: 0.273,
        }
    }
}

/// A battery-like energy store.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySource {
    initial: f64,
    remaining: f64,
    voltage: f64,
    baseline_current: f64,
    last_update: SimTime,
    total_consumed: f64,
    depleted_at: Option<SimTime>,
}

impl EnergySource {
    /// Create a full source holding `initial_joules` at `voltage`.
    pub fn new(initial_joules: f64, voltage: f64) -> SimResult<Self> {
        if !initial_joules.is_finite() || initial_joules < 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "initial energy must be a non-negative number of joules, got {}",
                initial_joules
            )));
        }
        if !voltage.is_finite() || voltage <= 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "supply voltage must be positive, got {}",
                voltage
            )));
        }
        Ok(EnergySource {
            initial: initial_joules,
            remaining: initial_joules,
            voltage,
            baseline_current: 0.0,
            last_update: SimTime::ZERO,
            total_consumed: 0.0,
            depleted_at: if initial_joules <= DEPLETION_TOLERANCE_J {
                Some(SimTime::ZERO)
            } else {
                None
            },
        })
    }

    /// Integrate the baseline drain up to `now`.
    pub fn update(&mut self, now: SimTime) -> EnergyUpdate {
        if now <= self.last_update {
            return EnergyUpdate::Ok;
        }
        let start = self.last_update;
        self.last_update = now;
        if self.is_depleted() || self.baseline_current == 0.0 {
            return EnergyUpdate::Ok;
        }
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        let power = self.baseline_current * self.voltage;
        let before = self.remaining;
        let result = self.consume(power * elapsed, now);
        if result == EnergyUpdate::Depleted {
            // The drain crossed zero somewhere inside (start, now].
            let exact = SimDuration::from_secs_f64(before / power)
                .map(|d| start.saturating_plus(d))
                .unwrap_or(now);
            self.depleted_at = Some(exact.min(now));
        }
        result
    }

    /// Draw `amperes` for `duration`, after integrating the baseline up to
    /// `now`.
    pub fn draw_current(
        &mut self,
        now: SimTime,
        amperes: f64,
        duration: SimDuration,
    ) -> SimResult<EnergyUpdate> {
        if !amperes.is_finite() || amperes < 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "current must be non-negative, got {} A",
                amperes
            )));
        }
        if self.update(now) == EnergyUpdate::Depleted {
            return Ok(EnergyUpdate::Depleted);
        }
        if self.is_depleted() {
            return Ok(EnergyUpdate::Ok);
        }
        let joules = amperes * self.voltage * duration.as_secs_f64();
        Ok(self.consume(joules, now))
    }

    /// Change the continuous current. Energy drawn at the old rate is
    /// integrated first.
    pub fn set_baseline_current(&mut self, now: SimTime, amperes: f64) -> SimResult<EnergyUpdate> {
        if !amperes.is_finite() || amperes < 0.0 {
            return Err(SimError::InvalidArgument(format!(
                "baseline current must be non-negative, got {} A",
                amperes
            )));
        }
        let result = self.update(now);
        self.baseline_current = amperes;
        Ok(result)
    }

    fn consume(&mut self, joules: f64, now: SimTime) -> EnergyUpdate {
        if self.is_depleted() || joules <= 0.0 {
            return EnergyUpdate::Ok;
        }
        let used = joules.min(self.remaining);
        self.remaining -= used;
        self.total_consumed += used;
        if self.remaining <= DEPLETION_TOLERANCE_J {
            self.total_consumed += self.remaining;
            self.remaining = 0.0;
            self.depleted_at = Some(now);
            EnergyUpdate::Depleted
        } else {
            EnergyUpdate::Ok
        }
    }

    /// Time left until the baseline alone empties the source, measured
    /// from the last update. `None` when nothing drains continuously.
    pub fn time_to_depletion(&self) -> Option<SimDuration> {
        if self.is_depleted() || self.baseline_current <= 0.0 {
            return None;
        }
        let secs = self.remaining / (self.baseline_current * self.voltage);
        SimDuration::from_secs_f64(secs).ok()
    }

    /// Predicted absolute depletion instant under the current baseline.
    pub fn predicted_depletion(&self) -> Option<SimTime> {
        self.time_to_depletion()
            .and_then(|d| self.last_update.plus(d))
    }

    /// Remaining energy as it would be at `now`, without mutating.
    pub fn remaining_at(&self, now: SimTime) -> f64 {
        if self.is_depleted() {
            return 0.0;
        }
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        let drained = self.baseline_current * self.voltage * elapsed;
        (self.remaining - drained).max(0.0)
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn initial_energy(&self) -> f64 {
        self.initial
    }

    /// Remaining energy as of the last update.
    pub fn remaining_energy(&self) -> f64 {
        self.remaining
    }

    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    pub fn baseline_current(&self) -> f64 {
        self.baseline_current
    }

    pub fn total_consumed(&self) -> f64 {
        self.total_consumed
    }

    pub fn is_depleted(&self) -> bool {
        self.depleted_at.is_some()
    }

    pub fn depleted_at(&self) -> Option<SimTime> {
        self.depleted_at
    }

    /// Remaining energy as a fraction of the initial energy, in `[0, 1]`.
    pub fn fraction_remaining(&self) -> f64 {
        if self.initial <= 0.0 {
            0.0
        } else {
            (self.remaining / self.initial).clamp(0.0, 1.0)
        }
    }
}
