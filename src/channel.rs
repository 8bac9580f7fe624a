//! Shared wireless channel with a range cutoff and seeded loss.
//!
//! Every frame a device transmits goes through [`Channel::process`] once
//! per candidate receiver. The channel decides whether that receiver
//! hears the frame and, if so, after what propagation delay. Loss draws
//! come from the channel's own ChaCha8 stream, so every run with the same
//! seed makes identical decisions.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::node::NodeId;
use crate::packet::{Frame, MacAddress};
use crate::random::{stream_rng, Stream};
use crate::time::SimDuration;

// ── Channel Config ────────────────────────────────────────────────────

/// Frame loss applied on top of the range cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossModel {
    /// Every in-range frame is received.
    #[default]
    None,
    /// Each in-range reception is independently lost with `probability`.
    Random { probability: f64 },
}

/// Configuration for the simulated channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Receivers farther than this (metres) never hear a frame.
    pub max_range: f64,
    /// Propagation speed in m/s.
    pub propagation_speed: f64,
    pub loss: LossModel,
    /// Extra wait after the transmission ends before an unacknowledged
    /// unicast is reported back to the sender as failed.
    #[serde(with = "secs")]
    pub ack_timeout: SimDuration,
}

impl ChannelConfig {
    /// A lossless channel with the given range.
    pub fn with_range(max_range: f64) -> Self {
        ChannelConfig {
            max_range,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.max_range.is_finite() || self.max_range < 0.0 {
            return Err(SimError::Config(format!(
                "channel max_range must be a non-negative distance, got {}",
                self.max_range
            )));
        }
        if !self.propagation_speed.is_finite() || self.propagation_speed <= 0.0 {
            return Err(SimError::Config(format!(
                "channel propagation_speed must be positive, got {}",
                self.propagation_speed
            )));
        }
        if let LossModel::Random { probability } = self.loss {
            if !(0.0..=1.0).contains(&probability) {
                return Err(SimError::Config(format!(
                    "loss probability must be in [0, 1], got {}",
                    probability
                )));
            }
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            max_range: 250.0,
            propagation_speed: 3.0e8,
            loss: LossModel::None,
            ack_timeout: SimDuration::from_millis(2),
        }
    }
}

/// Serde adapter storing a [`SimDuration`] as fractional seconds.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::time::SimDuration;

    pub fn serialize<S: Serializer>(d: &SimDuration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SimDuration, D::Error> {
        let secs = f64::deserialize(d)?;
        SimDuration::from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// ── Channel Decision ──────────────────────────────────────────────────

/// The outcome of one (frame, receiver) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDecision {
    /// The receiver hears the frame `delay` after the transmission ends.
    Delivered { delay: SimDuration },
    /// The receiver is beyond `max_range`.
    DroppedOutOfRange,
    /// Lost by the loss model.
    DroppedByLoss,
    /// The receiving node has no energy left.
    ReceiverOff,
}

impl ChannelDecision {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelDecision::Delivered { .. })
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Frames put on the air.
    pub transmitted: u64,
    /// Successful (frame, receiver) deliveries.
    pub delivered: u64,
    pub dropped_out_of_range: u64,
    pub dropped_by_loss: u64,
    pub dropped_receiver_off: u64,
    /// Unicast frames reported back to their sender as unacknowledged.
    pub tx_failed: u64,
}

/// A device attached to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub node: NodeId,
    pub device: usize,
    pub mac: MacAddress,
}

// ── Channel ───────────────────────────────────────────────────────────

/// The medium shared by every attached device.
///
/// Owned by `NodeRuntime`. The channel knows nothing about positions or
/// energy: the runtime resolves both and passes them to `process`.
#[derive(Debug, Clone)]
pub struct Channel {
    config: ChannelConfig,
    rng: ChaCha8Rng,
    attachments: Vec<Attachment>,
    stats: ChannelStats,
}

impl Channel {
    /// Create a channel drawing loss decisions from the scenario `seed`.
    pub fn new(config: ChannelConfig, seed: u64) -> Self {
        Channel {
            config,
            rng: stream_rng(seed, Stream::Channel, 0),
            attachments: Vec::new(),
            stats: ChannelStats::default(),
        }
    }

    /// Attach a device. Attachment order is the broadcast delivery order.
    pub fn attach(&mut self, node: NodeId, device: usize, mac: MacAddress) {
        self.attachments.push(Attachment { node, device, mac });
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Look up the device owning `mac`.
    pub fn resolve(&self, mac: MacAddress) -> Option<Attachment> {
        self.attachments.iter().copied().find(|a| a.mac == mac)
    }

    /// Candidate receivers of `frame` sent by `sender`: every other
    /// attached device for a broadcast, the addressed device otherwise.
    pub fn receivers(&self, sender: NodeId, frame: &Frame) -> Vec<Attachment> {
        if frame.is_broadcast() {
            self.attachments
                .iter()
                .copied()
                .filter(|a| a.node != sender)
                .collect()
        } else {
            self.resolve(frame.dst)
                .filter(|a| a.node != sender)
                .into_iter()
                .collect()
        }
    }

    /// Count a frame going on the air.
    pub fn record_transmission(&mut self) {
        self.stats.transmitted += 1;
    }

    /// Count an unacknowledged unicast.
    pub fn record_tx_failed(&mut self) {
        self.stats.tx_failed += 1;
    }

    /// Decide whether a receiver at `distance` metres hears a frame.
    ///
    /// Range and power are checked before the loss draw, so out-of-range
    /// and powered-off receivers never consume random numbers.
    pub fn process(&mut self, distance: f64, receiver_powered: bool) -> ChannelDecision {
        if distance > self.config.max_range {
            self.stats.dropped_out_of_range += 1;
            ChannelDecision::DroppedOutOfRange
        } else if !receiver_powered {
            self.stats.dropped_receiver_off += 1;
            ChannelDecision::ReceiverOff
        } else if self.lost() {
            self.stats.dropped_by_loss += 1;
            ChannelDecision::DroppedByLoss
        } else {
            self.stats.delivered += 1;
            ChannelDecision::Delivered {
                delay: self.propagation_delay(distance),
            }
        }
    }

    fn lost(&mut self) -> bool {
        match self.config.loss {
            LossModel::None => false,
            LossModel::Random { probability } => {
                probability > 0.0 && self.rng.gen::<f64>() < probability
            }
        }
    }

    /// Time for a signal to cover `distance` metres.
    pub fn propagation_delay(&self, distance: f64) -> SimDuration {
        SimDuration::from_secs_f64(distance / self.config.propagation_speed)
            .unwrap_or(SimDuration::ZERO)
    }

    // ── Accessors ─────────────────────────────────────────────────

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }
}
