//! Network devices.

use serde::Serialize;

use crate::energy::RadioEnergyModel;
use crate::packet::{Frame, MacAddress};
use crate::time::SimDuration;

/// 802.11a base rate.
pub const DEFAULT_BITRATE: u64 = 6_000_000;

/// Per-device frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub rx_frames: u64,
    pub rx_bytes: u64,
    /// Unicasts the peer never acknowledged.
    pub tx_failed: u64,
}

/// A radio attached to the shared channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    mac: MacAddress,
    bitrate: u64,
    radio: RadioEnergyModel,
    stats: DeviceStats,
}

impl Device {
    pub fn new(mac: MacAddress) -> Self {
        Device {
            mac,
            bitrate: DEFAULT_BITRATE,
            radio: RadioEnergyModel::default(),
            stats: DeviceStats::default(),
        }
    }

    pub fn with_bitrate(mut self, bits_per_sec: u64) -> Self {
        self.bitrate = bits_per_sec.max(1);
        self
    }

    pub fn with_radio(mut self, radio: RadioEnergyModel) -> Self {
        self.radio = radio;
        self
    }

    /// Air time of `frame` at this device's bitrate, rounded up to the
    /// next nanosecond.
    pub fn tx_time(&self, frame: &Frame) -> SimDuration {
        let bits = frame.wire_size() as u128 * 8;
        let nanos = (bits * 1_000_000_000).div_ceil(self.bitrate as u128);
        SimDuration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    pub(crate) fn record_tx(&mut self, frame: &Frame) {
        self.stats.tx_frames += 1;
        self.stats.tx_bytes += frame.wire_size() as u64;
    }

    pub(crate) fn record_rx(&mut self, frame: &Frame) {
        self.stats.rx_frames += 1;
        self.stats.rx_bytes += frame.wire_size() as u64;
    }

    pub(crate) fn record_tx_failed(&mut self) {
        self.stats.tx_failed += 1;
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn bitrate(&self) -> u64 {
        self.bitrate
    }

    pub fn radio(&self) -> &RadioEnergyModel {
        &self.radio
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }
}
