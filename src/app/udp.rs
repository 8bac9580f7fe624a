//! Constant-rate UDP sender and counting receiver.

use std::any::Any;
use std::collections::BTreeMap;

use log::{debug, info};

use crate::error::SimError;
use crate::node::NodeId;
use crate::packet::{Packet, Payload};
use crate::time::SimDuration;

use super::{AppContext, AppStats, Application};

const SEND_TIMER: u64 = 1;

/// Default ephemeral port of a client.
pub const CLIENT_PORT: u16 = 49153;

/// Sends `size_bytes` datagrams to `remote:remote_port` every `interval`.
#[derive(Debug, Clone)]
pub struct UdpClient {
    remote: NodeId,
    remote_port: u16,
    local_port: u16,
    /// `0` sends until stopped.
    max_packets: u64,
    interval: SimDuration,
    size_bytes: u32,
    running: bool,
    stats: AppStats,
}

impl UdpClient {
    pub fn new(remote: NodeId, remote_port: u16) -> Self {
        UdpClient {
            remote,
            remote_port,
            local_port: CLIENT_PORT,
            max_packets: 0,
            interval: SimDuration::from_secs(1),
            size_bytes: 1024,
            running: false,
            stats: AppStats::default(),
        }
    }

    pub fn max_packets(mut self, n: u64) -> Self {
        self.max_packets = n;
        self
    }

    pub fn interval(mut self, interval: SimDuration) -> Self {
        self.interval = interval;
        self
    }

    pub fn packet_size(mut self, bytes: u32) -> Self {
        self.size_bytes = bytes;
        self
    }

    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    fn send_next(&mut self, ctx: &mut AppContext) {
        if self.max_packets != 0 && self.stats.sent >= self.max_packets {
            return;
        }
        let seq = self.stats.sent as u32;
        ctx.send(
            self.remote,
            self.remote_port,
            self.size_bytes,
            Payload::Datagram {
                seq,
                sent_at: ctx.now(),
            },
        );
        self.stats.sent += 1;
        if self.max_packets == 0 || self.stats.sent < self.max_packets {
            ctx.set_timer(self.interval, SEND_TIMER);
        }
    }
}

impl Application for UdpClient {
    fn on_start(&mut self, ctx: &mut AppContext) {
        self.running = true;
        self.send_next(ctx);
    }

    fn on_stop(&mut self, _ctx: &mut AppContext) {
        self.running = false;
    }

    fn on_timer(&mut self, ctx: &mut AppContext, timer_id: u64) {
        if self.running && timer_id == SEND_TIMER {
            self.send_next(ctx);
        }
    }

    fn on_send_failed(&mut self, ctx: &mut AppContext, packet: &Packet, error: &SimError) {
        debug!("{} udp client: {} failed: {}", ctx.node(), packet, error);
        self.stats.failed += 1;
    }

    fn stats(&self) -> AppStats {
        self.stats
    }

    fn port(&self) -> u16 {
        self.local_port
    }

    fn name(&self) -> &'static str {
        "udp-client"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Counts datagrams and infers losses from per-source sequence gaps.
#[derive(Debug, Clone)]
pub struct UdpServer {
    port: u16,
    /// Next expected sequence number per sender.
    expected: BTreeMap<NodeId, u32>,
    stats: AppStats,
}

impl UdpServer {
    pub fn new(port: u16) -> Self {
        UdpServer {
            port,
            expected: BTreeMap::new(),
            stats: AppStats::default(),
        }
    }

    /// Number of distinct senders heard from.
    pub fn peers(&self) -> usize {
        self.expected.len()
    }
}

impl Application for UdpServer {
    fn on_start(&mut self, ctx: &mut AppContext) {
        info!("{} udp server listening on port {}", ctx.node(), self.port);
    }

    fn on_receive(&mut self, _ctx: &mut AppContext, packet: &Packet) {
        let Payload::Datagram { seq, .. } = packet.payload else {
            return;
        };
        self.stats.received += 1;
        let next = self.expected.entry(packet.src).or_insert(0);
        if seq >= *next {
            self.stats.lost += u64::from(seq - *next);
            *next = seq + 1;
        } else {
            // A late packet fills a gap counted earlier.
            self.stats.lost = self.stats.lost.saturating_sub(1);
        }
    }

    fn stats(&self) -> AppStats {
        self.stats
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn name(&self) -> &'static str {
        "udp-server"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
