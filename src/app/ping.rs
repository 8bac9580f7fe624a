//! ICMP-style echo client. Replies come from the remote node's stack, not
//! from an application.

use std::any::Any;

use log::info;

use crate::error::SimError;
use crate::node::NodeId;
use crate::packet::{Packet, Payload};
use crate::time::SimDuration;

use super::{AppContext, AppStats, Application};

const PING_TIMER: u64 = 1;

/// Echo port on the remote node, and the default local port.
pub const PING_PORT: u16 = 7;

#[derive(Debug, Clone)]
pub struct Ping {
    remote: NodeId,
    local_port: u16,
    interval: SimDuration,
    size_bytes: u32,
    /// `None` pings until stopped.
    count: Option<u64>,
    verbose: bool,
    running: bool,
    stats: AppStats,
    rtts: Vec<SimDuration>,
}

impl Ping {
    pub fn new(remote: NodeId) -> Self {
        Ping {
            remote,
            local_port: PING_PORT,
            interval: SimDuration::from_secs(1),
            size_bytes: 56,
            count: None,
            verbose: false,
            running: false,
            stats: AppStats::default(),
            rtts: Vec::new(),
        }
    }

    pub fn interval(mut self, interval: SimDuration) -> Self {
        self.interval = interval;
        self
    }

    pub fn packet_size(mut self, bytes: u32) -> Self {
        self.size_bytes = bytes;
        self
    }

    /// Port replies come back to. Two pings on one node need different
    /// ports.
    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }

    /// Log every reply at `info` level.
    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Round-trip times of every reply, in arrival order.
    pub fn rtts(&self) -> &[SimDuration] {
        &self.rtts
    }

    pub fn average_rtt(&self) -> Option<SimDuration> {
        if self.rtts.is_empty() {
            return None;
        }
        let total: u64 = self.rtts.iter().map(|d| d.as_nanos()).sum();
        Some(SimDuration::from_nanos(total / self.rtts.len() as u64))
    }

    fn ping(&mut self, ctx: &mut AppContext) {
        if self.count.is_some_and(|n| self.stats.sent >= n) {
            return;
        }
        ctx.send(
            self.remote,
            PING_PORT,
            self.size_bytes,
            Payload::EchoRequest {
                seq: self.stats.sent as u32,
                sent_at: ctx.now(),
            },
        );
        self.stats.sent += 1;
        ctx.set_timer(self.interval, PING_TIMER);
    }
}

impl Application for Ping {
    fn on_start(&mut self, ctx: &mut AppContext) {
        self.running = true;
        self.ping(ctx);
    }

    fn on_stop(&mut self, _ctx: &mut AppContext) {
        self.running = false;
        if self.verbose {
            let s = self.stats();
            info!(
                "--- {} ping statistics --- {} transmitted, {} received, {} lost, {} failed",
                self.remote, s.sent, s.received, s.lost, s.failed
            );
        }
    }

    fn on_timer(&mut self, ctx: &mut AppContext, timer_id: u64) {
        if self.running && timer_id == PING_TIMER {
            self.ping(ctx);
        }
    }

    fn on_receive(&mut self, ctx: &mut AppContext, packet: &Packet) {
        let Payload::EchoReply { seq, sent_at } = packet.payload else {
            return;
        };
        let rtt = ctx.now().saturating_duration_since(sent_at);
        self.rtts.push(rtt);
        self.stats.received += 1;
        if self.verbose {
            info!(
                "{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms",
                packet.size_bytes,
                packet.src,
                seq,
                packet.ttl,
                rtt.as_secs_f64() * 1e3
            );
        }
    }

    fn on_send_failed(&mut self, ctx: &mut AppContext, packet: &Packet, error: &SimError) {
        if self.verbose {
            info!("{} ping {}: {}", ctx.node(), packet, error);
        }
        self.stats.failed += 1;
    }

    /// Requests that neither got a reply nor failed count as lost.
    fn stats(&self) -> AppStats {
        AppStats {
            lost: self
                .stats
                .sent
                .saturating_sub(self.stats.received + self.stats.failed),
            ..self.stats
        }
    }

    fn port(&self) -> u16 {
        self.local_port
    }

    fn name(&self) -> &'static str {
        "ping"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppAction;
    use crate::time::SimTime;

    #[test]
    fn test_rtt_and_loss_accounting() {
        let mut ping = Ping::new(NodeId::new(4)).count(3);
        let mut ctx = AppContext::new(NodeId::new(0), SimTime::ZERO);
        ping.on_start(&mut ctx);
        for i in 1..4u64 {
            let at = SimTime::from_nanos(i * 1_000_000_000);
            let mut ctx = AppContext::new(NodeId::new(0), at);
            ping.on_timer(&mut ctx, PING_TIMER);
        }
        assert_eq!(ping.stats().sent, 3);

        let reply = Packet {
            uid: 10,
            src: NodeId::new(4),
            dst: NodeId::new(0),
            src_port: PING_PORT,
            dst_port: PING_PORT,
            size_bytes: 56,
            ttl: 61,
            payload: Payload::EchoReply {
                seq: 0,
                sent_at: SimTime::ZERO,
            },
        };
        let mut ctx = AppContext::new(NodeId::new(0), SimTime::from_nanos(12_000_000));
        ping.on_receive(&mut ctx, &reply);
        assert_eq!(ping.rtts(), &[SimDuration::from_millis(12)]);

        ping.on_send_failed(
            &mut ctx,
            &reply,
            &SimError::NoRouteToHost {
                destination: NodeId::new(4),
            },
        );
        let s = ping.stats();
        assert_eq!((s.sent, s.received, s.failed, s.lost), (3, 1, 1, 1));
    }

    #[test]
    fn test_request_payload() {
        let mut ping = Ping::new(NodeId::new(91)).packet_size(64);
        let mut ctx = AppContext::new(NodeId::new(0), SimTime::from_nanos(5));
        ping.on_start(&mut ctx);
        match &ctx.into_actions()[0] {
            AppAction::Send {
                dst,
                dst_port,
                size_bytes,
                payload,
            } => {
                assert_eq!(*dst, NodeId::new(91));
                assert_eq!(*dst_port, PING_PORT);
                assert_eq!(*size_bytes, 64);
                assert_eq!(
                    *payload,
                    Payload::EchoRequest {
                        seq: 0,
                        sent_at: SimTime::from_nanos(5)
                    }
                );
            }
            other => panic!("expected a send, got {:?}", other),
        }
    }

    #[test]
    fn test_local_port_binds_replies_not_requests() {
        let mut ping = Ping::new(NodeId::new(3)).local_port(49160);
        assert_eq!(ping.port(), 49160);

        let mut ctx = AppContext::new(NodeId::new(0), SimTime::ZERO);
        ping.on_start(&mut ctx);
        match &ctx.into_actions()[0] {
            AppAction::Send { dst_port, .. } => assert_eq!(*dst_port, PING_PORT),
            other => panic!("expected a send, got {:?}", other),
        }
    }
}
