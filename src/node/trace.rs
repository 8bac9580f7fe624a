//! Write-only records kept by `NodeRuntime`: the dispatch trace and
//! periodic routing-table snapshots.

use std::fmt::Write as _;

use serde::Serialize;

use crate::aodv::{RouteEntry, RouteState, RoutingTimer};
use crate::event::EventId;
use crate::packet::MacAddress;
use crate::time::SimTime;

use super::id::NodeId;

/// Combine two hash values (deterministic, order-dependent).
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// What a node was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceKind {
    AppStart { app: usize },
    AppStop { app: usize },
    AppTimer { app: usize, timer_id: u64 },
    RoutingStart,
    RoutingTimer(RoutingTimer),
    FrameArrival { from: MacAddress, bytes: u32 },
    TxFailed { to: MacAddress },
    EnergyDraw { amperes: f64 },
    EnergyDepletion,
    SetVelocity,
}

impl TraceKind {
    fn tag(&self) -> u64 {
        match self {
            TraceKind::AppStart { app } => hash_combine(1, *app as u64),
            TraceKind::AppStop { app } => hash_combine(2, *app as u64),
            TraceKind::AppTimer { app, timer_id } => {
                hash_combine(hash_combine(3, *app as u64), *timer_id)
            }
            TraceKind::RoutingStart => 4,
            TraceKind::RoutingTimer(t) => hash_combine(
                5,
                match t {
                    RoutingTimer::Hello => 0,
                    RoutingTimer::NeighborCheck => 1,
                    RoutingTimer::RreqTimeout(dst) => 2 + dst.raw(),
                },
            ),
            TraceKind::FrameArrival { from, bytes } => {
                hash_combine(hash_combine(6, from.raw()), *bytes as u64)
            }
            TraceKind::TxFailed { to } => hash_combine(7, to.raw()),
            TraceKind::EnergyDraw { amperes } => hash_combine(8, amperes.to_bits()),
            TraceKind::EnergyDepletion => 9,
            TraceKind::SetVelocity => 10,
        }
    }
}

impl std::fmt::Display for TraceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceKind::AppStart { app } => write!(f, "AppStart(#{})", app),
            TraceKind::AppStop { app } => write!(f, "AppStop(#{})", app),
            TraceKind::AppTimer { app, timer_id } => {
                write!(f, "AppTimer(#{}, id={})", app, timer_id)
            }
            TraceKind::RoutingStart => write!(f, "RoutingStart"),
            TraceKind::RoutingTimer(t) => write!(f, "RoutingTimer({:?})", t),
            TraceKind::FrameArrival { from, bytes } => {
                write!(f, "FrameArrival(from={}, {} B)", from, bytes)
            }
            TraceKind::TxFailed { to } => write!(f, "TxFailed(to={})", to),
            TraceKind::EnergyDraw { amperes } => write!(f, "EnergyDraw({} A)", amperes),
            TraceKind::EnergyDepletion => write!(f, "EnergyDepletion"),
            TraceKind::SetVelocity => write!(f, "SetVelocity"),
        }
    }
}

/// A record of a single event dispatched to a node.
///
/// Appended by `NodeRuntime` on every dispatch when tracing is on.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// Simulated time at which the event was dispatched.
    pub time: SimTime,
    /// The scheduler's unique ID for this event.
    pub event_id: EventId,
    /// The node that received the event.
    pub node: NodeId,
    pub kind: TraceKind,
}

impl TraceEntry {
    /// Order-sensitive digest of the entry.
    pub fn digest(&self) -> u64 {
        let mut h = hash_combine(self.time.as_nanos(), self.event_id.raw());
        h = hash_combine(h, self.node.raw());
        hash_combine(h, self.kind.tag())
    }
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[T={} {} N={}] {}",
            self.time, self.event_id, self.node, self.kind,
        )
    }
}

/// One node's routing table at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSnapshot {
    pub time: SimTime,
    pub node: NodeId,
    pub entries: Vec<RouteEntry>,
}

impl RouteSnapshot {
    /// Human-readable table, one route per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Node: {}, Time: {}, AODV Routing table", self.node, self.time);
        let _ = writeln!(out, "Destination\tNextHop\tSeq\tHops\tState\tExpire");
        for e in &self.entries {
            let state = match e.state {
                RouteState::Valid => "UP",
                RouteState::Invalid => "DOWN",
                RouteState::InRepair => "IN_SEARCH",
            };
            let expire = e.lifetime.saturating_duration_since(self.time);
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{:.2}",
                e.destination,
                e.next_hop,
                e.seq,
                e.hop_count,
                state,
                expire.as_secs_f64()
            );
        }
        out
    }
}
