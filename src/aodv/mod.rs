//! AODV-style reactive routing.
//!
//! The protocol is a synchronous state machine. The node runtime feeds it
//! [`RoutingInput`]s together with a [`RoutingEnv`] describing the node at
//! that instant, and executes the [`RoutingAction`]s it returns: putting
//! frames on the air, delivering packets to local applications, reporting
//! drops and arming or cancelling timers. The state machine itself never
//! touches the scheduler, the channel or another node.
//!
//! ```text
//!   RoutingInput ──► AodvRouting::handle(env, input) ──► Vec<RoutingAction>
//!        ▲                                                     │
//!        └──────────── NodeRuntime (events, channel) ◄─────────┘
//! ```

mod config;
mod messages;
mod protocol;
mod queue;
mod table;

#[cfg(test)]
mod tests;

pub use config::AodvConfig;
pub use messages::{
    ControlMessage, RouteError, RouteReply, RouteRequest, UnreachableDestination,
};
pub use protocol::{AodvRouting, RoutingStats};
pub use queue::RequestQueue;
pub use table::{seq_cmp, seq_newer, RouteEntry, RouteState, RouteStatus, RoutingTable};

use crate::error::SimError;
use crate::node::NodeId;
use crate::packet::{FrameBody, Packet};
use crate::time::{SimDuration, SimTime};

/// What the node looks like to the protocol at the moment of an input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingEnv {
    pub now: SimTime,
    /// Residual energy in `[0, 1]`; `1.0` for nodes without a source.
    pub energy_fraction: f64,
}

impl RoutingEnv {
    pub fn at(now: SimTime) -> Self {
        RoutingEnv {
            now,
            energy_fraction: 1.0,
        }
    }
}

/// Protocol timers. At most one of each is armed per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoutingTimer {
    Hello,
    /// Neighbor liveness check plus table, queue and duplicate-cache aging.
    NeighborCheck,
    /// No RREP arrived for the discovery of this destination.
    RreqTimeout(NodeId),
}

/// Everything that can happen to a routing instance.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingInput {
    Start,
    /// A local application wants this packet delivered.
    Send(Packet),
    /// A frame from neighbor `from` arrived.
    Received { from: NodeId, body: FrameBody },
    /// A unicast to `next_hop` was never acknowledged.
    TxFailed { next_hop: NodeId, body: FrameBody },
    Timer(RoutingTimer),
}

/// Why a data packet was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Discovery exhausted its retries, or there is no route to forward on.
    NoRoute,
    /// Evicted from a full request queue.
    QueueFull,
    /// Waited in the request queue longer than its timeout.
    QueueTimeout,
    TtlExpired,
    /// The next hop stopped acknowledging a forwarded packet.
    LinkBroken { next_hop: NodeId },
}

impl DropReason {
    /// The error reported to the application that originated `packet`
    /// when it is dropped at `node`.
    pub fn to_error(self, node: NodeId, packet: &Packet) -> SimError {
        match self {
            DropReason::LinkBroken { next_hop } => SimError::LinkBroken {
                from: node,
                to: next_hop,
            },
            DropReason::NoRoute
            | DropReason::QueueFull
            | DropReason::QueueTimeout
            | DropReason::TtlExpired => SimError::NoRouteToHost {
                destination: packet.dst,
            },
        }
    }
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingAction {
    Broadcast(ControlMessage),
    Unicast { next_hop: NodeId, body: FrameBody },
    /// Hand the packet to the local application layer.
    Deliver(Packet),
    Drop { packet: Packet, reason: DropReason },
    /// (Re)arm `timer`; an already armed instance is replaced.
    SetTimer { timer: RoutingTimer, after: SimDuration },
    CancelTimer(RoutingTimer),
}
