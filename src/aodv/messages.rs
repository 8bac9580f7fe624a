//! AODV control messages.
//!
//! Messages are immutable once built; a forwarding node constructs a new
//! value with the updated hop count and TTL instead of mutating the one it
//! received.

use crate::node::NodeId;
use crate::time::SimDuration;

/// RFC 3561 wire size of an RREQ.
pub const RREQ_BYTES: u32 = 24;
/// RFC 3561 wire size of an RREP (and of a hello, which is an RREP).
pub const RREP_BYTES: u32 = 20;
/// RERR header; each unreachable destination adds [`RERR_ENTRY_BYTES`].
pub const RERR_HEADER_BYTES: u32 = 4;
pub const RERR_ENTRY_BYTES: u32 = 8;

/// Route request, flooded by the originator and every forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub hop_count: u8,
    /// Remaining hops this request may travel.
    pub ttl: u8,
    pub request_id: u32,
    pub destination: NodeId,
    /// Last known destination sequence number, meaningless if `unknown_seq`.
    pub dest_seq: u32,
    pub unknown_seq: bool,
    pub originator: NodeId,
    pub origin_seq: u32,
    /// Ask an intermediate replier to also notify the destination.
    pub gratuitous: bool,
    /// Only the destination may answer.
    pub destination_only: bool,
}

/// Route reply, unicast hop by hop back to the originator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReply {
    pub hop_count: u8,
    pub destination: NodeId,
    pub dest_seq: u32,
    pub originator: NodeId,
    /// How long the receiver may consider the route valid.
    pub lifetime: SimDuration,
}

/// Route error: destinations that became unreachable through the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
    pub unreachable: Vec<UnreachableDestination>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreachableDestination {
    pub destination: NodeId,
    pub seq: u32,
}

/// Every routing control message a node can put on the air.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Rreq(RouteRequest),
    Rrep(RouteReply),
    Rerr(RouteError),
    /// Neighbor liveness beacon (a one-hop RREP about the sender itself).
    Hello {
        node: NodeId,
        seq: u32,
        lifetime: SimDuration,
    },
}

impl ControlMessage {
    /// Size of the message body in bytes, without IP/UDP or MAC headers.
    pub fn wire_size(&self) -> u32 {
        match self {
            ControlMessage::Rreq(_) => RREQ_BYTES,
            ControlMessage::Rrep(_) | ControlMessage::Hello { .. } => RREP_BYTES,
            ControlMessage::Rerr(e) => {
                RERR_HEADER_BYTES + RERR_ENTRY_BYTES * e.unreachable.len() as u32
            }
        }
    }

    /// Short tag used in logs and traces.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Rreq(_) => "RREQ",
            ControlMessage::Rrep(_) => "RREP",
            ControlMessage::Rerr(_) => "RERR",
            ControlMessage::Hello { .. } => "HELLO",
        }
    }
}
