//! Packets, frames and link-layer addressing.
//!
//! A [`Packet`] is the network-layer datagram exchanged between
//! applications; a [`Frame`] is what a device puts on the channel. Frames
//! carry either a data packet or an AODV control message.

use serde::Serialize;

use crate::aodv::ControlMessage;
use crate::node::NodeId;
use crate::time::SimTime;

/// IPv4 + UDP header bytes added to every network-layer payload.
pub const IP_UDP_HEADER_BYTES: u32 = 28;

/// 802.11 MAC header + FCS + LLC/SNAP bytes added to every frame.
pub const MAC_OVERHEAD_BYTES: u32 = 34;

/// Initial TTL of data packets.
pub const DEFAULT_TTL: u8 = 64;

// ── MacAddress ────────────────────────────────────────────────────────

/// Link-layer address of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MacAddress(u64);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress(0xffff_ffff_ffff);

    #[inline]
    pub fn new(raw: u64) -> Self {
        MacAddress(raw & 0xffff_ffff_ffff)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_broadcast(self) -> bool {
        self == MacAddress::BROADCAST
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

// ── Packet ────────────────────────────────────────────────────────────

/// Application payload carried inside a [`Packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A sequence-numbered UDP datagram with its send timestamp.
    Datagram { seq: u32, sent_at: SimTime },
    /// ICMP-style echo request.
    EchoRequest { seq: u32, sent_at: SimTime },
    /// Echo reply, mirroring the request's sequence number and timestamp.
    EchoReply { seq: u32, sent_at: SimTime },
}

/// A network-layer datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Simulation-wide unique id, assigned by the runtime.
    pub uid: u64,
    pub src: NodeId,
    pub dst: NodeId,
    pub src_port: u16,
    pub dst_port: u16,
    /// Application payload size in bytes (headers excluded).
    pub size_bytes: u32,
    pub ttl: u8,
    pub payload: Payload,
}

impl Packet {
    /// Size on the wire at the network layer (payload + IP/UDP headers).
    pub fn network_size(&self) -> u32 {
        self.size_bytes + IP_UDP_HEADER_BYTES
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pkt#{} {}:{} -> {}:{} ({} B)",
            self.uid, self.src, self.src_port, self.dst, self.dst_port, self.size_bytes
        )
    }
}

// ── Frame ─────────────────────────────────────────────────────────────

/// What a frame carries.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    Control(ControlMessage),
    Data(Packet),
}

impl FrameBody {
    /// Network-layer size of the body in bytes.
    pub fn network_size(&self) -> u32 {
        match self {
            FrameBody::Control(msg) => msg.wire_size() + IP_UDP_HEADER_BYTES,
            FrameBody::Data(packet) => packet.network_size(),
        }
    }

    /// The data packet, if this body carries one.
    pub fn packet(&self) -> Option<&Packet> {
        match self {
            FrameBody::Data(p) => Some(p),
            FrameBody::Control(_) => None,
        }
    }
}

/// A link-layer frame as transmitted on the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub body: FrameBody,
}

impl Frame {
    /// Total bytes on the air.
    pub fn wire_size(&self) -> u32 {
        self.body.network_size() + MAC_OVERHEAD_BYTES
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst.is_broadcast()
    }
}
