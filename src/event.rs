//! Event system for the simulation kernel.
//!
//! Every effect in the simulator is modeled as an `Event`. Events are
//! immutable records placed on the scheduler's queue and dispatched in
//! deterministic `(time, id)` order to an [`EventHandler`].
//!
//! [`EventHandler`]: crate::simulation::EventHandler

use std::cmp::Ordering;

use crate::aodv::RoutingTimer;
use crate::geometry::Vector2;
use crate::node::NodeId;
use crate::packet::Frame;
use crate::time::{SimDuration, SimTime};

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing event identifier.
///
/// Breaks ties in the scheduler: two events scheduled at the same
/// `SimTime` are ordered by `EventId`, i.e. by creation order. It is also
/// the handle used to cancel a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly increasing event-ID generator.
///
/// Each scheduler owns exactly one of these.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event Type ────────────────────────────────────────────────────────

/// The payload of an event.
///
/// Node-directed variants carry the target `NodeId`; the runtime routes
/// them into that node's components, so nodes only ever interact through
/// scheduled events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    /// A no-op event used for testing.
    Noop,

    /// A generic log / trace marker.
    Log(String),

    /// Start application `app` on `node`.
    AppStart { node: NodeId, app: usize },

    /// Stop application `app` on `node`.
    AppStop { node: NodeId, app: usize },

    /// A timer requested by an application fired.
    AppTimer {
        node: NodeId,
        app: usize,
        timer_id: u64,
    },

    /// Bring up the routing protocol on `node` (hello and neighbor timers).
    RoutingStart { node: NodeId },

    /// A routing protocol timer fired.
    RoutingTimer { node: NodeId, timer: RoutingTimer },

    /// A frame finished arriving at `device` of `node`.
    FrameArrival {
        node: NodeId,
        device: usize,
        frame: Frame,
    },

    /// A unicast frame sent by `device` of `node` was not acknowledged.
    TxFailed {
        node: NodeId,
        device: usize,
        frame: Frame,
    },

    /// Drain `amperes` for `duration` from the node's energy source.
    EnergyDraw {
        node: NodeId,
        amperes: f64,
        duration: SimDuration,
    },

    /// Predicted depletion instant of the node's energy source.
    EnergyDepletion { node: NodeId },

    /// Change a constant-velocity node's velocity (zero stops it for good).
    SetVelocity { node: NodeId, velocity: Vector2 },

    /// Snapshot every routing table, then re-arm.
    RouteDump { interval: SimDuration },
}

impl EventType {
    /// The node this event is addressed to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            EventType::AppStart { node, .. }
            | EventType::AppStop { node, .. }
            | EventType::AppTimer { node, .. }
            | EventType::RoutingStart { node }
            | EventType::RoutingTimer { node, .. }
            | EventType::FrameArrival { node, .. }
            | EventType::TxFailed { node, .. }
            | EventType::EnergyDraw { node, .. }
            | EventType::EnergyDepletion { node }
            | EventType::SetVelocity { node, .. } => Some(*node),
            EventType::Noop | EventType::Log(_) | EventType::RouteDump { .. } => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Noop => write!(f, "Noop"),
            EventType::Log(msg) => write!(f, "Log({})", msg),
            EventType::AppStart { node, app } => write!(f, "AppStart({}, app {})", node, app),
            EventType::AppStop { node, app } => write!(f, "AppStop({}, app {})", node, app),
            EventType::AppTimer {
                node,
                app,
                timer_id,
            } => write!(f, "AppTimer({}, app {}, #{})", node, app, timer_id),
            EventType::RoutingStart { node } => write!(f, "RoutingStart({})", node),
            EventType::RoutingTimer { node, timer } => {
                write!(f, "RoutingTimer({}, {:?})", node, timer)
            }
            EventType::FrameArrival { node, frame, .. } => {
                write!(f, "Rx({} <- {}, {} B)", node, frame.src, frame.wire_size())
            }
            EventType::TxFailed { node, frame, .. } => {
                write!(f, "TxFailed({} -> {})", node, frame.dst)
            }
            EventType::EnergyDraw {
                node,
                amperes,
                duration,
            } => write!(f, "EnergyDraw({}, {} A for {})", node, amperes, duration),
            EventType::EnergyDepletion { node } => write!(f, "EnergyDepletion({})", node),
            EventType::SetVelocity { node, velocity } => {
                write!(f, "SetVelocity({}, {})", node, velocity)
            }
            EventType::RouteDump { .. } => write!(f, "RouteDump"),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single simulation event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique identifier (monotonically increasing).
    pub id: EventId,

    /// The simulated time at which this event should be dispatched.
    pub scheduled_at: SimTime,

    /// The event payload.
    pub payload: EventType,
}

impl Event {
    pub fn new(id: EventId, scheduled_at: SimTime, payload: EventType) -> Self {
        Event {
            id,
            scheduled_at,
            payload,
        }
    }

    /// The ordering key: `(scheduled_at, id)`.
    #[inline]
    pub fn key(&self) -> EventKey {
        EventKey {
            time: self.scheduled_at,
            id: self.id,
        }
    }
}

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Event ID (FIFO among events scheduled for the same time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub time: SimTime,
    pub id: EventId,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
