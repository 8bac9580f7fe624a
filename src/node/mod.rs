//! Nodes, their devices, and the runtime that dispatches events to them.
//!
//! A node is an id plus optional components: mobility, an energy source,
//! a routing instance, devices and applications. Nodes never call each
//! other; every interaction is a scheduler event interpreted by
//! [`NodeRuntime`].
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`NodeId`] newtype |
//! | [`device`] | [`Device`], [`DeviceStats`] |
//! | [`trace`] | [`TraceEntry`], [`RouteSnapshot`] |
//! | [`runtime`] | [`NodeRuntime`] |

pub mod device;
pub mod id;
pub mod runtime;
pub mod trace;

pub use device::{Device, DeviceStats};
pub use id::NodeId;
pub use runtime::{DropStats, NodeRuntime};
pub use trace::{RouteSnapshot, TraceEntry, TraceKind};

use crate::aodv::AodvRouting;
use crate::app::Application;
use crate::energy::EnergySource;
use crate::event::EventId;
use crate::geometry::Vector2;
use crate::mobility::MobilityModel;
use crate::time::SimTime;

/// Optional component kinds a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Mobility,
    Energy,
    Routing,
    Applications,
}

/// An application plus the runtime's bookkeeping for it.
pub(crate) struct InstalledApp {
    pub(crate) app: Box<dyn Application>,
    pub(crate) running: bool,
    /// Pending timer events, cancelled when the application stops.
    pub(crate) timers: Vec<EventId>,
}

/// A simulated node.
pub struct Node {
    id: NodeId,
    pub(crate) mobility: Option<MobilityModel>,
    pub(crate) energy: Option<EnergySource>,
    pub(crate) routing: Option<AodvRouting>,
    pub(crate) devices: Vec<Device>,
    pub(crate) apps: Vec<InstalledApp>,
    /// Echo requests answered by the node's stack.
    pub(crate) echo_replies: u64,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Node {
            id,
            mobility: None,
            energy: None,
            routing: None,
            devices: Vec::new(),
            apps: Vec::new(),
            echo_replies: 0,
        }
    }

    pub fn with_mobility(mut self, mobility: MobilityModel) -> Self {
        self.mobility = Some(mobility);
        self
    }

    pub fn with_energy(mut self, source: EnergySource) -> Self {
        self.energy = Some(source);
        self
    }

    pub fn with_routing(mut self, routing: AodvRouting) -> Self {
        self.routing = Some(routing);
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Mobility => self.mobility.is_some(),
            Capability::Energy => self.energy.is_some(),
            Capability::Routing => self.routing.is_some(),
            Capability::Applications => !self.apps.is_empty(),
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        [
            Capability::Mobility,
            Capability::Energy,
            Capability::Routing,
            Capability::Applications,
        ]
        .into_iter()
        .filter(|c| self.has(*c))
        .collect()
    }

    /// Position at `now`; nodes without mobility sit at the origin.
    pub fn position(&mut self, now: SimTime) -> Vector2 {
        self.mobility
            .as_mut()
            .map_or(Vector2::ZERO, |m| m.position(now))
    }

    /// `false` once the energy source is depleted. Nodes without a source
    /// are always powered.
    pub fn is_powered(&self) -> bool {
        self.energy.as_ref().map_or(true, |e| !e.is_depleted())
    }

    pub fn mobility(&self) -> Option<&MobilityModel> {
        self.mobility.as_ref()
    }

    pub fn energy(&self) -> Option<&EnergySource> {
        self.energy.as_ref()
    }

    pub fn routing(&self) -> Option<&AodvRouting> {
        self.routing.as_ref()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn app_count(&self) -> usize {
        self.apps.len()
    }

    pub fn echo_replies(&self) -> u64 {
        self.echo_replies
    }

    /// Residual energy fraction at `now`, `1.0` without a source.
    pub(crate) fn energy_fraction(&self, now: SimTime) -> f64 {
        match &self.energy {
            Some(e) if e.initial_energy() > 0.0 => e.remaining_at(now) / e.initial_energy(),
            Some(_) => 0.0,
            None => 1.0,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities())
            .field("devices", &self.devices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;
