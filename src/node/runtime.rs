//! `NodeRuntime` — owns all nodes and the channel, and dispatches events
//! to them.

use std::collections::BTreeMap;

use log::{debug, info, trace, warn};
use serde::Serialize;

use crate::aodv::{AodvRouting, DropReason, RoutingAction, RoutingEnv, RoutingInput, RoutingTimer};
use crate::app::{AppAction, AppContext, AppStats, Application};
use crate::channel::{Channel, ChannelDecision};
use crate::energy::EnergyUpdate;
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventId, EventType};
use crate::geometry::Vector2;
use crate::packet::{Frame, FrameBody, MacAddress, Packet, Payload, DEFAULT_TTL};
use crate::simulation::{EventHandler, Simulation, SimulationContext};
use crate::time::{SimDuration, SimTime};

use super::id::NodeId;
use super::trace::{hash_combine, RouteSnapshot, TraceEntry, TraceKind};
use super::{InstalledApp, Node};

/// Data packets given up on, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropStats {
    pub no_route: u64,
    pub queue_full: u64,
    pub queue_timeout: u64,
    pub ttl_expired: u64,
    pub link_broken: u64,
    pub power_exhausted: u64,
    /// Delivered to a node with no application on the destination port.
    pub unclaimed: u64,
}

impl DropStats {
    pub fn total(&self) -> u64 {
        self.no_route
            + self.queue_full
            + self.queue_timeout
            + self.ttl_expired
            + self.link_broken
            + self.power_exhausted
            + self.unclaimed
    }

    fn count(&mut self, reason: DropReason) {
        match reason {
            DropReason::NoRoute => self.no_route += 1,
            DropReason::QueueFull => self.queue_full += 1,
            DropReason::QueueTimeout => self.queue_timeout += 1,
            DropReason::TtlExpired => self.ttl_expired += 1,
            DropReason::LinkBroken { .. } => self.link_broken += 1,
        }
    }
}

/// Manages the simulated nodes and the channel between them.
///
/// Implements [`EventHandler`] so it can be passed directly to
/// [`Simulation::run_until`]. Every node-directed event is routed into
/// the addressed node's components; frames cross between nodes only as
/// `FrameArrival` and `TxFailed` events.
pub struct NodeRuntime {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    channel: Channel,
    /// MAC of each node's first device, used to address next hops.
    macs: BTreeMap<NodeId, MacAddress>,
    routing_timers: BTreeMap<(NodeId, RoutingTimer), EventId>,
    depletion_events: BTreeMap<NodeId, EventId>,
    next_uid: u64,
    next_mac: u64,
    drops: DropStats,
    route_dumps: Vec<RouteSnapshot>,
    record_trace: bool,
    /// Append-only trace of every dispatched node event.
    pub trace: Vec<TraceEntry>,
}

impl NodeRuntime {
    pub fn new(channel: Channel) -> Self {
        NodeRuntime {
            nodes: BTreeMap::new(),
            channel,
            macs: BTreeMap::new(),
            routing_timers: BTreeMap::new(),
            depletion_events: BTreeMap::new(),
            next_uid: 0,
            next_mac: 1,
            drops: DropStats::default(),
            route_dumps: Vec::new(),
            record_trace: true,
            trace: Vec::new(),
        }
    }

    /// Turn the dispatch trace on or off.
    pub fn with_trace(mut self, on: bool) -> Self {
        self.record_trace = on;
        self
    }

    /// Hand out the next unused MAC address.
    pub fn allocate_mac(&mut self) -> MacAddress {
        let mac = MacAddress::new(self.next_mac);
        self.next_mac += 1;
        mac
    }

    /// Register a node and attach its devices to the channel.
    ///
    /// The devices' idle currents become the baseline drain of the node's
    /// energy source.
    pub fn register(&mut self, mut node: Node) -> SimResult<()> {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            return Err(SimError::NodeAlreadyRegistered(id));
        }
        for (index, device) in node.devices.iter().enumerate() {
            self.channel.attach(id, index, device.mac());
        }
        if let Some(device) = node.devices.first() {
            self.macs.insert(id, device.mac());
        }
        let idle: f64 = node.devices.iter().map(|d| d.radio().idle_current).sum();
        if let Some(source) = node.energy.as_mut() {
            source.set_baseline_current(SimTime::ZERO, idle)?;
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Install an application; returns its index on the node.
    ///
    /// Packets reach applications by port, so each port on a node is
    /// bound at most once.
    pub fn install_app(&mut self, node: NodeId, app: Box<dyn Application>) -> SimResult<usize> {
        let n = self.nodes.get_mut(&node).ok_or(SimError::NodeNotFound(node))?;
        let port = app.port();
        if n.apps.iter().any(|a| a.app.port() == port) {
            return Err(SimError::InvalidArgument(format!(
                "{} already has an application on port {}",
                node, port
            )));
        }
        n.apps.push(InstalledApp {
            app,
            running: false,
            timers: Vec::new(),
        });
        Ok(n.apps.len() - 1)
    }

    /// Schedule start and optional stop of an installed application.
    pub fn schedule_app(
        &self,
        sim: &mut Simulation,
        node: NodeId,
        app: usize,
        start: SimTime,
        stop: Option<SimTime>,
    ) -> SimResult<()> {
        self.installed(node, app)?;
        if let Some(stop) = stop {
            if stop < start {
                return Err(SimError::InvalidArgument(format!(
                    "application {} on {} stops ({}) before it starts ({})",
                    app, node, stop, start
                )));
            }
        }
        sim.schedule_at(start, EventType::AppStart { node, app })?;
        if let Some(stop) = stop {
            sim.schedule_at(stop, EventType::AppStop { node, app })?;
        }
        Ok(())
    }

    /// Bring up routing on every node and arm the energy depletion
    /// predictions. Call once before running.
    pub fn start(&mut self, sim: &mut Simulation) {
        let now = sim.now();
        let mut ctx = SimulationContext::new(sim.scheduler_mut(), now);
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let has_routing = self.nodes.get(&id).is_some_and(|n| n.routing.is_some());
            if has_routing {
                ctx.schedule_after(SimDuration::ZERO, EventType::RoutingStart { node: id });
            }
            self.rearm_depletion(&mut ctx, id);
        }
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All registered node IDs in sorted order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn position(&mut self, id: NodeId, now: SimTime) -> SimResult<Vector2> {
        self.nodes
            .get_mut(&id)
            .map(|n| n.position(now))
            .ok_or(SimError::NodeNotFound(id))
    }

    /// Remaining energy at `now`; `None` for nodes without a source.
    pub fn remaining_energy(&self, id: NodeId, now: SimTime) -> SimResult<Option<f64>> {
        let node = self.nodes.get(&id).ok_or(SimError::NodeNotFound(id))?;
        Ok(node.energy.as_ref().map(|e| e.remaining_at(now)))
    }

    pub fn routing(&self, id: NodeId) -> Option<&AodvRouting> {
        self.nodes.get(&id)?.routing.as_ref()
    }

    /// Downcast an installed application.
    pub fn app<T: Application + 'static>(&self, node: NodeId, index: usize) -> SimResult<&T> {
        self.installed(node, index)?
            .app
            .as_any()
            .downcast_ref::<T>()
            .ok_or(SimError::AppTypeMismatch {
                node,
                index,
                expected: std::any::type_name::<T>(),
            })
    }

    pub fn app_stats(&self, node: NodeId, index: usize) -> SimResult<AppStats> {
        Ok(self.installed(node, index)?.app.stats())
    }

    /// `(node, index, name, stats)` of every application, in node order.
    pub fn app_summaries(&self) -> Vec<(NodeId, usize, &'static str, AppStats)> {
        self.nodes
            .iter()
            .flat_map(|(id, n)| {
                n.apps
                    .iter()
                    .enumerate()
                    .map(move |(i, a)| (*id, i, a.app.name(), a.app.stats()))
            })
            .collect()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn drops(&self) -> DropStats {
        self.drops
    }

    /// Routing-table snapshots taken by `RouteDump` events.
    pub fn route_dumps(&self) -> &[RouteSnapshot] {
        &self.route_dumps
    }

    fn installed(&self, node: NodeId, index: usize) -> SimResult<&InstalledApp> {
        self.nodes
            .get(&node)
            .ok_or(SimError::NodeNotFound(node))?
            .apps
            .get(index)
            .ok_or_else(|| {
                SimError::InvalidArgument(format!("{} has no application #{}", node, index))
            })
    }

    fn next_uid(&mut self) -> u64 {
        self.next_uid += 1;
        self.next_uid
    }

    fn record(&mut self, ctx: &SimulationContext, event: &Event, node: NodeId, kind: TraceKind) {
        if self.record_trace {
            self.trace.push(TraceEntry {
                time: ctx.now(),
                event_id: event.id,
                node,
                kind,
            });
        }
    }

    // ── Energy ────────────────────────────────────────────────────

    /// Bring the node's energy up to date. Returns whether it still has
    /// power.
    fn touch_energy(&mut self, ctx: &mut SimulationContext, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let Some(source) = node.energy.as_mut() else {
            return true;
        };
        if source.is_depleted() {
            return false;
        }
        if source.update(ctx.now()) == EnergyUpdate::Depleted {
            self.on_depleted(ctx, id);
            return false;
        }
        true
    }

    fn energy_changed(&mut self, ctx: &mut SimulationContext, id: NodeId, update: EnergyUpdate) {
        if let Some(source) = self.nodes.get(&id).and_then(|n| n.energy.as_ref()) {
            trace!(
                "{} remaining energy = {:.6} J, consumed = {:.6} J",
                id,
                source.remaining_energy(),
                source.total_consumed()
            );
        }
        match update {
            EnergyUpdate::Depleted => self.on_depleted(ctx, id),
            EnergyUpdate::Ok => self.rearm_depletion(ctx, id),
        }
    }

    /// Replace the pending depletion prediction for `id`.
    fn rearm_depletion(&mut self, ctx: &mut SimulationContext, id: NodeId) {
        if let Some(old) = self.depletion_events.remove(&id) {
            ctx.cancel(old);
        }
        let Some(at) = self
            .nodes
            .get(&id)
            .and_then(|n| n.energy.as_ref())
            .and_then(|e| e.predicted_depletion())
        else {
            return;
        };
        let at = at.max(ctx.now());
        if let Ok(event) = ctx.schedule_at(at, EventType::EnergyDepletion { node: id }) {
            self.depletion_events.insert(id, event);
        }
    }

    fn on_depleted(&mut self, ctx: &mut SimulationContext, id: NodeId) {
        if let Some(old) = self.depletion_events.remove(&id) {
            ctx.cancel(old);
        }
        let timers: Vec<(NodeId, RoutingTimer)> = self
            .routing_timers
            .range((id, RoutingTimer::Hello)..)
            .take_while(|((n, _), _)| *n == id)
            .map(|(k, _)| *k)
            .collect();
        for key in timers {
            if let Some(event) = self.routing_timers.remove(&key) {
                ctx.cancel(event);
            }
        }
        let at = self
            .nodes
            .get(&id)
            .and_then(|n| n.energy.as_ref())
            .and_then(|e| e.depleted_at())
            .unwrap_or(ctx.now());
        info!("{} energy source depleted at {}", id, at);

        let parked = self
            .nodes
            .get_mut(&id)
            .and_then(|n| n.routing.as_mut())
            .map(|r| r.abandon_pending())
            .unwrap_or_default();
        for packet in parked {
            self.drops.power_exhausted += 1;
            if packet.src == id {
                self.packet_failed(ctx, id, packet, SimError::PowerExhausted { node: id });
            }
        }
    }

    // ── Frames ────────────────────────────────────────────────────

    /// Put `frame` on the air from `device` of `id`.
    ///
    /// Fails with `PowerExhausted` when the node has no energy left.
    fn transmit(
        &mut self,
        ctx: &mut SimulationContext,
        id: NodeId,
        device: usize,
        frame: Frame,
    ) -> SimResult<()> {
        if !self.touch_energy(ctx, id) {
            return Err(SimError::PowerExhausted { node: id });
        }
        let now = ctx.now();
        let node = self.nodes.get_mut(&id).ok_or(SimError::NodeNotFound(id))?;
        let has_energy = node.energy.is_some();
        let dev = node.devices.get_mut(device).ok_or_else(|| {
            SimError::InvalidArgument(format!("{} has no device #{}", id, device))
        })?;
        let tx_time = dev.tx_time(&frame);
        let tx_current = dev.radio().tx_current;
        dev.record_tx(&frame);
        let origin = node.position(now);

        if has_energy && tx_current > 0.0 {
            ctx.schedule_after(
                SimDuration::ZERO,
                EventType::EnergyDraw {
                    node: id,
                    amperes: tx_current,
                    duration: tx_time,
                },
            );
        }

        self.channel.record_transmission();
        let mut heard = false;
        for rx in self.channel.receivers(id, &frame) {
            let Some(peer) = self.nodes.get_mut(&rx.node) else {
                continue;
            };
            let distance = origin.distance(peer.position(now));
            let powered = peer
                .energy
                .as_ref()
                .map_or(true, |e| !e.is_depleted() && e.remaining_at(now) > 0.0);
            if let ChannelDecision::Delivered { delay } = self.channel.process(distance, powered) {
                heard = true;
                ctx.schedule_after(
                    tx_time.saturating_add(delay),
                    EventType::FrameArrival {
                        node: rx.node,
                        device: rx.device,
                        frame: frame.clone(),
                    },
                );
            }
        }

        if !frame.is_broadcast() && !heard {
            self.channel.record_tx_failed();
            let wait = tx_time.saturating_add(self.channel.config().ack_timeout);
            ctx.schedule_after(wait, EventType::TxFailed { node: id, device, frame });
        }
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut SimulationContext, id: NodeId, device: usize, frame: &Frame) {
        if !self.touch_energy(ctx, id) {
            return;
        }
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let has_energy = node.energy.is_some();
        let Some(dev) = node.devices.get_mut(device) else {
            return;
        };
        dev.record_rx(frame);
        let rx_current = dev.radio().rx_current;
        let rx_time = dev.tx_time(frame);
        if has_energy && rx_current > 0.0 {
            ctx.schedule_after(
                SimDuration::ZERO,
                EventType::EnergyDraw {
                    node: id,
                    amperes: rx_current,
                    duration: rx_time,
                },
            );
        }
        let Some(from) = self.channel.resolve(frame.src).map(|a| a.node) else {
            warn!("{} received a frame from unknown device {}", id, frame.src);
            return;
        };
        let input = RoutingInput::Received {
            from,
            body: frame.body.clone(),
        };
        self.routing_input(ctx, id, input);
    }

    fn on_tx_failed(&mut self, ctx: &mut SimulationContext, id: NodeId, device: usize, frame: &Frame) {
        if let Some(dev) = self.nodes.get_mut(&id).and_then(|n| n.devices.get_mut(device)) {
            dev.record_tx_failed();
        }
        if !self.touch_energy(ctx, id) {
            return;
        }
        let Some(next_hop) = self.channel.resolve(frame.dst).map(|a| a.node) else {
            debug!("{} unicast to unknown device {} failed", id, frame.dst);
            return;
        };
        let input = RoutingInput::TxFailed {
            next_hop,
            body: frame.body.clone(),
        };
        self.routing_input(ctx, id, input);
    }

    // ── Routing ───────────────────────────────────────────────────

    fn routing_input(&mut self, ctx: &mut SimulationContext, id: NodeId, input: RoutingInput) {
        let now = ctx.now();
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let env = RoutingEnv {
            now,
            energy_fraction: node.energy_fraction(now),
        };
        let actions = match node.routing.as_mut() {
            Some(routing) => routing.handle(env, input),
            None => Self::without_routing(id, input),
        };
        self.apply_routing(ctx, id, actions);
    }

    /// Nodes without a routing instance only talk to themselves.
    fn without_routing(id: NodeId, input: RoutingInput) -> Vec<RoutingAction> {
        match input {
            RoutingInput::Send(packet)
            | RoutingInput::Received {
                body: FrameBody::Data(packet),
                ..
            } if packet.dst == id => vec![RoutingAction::Deliver(packet)],
            RoutingInput::Send(packet) => vec![RoutingAction::Drop {
                packet,
                reason: DropReason::NoRoute,
            }],
            _ => Vec::new(),
        }
    }

    fn apply_routing(&mut self, ctx: &mut SimulationContext, id: NodeId, actions: Vec<RoutingAction>) {
        for action in actions {
            match action {
                RoutingAction::Broadcast(msg) => {
                    let Some(src) = self.macs.get(&id).copied() else {
                        continue;
                    };
                    let frame = Frame {
                        src,
                        dst: MacAddress::BROADCAST,
                        body: FrameBody::Control(msg),
                    };
                    if let Err(e) = self.transmit(ctx, id, 0, frame) {
                        debug!("{} broadcast not sent: {}", id, e);
                    }
                }
                RoutingAction::Unicast { next_hop, body } => {
                    let (Some(src), Some(dst)) =
                        (self.macs.get(&id).copied(), self.macs.get(&next_hop).copied())
                    else {
                        warn!("{} has no link-layer address for next hop {}", id, next_hop);
                        continue;
                    };
                    let packet = body.packet().cloned();
                    let frame = Frame { src, dst, body };
                    if let Err(e) = self.transmit(ctx, id, 0, frame) {
                        if let Some(packet) = packet {
                            self.drops.power_exhausted += 1;
                            if packet.src == id {
                                self.packet_failed(ctx, id, packet, e);
                            }
                        }
                    }
                }
                RoutingAction::Deliver(packet) => self.deliver_local(ctx, id, packet),
                RoutingAction::Drop { packet, reason } => {
                    self.drops.count(reason);
                    debug!("{} dropped {}: {:?}", id, packet, reason);
                    if packet.src == id {
                        let error = reason.to_error(id, &packet);
                        self.packet_failed(ctx, id, packet, error);
                    }
                }
                RoutingAction::SetTimer { timer, after } => {
                    if let Some(old) = self.routing_timers.remove(&(id, timer)) {
                        ctx.cancel(old);
                    }
                    let event = ctx.schedule_after(after, EventType::RoutingTimer { node: id, timer });
                    self.routing_timers.insert((id, timer), event);
                }
                RoutingAction::CancelTimer(timer) => {
                    if let Some(old) = self.routing_timers.remove(&(id, timer)) {
                        ctx.cancel(old);
                    }
                }
            }
        }
    }

    // ── Local delivery and applications ───────────────────────────

    fn deliver_local(&mut self, ctx: &mut SimulationContext, id: NodeId, packet: Packet) {
        if let Payload::EchoRequest { seq, sent_at } = packet.payload {
            let uid = self.next_uid();
            let Some(node) = self.nodes.get_mut(&id) else {
                return;
            };
            node.echo_replies += 1;
            let reply = Packet {
                uid,
                src: id,
                dst: packet.src,
                src_port: packet.dst_port,
                dst_port: packet.src_port,
                size_bytes: packet.size_bytes,
                ttl: DEFAULT_TTL,
                payload: Payload::EchoReply { seq, sent_at },
            };
            self.routing_input(ctx, id, RoutingInput::Send(reply));
            return;
        }

        let index = self
            .nodes
            .get(&id)
            .and_then(|n| n.apps.iter().position(|a| a.app.port() == packet.dst_port));
        let Some(index) = index else {
            self.drops.unclaimed += 1;
            debug!("{} has no listener for {}", id, packet);
            return;
        };
        let now = ctx.now();
        if let Some(actions) = self.with_app(id, index, now, |app, actx| app.on_receive(actx, &packet)) {
            self.apply_app_actions(ctx, id, index, actions);
        }
    }

    /// Report a failed send to the application on `packet.src_port`.
    fn packet_failed(&mut self, ctx: &mut SimulationContext, id: NodeId, packet: Packet, error: SimError) {
        let index = self
            .nodes
            .get(&id)
            .and_then(|n| n.apps.iter().position(|a| a.app.port() == packet.src_port));
        match index {
            Some(index) => self.app_send_failed(ctx, id, index, packet, error),
            None => debug!("{} {} failed with no sender to notify: {}", id, packet, error),
        }
    }

    fn app_send_failed(
        &mut self,
        ctx: &mut SimulationContext,
        id: NodeId,
        index: usize,
        packet: Packet,
        error: SimError,
    ) {
        let now = ctx.now();
        let actions = self.with_app(id, index, now, |app, actx| {
            app.on_send_failed(actx, &packet, &error)
        });
        if let Some(actions) = actions {
            self.apply_app_actions(ctx, id, index, actions);
        }
    }

    /// Run one application callback and collect what it asked for.
    fn with_app<F>(&mut self, id: NodeId, index: usize, now: SimTime, f: F) -> Option<Vec<AppAction>>
    where
        F: FnOnce(&mut dyn Application, &mut AppContext),
    {
        let installed = self.nodes.get_mut(&id)?.apps.get_mut(index)?;
        let mut actx = AppContext::new(id, now);
        f(installed.app.as_mut(), &mut actx);
        Some(actx.into_actions())
    }

    fn apply_app_actions(
        &mut self,
        ctx: &mut SimulationContext,
        id: NodeId,
        index: usize,
        actions: Vec<AppAction>,
    ) {
        for action in actions {
            match action {
                AppAction::Send {
                    dst,
                    dst_port,
                    size_bytes,
                    payload,
                } => {
                    let Some(src_port) = self
                        .nodes
                        .get(&id)
                        .and_then(|n| n.apps.get(index))
                        .map(|a| a.app.port())
                    else {
                        continue;
                    };
                    let packet = Packet {
                        uid: self.next_uid(),
                        src: id,
                        dst,
                        src_port,
                        dst_port,
                        size_bytes,
                        ttl: DEFAULT_TTL,
                        payload,
                    };
                    if !self.touch_energy(ctx, id) {
                        self.drops.power_exhausted += 1;
                        self.app_send_failed(ctx, id, index, packet, SimError::PowerExhausted { node: id });
                        continue;
                    }
                    self.routing_input(ctx, id, RoutingInput::Send(packet));
                }
                AppAction::SetTimer { after, timer_id } => {
                    let event = ctx.schedule_after(
                        after,
                        EventType::AppTimer {
                            node: id,
                            app: index,
                            timer_id,
                        },
                    );
                    if let Some(installed) = self.nodes.get_mut(&id).and_then(|n| n.apps.get_mut(index)) {
                        installed.timers.push(event);
                    }
                }
            }
        }
    }

    fn start_app(&mut self, ctx: &mut SimulationContext, id: NodeId, index: usize) {
        let Some(installed) = self.nodes.get_mut(&id).and_then(|n| n.apps.get_mut(index)) else {
            warn!("{} has no application #{} to start", id, index);
            return;
        };
        installed.running = true;
        info!("{} starting {} #{}", id, installed.app.name(), index);
        if let Some(actions) = self.with_app(id, index, ctx.now(), |app, actx| app.on_start(actx)) {
            self.apply_app_actions(ctx, id, index, actions);
        }
    }

    fn stop_app(&mut self, ctx: &mut SimulationContext, id: NodeId, index: usize) {
        let Some(installed) = self.nodes.get_mut(&id).and_then(|n| n.apps.get_mut(index)) else {
            return;
        };
        installed.running = false;
        for event in installed.timers.drain(..) {
            ctx.cancel(event);
        }
        if let Some(actions) = self.with_app(id, index, ctx.now(), |app, actx| app.on_stop(actx)) {
            self.apply_app_actions(ctx, id, index, actions);
        }
    }

    fn app_timer(&mut self, ctx: &mut SimulationContext, event: EventId, id: NodeId, index: usize, timer_id: u64) {
        let Some(installed) = self.nodes.get_mut(&id).and_then(|n| n.apps.get_mut(index)) else {
            return;
        };
        installed.timers.retain(|e| *e != event);
        if !installed.running {
            return;
        }
        if let Some(actions) = self.with_app(id, index, ctx.now(), |app, actx| app.on_timer(actx, timer_id)) {
            self.apply_app_actions(ctx, id, index, actions);
        }
    }

    fn dump_routes(&mut self, ctx: &mut SimulationContext, interval: SimDuration) {
        let now = ctx.now();
        for (id, node) in &self.nodes {
            if let Some(routing) = &node.routing {
                self.route_dumps.push(RouteSnapshot {
                    time: now,
                    node: *id,
                    entries: routing.routing_table().snapshot(),
                });
            }
        }
        if !interval.is_zero() {
            ctx.schedule_after(interval, EventType::RouteDump { interval });
        }
    }
}

impl EventHandler for NodeRuntime {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        if let Some(node) = event.payload.node() {
            if !self.nodes.contains_key(&node) {
                warn!("dropping {} for unknown node {}", event.payload, node);
                return;
            }
        }

        match &event.payload {
            EventType::AppStart { node, app } => {
                self.record(ctx, event, *node, TraceKind::AppStart { app: *app });
                self.start_app(ctx, *node, *app);
            }

            EventType::AppStop { node, app } => {
                self.record(ctx, event, *node, TraceKind::AppStop { app: *app });
                self.stop_app(ctx, *node, *app);
            }

            EventType::AppTimer {
                node,
                app,
                timer_id,
            } => {
                let kind = TraceKind::AppTimer {
                    app: *app,
                    timer_id: *timer_id,
                };
                self.record(ctx, event, *node, kind);
                self.app_timer(ctx, event.id, *node, *app, *timer_id);
            }

            EventType::RoutingStart { node } => {
                self.record(ctx, event, *node, TraceKind::RoutingStart);
                if self.touch_energy(ctx, *node) {
                    self.routing_input(ctx, *node, RoutingInput::Start);
                }
            }

            EventType::RoutingTimer { node, timer } => {
                // Replaced or cancelled handles never reach the map.
                if self.routing_timers.get(&(*node, *timer)) != Some(&event.id) {
                    return;
                }
                self.routing_timers.remove(&(*node, *timer));
                self.record(ctx, event, *node, TraceKind::RoutingTimer(*timer));
                if self.touch_energy(ctx, *node) {
                    self.routing_input(ctx, *node, RoutingInput::Timer(*timer));
                }
            }

            EventType::FrameArrival {
                node,
                device,
                frame,
            } => {
                let kind = TraceKind::FrameArrival {
                    from: frame.src,
                    bytes: frame.wire_size(),
                };
                self.record(ctx, event, *node, kind);
                self.on_frame(ctx, *node, *device, frame);
            }

            EventType::TxFailed {
                node,
                device,
                frame,
            } => {
                self.record(ctx, event, *node, TraceKind::TxFailed { to: frame.dst });
                self.on_tx_failed(ctx, *node, *device, frame);
            }

            EventType::EnergyDraw {
                node,
                amperes,
                duration,
            } => {
                self.record(ctx, event, *node, TraceKind::EnergyDraw { amperes: *amperes });
                let now = ctx.now();
                let result = self
                    .nodes
                    .get_mut(node)
                    .and_then(|n| n.energy.as_mut())
                    .map(|e| (e.is_depleted(), e.draw_current(now, *amperes, *duration)));
                match result {
                    Some((false, Ok(update))) => self.energy_changed(ctx, *node, update),
                    Some((_, Err(e))) => warn!("{} energy draw rejected: {}", node, e),
                    Some((true, Ok(_))) | None => {}
                }
            }

            EventType::EnergyDepletion { node } => {
                if self.depletion_events.get(node) != Some(&event.id) {
                    return;
                }
                self.depletion_events.remove(node);
                self.record(ctx, event, *node, TraceKind::EnergyDepletion);
                if self.touch_energy(ctx, *node) {
                    // Rounding left a sliver; predict again.
                    self.rearm_depletion(ctx, *node);
                }
            }

            EventType::SetVelocity { node, velocity } => {
                self.record(ctx, event, *node, TraceKind::SetVelocity);
                let now = ctx.now();
                let result = match self.nodes.get_mut(node).and_then(|n| n.mobility.as_mut()) {
                    Some(m) => m.set_velocity(now, *velocity),
                    None => Err(SimError::InvalidArgument(format!("{} has no mobility model", node))),
                };
                if let Err(e) = result {
                    warn!("{} velocity change ignored: {}", node, e);
                }
            }

            EventType::RouteDump { interval } => self.dump_routes(ctx, *interval),

            // System-level events — not dispatched to nodes.
            EventType::Noop | EventType::Log(_) => {}
        }
    }

    fn compute_state_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for (id, node) in &self.nodes {
            h = hash_combine(h, id.raw());
            if let Some(e) = &node.energy {
                h = hash_combine(h, e.remaining_energy().to_bits());
            }
            if let Some(r) = &node.routing {
                h = hash_combine(h, r.sequence_number() as u64);
                h = hash_combine(h, r.routing_table().len() as u64);
                h = hash_combine(h, r.stats().rreq_originated);
            }
            for installed in &node.apps {
                let s = installed.app.stats();
                h = hash_combine(h, s.sent);
                h = hash_combine(h, s.received);
            }
            h = hash_combine(h, node.echo_replies);
        }
        for entry in &self.trace {
            h = hash_combine(h, entry.digest());
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::udp::CLIENT_PORT;
    use crate::app::UdpClient;
    use crate::channel::ChannelConfig;
    use crate::energy::EnergySource;
    use crate::node::Device;
    use crate::scheduler::Scheduler;

    fn datagram(uid: u64, src: u64) -> Packet {
        Packet {
            uid,
            src: NodeId::new(src),
            dst: NodeId::new(2),
            src_port: CLIENT_PORT,
            dst_port: 9,
            size_bytes: 512,
            ttl: DEFAULT_TTL,
            payload: Payload::Datagram {
                seq: uid as u32,
                sent_at: SimTime::ZERO,
            },
        }
    }

    /// Nodes 0..3 with one device each; node 1 has an empty battery and a
    /// client bound to the same port the forwarded traffic comes from.
    fn dead_relay() -> (NodeRuntime, usize) {
        let mut rt = NodeRuntime::new(Channel::new(ChannelConfig::default(), 1));
        for i in 0..3 {
            let mac = rt.allocate_mac();
            let mut node = Node::new(NodeId::new(i)).with_device(Device::new(mac));
            if i == 1 {
                node = node.with_energy(EnergySource::new(0.0, 3.0).unwrap());
            }
            rt.register(node).unwrap();
        }
        let index = rt
            .install_app(NodeId::new(1), Box::new(UdpClient::new(NodeId::new(2), 9)))
            .unwrap();
        (rt, index)
    }

    fn unicast(packet: Packet) -> Vec<RoutingAction> {
        vec![RoutingAction::Unicast {
            next_hop: NodeId::new(2),
            body: FrameBody::Data(packet),
        }]
    }

    #[test]
    fn test_failed_forward_does_not_notify_local_sender() {
        let (mut rt, index) = dead_relay();
        let relay = NodeId::new(1);
        let mut scheduler = Scheduler::new();
        let mut ctx = SimulationContext::new(&mut scheduler, SimTime::ZERO);

        rt.apply_routing(&mut ctx, relay, unicast(datagram(1, 0)));
        assert_eq!(rt.app_stats(relay, index).unwrap().failed, 0);
        assert_eq!(rt.drops().power_exhausted, 1);

        rt.apply_routing(&mut ctx, relay, unicast(datagram(2, 1)));
        assert_eq!(rt.app_stats(relay, index).unwrap().failed, 1);
        assert_eq!(rt.drops().power_exhausted, 2);
    }
}
