use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use super::config::AodvConfig;
use super::messages::{
    ControlMessage, RouteError, RouteReply, RouteRequest, UnreachableDestination,
};
use super::queue::RequestQueue;
use super::table::{seq_newer, RouteEntry, RouteState, RouteStatus, RoutingTable};
use super::{DropReason, RoutingAction, RoutingEnv, RoutingInput, RoutingTimer};
use crate::node::NodeId;
use crate::packet::{FrameBody, Packet};
use crate::time::{SimDuration, SimTime};

/// Control-plane counters of one routing instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoutingStats {
    pub rreq_originated: u64,
    pub rreq_forwarded: u64,
    pub rreq_duplicates: u64,
    /// RREQs not rebroadcast because residual energy was too low.
    pub rreq_suppressed: u64,
    pub rrep_sent: u64,
    pub rrep_forwarded: u64,
    pub rerr_sent: u64,
    pub hello_sent: u64,
    pub link_breaks: u64,
    pub data_forwarded: u64,
    pub discoveries_failed: u64,
}

#[derive(Debug, Clone, Copy)]
struct Discovery {
    attempt: u32,
    /// Started by an intermediate node to patch a broken route.
    repair: bool,
}

/// One node's AODV instance.
#[derive(Debug, Clone)]
pub struct AodvRouting {
    id: NodeId,
    config: AodvConfig,
    table: RoutingTable,
    seq: u32,
    request_id: u32,
    /// `(originator, request id)` of recently seen RREQs, with expiry.
    seen_rreqs: BTreeMap<(NodeId, u32), SimTime>,
    discoveries: BTreeMap<NodeId, Discovery>,
    queue: RequestQueue,
    /// Neighbors heard recently, with the instant they are presumed gone.
    neighbors: BTreeMap<NodeId, SimTime>,
    rng: ChaCha8Rng,
    stats: RoutingStats,
}

impl AodvRouting {
    /// `rng` only drives hello jitter.
    pub fn new(id: NodeId, config: AodvConfig, rng: ChaCha8Rng) -> Self {
        let queue = RequestQueue::new(config.max_queue_len, config.max_queue_time);
        AodvRouting {
            id,
            config,
            table: RoutingTable::new(),
            seq: 0,
            request_id: 0,
            seen_rreqs: BTreeMap::new(),
            discoveries: BTreeMap::new(),
            queue,
            neighbors: BTreeMap::new(),
            rng,
            stats: RoutingStats::default(),
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &AodvConfig {
        &self.config
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    /// Own destination sequence number.
    pub fn sequence_number(&self) -> u32 {
        self.seq
    }

    pub fn stats(&self) -> RoutingStats {
        self.stats
    }

    /// Packets parked while waiting for routes.
    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /// Give up on every pending discovery and hand back the parked packets.
    ///
    /// Used when the node loses power and its timers are gone.
    pub fn abandon_pending(&mut self) -> Vec<Packet> {
        self.discoveries.clear();
        self.queue.drain()
    }

    /// Neighbors heard within the liveness window ending at `now`.
    pub fn neighbors(&self, now: SimTime) -> Vec<NodeId> {
        self.neighbors
            .iter()
            .filter(|(_, expires)| now < **expires)
            .map(|(n, _)| *n)
            .collect()
    }

    pub fn route_status(&self, dst: NodeId, now: SimTime) -> RouteStatus {
        match self.table.get(dst) {
            Some(e) if e.state == RouteState::InRepair => RouteStatus::Repairing,
            Some(e) if e.is_usable(now) => RouteStatus::Valid,
            _ if self.discoveries.contains_key(&dst) => RouteStatus::RouteDiscoveryPending,
            Some(_) => RouteStatus::Expired,
            None => RouteStatus::NoRoute,
        }
    }

    // ── Dispatch ──────────────────────────────────────────────────────

    /// Process one input and return the side effects to perform.
    ///
    /// Same state + same input = same actions.
    pub fn handle(&mut self, env: RoutingEnv, input: RoutingInput) -> Vec<RoutingAction> {
        let mut out = Vec::new();
        match input {
            RoutingInput::Start => self.on_start(&mut out),
            RoutingInput::Send(packet) => self.route_output(env.now, packet, &mut out),
            RoutingInput::Received { from, body } => self.on_receive(env, from, body, &mut out),
            RoutingInput::TxFailed { next_hop, body } => {
                self.on_tx_failed(env.now, next_hop, body, &mut out)
            }
            RoutingInput::Timer(timer) => self.on_timer(env.now, timer, &mut out),
        }
        out
    }

    fn on_start(&mut self, out: &mut Vec<RoutingAction>) {
        if self.config.enable_hello {
            let after = self.jitter();
            out.push(RoutingAction::SetTimer {
                timer: RoutingTimer::Hello,
                after,
            });
        }
        out.push(RoutingAction::SetTimer {
            timer: RoutingTimer::NeighborCheck,
            after: self.config.hello_interval,
        });
    }

    fn on_timer(&mut self, now: SimTime, timer: RoutingTimer, out: &mut Vec<RoutingAction>) {
        match timer {
            RoutingTimer::Hello => {
                if !self.config.enable_hello {
                    return;
                }
                out.push(RoutingAction::Broadcast(ControlMessage::Hello {
                    node: self.id,
                    seq: self.seq,
                    lifetime: self.config.neighbor_timeout(),
                }));
                self.stats.hello_sent += 1;
                let after = self.config.hello_interval.saturating_add(self.jitter());
                out.push(RoutingAction::SetTimer {
                    timer: RoutingTimer::Hello,
                    after,
                });
            }
            RoutingTimer::NeighborCheck => {
                if self.config.enable_hello {
                    let lost: Vec<NodeId> = self
                        .neighbors
                        .iter()
                        .filter(|(_, expires)| now >= **expires)
                        .map(|(n, _)| *n)
                        .collect();
                    for neighbor in lost {
                        self.neighbors.remove(&neighbor);
                        debug!("{} lost neighbor {} (hello timeout)", self.id, neighbor);
                        self.link_broken(now, neighbor, out);
                    }
                }
                self.table.purge(now, self.config.delete_period());
                self.seen_rreqs.retain(|_, expires| now < *expires);
                for packet in self.queue.purge(now) {
                    out.push(RoutingAction::Drop {
                        packet,
                        reason: DropReason::QueueTimeout,
                    });
                }
                out.push(RoutingAction::SetTimer {
                    timer: RoutingTimer::NeighborCheck,
                    after: self.config.hello_interval,
                });
            }
            RoutingTimer::RreqTimeout(dst) => self.on_rreq_timeout(now, dst, out),
        }
    }

    // ── Route discovery ───────────────────────────────────────────────

    fn route_output(&mut self, now: SimTime, packet: Packet, out: &mut Vec<RoutingAction>) {
        if packet.dst == self.id {
            out.push(RoutingAction::Deliver(packet));
            return;
        }
        if let Some(next_hop) = self.usable_next_hop(packet.dst, now) {
            self.refresh_active(packet.dst, next_hop, now);
            out.push(RoutingAction::Unicast {
                next_hop,
                body: FrameBody::Data(packet),
            });
            return;
        }
        self.park(now, packet, false, out);
    }

    /// Queue `packet` and make sure a discovery for its destination runs.
    fn park(&mut self, now: SimTime, packet: Packet, repair: bool, out: &mut Vec<RoutingAction>) {
        let dst = packet.dst;
        if let Some(evicted) = self.queue.enqueue(packet, now) {
            out.push(RoutingAction::Drop {
                packet: evicted,
                reason: DropReason::QueueFull,
            });
        }
        if !self.discoveries.contains_key(&dst) {
            self.start_discovery(now, dst, 0, repair, out);
        }
    }

    fn start_discovery(
        &mut self,
        now: SimTime,
        dst: NodeId,
        attempt: u32,
        repair: bool,
        out: &mut Vec<RoutingAction>,
    ) {
        self.seq = self.seq.wrapping_add(1);
        self.request_id = self.request_id.wrapping_add(1);

        // A repair must not be answered by upstream nodes still holding
        // the route that just broke, so it asks for a newer number.
        let (dest_seq, unknown_seq) = match self.table.get(dst) {
            Some(e) if e.valid_seq && repair => (e.seq.wrapping_add(1), false),
            Some(e) if e.valid_seq => (e.seq, false),
            _ => (0, true),
        };
        self.seen_rreqs.insert(
            (self.id, self.request_id),
            now.saturating_plus(self.config.path_discovery_time()),
        );

        let rreq = RouteRequest {
            hop_count: 0,
            ttl: self.config.net_diameter,
            request_id: self.request_id,
            destination: dst,
            dest_seq,
            unknown_seq,
            originator: self.id,
            origin_seq: self.seq,
            gratuitous: self.config.gratuitous_reply,
            destination_only: self.config.destination_only,
        };
        debug!(
            "{} RREQ #{} for {} (attempt {}{})",
            self.id,
            self.request_id,
            dst,
            attempt,
            if repair { ", local repair" } else { "" }
        );
        out.push(RoutingAction::Broadcast(ControlMessage::Rreq(rreq)));
        self.stats.rreq_originated += 1;

        self.discoveries.insert(dst, Discovery { attempt, repair });
        out.push(RoutingAction::SetTimer {
            timer: RoutingTimer::RreqTimeout(dst),
            after: self.config.rreq_backoff(attempt),
        });
    }

    fn on_rreq_timeout(&mut self, now: SimTime, dst: NodeId, out: &mut Vec<RoutingAction>) {
        let Some(discovery) = self.discoveries.get(&dst).copied() else {
            return;
        };
        if self.usable_next_hop(dst, now).is_some() {
            self.flush_if_routable(dst, now, out);
            return;
        }
        if discovery.attempt < self.config.rreq_retries {
            self.start_discovery(now, dst, discovery.attempt + 1, discovery.repair, out);
            return;
        }

        self.discoveries.remove(&dst);
        self.stats.discoveries_failed += 1;
        debug!("{} gave up discovering {}", self.id, dst);

        if discovery.repair {
            // Local repair failed: the upstream nodes must now hear about it.
            if let Some(entry) = self.table.get(dst).cloned() {
                self.table
                    .invalidate(dst, now, self.config.delete_period());
                let seq = self.table.get(dst).map_or(entry.seq, |e| e.seq);
                self.send_rerr(
                    vec![UnreachableDestination {
                        destination: dst,
                        seq,
                    }],
                    entry.precursors,
                    out,
                );
            }
        }
        for packet in self.queue.take_for(dst) {
            out.push(RoutingAction::Drop {
                packet,
                reason: DropReason::NoRoute,
            });
        }
    }

    // ── Reception ─────────────────────────────────────────────────────

    fn on_receive(
        &mut self,
        env: RoutingEnv,
        from: NodeId,
        body: FrameBody,
        out: &mut Vec<RoutingAction>,
    ) {
        let now = env.now;
        self.neighbors
            .insert(from, now.saturating_plus(self.config.neighbor_timeout()));

        match body {
            FrameBody::Control(ControlMessage::Hello {
                node,
                seq,
                lifetime,
            }) => {
                self.table
                    .refresh_neighbor(node, Some(seq), now.saturating_plus(lifetime));
                self.flush_if_routable(node, now, out);
            }
            FrameBody::Control(ControlMessage::Rreq(rreq)) => self.recv_rreq(env, from, rreq, out),
            FrameBody::Control(ControlMessage::Rrep(rrep)) => self.recv_rrep(now, from, rrep, out),
            FrameBody::Control(ControlMessage::Rerr(rerr)) => self.recv_rerr(now, from, rerr, out),
            FrameBody::Data(packet) => self.recv_data(now, from, packet, out),
        }
    }

    fn recv_rreq(
        &mut self,
        env: RoutingEnv,
        from: NodeId,
        rreq: RouteRequest,
        out: &mut Vec<RoutingAction>,
    ) {
        let now = env.now;
        if rreq.originator == self.id {
            return;
        }
        self.table.refresh_neighbor(
            from,
            None,
            now.saturating_plus(self.config.active_route_timeout),
        );

        let key = (rreq.originator, rreq.request_id);
        if self.seen_rreqs.get(&key).is_some_and(|exp| now < *exp) {
            self.stats.rreq_duplicates += 1;
            trace!("{} dropped duplicate RREQ {:?}", self.id, key);
            return;
        }
        self.seen_rreqs
            .insert(key, now.saturating_plus(self.config.path_discovery_time()));

        // Reverse route toward the originator.
        let hops = rreq.hop_count.saturating_add(1);
        let reverse_lifetime = now.saturating_plus(
            self.config
                .net_traversal_time()
                .saturating_mul(2)
                .saturating_sub(
                    self.config
                        .node_traversal_time
                        .saturating_mul(2 * u64::from(hops)),
                ),
        );
        let reverse = RouteEntry::new(
            rreq.originator,
            from,
            rreq.origin_seq,
            true,
            hops,
            reverse_lifetime,
        );
        if !self.table.update(reverse, now) {
            self.table.extend_lifetime(rreq.originator, reverse_lifetime);
        }
        self.flush_if_routable(rreq.originator, now, out);
        let back = self
            .usable_next_hop(rreq.originator, now)
            .unwrap_or(from);

        if rreq.destination == self.id {
            if !rreq.unknown_seq && seq_newer(rreq.dest_seq, self.seq) {
                self.seq = rreq.dest_seq;
            }
            let rrep = RouteReply {
                hop_count: 0,
                destination: self.id,
                dest_seq: self.seq,
                originator: rreq.originator,
                lifetime: self.config.my_route_timeout(),
            };
            debug!("{} answers RREQ from {} as destination", self.id, rreq.originator);
            out.push(RoutingAction::Unicast {
                next_hop: back,
                body: FrameBody::Control(ControlMessage::Rrep(rrep)),
            });
            self.stats.rrep_sent += 1;
            return;
        }

        if !rreq.destination_only {
            let fresh_enough = self
                .table
                .usable(rreq.destination, now)
                .filter(|e| e.valid_seq && (rreq.unknown_seq || !seq_newer(rreq.dest_seq, e.seq)))
                .cloned();
            if let Some(route) = fresh_enough {
                self.reply_from_cache(now, &rreq, &route, back, out);
                return;
            }
        }

        if rreq.ttl <= 1 {
            return;
        }
        if let Some(min) = self.config.min_forward_energy {
            if env.energy_fraction < min {
                self.stats.rreq_suppressed += 1;
                debug!(
                    "{} not forwarding RREQ from {}: energy {:.3} below {:.3}",
                    self.id, rreq.originator, env.energy_fraction, min
                );
                return;
            }
        }

        let mut forwarded = RouteRequest {
            hop_count: hops,
            ttl: rreq.ttl - 1,
            ..rreq
        };
        if let Some(e) = self.table.get(forwarded.destination) {
            if e.valid_seq && (forwarded.unknown_seq || seq_newer(e.seq, forwarded.dest_seq)) {
                forwarded.dest_seq = e.seq;
                forwarded.unknown_seq = false;
            }
        }
        out.push(RoutingAction::Broadcast(ControlMessage::Rreq(forwarded)));
        self.stats.rreq_forwarded += 1;
    }

    /// Answer an RREQ with a route we already hold, optionally telling the
    /// destination about the originator as well.
    fn reply_from_cache(
        &mut self,
        now: SimTime,
        rreq: &RouteRequest,
        route: &RouteEntry,
        back: NodeId,
        out: &mut Vec<RoutingAction>,
    ) {
        self.table.add_precursor(rreq.destination, back);
        self.table.add_precursor(rreq.originator, route.next_hop);

        let rrep = RouteReply {
            hop_count: route.hop_count,
            destination: rreq.destination,
            dest_seq: route.seq,
            originator: rreq.originator,
            lifetime: route.lifetime.saturating_duration_since(now),
        };
        debug!(
            "{} answers RREQ from {} for {} from its table",
            self.id, rreq.originator, rreq.destination
        );
        out.push(RoutingAction::Unicast {
            next_hop: back,
            body: FrameBody::Control(ControlMessage::Rrep(rrep)),
        });
        self.stats.rrep_sent += 1;

        if rreq.gratuitous {
            if let Some(reverse) = self.table.usable(rreq.originator, now) {
                let gratuitous = RouteReply {
                    hop_count: reverse.hop_count,
                    destination: rreq.originator,
                    dest_seq: rreq.origin_seq,
                    originator: rreq.destination,
                    lifetime: reverse.lifetime.saturating_duration_since(now),
                };
                out.push(RoutingAction::Unicast {
                    next_hop: route.next_hop,
                    body: FrameBody::Control(ControlMessage::Rrep(gratuitous)),
                });
                self.stats.rrep_sent += 1;
            }
        }
    }

    fn recv_rrep(&mut self, now: SimTime, from: NodeId, rrep: RouteReply, out: &mut Vec<RoutingAction>) {
        self.table.refresh_neighbor(
            from,
            None,
            now.saturating_plus(self.config.active_route_timeout),
        );
        if rrep.destination == self.id {
            return;
        }

        let hops = rrep.hop_count.saturating_add(1);
        let forward = RouteEntry::new(
            rrep.destination,
            from,
            rrep.dest_seq,
            true,
            hops,
            now.saturating_plus(rrep.lifetime),
        );
        if self.table.update(forward, now) {
            debug!(
                "{} route to {} via {} ({} hops, seq {})",
                self.id, rrep.destination, from, hops, rrep.dest_seq
            );
        }

        if rrep.originator == self.id {
            self.flush_if_routable(rrep.destination, now, out);
            return;
        }

        let Some(back) = self.usable_next_hop(rrep.originator, now) else {
            debug!(
                "{} cannot forward RREP for {}: no route back to {}",
                self.id, rrep.destination, rrep.originator
            );
            return;
        };
        self.table.add_precursor(rrep.destination, back);
        self.table.add_precursor(rrep.originator, from);
        self.table.extend_lifetime(
            rrep.originator,
            now.saturating_plus(self.config.active_route_timeout),
        );
        let destination = rrep.destination;
        out.push(RoutingAction::Unicast {
            next_hop: back,
            body: FrameBody::Control(ControlMessage::Rrep(RouteReply {
                hop_count: hops,
                ..rrep
            })),
        });
        self.stats.rrep_forwarded += 1;
        self.flush_if_routable(destination, now, out);
    }

    fn recv_rerr(&mut self, now: SimTime, from: NodeId, rerr: RouteError, out: &mut Vec<RoutingAction>) {
        let mut lost = Vec::new();
        let mut precursors = BTreeSet::new();
        for u in rerr.unreachable {
            if let Some(entry) = self.table.invalidate_reported(
                u.destination,
                from,
                u.seq,
                now,
                self.config.delete_period(),
            ) {
                debug!("{} route to {} invalidated by RERR from {}", self.id, u.destination, from);
                lost.push(UnreachableDestination {
                    destination: entry.destination,
                    seq: entry.seq,
                });
                precursors.extend(entry.precursors);
            }
        }
        self.send_rerr(lost, precursors, out);
    }

    fn recv_data(&mut self, now: SimTime, from: NodeId, mut packet: Packet, out: &mut Vec<RoutingAction>) {
        let active_until = now.saturating_plus(self.config.active_route_timeout);
        self.table.extend_lifetime(packet.src, active_until);
        self.table.extend_lifetime(from, active_until);

        if packet.dst == self.id {
            out.push(RoutingAction::Deliver(packet));
            return;
        }
        if packet.ttl <= 1 {
            out.push(RoutingAction::Drop {
                packet,
                reason: DropReason::TtlExpired,
            });
            return;
        }
        if let Some(next_hop) = self.usable_next_hop(packet.dst, now) {
            self.refresh_active(packet.dst, next_hop, now);
            packet.ttl -= 1;
            out.push(RoutingAction::Unicast {
                next_hop,
                body: FrameBody::Data(packet),
            });
            self.stats.data_forwarded += 1;
            return;
        }
        if self
            .table
            .get(packet.dst)
            .is_some_and(|e| e.state == RouteState::InRepair)
        {
            packet.ttl -= 1;
            self.park(now, packet, true, out);
            return;
        }

        // Nowhere to send it: tell the upstream hop so it stops using us.
        let dst = packet.dst;
        let seq = self.table.get(dst).map_or(0, |e| e.seq);
        out.push(RoutingAction::Drop {
            packet,
            reason: DropReason::NoRoute,
        });
        out.push(RoutingAction::Unicast {
            next_hop: from,
            body: FrameBody::Control(ControlMessage::Rerr(RouteError {
                unreachable: vec![UnreachableDestination { destination: dst, seq }],
            })),
        });
        self.stats.rerr_sent += 1;
    }

    // ── Link breakage ─────────────────────────────────────────────────

    fn on_tx_failed(
        &mut self,
        now: SimTime,
        next_hop: NodeId,
        body: FrameBody,
        out: &mut Vec<RoutingAction>,
    ) {
        self.neighbors.remove(&next_hop);
        self.stats.link_breaks += 1;
        debug!("{} link to {} broken (no ack)", self.id, next_hop);

        let FrameBody::Data(packet) = body else {
            self.link_broken(now, next_hop, out);
            return;
        };

        if packet.src == self.id {
            self.link_broken(now, next_hop, out);
            self.park(now, packet, false, out);
            return;
        }

        let dst = packet.dst;
        let repairable = self.config.enable_local_repair
            && self.table.get(dst).is_some_and(|e| {
                e.next_hop == next_hop
                    && e.state == RouteState::Valid
                    && e.hop_count <= self.config.max_repair_ttl
            });
        if repairable {
            if let Some(entry) = self.table.get_mut(dst) {
                entry.state = RouteState::InRepair;
            }
            self.link_broken(now, next_hop, out);
            self.park(now, packet, true, out);
        } else {
            self.link_broken(now, next_hop, out);
            out.push(RoutingAction::Drop {
                packet,
                reason: DropReason::LinkBroken { next_hop },
            });
        }
    }

    /// Invalidate every route through `neighbor` and warn the precursors.
    fn link_broken(&mut self, now: SimTime, neighbor: NodeId, out: &mut Vec<RoutingAction>) {
        let broken = self
            .table
            .invalidate_via(neighbor, now, self.config.delete_period());
        let mut precursors = BTreeSet::new();
        let mut lost = Vec::with_capacity(broken.len());
        for entry in broken {
            lost.push(UnreachableDestination {
                destination: entry.destination,
                seq: entry.seq,
            });
            precursors.extend(entry.precursors.into_iter().filter(|p| *p != neighbor));
        }
        self.send_rerr(lost, precursors, out);
    }

    /// Unicast the RERR to a single precursor, broadcast it to several.
    fn send_rerr(
        &mut self,
        lost: Vec<UnreachableDestination>,
        precursors: BTreeSet<NodeId>,
        out: &mut Vec<RoutingAction>,
    ) {
        if lost.is_empty() || precursors.is_empty() {
            return;
        }
        let msg = ControlMessage::Rerr(RouteError { unreachable: lost });
        self.stats.rerr_sent += 1;
        if precursors.len() == 1 {
            if let Some(&next_hop) = precursors.iter().next() {
                out.push(RoutingAction::Unicast {
                    next_hop,
                    body: FrameBody::Control(msg),
                });
            }
        } else {
            out.push(RoutingAction::Broadcast(msg));
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────

    fn usable_next_hop(&self, dst: NodeId, now: SimTime) -> Option<NodeId> {
        self.table.usable(dst, now).map(|e| e.next_hop)
    }

    /// Using a route keeps it and its first hop alive.
    fn refresh_active(&mut self, dst: NodeId, next_hop: NodeId, now: SimTime) {
        let until = now.saturating_plus(self.config.active_route_timeout);
        self.table.extend_lifetime(dst, until);
        self.table.extend_lifetime(next_hop, until);
    }

    /// If `dst` just became reachable, end its discovery and release the
    /// packets parked for it.
    fn flush_if_routable(&mut self, dst: NodeId, now: SimTime, out: &mut Vec<RoutingAction>) {
        let Some(next_hop) = self.usable_next_hop(dst, now) else {
            return;
        };
        if self.discoveries.remove(&dst).is_some() {
            out.push(RoutingAction::CancelTimer(RoutingTimer::RreqTimeout(dst)));
        }
        let packets = self.queue.take_for(dst);
        if packets.is_empty() {
            return;
        }
        // Forwarded packets had their TTL spent before they were parked.
        self.refresh_active(dst, next_hop, now);
        for packet in packets {
            out.push(RoutingAction::Unicast {
                next_hop,
                body: FrameBody::Data(packet),
            });
        }
    }

    fn jitter(&mut self) -> SimDuration {
        let max = self.config.hello_jitter.as_nanos();
        if max == 0 {
            SimDuration::ZERO
        } else {
            SimDuration::from_nanos(self.rng.gen_range(0..=max))
        }
    }
}
