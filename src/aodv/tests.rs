//! Multi-node protocol tests.
//!
//! A small in-memory `Mesh` wires several `AodvRouting` instances together
//! over an explicit link set and executes their actions synchronously, so
//! each test can script link changes and timer firings precisely.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::*;
use crate::packet::{Payload, DEFAULT_TTL};
use crate::random::{stream_rng, Stream};

fn n(i: u64) -> NodeId {
    NodeId::new(i)
}

fn datagram(uid: u64, src: u64, dst: u64) -> Packet {
    Packet {
        uid,
        src: n(src),
        dst: n(dst),
        src_port: 49153,
        dst_port: 9,
        size_bytes: 512,
        ttl: DEFAULT_TTL,
        payload: Payload::Datagram {
            seq: uid as u32,
            sent_at: SimTime::ZERO,
        },
    }
}

fn quiet_config() -> AodvConfig {
    AodvConfig {
        enable_hello: false,
        ..AodvConfig::default()
    }
}

struct Mesh {
    nodes: BTreeMap<NodeId, AodvRouting>,
    links: BTreeSet<(NodeId, NodeId)>,
    energy: BTreeMap<NodeId, f64>,
    now: SimTime,
    delivered: Vec<(NodeId, Packet)>,
    dropped: Vec<(NodeId, Packet, DropReason)>,
    timers: BTreeMap<(NodeId, RoutingTimer), SimTime>,
    frames: u64,
}

impl Mesh {
    fn new(count: u64, config: AodvConfig) -> Self {
        let nodes = (0..count)
            .map(|i| {
                let id = n(i);
                let rng = stream_rng(7, Stream::Routing, i);
                (id, AodvRouting::new(id, config.clone(), rng))
            })
            .collect();
        Mesh {
            nodes,
            links: BTreeSet::new(),
            energy: BTreeMap::new(),
            now: SimTime::ZERO,
            delivered: Vec::new(),
            dropped: Vec::new(),
            timers: BTreeMap::new(),
            frames: 0,
        }
    }

    fn chain(count: u64, config: AodvConfig) -> Self {
        let mut mesh = Mesh::new(count, config);
        for i in 1..count {
            mesh.link(i - 1, i);
        }
        mesh
    }

    fn link(&mut self, a: u64, b: u64) {
        self.links.insert((n(a), n(b)));
        self.links.insert((n(b), n(a)));
    }

    fn unlink(&mut self, a: u64, b: u64) {
        self.links.remove(&(n(a), n(b)));
        self.links.remove(&(n(b), n(a)));
    }

    fn node(&self, i: u64) -> &AodvRouting {
        &self.nodes[&n(i)]
    }

    fn neighbors_of(&self, id: NodeId) -> Vec<NodeId> {
        self.links
            .iter()
            .filter(|(a, _)| *a == id)
            .map(|(_, b)| *b)
            .collect()
    }

    /// Feed one input and run every consequence to quiescence.
    fn input(&mut self, node: u64, input: RoutingInput) {
        let mut pending = VecDeque::from([(n(node), input)]);
        while let Some((id, input)) = pending.pop_front() {
            let env = RoutingEnv {
                now: self.now,
                energy_fraction: self.energy.get(&id).copied().unwrap_or(1.0),
            };
            let Some(routing) = self.nodes.get_mut(&id) else {
                continue;
            };
            for action in routing.handle(env, input) {
                match action {
                    RoutingAction::Broadcast(msg) => {
                        for nb in self.neighbors_of(id) {
                            self.frames += 1;
                            pending.push_back((
                                nb,
                                RoutingInput::Received {
                                    from: id,
                                    body: FrameBody::Control(msg.clone()),
                                },
                            ));
                        }
                    }
                    RoutingAction::Unicast { next_hop, body } => {
                        self.frames += 1;
                        if self.links.contains(&(id, next_hop)) {
                            pending.push_back((next_hop, RoutingInput::Received { from: id, body }));
                        } else {
                            pending.push_back((id, RoutingInput::TxFailed { next_hop, body }));
                        }
                    }
                    RoutingAction::Deliver(p) => self.delivered.push((id, p)),
                    RoutingAction::Drop { packet, reason } => {
                        self.dropped.push((id, packet, reason))
                    }
                    RoutingAction::SetTimer { timer, after } => {
                        self.timers
                            .insert((id, timer), self.now.saturating_plus(after));
                    }
                    RoutingAction::CancelTimer(timer) => {
                        self.timers.remove(&(id, timer));
                    }
                }
            }
        }
    }

    fn send(&mut self, packet: Packet) {
        let src = packet.src.raw();
        self.input(src, RoutingInput::Send(packet));
    }

    /// Advance to the armed `timer` of `node` and fire it.
    fn fire(&mut self, node: u64, timer: RoutingTimer) {
        let at = self
            .timers
            .remove(&(n(node), timer))
            .unwrap_or_else(|| panic!("{:?} not armed on node {}", timer, node));
        self.now = self.now.max(at);
        self.input(node, RoutingInput::Timer(timer));
    }
}

#[test]
fn test_three_hop_chain_delivers() {
    let mut mesh = Mesh::chain(4, quiet_config());
    mesh.send(datagram(1, 0, 3));

    assert_eq!(mesh.delivered.len(), 1);
    assert_eq!(mesh.delivered[0].0, n(3));
    assert_eq!(mesh.delivered[0].1.uid, 1);
    assert_eq!(mesh.delivered[0].1.ttl, DEFAULT_TTL - 2);

    let route = mesh.node(0).routing_table().get(n(3)).unwrap();
    assert_eq!(route.next_hop, n(1));
    assert_eq!(route.hop_count, 3);
    assert_eq!(mesh.node(0).route_status(n(3), mesh.now), RouteStatus::Valid);

    // The discovery timer was cancelled once the RREP arrived.
    assert!(!mesh.timers.contains_key(&(n(0), RoutingTimer::RreqTimeout(n(3)))));

    // Reverse route at the destination.
    let back = mesh.node(3).routing_table().get(n(0)).unwrap();
    assert_eq!(back.next_hop, n(2));
    assert_eq!(back.hop_count, 3);

    // Node 1 saw node 2's rebroadcast of its own forward.
    assert_eq!(mesh.node(1).stats().rreq_duplicates, 1);
}

#[test]
fn test_second_packet_uses_cached_route() {
    let mut mesh = Mesh::chain(3, quiet_config());
    mesh.send(datagram(1, 0, 2));
    let rreqs = mesh.node(0).stats().rreq_originated;

    mesh.send(datagram(2, 0, 2));
    assert_eq!(mesh.node(0).stats().rreq_originated, rreqs);
    assert_eq!(mesh.delivered.len(), 2);
}

#[test]
fn test_unreachable_destination_reports_no_route() {
    let config = quiet_config();
    let backoffs: Vec<SimDuration> = (0..=config.rreq_retries)
        .map(|a| config.rreq_backoff(a))
        .collect();
    let mut mesh = Mesh::new(2, config);
    mesh.send(datagram(1, 0, 1));
    assert_eq!(
        mesh.node(0).route_status(n(1), mesh.now),
        RouteStatus::RouteDiscoveryPending
    );

    let target = RoutingTimer::RreqTimeout(n(1));
    for backoff in &backoffs {
        let armed = mesh.timers[&(n(0), target)];
        assert_eq!(armed, mesh.now.saturating_plus(*backoff));
        mesh.fire(0, target);
    }

    assert_eq!(mesh.node(0).stats().rreq_originated, 3);
    assert_eq!(mesh.node(0).stats().discoveries_failed, 1);
    assert_eq!(mesh.dropped.len(), 1);
    assert_eq!(mesh.dropped[0].2, DropReason::NoRoute);
    assert_eq!(
        mesh.dropped[0].2.to_error(n(0), &mesh.dropped[0].1),
        crate::error::SimError::NoRouteToHost { destination: n(1) }
    );
    assert!(mesh
        .node(0)
        .routing_table()
        .iter()
        .all(|e| !(e.destination == n(1) && e.state == RouteState::Valid)));
    assert_eq!(mesh.node(0).route_status(n(1), mesh.now), RouteStatus::NoRoute);
    assert!(!mesh.timers.contains_key(&(n(0), target)));
}

#[test]
fn test_fresher_rrep_supersedes_shorter_route() {
    let mut mesh = Mesh::new(1, quiet_config());
    let rrep = |seq: u32, hops: u8| RoutingInput::Received {
        from: n(0),
        body: FrameBody::Control(ControlMessage::Rrep(RouteReply {
            hop_count: hops,
            destination: n(9),
            dest_seq: seq,
            originator: n(0),
            lifetime: SimDuration::from_secs(10),
        })),
    };
    // The harness addresses node 0; `from` stands for a neighbor.
    let feed = |mesh: &mut Mesh, from: u64, input: RoutingInput| {
        let input = match input {
            RoutingInput::Received { body, .. } => RoutingInput::Received { from: n(from), body },
            other => other,
        };
        mesh.input(0, input);
    };

    feed(&mut mesh, 1, rrep(5, 1));
    feed(&mut mesh, 2, rrep(6, 4));
    let route = mesh.node(0).routing_table().get(n(9)).unwrap().clone();
    assert_eq!(route.next_hop, n(2));
    assert_eq!(route.hop_count, 5);
    assert_eq!(route.seq, 6);

    // A stale reply cannot win back, however short.
    feed(&mut mesh, 3, rrep(5, 0));
    assert_eq!(mesh.node(0).routing_table().get(n(9)).unwrap().next_hop, n(2));
}

#[test]
fn test_destination_adopts_requested_sequence_number() {
    let mut mesh = Mesh::new(2, quiet_config());
    mesh.link(0, 1);
    let rreq = RouteRequest {
        hop_count: 0,
        ttl: 35,
        request_id: 1,
        destination: n(1),
        dest_seq: 7,
        unknown_seq: false,
        originator: n(0),
        origin_seq: 1,
        gratuitous: false,
        destination_only: false,
    };
    mesh.input(
        1,
        RoutingInput::Received {
            from: n(0),
            body: FrameBody::Control(ControlMessage::Rreq(rreq)),
        },
    );
    assert_eq!(mesh.node(1).sequence_number(), 7);
    assert_eq!(mesh.node(0).routing_table().get(n(1)).unwrap().seq, 7);
}

#[test]
fn test_rerr_invalidates_upstream_routes() {
    let mut mesh = Mesh::chain(4, quiet_config());
    mesh.send(datagram(1, 0, 3));
    assert_eq!(mesh.delivered.len(), 1);

    mesh.unlink(2, 3);
    mesh.send(datagram(2, 0, 3));

    // Node 2 hit the break and dropped the forwarded packet.
    assert_eq!(mesh.delivered.len(), 1);
    assert_eq!(mesh.dropped.len(), 1);
    assert_eq!(mesh.dropped[0].0, n(2));
    assert_eq!(
        mesh.dropped[0].2,
        DropReason::LinkBroken { next_hop: n(3) }
    );

    for i in 0..3 {
        let entry = mesh.node(i).routing_table().get(n(3)).unwrap();
        assert_eq!(entry.state, RouteState::Invalid, "node {} still routes to N3", i);
    }
    assert_eq!(mesh.node(0).route_status(n(3), mesh.now), RouteStatus::Expired);
    assert_eq!(mesh.node(2).stats().rerr_sent, 1);
    assert_eq!(mesh.node(1).stats().rerr_sent, 1);

    // The next send from the source starts a fresh discovery.
    mesh.send(datagram(3, 0, 3));
    assert_eq!(
        mesh.node(0).route_status(n(3), mesh.now),
        RouteStatus::RouteDiscoveryPending
    );
}

#[test]
fn test_local_break_requeues_and_rediscovers() {
    let mut mesh = Mesh::chain(3, quiet_config());
    mesh.send(datagram(1, 0, 2));
    assert_eq!(mesh.node(0).routing_table().get(n(2)).unwrap().next_hop, n(1));

    // Node 1 moves away but node 2 comes into direct range.
    mesh.unlink(0, 1);
    mesh.link(0, 2);
    mesh.send(datagram(2, 0, 2));

    assert_eq!(mesh.delivered.len(), 2);
    assert!(mesh.dropped.is_empty());
    let route = mesh.node(0).routing_table().get(n(2)).unwrap();
    assert_eq!(route.next_hop, n(2));
    assert_eq!(route.hop_count, 1);
}

#[test]
fn test_hello_loss_breaks_link() {
    let mut mesh = Mesh::new(2, AodvConfig::default());
    mesh.link(0, 1);
    mesh.input(0, RoutingInput::Start);
    mesh.input(1, RoutingInput::Start);
    mesh.fire(0, RoutingTimer::Hello);
    mesh.fire(1, RoutingTimer::Hello);

    assert_eq!(mesh.node(0).neighbors(mesh.now), vec![n(1)]);
    assert_eq!(mesh.node(0).route_status(n(1), mesh.now), RouteStatus::Valid);

    mesh.unlink(0, 1);
    mesh.now = mesh.now.saturating_plus(SimDuration::from_secs(3));
    mesh.timers.insert((n(0), RoutingTimer::NeighborCheck), mesh.now);
    mesh.fire(0, RoutingTimer::NeighborCheck);

    assert!(mesh.node(0).neighbors(mesh.now).is_empty());
    let entry = mesh.node(0).routing_table().get(n(1)).unwrap();
    assert_eq!(entry.state, RouteState::Invalid);
    assert_eq!(mesh.node(0).route_status(n(1), mesh.now), RouteStatus::Expired);
}

#[test]
fn test_low_energy_node_does_not_forward_rreq() {
    let config = AodvConfig {
        min_forward_energy: Some(0.5),
        ..quiet_config()
    };
    let mut mesh = Mesh::chain(3, config);
    mesh.energy.insert(n(1), 0.2);

    mesh.send(datagram(1, 0, 2));
    assert_eq!(mesh.node(1).stats().rreq_suppressed, 1);
    assert_eq!(mesh.node(1).stats().rreq_forwarded, 0);
    assert!(mesh.node(2).routing_table().get(n(0)).is_none());
    assert!(mesh.delivered.is_empty());

    // It still answers for itself.
    mesh.send(datagram(2, 0, 1));
    assert_eq!(mesh.delivered.len(), 1);
    assert_eq!(mesh.delivered[0].0, n(1));
}

#[test]
fn test_intermediate_node_replies_from_table() {
    let mut mesh = Mesh::chain(4, quiet_config());
    // Node 1 learns a route to 3.
    mesh.send(datagram(1, 1, 3));
    let replies_before = mesh.node(1).stats().rrep_sent;

    mesh.send(datagram(2, 0, 3));
    assert_eq!(mesh.node(1).stats().rrep_sent, replies_before + 2);
    assert_eq!(mesh.node(1).stats().rreq_forwarded, 0);
    assert_eq!(mesh.delivered.len(), 2);

    // The gratuitous reply taught the destination a route to the originator.
    let back = mesh.node(3).routing_table().get(n(0)).unwrap();
    assert_eq!(back.next_hop, n(2));
    assert_eq!(back.state, RouteState::Valid);
}

#[test]
fn test_local_repair_patches_route() {
    let config = AodvConfig {
        enable_local_repair: true,
        ..quiet_config()
    };
    let mut mesh = Mesh::chain(4, config);
    mesh.link(2, 4);
    mesh.link(4, 3);
    mesh.send(datagram(1, 0, 3));
    assert_eq!(mesh.node(2).routing_table().get(n(3)).unwrap().next_hop, n(3));

    mesh.unlink(2, 3);
    mesh.send(datagram(2, 0, 3));

    assert!(mesh.dropped.is_empty(), "{:?}", mesh.dropped);
    assert_eq!(mesh.delivered.len(), 2);
    let patched = mesh.node(2).routing_table().get(n(3)).unwrap();
    assert_eq!(patched.next_hop, n(4));
    assert_eq!(patched.state, RouteState::Valid);
    assert_eq!(mesh.node(0).route_status(n(3), mesh.now), RouteStatus::Valid);
}

#[test]
fn test_repair_pending_reports_repairing() {
    let config = AodvConfig {
        enable_local_repair: true,
        ..quiet_config()
    };
    let mut mesh = Mesh::chain(4, config);
    mesh.send(datagram(1, 0, 3));
    mesh.unlink(2, 3);
    mesh.send(datagram(2, 0, 3));

    assert_eq!(mesh.node(2).route_status(n(3), mesh.now), RouteStatus::Repairing);
    assert_eq!(mesh.node(2).queued_packets(), 1);

    let target = RoutingTimer::RreqTimeout(n(3));
    for _ in 0..=mesh.node(2).config().rreq_retries {
        mesh.fire(2, target);
    }

    // Repair gave up: packet dropped, upstream told.
    assert_eq!(mesh.dropped.len(), 1);
    assert_eq!(mesh.dropped[0].2, DropReason::NoRoute);
    assert_eq!(
        mesh.node(0).routing_table().get(n(3)).unwrap().state,
        RouteState::Invalid
    );
}

#[test]
fn test_identical_seeds_identical_actions() {
    fn run() -> (u64, Vec<(NodeId, RoutingTimer, SimTime)>) {
        let mut mesh = Mesh::chain(3, AodvConfig::default());
        for i in 0..3 {
            mesh.input(i, RoutingInput::Start);
        }
        let timers = mesh
            .timers
            .iter()
            .map(|((node, timer), at)| (*node, *timer, *at))
            .collect();
        mesh.send(datagram(1, 0, 2));
        (mesh.frames, timers)
    }
    assert_eq!(run(), run());
}
