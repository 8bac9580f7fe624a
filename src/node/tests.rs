//! Integration tests for `NodeRuntime`: whole scenarios run through the
//! scheduler, channel, routing, energy and applications together.

use crate::aodv::{AodvConfig, RouteState};
use crate::app::{Application, Ping, UdpClient, UdpServer};
use crate::channel::{Channel, ChannelConfig};
use crate::config::AppConfig;
use crate::dsl::{Scenario, ScenarioBuilder};
use crate::energy::{EnergySource, RadioEnergyModel};
use crate::error::SimError;
use crate::geometry::{Rect, Vector2};
use crate::node::{Node, NodeId, NodeRuntime, TraceKind};
use crate::time::{SimDuration, SimTime};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn n(i: u64) -> NodeId {
    NodeId::new(i)
}

fn secs(s: f64) -> SimTime {
    SimTime::from_nanos((s * 1e9) as u64)
}

fn quiet_aodv() -> AodvConfig {
    AodvConfig {
        enable_hello: false,
        ..AodvConfig::default()
    }
}

/// Stationary nodes on the x axis, no batteries, no hellos.
fn line(xs: &[f64]) -> ScenarioBuilder {
    init_logging();
    ScenarioBuilder::new()
        .positions(xs.iter().map(|x| Vector2::new(*x, 0.0)).collect())
        .stationary()
        .without_energy()
        .aodv(quiet_aodv())
        .route_dumps(SimDuration::ZERO)
}

fn ping(from: u64, to: u64, count: u64) -> AppConfig {
    AppConfig::Ping {
        from,
        to,
        start: 0.0,
        stop: None,
        interval: 1.0,
        size: 56,
        count: Some(count),
        verbose: false,
    }
}

fn udp(from: u64, to: u64, max_packets: u64) -> AppConfig {
    AppConfig::UdpFlow {
        from,
        to,
        port: 9,
        start: 0.0,
        stop: None,
        interval: 1.0,
        size: 512,
        max_packets,
    }
}

// ── Single hop ────────────────────────────────────────────────────────

#[test]
fn test_neighbors_in_range_exchange_pings() {
    let mut scenario = line(&[0.0, 100.0])
        .app(ping(0, 1, 3))
        .stop_time(5.0)
        .build()
        .unwrap();
    scenario.run();

    let ping = scenario.runtime.app::<Ping>(n(0), 0).unwrap();
    let s = ping.stats();
    assert_eq!((s.sent, s.received, s.lost, s.failed), (3, 3, 0, 0));
    let rtt = ping.average_rtt().unwrap();
    assert!(rtt > SimDuration::ZERO && rtt < SimDuration::from_millis(10), "{}", rtt);

    let target = scenario.runtime.node(n(1)).unwrap();
    assert_eq!(target.echo_replies(), 3);
    assert!(scenario.runtime.channel().stats().delivered > 0);
}

#[test]
fn test_two_pings_on_one_node_keep_their_own_replies() {
    let mut scenario = line(&[0.0, 100.0, 0.0])
        .app(ping(0, 1, 3))
        .app(ping(0, 2, 3))
        .stop_time(6.0)
        .build()
        .unwrap();
    scenario.run();

    for index in 0..2 {
        let s = scenario.runtime.app_stats(n(0), index).unwrap();
        assert_eq!((s.sent, s.received, s.lost, s.failed), (3, 3, 0, 0), "ping #{}", index);
    }
    let first = scenario.runtime.app::<Ping>(n(0), 0).unwrap().port();
    let second = scenario.runtime.app::<Ping>(n(0), 1).unwrap().port();
    assert_ne!(first, second);
    assert_eq!(scenario.runtime.node(n(1)).unwrap().echo_replies(), 3);
    assert_eq!(scenario.runtime.node(n(2)).unwrap().echo_replies(), 3);
}

#[test]
fn test_out_of_range_destination_fails_with_no_route() {
    let mut scenario = line(&[0.0, 300.0])
        .app(ping(0, 1, 1))
        .stop_time(30.0)
        .build()
        .unwrap();
    let report = scenario.run();

    let s = scenario.runtime.app_stats(n(0), 0).unwrap();
    assert_eq!((s.sent, s.received, s.failed), (1, 0, 1));
    assert_eq!(report.drops.no_route, 1);
    assert_eq!(report.channel.delivered, 0);
    // The first request plus two retries, none heard.
    assert_eq!(report.routing.rreq_originated, 3);
    assert_eq!(report.channel.dropped_out_of_range, 3);

    let routing = scenario.runtime.routing(n(0)).unwrap();
    assert!(routing
        .routing_table()
        .get(n(1))
        .map_or(true, |e| e.state != RouteState::Valid));
}

// ── Multi hop ─────────────────────────────────────────────────────────

#[test]
fn test_three_hop_chain_delivers_end_to_end() {
    let mut scenario = line(&[0.0, 200.0, 400.0, 600.0])
        .app(udp(0, 3, 5))
        .stop_time(10.0)
        .build()
        .unwrap();

    scenario.run_until(secs(4.5));
    let entry = scenario
        .runtime
        .routing(n(0))
        .unwrap()
        .routing_table()
        .get(n(3))
        .cloned()
        .unwrap();
    assert_eq!(entry.next_hop, n(1));
    assert_eq!(entry.hop_count, 3);
    assert_eq!(entry.state, RouteState::Valid);

    let report = scenario.run();
    let server = scenario.runtime.app::<UdpServer>(n(3), 0).unwrap();
    assert_eq!(server.peers(), 1);
    let client = scenario.runtime.app_stats(n(0), 0).unwrap();
    let received = scenario.runtime.app_stats(n(3), 0).unwrap();
    assert_eq!((client.sent, client.failed), (5, 0));
    assert_eq!((received.received, received.lost), (5, 0));
    assert!(report.routing.data_forwarded >= 10, "{:?}", report.routing);
    assert!(scenario.runtime.app::<UdpClient>(n(0), 0).is_ok());
}

#[test]
fn test_dead_relay_breaks_route() {
    let mut scenario = line(&[0.0, 200.0, 400.0])
        .app(udp(0, 2, 0))
        .stop_time(40.0)
        .build()
        .unwrap();

    // The relay runs on 3 J drained at 0.3 W: empty at t = 10 s.
    let mut battery = EnergySource::new(3.0, 3.0).unwrap();
    battery.set_baseline_current(SimTime::ZERO, 0.1).unwrap();
    scenario.runtime.node_mut(n(1)).unwrap().energy = Some(battery);

    let report = scenario.run();
    let server = scenario.runtime.app_stats(n(2), 0).unwrap();
    let client = scenario.runtime.app_stats(n(0), 0).unwrap();
    assert!((9..=11).contains(&server.received), "{:?}", server);
    assert!(client.failed >= 1, "{:?}", client);
    assert!(report.channel.tx_failed >= 1);
    let now = scenario.sim.now();
    assert_eq!(scenario.runtime.remaining_energy(n(1), now), Ok(Some(0.0)));

    let routing = scenario.runtime.routing(n(0)).unwrap();
    assert_ne!(
        routing.routing_table().get(n(2)).map(|e| e.state),
        Some(RouteState::Valid)
    );
}

// ── Energy ────────────────────────────────────────────────────────────

#[test]
fn test_idle_drain_depletes_at_predicted_time() {
    init_logging();
    let radio = RadioEnergyModel {
        tx_current: 0.0,
        rx_current: 0.0,
        idle_current: 0.0174,
    };
    let mut scenario = ScenarioBuilder::new()
        .nodes(1)
        .stationary()
        .aodv(quiet_aodv())
        .energy(300.0)
        .voltage(3.3)
        .radio(radio)
        .route_dumps(SimDuration::ZERO)
        .trace(true)
        .stop_time(6000.0)
        .build()
        .unwrap();
    let report = scenario.run();

    let expected = 300.0 / (0.0174 * 3.3);
    let node = &report.nodes[0];
    let depleted_at = node.depleted_at.unwrap();
    assert!((depleted_at - expected).abs() < 1e-6, "{} vs {}", depleted_at, expected);
    assert_eq!(node.remaining_energy, Some(0.0));
    assert_eq!(report.depleted_nodes(), 1);

    let first = scenario
        .runtime
        .trace
        .iter()
        .find(|e| e.kind == TraceKind::EnergyDepletion)
        .unwrap();
    assert!((first.time.as_secs_f64() - expected).abs() < 1e-6);
}

#[test]
fn test_exhausted_sender_reports_power_exhausted() {
    let radio = RadioEnergyModel {
        tx_current: 0.0,
        rx_current: 0.0,
        idle_current: 1.0,
    };
    // 30 J at 3 W lasts 10 s.
    let mut scenario = line(&[0.0, 100.0])
        .energy(30.0)
        .voltage(3.0)
        .radio(radio)
        .app(ping(0, 1, 15))
        .stop_time(15.0)
        .build()
        .unwrap();
    let report = scenario.run();

    let s = scenario.runtime.app_stats(n(0), 0).unwrap();
    assert_eq!(s.sent, 15);
    assert!(s.received >= 9, "{:?}", s);
    assert!(s.failed >= 4, "{:?}", s);
    assert_eq!(s.sent, s.received + s.failed + s.lost);
    assert!(report.drops.power_exhausted >= 4);
    assert_eq!(report.depleted_nodes(), 2);
}

#[test]
fn test_depletion_fails_packets_waiting_for_a_route() {
    // 1 J against the default 0.273 A idle draw at 3 V lasts about 1.22 s,
    // well before the first discovery times out.
    let mut scenario = line(&[0.0, 300.0])
        .energy(1.0)
        .voltage(3.0)
        .app(ping(0, 1, 2))
        .stop_time(60.0)
        .build()
        .unwrap();
    let report = scenario.run();

    let s = scenario.runtime.app_stats(n(0), 0).unwrap();
    assert_eq!(s.sent, 2);
    assert_eq!(s.failed, s.sent, "{:?}", s);
    assert_eq!(s.lost, 0);
    assert_eq!(report.drops.power_exhausted, 2);
    assert_eq!(report.drops.no_route, 0);
    let routing = scenario.runtime.node(n(0)).unwrap().routing().unwrap();
    assert_eq!(routing.queued_packets(), 0);
}

// ── Mobility ──────────────────────────────────────────────────────────

#[test]
fn test_zero_velocity_stops_node_for_good() {
    init_logging();
    let mut scenario = ScenarioBuilder::new()
        .positions(vec![Vector2::ZERO])
        .constant_velocity(Vector2::new(1.0, 0.0))
        .without_energy()
        .route_dumps(SimDuration::ZERO)
        .set_velocity(0, 5.0, Vector2::ZERO)
        .set_velocity(0, 8.0, Vector2::new(1.0, 0.0))
        .stop_time(10.0)
        .build()
        .unwrap();
    scenario.run();
    let p = scenario.runtime.position(n(0), secs(10.0)).unwrap();
    assert_eq!(p, Vector2::new(5.0, 0.0));
}

#[test]
fn test_random_waypoint_nodes_stay_in_field() {
    init_logging();
    let mut scenario = ScenarioBuilder::new()
        .nodes(8)
        .random_rectangle(300.0, 600.0)
        .random_waypoint(0.0, 20.0, SimDuration::ZERO)
        .without_energy()
        .route_dumps(SimDuration::ZERO)
        .stop_time(60.0)
        .build()
        .unwrap();
    let field = Rect::new(0.0, 300.0, 0.0, 600.0);
    for step in 1..=6 {
        let t = secs(step as f64 * 10.0);
        scenario.run_until(t);
        for id in scenario.runtime.node_ids() {
            let p = scenario.runtime.position(id, t).unwrap();
            assert!(field.contains(p), "{} at {} left the field", id, p);
        }
    }
}

// ── Determinism ───────────────────────────────────────────────────────

fn mobile_run(seed: u64) -> (Vec<u64>, u64) {
    let mut scenario: Scenario = ScenarioBuilder::new()
        .nodes(10)
        .seed(seed)
        .random_rectangle(300.0, 600.0)
        .ping(0, 9)
        .udp_flow(3, 7)
        .trace(true)
        .stop_time(20.0)
        .build()
        .unwrap();
    let report = scenario.run();
    let digests = scenario.runtime.trace.iter().map(|e| e.digest()).collect();
    (digests, report.state_hash)
}

#[test]
fn test_same_seed_same_trace() {
    init_logging();
    let (trace_a, hash_a) = mobile_run(99);
    let (trace_b, hash_b) = mobile_run(99);
    assert!(!trace_a.is_empty());
    assert_eq!(trace_a, trace_b);
    assert_eq!(hash_a, hash_b);

    let (trace_c, _) = mobile_run(100);
    assert_ne!(trace_a, trace_c);
}

// ── Runtime API ───────────────────────────────────────────────────────

#[test]
fn test_register_rejects_duplicate_ids() {
    let mut rt = NodeRuntime::new(Channel::new(ChannelConfig::default(), 1));
    rt.register(Node::new(n(0))).unwrap();
    assert_eq!(
        rt.register(Node::new(n(0))),
        Err(SimError::NodeAlreadyRegistered(n(0)))
    );
    assert_eq!(rt.node_count(), 1);
}

#[test]
fn test_app_lookup_errors() {
    let mut rt = NodeRuntime::new(Channel::new(ChannelConfig::default(), 1));
    rt.register(Node::new(n(0))).unwrap();
    let index = rt.install_app(n(0), Box::new(Ping::new(n(1)))).unwrap();

    assert!(rt.app::<Ping>(n(0), index).is_ok());
    assert!(matches!(
        rt.app::<UdpServer>(n(0), index),
        Err(SimError::AppTypeMismatch { index: 0, .. })
    ));
    assert!(matches!(
        rt.app::<Ping>(n(0), 3),
        Err(SimError::InvalidArgument(_))
    ));
    assert_eq!(
        rt.app_stats(n(7), 0),
        Err(SimError::NodeNotFound(n(7)))
    );
    assert_eq!(
        rt.install_app(n(7), Box::new(Ping::new(n(0)))).unwrap_err(),
        SimError::NodeNotFound(n(7))
    );
    assert!(matches!(
        rt.install_app(n(0), Box::new(Ping::new(n(2)))),
        Err(SimError::InvalidArgument(_))
    ));
    assert_eq!(
        rt.install_app(n(0), Box::new(Ping::new(n(2)).local_port(8))).unwrap(),
        1
    );
}

#[test]
fn test_node_without_routing_only_reaches_itself() {
    init_logging();
    let mut rt = NodeRuntime::new(Channel::new(ChannelConfig::default(), 1));
    rt.register(Node::new(n(0))).unwrap();
    let index = rt.install_app(n(0), Box::new(Ping::new(n(5)).count(1))).unwrap();

    let mut sim = crate::simulation::Simulation::new();
    rt.schedule_app(&mut sim, n(0), index, SimTime::ZERO, None).unwrap();
    rt.start(&mut sim);
    sim.run_until(secs(2.0), &mut rt);

    let s = rt.app_stats(n(0), index).unwrap();
    assert_eq!((s.sent, s.failed), (1, 1));
    assert_eq!(rt.drops().no_route, 1);
}
