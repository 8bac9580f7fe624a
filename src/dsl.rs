//! Fluent builder for scenario setup.
//!
//! Wraps a [`ScenarioConfig`] with an ergonomic API and turns it into a
//! ready-to-run [`Scenario`]: nodes placed and registered, routing and
//! energy installed, applications scheduled. Every random draw comes from
//! the scenario seed, so two builds of the same configuration run
//! identically.

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use rand::Rng;

use crate::aodv::{AodvConfig, AodvRouting};
use crate::app::udp::CLIENT_PORT;
use crate::app::{Ping, UdpClient, UdpServer};
use crate::channel::{Channel, ChannelConfig};
use crate::config::{AppConfig, EnergyRange, LayoutConfig, MobilityConfig, ScenarioConfig};
use crate::energy::{EnergySource, RadioEnergyModel};
use crate::error::{SimError, SimResult};
use crate::event::EventType;
use crate::geometry::{Rect, Vector2};
use crate::mobility::{
    GridLayout, GridPositionAllocator, MobilityModel, PositionAllocator,
    RandomRectanglePositionAllocator,
};
use crate::node::{Device, Node, NodeId, NodeRuntime};
use crate::random::{stream_rng, Stream};
use crate::report::ScenarioReport;
use crate::simulation::Simulation;
use crate::time::{SimDuration, SimTime};

// ── ScenarioBuilder ───────────────────────────────────────────────────

/// Fluent builder for a [`Scenario`].
///
/// Starts from the reference configuration without any applications.
///
/// # Example
/// ```rust
/// use manet::dsl::ScenarioBuilder;
///
/// let mut scenario = ScenarioBuilder::new()
///     .nodes(4)
///     .grid(100.0, 4)
///     .stationary()
///     .ping(0, 3)
///     .stop_time(10.0)
///     .build()
///     .unwrap();
/// let report = scenario.run();
/// assert!(report.apps[0].stats.received > 0);
/// ```
pub struct ScenarioBuilder {
    config: ScenarioConfig,
    aodv: Option<AodvConfig>,
    positions: Option<Vec<Vector2>>,
    events: Vec<(f64, EventType)>,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        ScenarioBuilder::from_config(ScenarioConfig {
            apps: Vec::new(),
            ..ScenarioConfig::default()
        })
    }

    /// Start from a loaded scenario file.
    pub fn from_config(config: ScenarioConfig) -> Self {
        ScenarioBuilder {
            config,
            aodv: None,
            positions: None,
            events: Vec::new(),
        }
    }

    // ── Topology ──────────────────────────────────────────────

    pub fn nodes(mut self, count: u32) -> Self {
        self.config.nodes = count;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Row-first grid, `step` metres apart, `width` nodes per row.
    pub fn grid(mut self, step: f64, width: u32) -> Self {
        self.config.layout = LayoutConfig::Grid {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: step,
            delta_y: step,
            grid_width: width,
            layout: GridLayout::RowFirst,
        };
        self
    }

    pub fn random_rectangle(mut self, width: f64, height: f64) -> Self {
        self.config.layout = LayoutConfig::RandomRectangle { width, height };
        self
    }

    /// Place nodes at explicit positions; also sets the node count.
    pub fn positions(mut self, positions: Vec<Vector2>) -> Self {
        self.config.nodes = positions.len() as u32;
        self.positions = Some(positions);
        self
    }

    // ── Mobility ──────────────────────────────────────────────

    pub fn stationary(mut self) -> Self {
        self.config.mobility = MobilityConfig::Stationary;
        self
    }

    pub fn constant_velocity(mut self, velocity: Vector2) -> Self {
        self.config.mobility = MobilityConfig::ConstantVelocity { velocity };
        self
    }

    pub fn random_waypoint(mut self, min_speed: f64, max_speed: f64, pause: SimDuration) -> Self {
        self.config.mobility = MobilityConfig::RandomWaypoint {
            min_speed,
            max_speed,
            pause,
        };
        self
    }

    /// Change a node's velocity at `at` seconds (constant-velocity nodes).
    pub fn set_velocity(mut self, node: u64, at: f64, velocity: Vector2) -> Self {
        self.events.push((
            at,
            EventType::SetVelocity {
                node: NodeId::new(node),
                velocity,
            },
        ));
        self
    }

    // ── Channel, routing, energy ──────────────────────────────

    pub fn channel(mut self, config: ChannelConfig) -> Self {
        self.config.channel = config;
        self
    }

    pub fn range(mut self, metres: f64) -> Self {
        self.config.channel.max_range = metres;
        self
    }

    /// Use this routing configuration as-is, ignoring file overrides.
    pub fn aodv(mut self, config: AodvConfig) -> Self {
        self.aodv = Some(config);
        self
    }

    pub fn energy(mut self, joules: f64) -> Self {
        self.config.energy.enabled = true;
        self.config.energy.initial_joules = joules;
        self
    }

    pub fn voltage(mut self, volts: f64) -> Self {
        self.config.energy.voltage = volts;
        self
    }

    pub fn radio(mut self, radio: RadioEnergyModel) -> Self {
        self.config.energy.radio = radio;
        self
    }

    /// Draw each node's initial energy from `[min, max]` joules.
    pub fn random_initial_energy(mut self, min: f64, max: f64) -> Self {
        self.config.energy.random_initial = Some(EnergyRange { min, max });
        self
    }

    pub fn without_energy(mut self) -> Self {
        self.config.energy.enabled = false;
        self
    }

    // ── Applications ──────────────────────────────────────────

    pub fn app(mut self, app: AppConfig) -> Self {
        self.config.apps.push(app);
        self
    }

    /// Ping once a second from `from` to `to` for the whole run.
    pub fn ping(self, from: u64, to: u64) -> Self {
        self.app(AppConfig::Ping {
            from,
            to,
            start: 0.0,
            stop: None,
            interval: 1.0,
            size: 56,
            count: None,
            verbose: false,
        })
    }

    /// One 512-byte datagram a second from `from` to port 9 on `to`.
    pub fn udp_flow(self, from: u64, to: u64) -> Self {
        self.app(AppConfig::UdpFlow {
            from,
            to,
            port: 9,
            start: 0.0,
            stop: None,
            interval: 1.0,
            size: 512,
            max_packets: 0,
        })
    }

    // ── Run control ───────────────────────────────────────────

    pub fn stop_time(mut self, secs: f64) -> Self {
        // Invalid values fall through to validation.
        self.config.stop_time = SimDuration::from_secs_f64(secs).unwrap_or(SimDuration::ZERO);
        self
    }

    /// Snapshot all routing tables every `interval`; zero disables.
    pub fn route_dumps(mut self, interval: SimDuration) -> Self {
        self.config.route_dump_interval = interval;
        self
    }

    pub fn trace(mut self, on: bool) -> Self {
        self.config.trace = on;
        self
    }

    /// Schedule a raw event at `at` seconds.
    pub fn event(mut self, at: f64, event: EventType) -> Self {
        self.events.push((at, event));
        self
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    // ── Build ─────────────────────────────────────────────────

    pub fn build(self) -> SimResult<Scenario> {
        let ScenarioBuilder {
            config,
            aodv,
            positions,
            events,
        } = self;
        config.validate()?;
        let aodv = match aodv {
            Some(c) => c,
            None => config.aodv.apply(AodvConfig::default())?,
        };
        let seed = config.seed;
        info!(
            "building scenario: {} nodes, seed {}, {} applications",
            config.nodes,
            seed,
            config.apps.len()
        );

        let positions = match positions {
            Some(p) if p.len() == config.nodes as usize => p,
            Some(p) => {
                return Err(SimError::Config(format!(
                    "{} positions given for {} nodes",
                    p.len(),
                    config.nodes
                )))
            }
            None => {
                let mut allocator = position_allocator(&config.layout, config.field(), seed);
                (0..config.nodes).map(|_| allocator.next_position()).collect()
            }
        };

        let channel = Channel::new(config.channel.clone(), seed);
        let mut runtime = NodeRuntime::new(channel).with_trace(config.trace);
        for (index, position) in positions.into_iter().enumerate() {
            let index = index as u64;
            let id = NodeId::new(index);
            let mobility = match (config.mobility, config.waypoint_params()) {
                (_, Some(params)) => MobilityModel::random_waypoint(
                    position,
                    params,
                    stream_rng(seed, Stream::Mobility, index),
                )?,
                (MobilityConfig::ConstantVelocity { velocity }, None) => {
                    MobilityModel::constant_velocity(position, velocity)
                }
                _ => MobilityModel::stationary(position),
            };
            let routing = AodvRouting::new(id, aodv.clone(), stream_rng(seed, Stream::Routing, index));
            let device = Device::new(runtime.allocate_mac()).with_radio(config.energy.radio);
            let mut node = Node::new(id)
                .with_mobility(mobility)
                .with_routing(routing)
                .with_device(device);
            if config.energy.enabled {
                let joules = match config.energy.random_initial {
                    Some(EnergyRange { min, max }) => {
                        stream_rng(seed, Stream::Energy, index).gen_range(min..=max)
                    }
                    None => config.energy.initial_joules,
                };
                node = node.with_energy(EnergySource::new(joules, config.energy.voltage)?);
            }
            runtime.register(node)?;
        }

        let mut sim = Simulation::new();
        let mut installer = AppInstaller::default();
        for app in &config.apps {
            installer.install(&mut sim, &mut runtime, app)?;
        }
        runtime.start(&mut sim);

        if !config.route_dump_interval.is_zero() {
            let interval = config.route_dump_interval;
            sim.schedule(interval, EventType::RouteDump { interval });
        }
        for (at, event) in events {
            sim.schedule_at(SimTime::from_secs_f64(at)?, event)?;
        }

        Ok(Scenario {
            sim,
            runtime,
            seed,
            stop: SimTime::from_nanos(config.stop_time.as_nanos()),
        })
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn position_allocator(layout: &LayoutConfig, field: Rect, seed: u64) -> Box<dyn PositionAllocator> {
    match *layout {
        LayoutConfig::RandomRectangle { .. } => Box::new(RandomRectanglePositionAllocator::new(
            field,
            stream_rng(seed, Stream::Placement, 0),
        )),
        LayoutConfig::Grid {
            min_x,
            min_y,
            delta_x,
            delta_y,
            grid_width,
            layout,
        } => Box::new(GridPositionAllocator::new(
            min_x, min_y, delta_x, delta_y, grid_width, layout,
        )),
    }
}

/// Installs configured applications, sharing one server per
/// `(node, port)` and giving each client on a node its own port.
#[derive(Default)]
struct AppInstaller {
    servers: BTreeSet<(NodeId, u16)>,
    client_ports: BTreeMap<NodeId, u16>,
}

impl AppInstaller {
    fn install(
        &mut self,
        sim: &mut Simulation,
        runtime: &mut NodeRuntime,
        app: &AppConfig,
    ) -> SimResult<()> {
        match *app {
            AppConfig::Ping {
                from,
                to,
                start,
                stop,
                interval,
                size,
                count,
                verbose,
            } => {
                let node = NodeId::new(from);
                let local = self.client_ports.entry(node).or_insert(CLIENT_PORT);
                let mut ping = Ping::new(NodeId::new(to))
                    .interval(SimDuration::from_secs_f64(interval)?)
                    .packet_size(size)
                    .verbose(verbose)
                    .local_port(*local);
                *local = local.wrapping_add(1);
                if let Some(n) = count {
                    ping = ping.count(n);
                }
                let index = runtime.install_app(node, Box::new(ping))?;
                runtime.schedule_app(sim, node, index, at(start)?, stop.map(at).transpose()?)
            }
            AppConfig::UdpFlow {
                from,
                to,
                port,
                start,
                stop,
                interval,
                size,
                max_packets,
            } => {
                let server = NodeId::new(to);
                if self.servers.insert((server, port)) {
                    let index = runtime.install_app(server, Box::new(UdpServer::new(port)))?;
                    runtime.schedule_app(sim, server, index, SimTime::ZERO, None)?;
                }
                let node = NodeId::new(from);
                let local = self.client_ports.entry(node).or_insert(CLIENT_PORT);
                let client = UdpClient::new(server, port)
                    .interval(SimDuration::from_secs_f64(interval)?)
                    .packet_size(size)
                    .max_packets(max_packets)
                    .local_port(*local);
                *local = local.wrapping_add(1);
                let index = runtime.install_app(node, Box::new(client))?;
                runtime.schedule_app(sim, node, index, at(start)?, stop.map(at).transpose()?)
            }
        }
    }
}

fn at(secs: f64) -> SimResult<SimTime> {
    SimTime::from_secs_f64(secs)
}

// ── Scenario ──────────────────────────────────────────────────────────

/// A built scenario: the simulation plus the nodes it drives.
pub struct Scenario {
    pub sim: Simulation,
    pub runtime: NodeRuntime,
    seed: u64,
    stop: SimTime,
}

impl Scenario {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn stop_time(&self) -> SimTime {
        self.stop
    }

    /// Run to the configured stop time and report.
    pub fn run(&mut self) -> ScenarioReport {
        let processed = self.run_until(self.stop);
        info!("scenario finished at {} after {} events", self.sim.now(), processed);
        self.report()
    }

    /// Run every event before `stop`. Returns the number processed.
    pub fn run_until(&mut self, stop: SimTime) -> u64 {
        self.sim.run_until(stop, &mut self.runtime)
    }

    pub fn report(&mut self) -> ScenarioReport {
        ScenarioReport::collect(self.seed, &self.sim, &mut self.runtime)
    }

    /// All routing-table dumps taken so far, as text.
    pub fn render_route_dumps(&self) -> String {
        self.runtime
            .route_dumps()
            .iter()
            .map(|s| s.render())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
