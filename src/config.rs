//! Scenario files.
//!
//! A [`ScenarioConfig`] is read from TOML. Every field has a default, so an
//! empty file describes the reference run: 100 nodes scattered over a
//! 300 × 1500 m field moving by random waypoint at up to 20 m/s, with node 0
//! pinging node 91 for 240 s on 300 J batteries.
//!
//! ```toml
//! nodes = 25
//! stop_time = 60.0
//!
//! [layout]
//! kind = "grid"
//! delta_x = 100.0
//! grid_width = 5
//!
//! [mobility]
//! kind = "stationary"
//!
//! [[apps]]
//! kind = "udp_flow"
//! from = 0
//! to = 24
//! ```

use serde::{Deserialize, Serialize};

use crate::aodv::AodvConfig;
use crate::channel::{secs, ChannelConfig};
use crate::energy::{RadioEnergyModel, DEFAULT_VOLTAGE};
use crate::error::{SimError, SimResult};
use crate::geometry::{Rect, Vector2};
use crate::mobility::{GridLayout, WaypointParams};
use crate::time::SimDuration;

/// Everything needed to build and run one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub nodes: u32,
    pub seed: u64,
    #[serde(with = "secs")]
    pub stop_time: SimDuration,
    /// Interval between routing-table dumps. Zero disables them.
    #[serde(with = "secs")]
    pub route_dump_interval: SimDuration,
    /// Keep the per-event dispatch trace.
    pub trace: bool,
    pub layout: LayoutConfig,
    pub mobility: MobilityConfig,
    pub channel: ChannelConfig,
    pub energy: EnergyConfig,
    pub aodv: AodvOverrides,
    pub apps: Vec<AppConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            nodes: 100,
            seed: 12345,
            stop_time: SimDuration::from_secs(240),
            route_dump_interval: SimDuration::from_secs(5),
            trace: false,
            layout: LayoutConfig::default(),
            mobility: MobilityConfig::default(),
            channel: ChannelConfig::default(),
            energy: EnergyConfig::default(),
            aodv: AodvOverrides::default(),
            apps: vec![AppConfig::Ping {
                from: 0,
                to: 91,
                start: 0.0,
                stop: None,
                interval: 1.0,
                size: 56,
                count: None,
                verbose: false,
            }],
        }
    }
}

impl ScenarioConfig {
    /// Parse and validate a TOML scenario.
    pub fn from_toml(text: &str) -> SimResult<Self> {
        let config: ScenarioConfig =
            toml::from_str(text).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.nodes == 0 {
            return Err(SimError::Config("a scenario needs at least one node".into()));
        }
        if self.stop_time.is_zero() {
            return Err(SimError::Config("stop_time must be positive".into()));
        }
        self.layout.validate()?;
        if let Some(params) = self.waypoint_params() {
            params.validate().map_err(config_error)?;
        }
        self.channel.validate()?;
        self.energy.validate()?;
        self.aodv.apply(AodvConfig::default())?;
        for app in &self.apps {
            app.validate(self.nodes)?;
        }
        Ok(())
    }

    /// The area nodes are placed in and random waypoints are drawn from.
    pub fn field(&self) -> Rect {
        self.layout.field(self.nodes)
    }

    /// Random-waypoint parameters, if that is the configured model.
    pub fn waypoint_params(&self) -> Option<WaypointParams> {
        match self.mobility {
            MobilityConfig::RandomWaypoint {
                min_speed,
                max_speed,
                pause,
            } => Some(WaypointParams {
                bounds: self.field(),
                min_speed,
                max_speed,
                pause,
            }),
            _ => None,
        }
    }
}

fn config_error(e: SimError) -> SimError {
    match e {
        SimError::InvalidArgument(msg) => SimError::Config(msg),
        other => other,
    }
}

// ── Layout ────────────────────────────────────────────────────────────

/// Initial node placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutConfig {
    /// Uniformly random inside `[0, width] × [0, height]`.
    RandomRectangle {
        #[serde(default = "default_width")]
        width: f64,
        #[serde(default = "default_height")]
        height: f64,
    },
    Grid {
        #[serde(default)]
        min_x: f64,
        #[serde(default)]
        min_y: f64,
        #[serde(default = "default_step")]
        delta_x: f64,
        #[serde(default = "default_step")]
        delta_y: f64,
        /// Nodes per row (or per column for `column_first`).
        #[serde(default = "default_grid_width")]
        grid_width: u32,
        #[serde(default)]
        layout: GridLayout,
    },
}

fn default_width() -> f64 {
    300.0
}

fn default_height() -> f64 {
    1500.0
}

fn default_step() -> f64 {
    100.0
}

fn default_grid_width() -> u32 {
    10
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig::RandomRectangle {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl LayoutConfig {
    fn validate(&self) -> SimResult<()> {
        let ok = match *self {
            LayoutConfig::RandomRectangle { width, height } => {
                width.is_finite() && height.is_finite() && width >= 0.0 && height >= 0.0
            }
            LayoutConfig::Grid {
                min_x,
                min_y,
                delta_x,
                delta_y,
                grid_width,
                ..
            } => {
                [min_x, min_y, delta_x, delta_y].iter().all(|v| v.is_finite()) && grid_width > 0
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::Config(format!("invalid layout {:?}", self)))
        }
    }

    /// Bounding rectangle of the layout for `nodes` nodes.
    pub fn field(&self, nodes: u32) -> Rect {
        match *self {
            LayoutConfig::RandomRectangle { width, height } => Rect::new(0.0, width, 0.0, height),
            LayoutConfig::Grid {
                min_x,
                min_y,
                delta_x,
                delta_y,
                grid_width,
                layout,
            } => {
                let width = grid_width.max(1);
                let along = width.min(nodes.max(1)) - 1;
                let across = nodes.max(1).div_ceil(width) - 1;
                let (cols, rows) = match layout {
                    GridLayout::RowFirst => (along, across),
                    GridLayout::ColumnFirst => (across, along),
                };
                Rect::new(
                    min_x,
                    min_x + delta_x * cols as f64,
                    min_y,
                    min_y + delta_y * rows as f64,
                )
            }
        }
    }
}

// ── Mobility ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MobilityConfig {
    Stationary,
    /// Every node starts with the same velocity.
    ConstantVelocity { velocity: Vector2 },
    /// Waypoints are drawn from the layout's field.
    RandomWaypoint {
        #[serde(default)]
        min_speed: f64,
        #[serde(default = "default_max_speed")]
        max_speed: f64,
        #[serde(default, with = "secs")]
        pause: SimDuration,
    },
}

fn default_max_speed() -> f64 {
    20.0
}

impl Default for MobilityConfig {
    fn default() -> Self {
        MobilityConfig::RandomWaypoint {
            min_speed: 0.0,
            max_speed: default_max_speed(),
            pause: SimDuration::ZERO,
        }
    }
}

// ── Energy ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub enabled: bool,
    pub initial_joules: f64,
    pub voltage: f64,
    /// Draw each node's initial energy uniformly from this range instead
    /// of using `initial_joules`.
    pub random_initial: Option<EnergyRange>,
    pub radio: RadioEnergyModel,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        EnergyConfig {
            enabled: true,
            initial_joules: 300.0,
            voltage: DEFAULT_VOLTAGE,
            random_initial: None,
            radio: RadioEnergyModel::default(),
        }
    }
}

impl EnergyConfig {
    fn validate(&self) -> SimResult<()> {
        if !(self.initial_joules.is_finite() && self.initial_joules > 0.0) {
            return Err(SimError::Config(format!(
                "initial energy must be positive, got {} J",
                self.initial_joules
            )));
        }
        if !(self.voltage.is_finite() && self.voltage > 0.0) {
            return Err(SimError::Config(format!(
                "supply voltage must be positive, got {} V",
                self.voltage
            )));
        }
        if let Some(EnergyRange { min, max }) = self.random_initial {
            if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max) {
                return Err(SimError::Config(format!(
                    "initial energy range [{}, {}] is invalid",
                    min, max
                )));
            }
        }
        self.radio.validate().map_err(config_error)
    }
}

// ── AODV ──────────────────────────────────────────────────────────────

/// Overrides applied on top of [`AodvConfig::default`]. Durations are in
/// seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AodvOverrides {
    pub hello_interval: Option<f64>,
    pub allowed_hello_loss: Option<u32>,
    pub rreq_retries: Option<u32>,
    pub node_traversal_time: Option<f64>,
    pub active_route_timeout: Option<f64>,
    pub max_queue_len: Option<usize>,
    pub max_queue_time: Option<f64>,
    pub gratuitous_reply: Option<bool>,
    pub destination_only: Option<bool>,
    pub enable_hello: Option<bool>,
    pub enable_local_repair: Option<bool>,
    pub min_forward_energy: Option<f64>,
}

impl AodvOverrides {
    pub fn apply(&self, mut config: AodvConfig) -> SimResult<AodvConfig> {
        let duration = |name: &str, v: f64| {
            SimDuration::from_secs_f64(v)
                .map_err(|e| SimError::Config(format!("aodv.{}: {}", name, e)))
        };
        if let Some(v) = self.hello_interval {
            config.hello_interval = duration("hello_interval", v)?;
        }
        if let Some(v) = self.allowed_hello_loss {
            config.allowed_hello_loss = v;
        }
        if let Some(v) = self.rreq_retries {
            config.rreq_retries = v;
        }
        if let Some(v) = self.node_traversal_time {
            config.node_traversal_time = duration("node_traversal_time", v)?;
        }
        if let Some(v) = self.active_route_timeout {
            config.active_route_timeout = duration("active_route_timeout", v)?;
        }
        if let Some(v) = self.max_queue_len {
            config.max_queue_len = v;
        }
        if let Some(v) = self.max_queue_time {
            config.max_queue_time = duration("max_queue_time", v)?;
        }
        if let Some(v) = self.gratuitous_reply {
            config.gratuitous_reply = v;
        }
        if let Some(v) = self.destination_only {
            config.destination_only = v;
        }
        if let Some(v) = self.enable_hello {
            config.enable_hello = v;
        }
        if let Some(v) = self.enable_local_repair {
            config.enable_local_repair = v;
        }
        if let Some(v) = self.min_forward_energy {
            if !(0.0..=1.0).contains(&v) {
                return Err(SimError::Config(format!(
                    "aodv.min_forward_energy must be a fraction, got {}",
                    v
                )));
            }
            config.min_forward_energy = Some(v);
        }
        if config.hello_interval.is_zero() && config.enable_hello {
            return Err(SimError::Config("aodv.hello_interval must be positive".into()));
        }
        Ok(config)
    }
}

// ── Applications ──────────────────────────────────────────────────────

/// One traffic generator. Times are in seconds; a missing `stop` runs the
/// application until the end of the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppConfig {
    Ping {
        from: u64,
        to: u64,
        #[serde(default)]
        start: f64,
        stop: Option<f64>,
        #[serde(default = "default_interval")]
        interval: f64,
        #[serde(default = "default_ping_size")]
        size: u32,
        count: Option<u64>,
        #[serde(default)]
        verbose: bool,
    },
    /// A `UdpClient` on `from` sending to a `UdpServer` on `to`.
    UdpFlow {
        from: u64,
        to: u64,
        #[serde(default = "default_udp_port")]
        port: u16,
        #[serde(default)]
        start: f64,
        stop: Option<f64>,
        #[serde(default = "default_interval")]
        interval: f64,
        #[serde(default = "default_udp_size")]
        size: u32,
        /// `0` sends until stopped.
        #[serde(default)]
        max_packets: u64,
    },
}

fn default_interval() -> f64 {
    1.0
}

fn default_ping_size() -> u32 {
    56
}

fn default_udp_port() -> u16 {
    9
}

fn default_udp_size() -> u32 {
    1024
}

impl AppConfig {
    fn validate(&self, nodes: u32) -> SimResult<()> {
        let (from, to, start, stop, interval) = match *self {
            AppConfig::Ping {
                from,
                to,
                start,
                stop,
                interval,
                ..
            }
            | AppConfig::UdpFlow {
                from,
                to,
                start,
                stop,
                interval,
                ..
            } => (from, to, start, stop, interval),
        };
        for id in [from, to] {
            if id >= u64::from(nodes) {
                return Err(SimError::Config(format!(
                    "application endpoint {} is outside the {} configured nodes",
                    id, nodes
                )));
            }
        }
        if !(start.is_finite() && start >= 0.0) {
            return Err(SimError::Config(format!("application start {} is invalid", start)));
        }
        if stop.is_some_and(|s| !s.is_finite() || s < start) {
            return Err(SimError::Config(format!(
                "application stops before it starts ({:?} < {})",
                stop, start
            )));
        }
        if !(interval.is_finite() && interval > 0.0) {
            return Err(SimError::Config(format!(
                "application interval must be positive, got {}",
                interval
            )));
        }
        Ok(())
    }
}
