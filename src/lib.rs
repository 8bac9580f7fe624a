//! # manet — Deterministic MANET Simulator
//!
//! A discrete-event simulator for mobile ad-hoc wireless networks: nodes
//! move, talk over a shared range-limited channel, find each other with
//! AODV-style reactive routing and run on finite batteries. No async, no
//! threads, no wall-clock time; every run is a pure function of its
//! configuration and seed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          Scenario            │ ← dsl::ScenarioBuilder / config files
//! │  ┌────────────────────────┐  │
//! │  │      NodeRuntime       │  │ ← dispatches events to nodes
//! │  │  mobility · energy     │  │
//! │  │  AODV · apps · devices │  │
//! │  │  ┌──────────────────┐  │  │
//! │  │  │     Channel      │  │  │ ← range cutoff, loss, delay
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! │  ┌────────────────────────┐  │
//! │  │      Simulation        │  │ ← execution loop
//! │  │  ┌──────────────────┐  │  │
//! │  │  │    Scheduler     │  │  │ ← (time, id)-ordered, cancellable
//! │  │  └──────────────────┘  │  │
//! │  └────────────────────────┘  │
//! └──────────────────────────────┘
//! ```

pub mod aodv;
pub mod app;
pub mod channel;
pub mod config;
pub mod dsl;
pub mod energy;
pub mod error;
pub mod event;
pub mod geometry;
pub mod mobility;
pub mod node;
pub mod packet;
pub mod random;
pub mod report;
pub mod scheduler;
pub mod simulation;
pub mod time;

// Re-exports for convenience.
pub use aodv::{AodvConfig, AodvRouting, RouteEntry, RouteState};
pub use app::{AppStats, Application, Ping, UdpClient, UdpServer};
pub use channel::{Channel, ChannelConfig, LossModel};
pub use config::ScenarioConfig;
pub use dsl::{Scenario, ScenarioBuilder};
pub use energy::{EnergySource, RadioEnergyModel};
pub use error::{SimError, SimResult};
pub use event::{Event, EventId, EventType};
pub use geometry::{Rect, Vector2};
pub use mobility::MobilityModel;
pub use node::{Device, Node, NodeId, NodeRuntime};
pub use packet::{MacAddress, Packet};
pub use report::ScenarioReport;
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, Simulation, SimulationContext};
pub use time::{SimDuration, SimTime};
