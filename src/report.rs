//! End-of-run summary of a scenario, serialisable as JSON.

use serde::Serialize;

use crate::aodv::{RoutingStats, RouteState};
use crate::app::AppStats;
use crate::channel::ChannelStats;
use crate::geometry::Vector2;
use crate::node::{DeviceStats, DropStats, NodeId, NodeRuntime};
use crate::simulation::{EventHandler, Simulation};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppReport {
    pub node: NodeId,
    pub index: usize,
    pub name: &'static str,
    #[serde(flatten)]
    pub stats: AppStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub node: NodeId,
    pub position: Vector2,
    /// Joules left, `None` for nodes without an energy source.
    pub remaining_energy: Option<f64>,
    pub consumed_energy: Option<f64>,
    /// Seconds.
    pub depleted_at: Option<f64>,
    pub routes: usize,
    pub valid_routes: usize,
    pub echo_replies: u64,
    pub device: DeviceStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub seed: u64,
    /// Seconds.
    pub end_time: f64,
    pub events_processed: u64,
    pub state_hash: u64,
    pub apps: Vec<AppReport>,
    pub nodes: Vec<NodeReport>,
    pub channel: ChannelStats,
    /// Control-plane counters summed over all nodes.
    pub routing: RoutingStats,
    pub drops: DropStats,
}

impl ScenarioReport {
    /// Read every counter out of a finished (or paused) run.
    pub fn collect(seed: u64, sim: &Simulation, runtime: &mut NodeRuntime) -> Self {
        let now = sim.now();
        let mut nodes = Vec::with_capacity(runtime.node_count());
        let mut routing = RoutingStats::default();
        for id in runtime.node_ids() {
            let position = runtime.position(id, now).unwrap_or(Vector2::ZERO);
            let Some(node) = runtime.node(id) else {
                continue;
            };
            let energy = node.energy();
            let (routes, valid_routes) = node.routing().map_or((0, 0), |r| {
                let table = r.routing_table();
                let valid = table.iter().filter(|e| e.state == RouteState::Valid).count();
                (table.len(), valid)
            });
            if let Some(r) = node.routing() {
                add_stats(&mut routing, &r.stats());
            }
            nodes.push(NodeReport {
                node: id,
                position,
                remaining_energy: energy.map(|e| e.remaining_at(now)),
                consumed_energy: energy.map(|e| e.initial_energy() - e.remaining_at(now)),
                depleted_at: energy.and_then(|e| e.depleted_at()).map(|t| t.as_secs_f64()),
                routes,
                valid_routes,
                echo_replies: node.echo_replies(),
                device: node.devices().first().map(|d| d.stats()).unwrap_or_default(),
            });
        }

        let apps = runtime
            .app_summaries()
            .into_iter()
            .map(|(node, index, name, stats)| AppReport {
                node,
                index,
                name,
                stats,
            })
            .collect();

        ScenarioReport {
            seed,
            end_time: now.as_secs_f64(),
            events_processed: sim.events_processed(),
            state_hash: runtime.compute_state_hash(),
            apps,
            nodes,
            channel: runtime.channel().stats(),
            routing,
            drops: runtime.drops(),
        }
    }

    /// Nodes whose energy ran out.
    pub fn depleted_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| n.depleted_at.is_some()).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn add_stats(total: &mut RoutingStats, s: &RoutingStats) {
    total.rreq_originated += s.rreq_originated;
    total.rreq_forwarded += s.rreq_forwarded;
    total.rreq_duplicates += s.rreq_duplicates;
    total.rreq_suppressed += s.rreq_suppressed;
    total.rrep_sent += s.rrep_sent;
    total.rrep_forwarded += s.rrep_forwarded;
    total.rerr_sent += s.rerr_sent;
    total.hello_sent += s.hello_sent;
    total.link_breaks += s.link_breaks;
    total.data_forwarded += s.data_forwarded;
    total.discoveries_failed += s.discoveries_failed;
}

impl std::fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} nodes, seed {}, ended at {:.3}s after {} events (state {:016x})",
            self.nodes.len(),
            self.seed,
            self.end_time,
            self.events_processed,
            self.state_hash
        )?;
        for app in &self.apps {
            writeln!(
                f,
                "  {} #{} on {}: sent {}, received {}, lost {}, failed {}",
                app.name,
                app.index,
                app.node,
                app.stats.sent,
                app.stats.received,
                app.stats.lost,
                app.stats.failed
            )?;
        }
        let c = &self.channel;
        writeln!(
            f,
            "  channel: {} transmitted, {} delivered, {} out of range, {} lost, {} to powered-off receivers",
            c.transmitted, c.delivered, c.dropped_out_of_range, c.dropped_by_loss, c.dropped_receiver_off
        )?;
        let r = &self.routing;
        writeln!(
            f,
            "  routing: {} RREQ originated, {} forwarded, {} RREP, {} RERR, {} link breaks",
            r.rreq_originated, r.rreq_forwarded, r.rrep_sent, r.rerr_sent, r.link_breaks
        )?;
        write!(
            f,
            "  energy: {} of {} nodes depleted; {} data packets dropped",
            self.depleted_nodes(),
            self.nodes.len(),
            self.drops.total()
        )
    }
}
