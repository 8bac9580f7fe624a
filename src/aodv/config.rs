//! AODV protocol parameters.

use crate::time::SimDuration;

/// Tunables of one AODV instance.
///
/// The timing constants that RFC 3561 derives from others
/// (`NET_TRAVERSAL_TIME`, `PATH_DISCOVERY_TIME`, ...) are methods rather
/// than fields so they always stay consistent with their inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct AodvConfig {
    pub hello_interval: SimDuration,
    pub allowed_hello_loss: u32,
    pub rreq_retries: u32,
    pub node_traversal_time: SimDuration,
    pub net_diameter: u8,
    pub active_route_timeout: SimDuration,
    pub max_queue_len: usize,
    pub max_queue_time: SimDuration,
    pub gratuitous_reply: bool,
    pub destination_only: bool,
    pub enable_hello: bool,
    /// Upper bound of the random delay added to each hello.
    pub hello_jitter: SimDuration,
    pub enable_local_repair: bool,
    /// Routes longer than this are not repaired locally.
    pub max_repair_ttl: u8,
    /// Nodes whose residual energy fraction is below this do not
    /// rebroadcast RREQs. `None` disables the check.
    pub min_forward_energy: Option<f64>,
}

impl Default for AodvConfig {
    fn default() -> Self {
        AodvConfig {
            hello_interval: SimDuration::from_secs(1),
            allowed_hello_loss: 2,
            rreq_retries: 2,
            node_traversal_time: SimDuration::from_millis(40),
            net_diameter: 35,
            active_route_timeout: SimDuration::from_secs(3),
            max_queue_len: 64,
            max_queue_time: SimDuration::from_secs(30),
            gratuitous_reply: true,
            destination_only: false,
            enable_hello: true,
            hello_jitter: SimDuration::from_millis(100),
            enable_local_repair: false,
            max_repair_ttl: 10,
            min_forward_energy: None,
        }
    }
}

impl AodvConfig {
    /// 2 · NODE_TRAVERSAL_TIME · NET_DIAMETER.
    pub fn net_traversal_time(&self) -> SimDuration {
        self.node_traversal_time
            .saturating_mul(2 * u64::from(self.net_diameter))
    }

    /// 2 · NET_TRAVERSAL_TIME.
    pub fn path_discovery_time(&self) -> SimDuration {
        self.net_traversal_time().saturating_mul(2)
    }

    /// 2 · max(PATH_DISCOVERY_TIME, ACTIVE_ROUTE_TIMEOUT).
    pub fn my_route_timeout(&self) -> SimDuration {
        self.path_discovery_time()
            .max(self.active_route_timeout)
            .saturating_mul(2)
    }

    /// 5 · max(ACTIVE_ROUTE_TIMEOUT, HELLO_INTERVAL).
    pub fn delete_period(&self) -> SimDuration {
        self.active_route_timeout
            .max(self.hello_interval)
            .saturating_mul(5)
    }

    /// Silence after which a neighbor is considered gone.
    pub fn neighbor_timeout(&self) -> SimDuration {
        self.hello_interval
            .saturating_mul(u64::from(self.allowed_hello_loss))
    }

    /// Wait before retry `attempt` (0-based) of a route discovery.
    pub fn rreq_backoff(&self, attempt: u32) -> SimDuration {
        self.net_traversal_time()
            .saturating_mul(1u64 << attempt.min(16))
    }
}
