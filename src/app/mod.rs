//! Traffic generators.
//!
//! Applications never touch the scheduler or the routing layer directly.
//! Each callback receives an [`AppContext`] that collects the sends and
//! timers the application asks for; the node runtime executes them once
//! the callback returns.
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`udp`] | [`UdpClient`], [`UdpServer`] |
//! | [`ping`] | [`Ping`] |

pub mod ping;
pub mod udp;

use std::any::Any;

use serde::Serialize;

use crate::error::SimError;
use crate::node::NodeId;
use crate::packet::{Packet, Payload};
use crate::time::{SimDuration, SimTime};

pub use ping::Ping;
pub use udp::{UdpClient, UdpServer};

/// Counters every application exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppStats {
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
    /// Sends reported back as `NoRouteToHost` or `PowerExhausted`.
    pub failed: u64,
}

/// A request made by an application callback.
#[derive(Debug, Clone, PartialEq)]
pub enum AppAction {
    Send {
        dst: NodeId,
        dst_port: u16,
        size_bytes: u32,
        payload: Payload,
    },
    SetTimer {
        after: SimDuration,
        timer_id: u64,
    },
}

/// Handle passed to application callbacks.
#[derive(Debug)]
pub struct AppContext {
    node: NodeId,
    now: SimTime,
    actions: Vec<AppAction>,
}

impl AppContext {
    pub fn new(node: NodeId, now: SimTime) -> Self {
        AppContext {
            node,
            now,
            actions: Vec::new(),
        }
    }

    /// The node the application runs on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Queue a packet for `dst:dst_port`.
    pub fn send(&mut self, dst: NodeId, dst_port: u16, size_bytes: u32, payload: Payload) {
        self.actions.push(AppAction::Send {
            dst,
            dst_port,
            size_bytes,
            payload,
        });
    }

    /// Ask for `on_timer(timer_id)` after `after`.
    pub fn set_timer(&mut self, after: SimDuration, timer_id: u64) {
        self.actions.push(AppAction::SetTimer { after, timer_id });
    }

    pub fn into_actions(self) -> Vec<AppAction> {
        self.actions
    }
}

/// Trait implemented by every application installed on a node.
///
/// Implementations must be deterministic for equal inputs and route all
/// side effects through the context.
pub trait Application {
    fn on_start(&mut self, ctx: &mut AppContext);

    fn on_stop(&mut self, _ctx: &mut AppContext) {}

    fn on_timer(&mut self, _ctx: &mut AppContext, _timer_id: u64) {}

    /// A packet addressed to this application's port arrived.
    fn on_receive(&mut self, _ctx: &mut AppContext, _packet: &Packet) {}

    /// A packet this application sent was given up on.
    fn on_send_failed(&mut self, _ctx: &mut AppContext, _packet: &Packet, _error: &SimError) {}

    fn stats(&self) -> AppStats;

    /// The local port packets are sent from and received on.
    fn port(&self) -> u16;

    /// Short type name used in reports.
    fn name(&self) -> &'static str;

    /// Downcast support for `NodeRuntime::app::<T>()`.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
