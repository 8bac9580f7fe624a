//! Structured error types for the simulator.
//!
//! All fallible public APIs return `Result<T, SimError>`. Errors that an
//! application can observe at runtime (`NoRouteToHost`, `PowerExhausted`)
//! are delivered as failed-send outcomes; the rest are configuration or
//! programming mistakes surfaced to the caller that made them.

use thiserror::Error;

use crate::node::NodeId;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    // ── Configuration / misuse ────────────────────────────

    /// A bad argument, e.g. a negative delay or an event in the past.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A scenario configuration is inconsistent or could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    // ── Node errors ───────────────────────────────────────

    /// A node ID was referenced but is not registered in the runtime.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    /// Attempted to register a node with an ID that is already in use.
    #[error("node {0} is already registered")]
    NodeAlreadyRegistered(NodeId),

    /// An application downcast to a concrete type failed.
    #[error("application {index} on node {node} is not a {expected}")]
    AppTypeMismatch {
        node: NodeId,
        index: usize,
        expected: &'static str,
    },

    // ── Runtime outcomes ──────────────────────────────────

    /// Route discovery exhausted its retries.
    #[error("no route to host {destination}")]
    NoRouteToHost { destination: NodeId },

    /// The node's energy source is depleted.
    #[error("energy source of node {node} is exhausted")]
    PowerExhausted { node: NodeId },

    /// A link to a neighbor broke while a frame was in flight.
    #[error("link {from} -> {to} is broken")]
    LinkBroken { from: NodeId, to: NodeId },
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
