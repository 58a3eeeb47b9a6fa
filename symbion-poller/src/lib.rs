//! Symbion Poller - poll-and-reconcile node agent
//!
//! Polls managed hosts through a management-query service and keeps, per host:
//! - an entity graph (machine data, interfaces, volumes) reconciled by identity
//! - capability flags probed once per inventory cycle
//! - bounded CPU, memory, network and volume history, plus combined streams
//!
//! The graph and histories are served read-only over HTTP.

pub mod bridge;
pub mod capabilities;
pub mod combine;
pub mod config;
pub mod health;
pub mod history;
pub mod http;
pub mod inventory;
pub mod model;
pub mod normalize;
pub mod poller;
pub mod prefix;
pub mod reconcile;
pub mod rows;
pub mod state;
pub mod stats;

pub use model::{Interface, Node, NodeStatus, NodeSummary, Volume};
pub use poller::{poll_info, poll_stats, CycleOutcome, NodePoller, PollContext};
