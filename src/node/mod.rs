//! Node orchestrators for the two link roles.
//!
//! [`remote::RemoteNode`] runs the duty-cycled sensor side: periodic metrics
//! uplink, outcome recording, and power-state-driven sleep. [`base::BaseStation`]
//! runs the mains-powered side: continuous receive dispatch, remote-status
//! tracking, and the operator surface (ping, status report).

pub mod base;
pub mod remote;

pub use base::{BaseEvent, BaseStation, DeliveryTracker, RemoteStatus};
pub use remote::{NodeConfig, NodeExit, NodeStatus, RemoteNode};
