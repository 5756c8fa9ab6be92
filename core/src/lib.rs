//! PortPilot Core Library
//!
//! Tracks Kubernetes port-forward tunnels for a desktop or CLI front end.
//! Provides functionality to:
//! - Register, start, stop, modify, and remove tunnels against a cluster
//!   proxy backend
//! - Resume saved tunnels at startup, degrading gracefully when some fail
//! - Persist tunnel bookkeeping across restarts (write-through JSON file)
//! - Probe local ports to confirm teardown
//!
//! # Architecture
//! The store is the single owner of the in-memory tunnel collection; its
//! two collaborators are injected at construction:
//! - `storage`: durable descriptor persistence (`ForwardStorage`)
//! - `control`: the backend that owns the actual tunnels (`ControlApi`)
//!
//! Consumers read cloned snapshots and pending notifications; only the
//! store mutates state.

pub mod control;
pub mod error;
pub mod models;
pub mod net;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use control::{ControlApi, HttpControlApi};
pub use error::{ForwardError, Result};
pub use models::{
    ForwardNotification, ForwardProtocol, ForwardStatus, ForwardTarget, PortForwardDescriptor,
    PortForwardItem,
};
pub use net::wait_until_free;
pub use storage::{ForwardStorage, JsonFileStorage};
pub use store::{PortForwardStore, WatchHandle};
