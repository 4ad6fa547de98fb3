//! # Summary
//!
//! Core of a small replicated key-value store whose consistency is
//! maintained by Multi-Paxos (see SPEC_FULL.md). The concrete vote
//! arithmetic of a single Paxos instance, durability of ballot state, and
//! the messaging transport are external collaborators specified only at
//! their trait boundaries (`paxos_driver::PaxosDriver`,
//! `transport::Transport`); this crate implements the catch-up state
//! machine, the self-describing cluster configuration, and the
//! replicated KV state built on top of them.

pub mod config;
pub mod durability;
pub mod durable_map;
pub mod engine;
pub mod error;
pub mod message;
pub mod paxos_driver;
pub mod replication;
pub mod transport;

pub use config::{ClusterConfig, ConfigEffects, ConfigLoader, NodeEntry};
pub use durable_map::DurableMap;
pub use engine::{Engine, EngineOptions, CONFIG_KEY};
pub use error::{Error, Result};
pub use paxos_driver::{DriverEvent, Heartbeat, PaxosDriver, ProposalError};
pub use replication::ReplicationNode;
pub use transport::{NullTransport, Transport};
