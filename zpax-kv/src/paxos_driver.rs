//! # Summary
//!
//! Interface consumed from a Multi-Paxos driver (§6.1). The concrete vote
//! arithmetic of a single Paxos instance — proposer/acceptor/learner logic,
//! ballot preemption, commander fan-out — is explicitly out of scope for
//! this crate (spec.md §1): it is assumed to be supplied by a correct
//! Multi-Paxos implementation satisfying this trait. Nothing in this crate
//! implements `PaxosDriver` outside of its test suite.

use std::collections::HashMap;

/// One replica's view of the heartbeat payload this protocol layers on
/// top of a bare Multi-Paxos heartbeat: the sender's current instance
/// number, so a stale replica can detect divergence (§4.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Heartbeat {
    pub seq_num: i64,
}

/// A Paxos Driver surfaces state transitions as events rather than
/// calling back into the core directly; the event loop drains them each
/// tick and dispatches to the Replication Node / KV Engine. This mirrors
/// the "required callbacks (invoked on the loop)" of §6.1 without
/// requiring the driver to hold a reference back into its caller.
#[derive(Clone, Debug)]
pub enum DriverEvent {
    /// A heartbeat arrived from the named peer.
    Heartbeat { from: String, heartbeat: Heartbeat },
    /// The base driver observed it is behind in sequence for a received
    /// message (§4.2's "behind-in-sequence hook").
    BehindInSequence { old: i64, new: i64 },
    /// Instance `instance` resolved with the given opaque value. Per I5,
    /// `instance` always equals `current_sequence_number()` at the moment
    /// of delivery.
    ProposalResolved { instance: i64, value: Vec<u8> },
}

/// A proposal was refused by the driver (not leader, instance full, ...).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProposalError(pub String);

/// The operations a Multi-Paxos driver must expose to this crate (§6.1).
pub trait PaxosDriver {
    /// Proposes an opaque value for the next available instance.
    fn propose(&mut self, value: Vec<u8>) -> Result<(), ProposalError>;

    /// The instance currently under negotiation.
    fn current_sequence_number(&self) -> i64;

    /// Forces the driver's view of the current instance forward, e.g.
    /// after observing a peer further ahead via heartbeat.
    fn set_current_sequence_number(&mut self, n: i64);

    /// One-time initialization with the cluster's quorum size.
    fn initialize(&mut self, quorum_size: usize);

    /// Reconfigures the quorum size of an already-initialized driver.
    fn change_quorum_size(&mut self, quorum_size: usize);

    /// (Re)connects to the given membership, keyed by uid, each mapped to
    /// its `(paxos_rep_addr, paxos_pub_addr)` pair.
    fn connect(&mut self, nodes: &HashMap<String, (String, String)>);

    /// The driver's own admission check for an inbound message's header
    /// sequence number (e.g. dropping messages for past instances). The
    /// core layers an additional `not catching_up` check on top of this.
    fn check_sequence(&self, header_seq: i64) -> bool;

    /// Drains driver-internal events accumulated since the last call, for
    /// the event loop to dispatch.
    fn drain_events(&mut self) -> Vec<DriverEvent>;

    /// Releases any resources (connections, timers) held by the driver.
    fn shutdown(&mut self);
}
