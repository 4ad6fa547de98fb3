//! # Summary
//!
//! Error kinds raised at the boundaries of the KV Engine. Per the
//! propagation policy, errors from the Paxos Driver are surfaced to the
//! requesting client, errors from the Durable Map are fatal, and
//! configuration reload errors are non-fatal and local: no variant here
//! is allowed to unwind across the event loop boundary.

use thiserror::Error;

/// Errors produced by the CORE. Every fallible public operation returns
/// one of these rather than panicking.
#[derive(Error, Debug)]
pub enum Error {
    /// `initialize` was called on a replica that already has a config key.
    #[error("replica already initialized")]
    AlreadyInitialized,

    /// The loaded configuration does not contain this replica's uid.
    /// Swallowed by the KV Engine: the replica keeps serving local data
    /// but stops participating in consensus.
    #[error("this node is not present in the current configuration")]
    MissingConfiguration,

    /// A client attempted to propose or query the reserved config key
    /// while `allow_config_proposals` is false.
    #[error("Access Denied")]
    AccessDenied,

    /// The Paxos Driver refused a proposal.
    #[error("proposal failed: {0}")]
    ProposalFailed(String),

    /// A catchup-data reply whose `from_seq` does not match the current
    /// instance ceiling; discarded rather than applied.
    #[error("stale catch-up reply (from_seq did not match instance ceiling)")]
    StaleCatchupReply,

    /// A request missing required fields, or of unrecognized shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The durable map's backing snapshot file could not be read or written.
    #[error("durability I/O error: {0}")]
    Durability(#[from] std::io::Error),

    /// The config blob failed to parse as JSON.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
