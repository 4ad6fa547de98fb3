//! # Summary
//!
//! The messaging transport is an external collaborator (spec.md §1): the
//! CORE only needs to know that, when the Configuration Loader decides an
//! address changed, *something* rebinds the reply socket or reconnects
//! the peer fan-out. This trait is that boundary. `zpax-kv-cli` supplies
//! the concrete TCP implementation; `zpax-kv`'s own tests use a no-op or
//! recording fake so the KV Engine stays testable without real sockets.

use std::collections::BTreeSet;

/// Rebinds/reconnects the two socket directions described in §4.4 steps
/// 3–4: a reply socket for client and peer requests, and a fan-out
/// connection to every other replica's reply address.
pub trait Transport {
    /// Closes the existing reply socket (if any) and binds a new one.
    fn rebind_reply(&mut self, addr: &str);

    /// Closes the existing peer fan-out (if any) and opens connections to
    /// every address in `addrs`.
    fn reconnect_peers(&mut self, addrs: &BTreeSet<String>);
}

/// A `Transport` that does nothing, for unit tests and embedded use where
/// no real networking is wanted.
#[derive(Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn rebind_reply(&mut self, _addr: &str) {}
    fn reconnect_peers(&mut self, _addrs: &BTreeSet<String>) {}
}
