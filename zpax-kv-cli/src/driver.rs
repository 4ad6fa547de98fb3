//! A minimal `PaxosDriver` sufficient to run this binary standalone.
//!
//! Real vote arithmetic (proposer/acceptor/learner roles, ballot
//! preemption, commander fan-out) is out of scope for the core crate; it
//! is supplied by whatever Multi-Paxos implementation a deployment plugs
//! in. This driver resolves every proposal immediately at the next
//! instance, which is correct only for a single-node cluster. It exists
//! so `zpax-kv-cli` compiles and runs end to end without depending on an
//! external consensus library; swap it for a real one to run more than
//! one replica.

use std::collections::HashMap;

use zpax_kv::{DriverEvent, PaxosDriver, ProposalError};

#[derive(Default)]
pub struct SingleNodeDriver {
    seq: i64,
    quorum_size: usize,
    pending: Vec<DriverEvent>,
}

impl PaxosDriver for SingleNodeDriver {
    fn propose(&mut self, value: Vec<u8>) -> Result<(), ProposalError> {
        let instance = self.seq;
        self.seq += 1;
        self.pending.push(DriverEvent::ProposalResolved { instance, value });
        Ok(())
    }

    fn current_sequence_number(&self) -> i64 {
        self.seq
    }

    fn set_current_sequence_number(&mut self, n: i64) {
        self.seq = n;
    }

    fn initialize(&mut self, quorum_size: usize) {
        self.quorum_size = quorum_size;
        log::info!("single-node driver initialized with quorum size {quorum_size}");
    }

    fn change_quorum_size(&mut self, quorum_size: usize) {
        self.quorum_size = quorum_size;
    }

    fn connect(&mut self, nodes: &HashMap<String, (String, String)>) {
        log::debug!("single-node driver ignoring peer connect to {} nodes", nodes.len());
    }

    fn check_sequence(&self, _header_seq: i64) -> bool {
        true
    }

    fn drain_events(&mut self) -> Vec<DriverEvent> {
        std::mem::take(&mut self.pending)
    }

    fn shutdown(&mut self) {}
}
