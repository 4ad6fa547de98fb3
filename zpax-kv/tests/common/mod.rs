//! Shared test double for a Multi-Paxos driver (§6.1). Exercises the
//! Replication Node and KV Engine without a real consensus
//! implementation, the way the teacher's `chatroom::State` plays the
//! "user-supplied state machine" role relative to `paxos::State`.

use std::collections::HashMap;

use zpax_kv::{DriverEvent, PaxosDriver, ProposalError};

#[derive(Default)]
pub struct MockPaxosDriver {
    pub seq: i64,
    pub quorum_size: Option<usize>,
    pub connected: HashMap<String, (String, String)>,
    pub proposals: Vec<Vec<u8>>,
    pub refuse_next: bool,
}

impl PaxosDriver for MockPaxosDriver {
    fn propose(&mut self, value: Vec<u8>) -> Result<(), ProposalError> {
        if self.refuse_next {
            self.refuse_next = false;
            return Err(ProposalError("not leader".into()));
        }
        self.proposals.push(value);
        Ok(())
    }

    fn current_sequence_number(&self) -> i64 {
        self.seq
    }

    fn set_current_sequence_number(&mut self, n: i64) {
        self.seq = n;
    }

    fn initialize(&mut self, quorum_size: usize) {
        self.quorum_size = Some(quorum_size);
    }

    fn change_quorum_size(&mut self, quorum_size: usize) {
        self.quorum_size = Some(quorum_size);
    }

    fn connect(&mut self, nodes: &HashMap<String, (String, String)>) {
        self.connected = nodes.clone();
    }

    fn check_sequence(&self, _header_seq: i64) -> bool {
        true
    }

    fn drain_events(&mut self) -> Vec<DriverEvent> {
        Vec::new()
    }

    fn shutdown(&mut self) {}
}

/// Builds the JSON config blob for a set of uids, all reachable via
/// `tcp://<uid>:*` placeholder addresses.
pub fn config_blob(uids: &[&str]) -> String {
    let nodes: Vec<_> = uids
        .iter()
        .map(|uid| {
            serde_json::json!({
                "uid": uid,
                "pax_rep_addr": format!("tcp://{uid}:9000"),
                "pax_pub_addr": format!("tcp://{uid}:9001"),
                "kv_rep_addr": format!("tcp://{uid}:9002"),
            })
        })
        .collect();
    serde_json::json!({ "nodes": nodes }).to_string()
}
