//! # Summary
//!
//! Thin adapter layered over a `PaxosDriver` (§4.2). Piggybacks the
//! current instance number on every heartbeat, detects divergence from a
//! peer's heartbeat, gates inbound Paxos message dispatch while catching
//! up, and parses resolved proposals back into `(key, value)` pairs for
//! the KV Engine to apply.
//!
//! This module intentionally does not own `CatchupState` or
//! `InstanceCeiling` — those belong to the KV Engine (§4.3) — so it takes
//! them as parameters and returns decisions rather than reaching back into
//! its caller.

use crate::error::{Error, Result};
use crate::paxos_driver::{Heartbeat, PaxosDriver};

/// Adapts a `PaxosDriver` with the catch-up-aware overrides of §4.2.
pub struct ReplicationNode<D> {
    driver: D,
}

impl<D: PaxosDriver> ReplicationNode<D> {
    pub fn new(driver: D) -> Self {
        ReplicationNode { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// The heartbeat payload this replica should emit.
    pub fn heartbeat_payload(&self) -> Heartbeat {
        Heartbeat {
            seq_num: self.driver.current_sequence_number(),
        }
    }

    /// Processes a heartbeat received from a peer. Returns `true` if this
    /// replica should begin (or remain) catching up.
    ///
    /// An incoming heartbeat with `seq_num == instance_ceiling + 1` does
    /// NOT trigger catch-up: at most one instance behind is the normal
    /// steady state, since the current instance is still being negotiated.
    pub fn on_heartbeat(&mut self, heartbeat: Heartbeat, instance_ceiling: i64) -> bool {
        if heartbeat.seq_num - 1 > instance_ceiling {
            if heartbeat.seq_num > self.driver.current_sequence_number() {
                self.driver.set_current_sequence_number(heartbeat.seq_num);
            }
            true
        } else {
            false
        }
    }

    /// The base driver's "behind in sequence" hook always requests
    /// catch-up (§4.2).
    pub fn on_behind_in_sequence(&self, _old: i64, _new: i64) -> bool {
        true
    }

    /// Gates inbound Paxos message dispatch (I4): while catching up, every
    /// message is dropped regardless of what the base driver's own
    /// sequence check would say. The base check still applies otherwise.
    pub fn check_sequence(&self, header_seq: i64, catching_up: bool) -> bool {
        !catching_up && self.driver.check_sequence(header_seq)
    }

    /// Parses a resolved proposal's opaque value as the JSON-encoded pair
    /// `[key, value]` (§6.3).
    pub fn parse_resolution(value: &[u8]) -> Result<(String, String)> {
        let pair: (String, String) = serde_json::from_slice(value)
            .map_err(|error| Error::MalformedMessage(error.to_string()))?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paxos_driver::{DriverEvent, ProposalError};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDriver {
        seq: i64,
    }

    impl PaxosDriver for FakeDriver {
        fn propose(&mut self, _value: Vec<u8>) -> std::result::Result<(), ProposalError> {
            Ok(())
        }
        fn current_sequence_number(&self) -> i64 {
            self.seq
        }
        fn set_current_sequence_number(&mut self, n: i64) {
            self.seq = n;
        }
        fn initialize(&mut self, _quorum_size: usize) {}
        fn change_quorum_size(&mut self, _quorum_size: usize) {}
        fn connect(&mut self, _nodes: &HashMap<String, (String, String)>) {}
        fn check_sequence(&self, _header_seq: i64) -> bool {
            true
        }
        fn drain_events(&mut self) -> Vec<DriverEvent> {
            Vec::new()
        }
        fn shutdown(&mut self) {}
    }

    #[test]
    fn heartbeat_at_ceiling_plus_one_is_steady_state() {
        let mut node = ReplicationNode::new(FakeDriver::default());
        // ceiling == 1, heartbeat seq_num == 2 => 2 - 1 == 1, not > 1.
        assert!(!node.on_heartbeat(Heartbeat { seq_num: 2 }, 1));
    }

    #[test]
    fn heartbeat_further_ahead_triggers_catchup_and_advances_sequence() {
        let mut node = ReplicationNode::new(FakeDriver::default());
        assert!(node.on_heartbeat(Heartbeat { seq_num: 10 }, 1));
        assert_eq!(node.driver().current_sequence_number(), 10);
    }

    #[test]
    fn heartbeat_behind_current_sequence_does_not_rewind_it() {
        let mut node = ReplicationNode::new(FakeDriver { seq: 20 });
        assert!(node.on_heartbeat(Heartbeat { seq_num: 10 }, 1));
        assert_eq!(node.driver().current_sequence_number(), 20);
    }

    #[test]
    fn catching_up_gates_every_message_regardless_of_base_check() {
        let node = ReplicationNode::new(FakeDriver::default());
        assert!(!node.check_sequence(0, true));
        assert!(node.check_sequence(0, false));
    }

    #[test]
    fn parses_resolved_value_as_key_value_pair() {
        let parsed = ReplicationNode::<FakeDriver>::parse_resolution(br#"["x","1"]"#).unwrap();
        assert_eq!(parsed, ("x".to_string(), "1".to_string()));
    }

    #[test]
    fn malformed_resolution_is_an_error_not_a_panic() {
        let result = ReplicationNode::<FakeDriver>::parse_resolution(b"not json");
        assert!(result.is_err());
    }
}
