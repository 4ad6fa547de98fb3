//! # Summary
//!
//! Parses the self-describing cluster configuration stored under the
//! reserved `__zpax_config__` key (§4.4, §6.4) and computes the diff
//! against whatever configuration is currently active, so the KV Engine
//! can apply only the effects that actually changed: rebinding the reply
//! socket, reconnecting the peer fan-out, or reinitializing/resizing the
//! Paxos Driver's quorum. Loading the same configuration twice in a row
//! must be a no-op (P6); this module is the one responsible for making
//! that true, by diffing rather than unconditionally re-applying.

use std::collections::BTreeSet;
use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One member of the cluster, as stored in the config blob (§6.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeEntry {
    pub uid: String,
    pub pax_rep_addr: String,
    pub pax_pub_addr: String,
    pub kv_rep_addr: String,
}

/// The config blob itself: the value stored under `__zpax_config__`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quorum_size: Option<usize>,
}

impl ClusterConfig {
    /// Quorum size: the explicit field if present, else floor(n/2)+1.
    pub fn quorum_size(&self) -> usize {
        self.quorum_size.unwrap_or_else(|| self.nodes.len() / 2 + 1)
    }
}

/// The fully-resolved effects of loading one configuration, diffed
/// against whatever was active before.
#[derive(Clone, Debug)]
pub struct ConfigEffects {
    pub my_addr: String,
    pub peer_addrs: BTreeSet<String>,
    pub quorum_size: usize,
    /// uid -> (paxos_rep_addr, paxos_pub_addr), for `PaxosDriver::connect`.
    pub paxos_nodes: HashMap<String, (String, String)>,
    pub rebind_reply: bool,
    pub reconnect_peers: bool,
    pub quorum_changed: bool,
}

struct Active {
    my_addr: String,
    peer_addrs: BTreeSet<String>,
    quorum_size: usize,
}

/// Loads and diffs cluster configurations for a single replica, identified
/// by `my_uid`.
pub struct ConfigLoader {
    my_uid: String,
    active: Option<Active>,
}

impl ConfigLoader {
    pub fn new(my_uid: impl Into<String>) -> Self {
        ConfigLoader {
            my_uid: my_uid.into(),
            active: None,
        }
    }

    /// Parses `blob` and computes the effects of adopting it, relative to
    /// whatever is currently active. Returns `MissingConfiguration` if
    /// this replica's uid is absent from the membership.
    pub fn load(&mut self, blob: &str) -> Result<ConfigEffects> {
        let config: ClusterConfig = serde_json::from_str(blob)?;

        let mut paxos_nodes = HashMap::new();
        let mut peer_addrs = BTreeSet::new();
        let mut my_addr = None;

        for node in &config.nodes {
            paxos_nodes.insert(
                node.uid.clone(),
                (node.pax_rep_addr.clone(), node.pax_pub_addr.clone()),
            );
            if node.uid == self.my_uid {
                my_addr = Some(node.kv_rep_addr.clone());
            } else {
                peer_addrs.insert(node.kv_rep_addr.clone());
            }
        }

        let my_addr = my_addr.ok_or(Error::MissingConfiguration)?;
        let quorum_size = config.quorum_size();

        let rebind_reply = self
            .active
            .as_ref()
            .map_or(true, |active| active.my_addr != my_addr);
        let reconnect_peers = self
            .active
            .as_ref()
            .map_or(true, |active| active.peer_addrs != peer_addrs);
        let quorum_changed = self
            .active
            .as_ref()
            .map_or(true, |active| active.quorum_size != quorum_size);

        self.active = Some(Active {
            my_addr: my_addr.clone(),
            peer_addrs: peer_addrs.clone(),
            quorum_size,
        });

        Ok(ConfigEffects {
            my_addr,
            peer_addrs,
            quorum_size,
            paxos_nodes,
            rebind_reply,
            reconnect_peers,
            quorum_changed,
        })
    }

    /// Current quorum size, if a configuration has been loaded.
    pub fn quorum_size(&self) -> Option<usize> {
        self.active.as_ref().map(|active| active.quorum_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(uids: &[&str], quorum: Option<usize>) -> String {
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
        let mut value = serde_json::json!({ "nodes": nodes });
        if let Some(q) = quorum {
            value["quorum_size"] = serde_json::json!(q);
        }
        value.to_string()
    }

    #[test]
    fn defaults_quorum_to_majority() {
        let mut loader = ConfigLoader::new("a");
        let effects = loader.load(&blob(&["a", "b", "c"], None)).unwrap();
        assert_eq!(effects.quorum_size, 2);
    }

    #[test]
    fn honors_explicit_quorum() {
        let mut loader = ConfigLoader::new("a");
        let effects = loader.load(&blob(&["a", "b", "c"], Some(3))).unwrap();
        assert_eq!(effects.quorum_size, 3);
    }

    #[test]
    fn missing_self_raises_missing_configuration() {
        let mut loader = ConfigLoader::new("z");
        let result = loader.load(&blob(&["a", "b", "c"], None));
        assert!(matches!(result, Err(Error::MissingConfiguration)));
    }

    #[test]
    fn first_load_always_rebinds_and_reconnects() {
        let mut loader = ConfigLoader::new("a");
        let effects = loader.load(&blob(&["a", "b", "c"], None)).unwrap();
        assert!(effects.rebind_reply);
        assert!(effects.reconnect_peers);
    }

    #[test]
    fn identical_reload_is_a_no_op_diff() {
        let mut loader = ConfigLoader::new("a");
        let raw = blob(&["a", "b", "c"], None);
        loader.load(&raw).unwrap();
        let effects = loader.load(&raw).unwrap();
        assert!(!effects.rebind_reply);
        assert!(!effects.reconnect_peers);
    }

    #[test]
    fn membership_change_triggers_reconnect_only() {
        let mut loader = ConfigLoader::new("a");
        loader.load(&blob(&["a", "b", "c"], None)).unwrap();
        let effects = loader.load(&blob(&["a", "b", "d"], None)).unwrap();
        assert!(!effects.rebind_reply);
        assert!(effects.reconnect_peers);
    }
}
