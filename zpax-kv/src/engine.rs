//! # Summary
//!
//! The orchestrator (§4.3): holds the Durable Map, the Replication Node,
//! and the catch-up state machine, and handles client requests (propose,
//! query, catchup-serve, catchup-receive) plus configuration reloads. This
//! is the single piece of mutable state a caller drives one event at a
//! time from its event loop — nothing here blocks or spawns a task of its
//! own (§5).

use std::time::{Duration, Instant};

use crate::config::ConfigLoader;
use crate::durable_map::{DurableMap, ADMINISTRATIVE_RESOLUTION};
use crate::error::{Error, Result};
use crate::message::PeerReply;
use crate::paxos_driver::{DriverEvent, Heartbeat, PaxosDriver};
use crate::replication::ReplicationNode;
use crate::transport::Transport;

/// The reserved key under which the cluster configuration is stored.
/// Not proposable via the client surface unless `allow_config_proposals`.
pub const CONFIG_KEY: &str = "__zpax_config__";

/// Tuning knobs, mirroring the original implementation's constructor
/// defaults (`catchup_retry_delay=2.0`, `catchup_num_items=2`).
#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub allow_config_proposals: bool,
    pub catchup_retry_delay: Duration,
    pub catchup_num_items: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            allow_config_proposals: false,
            catchup_retry_delay: Duration::from_secs_f64(2.0),
            catchup_num_items: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CatchupStatus {
    Idle,
    CatchingUp,
}

/// Catch-up progress, plus the deadline of any pending retry. The engine
/// never owns a real timer itself (§5): it only tracks *when* the next
/// retry is due; the owning event loop is responsible for actually
/// sleeping until `retry_deadline()` and calling `catchup_retry_fired`.
pub struct CatchupState {
    status: CatchupStatus,
    retry_deadline: Option<Instant>,
}

impl CatchupState {
    fn idle() -> Self {
        CatchupState {
            status: CatchupStatus::Idle,
            retry_deadline: None,
        }
    }

    pub fn is_catching_up(&self) -> bool {
        self.status == CatchupStatus::CatchingUp
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_deadline
    }
}

/// Result of a `propose` call (§6.3's `propose_value` reply).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposeOutcome {
    pub proposed: bool,
    pub message: Option<String>,
}

/// Orchestrates the Durable Map, Replication Node, and catch-up state
/// machine for a single replica.
pub struct Engine<D> {
    uid: String,
    map: DurableMap,
    replication: ReplicationNode<D>,
    instance_ceiling: i64,
    catchup: CatchupState,
    config_loader: ConfigLoader,
    driver_initialized: bool,
    evicted: bool,
    options: EngineOptions,
    transport: Option<Box<dyn Transport>>,
    on_caught_up: Option<Box<dyn FnMut()>>,
}

impl<D: PaxosDriver> Engine<D> {
    pub fn new(uid: impl Into<String>, driver: D, map: DurableMap, options: EngineOptions) -> Self {
        let uid = uid.into();
        let instance_ceiling = map.max_resolution();
        Engine {
            config_loader: ConfigLoader::new(uid.clone()),
            uid,
            map,
            replication: ReplicationNode::new(driver),
            instance_ceiling,
            catchup: CatchupState::idle(),
            driver_initialized: false,
            evicted: false,
            options,
            transport: None,
            on_caught_up: None,
        }
    }

    /// Installs the transport that will be told about reply-socket and
    /// peer fan-out changes when the configuration reloads.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Installs a hook invoked when catch-up completes. Default is no-op.
    pub fn with_on_caught_up(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_caught_up = Some(Box::new(hook));
        self
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn durable_map(&self) -> &DurableMap {
        &self.map
    }

    pub fn replication(&self) -> &ReplicationNode<D> {
        &self.replication
    }

    pub fn instance_ceiling(&self) -> i64 {
        self.instance_ceiling
    }

    pub fn current_instance(&self) -> i64 {
        self.replication.driver().current_sequence_number()
    }

    pub fn is_catching_up(&self) -> bool {
        self.catchup.is_catching_up()
    }

    pub fn catchup_state(&self) -> &CatchupState {
        &self.catchup
    }

    /// Whether this replica has been evicted from the current membership
    /// (I6): it keeps applying values it receives but does not
    /// participate in consensus or raise.
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    /// Writes the config key at the administrative sentinel resolution
    /// and loads it. Fails if a config key is already present.
    pub fn initialize(&mut self, config_blob: &str) -> Result<()> {
        if self.map.get(CONFIG_KEY).is_some() {
            return Err(Error::AlreadyInitialized);
        }
        self.map
            .put_if_newer(CONFIG_KEY, config_blob, ADMINISTRATIVE_RESOLUTION);
        self.instance_ceiling = self.map.max_resolution();
        self.try_reload_configuration(config_blob);
        Ok(())
    }

    /// Proposes `(key, value)` as the next Paxos instance's value.
    pub fn propose(&mut self, key: &str, value: &str) -> Result<ProposeOutcome> {
        if key == CONFIG_KEY && !self.options.allow_config_proposals {
            return Err(Error::AccessDenied);
        }
        let payload = serde_json::to_vec(&(key, value))
            .map_err(|error| Error::MalformedMessage(error.to_string()))?;
        match self.replication.driver_mut().propose(payload) {
            Ok(()) => Ok(ProposeOutcome {
                proposed: true,
                message: None,
            }),
            Err(error) => Ok(ProposeOutcome {
                proposed: false,
                message: Some(error.0),
            }),
        }
    }

    /// Returns the locally stored value for `key`, which may be stale.
    pub fn query(&self, key: &str) -> Result<Option<String>> {
        if key == CONFIG_KEY && !self.options.allow_config_proposals {
            return Err(Error::AccessDenied);
        }
        Ok(self.map.get(key).map(str::to_string))
    }

    /// Applies one consensus outcome (§4.3). The caller only delivers
    /// strictly-newer instances; `instance_ceiling` always advances to
    /// `instance` even if the write itself is a no-op (see SPEC_FULL.md,
    /// "open question" note carried over from the original behavior).
    pub fn on_value_set(&mut self, key: String, value: String, instance: i64) {
        if key == CONFIG_KEY {
            self.try_reload_configuration(&value);
        }
        self.map.put_if_newer(&key, &value, instance);
        self.instance_ceiling = instance;
    }

    /// Serves a catch-up request: up to `catchup_num_items` entries past
    /// `last_known_seq`, ascending.
    pub fn catchup_request_handler(&self, last_known_seq: i64) -> PeerReply {
        let triples: Vec<_> = self
            .map
            .scan_by_resolution(last_known_seq, None)
            .into_iter()
            .take(self.options.catchup_num_items)
            .collect();
        PeerReply::CatchupData {
            from_seq: last_known_seq,
            key_val_seq_list: triples,
        }
    }

    /// Applies a catch-up reply and, if still behind, returns the next
    /// catch-up request to send.
    pub fn on_catchup_data(
        &mut self,
        from_seq: i64,
        triples: Vec<(String, String, i64)>,
    ) -> Result<Option<crate::message::PeerRequest>> {
        if from_seq != self.instance_ceiling {
            return Err(Error::StaleCatchupReply);
        }

        self.catchup.retry_deadline = None;

        for (key, value, seq) in triples {
            if key == CONFIG_KEY {
                self.try_reload_configuration(&value);
            }
            self.map.put_if_newer(&key, &value, seq);
        }
        self.instance_ceiling = self.map.max_resolution();

        Ok(self.continue_catchup())
    }

    /// Entry point: called by the heartbeat hook (or behind-in-sequence
    /// hook) to request catch-up begin. Idempotent while already
    /// catching up, and a no-op if already current.
    pub fn catchup(&mut self) -> Option<crate::message::PeerRequest> {
        if self.catchup.is_catching_up() {
            return None;
        }
        if self.instance_ceiling == self.current_instance() - 1 {
            return None;
        }
        self.continue_catchup()
    }

    /// Re-sends the catch-up request for a pending retry timer that has
    /// fired. No-op if catch-up already completed in the meantime.
    pub fn catchup_retry_fired(&mut self) -> Option<crate::message::PeerRequest> {
        if !self.catchup.is_catching_up() {
            return None;
        }
        self.continue_catchup()
    }

    fn continue_catchup(&mut self) -> Option<crate::message::PeerRequest> {
        let still_behind = self.instance_ceiling != self.current_instance() - 1;

        if !still_behind {
            self.catchup.status = CatchupStatus::Idle;
            self.catchup.retry_deadline = None;
            if let Some(hook) = &mut self.on_caught_up {
                hook();
            }
            return None;
        }

        self.catchup.status = CatchupStatus::CatchingUp;
        self.catchup.retry_deadline = Some(Instant::now() + jittered(self.options.catchup_retry_delay));
        Some(crate::message::PeerRequest::CatchupRequest {
            last_known_seq: self.instance_ceiling,
        })
    }

    /// Processes a heartbeat from a peer; returns the catch-up request to
    /// send, if divergence was detected (§4.2).
    pub fn on_heartbeat(&mut self, heartbeat: Heartbeat) -> Option<crate::message::PeerRequest> {
        if self.replication.on_heartbeat(heartbeat, self.instance_ceiling) {
            self.catchup()
        } else {
            None
        }
    }

    /// The base driver observed it is behind in sequence for a received
    /// message; always requests catch-up.
    pub fn on_behind_in_sequence(&mut self, old: i64, new: i64) -> Option<crate::message::PeerRequest> {
        if self.replication.on_behind_in_sequence(old, new) {
            self.catchup()
        } else {
            None
        }
    }

    /// Gates inbound Paxos message dispatch (I4): combines the catch-up
    /// gate with the base driver's own sequence check.
    pub fn check_sequence(&self, header_seq: i64) -> bool {
        self.replication.check_sequence(header_seq, self.is_catching_up())
    }

    /// The heartbeat payload this replica should emit.
    pub fn heartbeat_payload(&self) -> Heartbeat {
        self.replication.heartbeat_payload()
    }

    /// Drains events accumulated by the driver since the last call and
    /// dispatches each to the matching handler (§6.1's "required
    /// callbacks"), returning any catch-up requests that resulted. The
    /// owning event loop is expected to call this every tick, since the
    /// driver has no other way to hand an event back to its caller.
    pub fn drain_driver_events(&mut self) -> Vec<crate::message::PeerRequest> {
        let events = self.replication.driver_mut().drain_events();
        let mut requests = Vec::new();
        for event in events {
            let request = match event {
                DriverEvent::Heartbeat { heartbeat, .. } => self.on_heartbeat(heartbeat),
                DriverEvent::BehindInSequence { old, new } => self.on_behind_in_sequence(old, new),
                DriverEvent::ProposalResolved { instance, value } => {
                    match ReplicationNode::<D>::parse_resolution(&value) {
                        Ok((key, value)) => {
                            self.on_value_set(key, value, instance);
                            None
                        }
                        Err(error) => {
                            log::warn!("[{}] discarded unparseable resolution: {error}", self.uid);
                            None
                        }
                    }
                }
            };
            requests.extend(request);
        }
        requests
    }

    fn try_reload_configuration(&mut self, blob: &str) {
        match self.config_loader.load(blob) {
            Ok(effects) => {
                self.evicted = false;

                if !self.driver_initialized {
                    self.replication.driver_mut().initialize(effects.quorum_size);
                    self.driver_initialized = true;
                } else if effects.quorum_changed {
                    self.replication.driver_mut().change_quorum_size(effects.quorum_size);
                }
                self.replication.driver_mut().connect(&effects.paxos_nodes);

                if let Some(transport) = &mut self.transport {
                    if effects.rebind_reply {
                        transport.rebind_reply(&effects.my_addr);
                    }
                    if effects.reconnect_peers {
                        transport.reconnect_peers(&effects.peer_addrs);
                    }
                }
            }
            Err(Error::MissingConfiguration) => {
                log::warn!(
                    "[{}] evicted from cluster configuration; continuing to serve local data",
                    self.uid
                );
                self.evicted = true;
            }
            Err(error) => {
                log::error!("[{}] failed to reload configuration: {error}", self.uid);
            }
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(deadline) = self.catchup.retry_deadline.take() {
            let _ = deadline;
        }
        self.catchup.status = CatchupStatus::Idle;
        self.replication.driver_mut().shutdown();
    }
}

/// Adds up to 10% random jitter to a retry delay so concurrently
/// catching-up replicas don't lock-step their retries (grounded on the
/// teacher's `thread::leader` exponential backoff, which jitters for the
/// same reason).
fn jittered(base: Duration) -> Duration {
    let factor = 1.0 + rand::random::<f64>() * 0.1;
    base.mul_f64(factor)
}
