use std::fmt::{Display, Formatter};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use typed_builder::TypedBuilder;
use tracing::{debug, info, trace, warn};

use crate::address::Address;
use crate::collaborator::{MembershipObserver, TracingObserver, Transport};
use crate::config::MembershipConfig;
use crate::entry::MembershipEntry;
use crate::error::FormatError;
use crate::message::{encode_join_request, encode_table_message, JoinRequest, Message, MessageKind};
use crate::selector::{PeerSelector, RandomSelector};
use crate::table::{MembershipTable, MergeOutcome};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeState {
    Uninitialized,
    Joining,
    Active,
}

impl Display for NodeState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Uninitialized => write!(f, "Uninitialized"),
            NodeState::Joining => write!(f, "Joining"),
            NodeState::Active => write!(f, "Active"),
        }
    }
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct EngineStats {
    pub received: u64,
    /// Frames dropped because they failed to decode.
    pub malformed: u64,
    /// Well formed frames that were not valid in the current state.
    pub ignored: u64,
    pub sent: u64,
    pub rounds: u64,
}

/// Membership protocol of a single node.
///
/// The engine owns no timer or socket. The host feeds it inbound frames with
/// [`MembershipEngine::on_message`] and drives rounds with
/// [`MembershipEngine::on_tick`], never concurrently.
#[derive(Debug, TypedBuilder)]
pub struct MembershipEngine {
    address: Address,
    config: MembershipConfig,
    transport: Arc<dyn Transport>,
    #[builder(default = Box::new(RandomSelector::default()))]
    selector: Box<dyn PeerSelector>,
    #[builder(default = Arc::new(TracingObserver))]
    observer: Arc<dyn MembershipObserver>,
    #[builder(default = NodeState::Uninitialized, setter(skip))]
    state: NodeState,
    #[builder(default, setter(skip))]
    heartbeat: i64,
    #[builder(default = MembershipTable::new(address, config.t_fail, config.t_remove), setter(skip))]
    table: MembershipTable,
    #[builder(default, setter(skip))]
    stats: EngineStats,
}

impl MembershipEngine {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_in_group(&self) -> bool {
        self.state == NodeState::Active
    }

    pub fn heartbeat(&self) -> i64 {
        self.heartbeat
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    /// Every identity in the local view, the node itself included.
    pub fn members(&self) -> Vec<Address> {
        self.table.snapshot().iter().map(MembershipEntry::address).collect()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn initialize(&mut self) {
        self.heartbeat = 0;
        self.table.clear();
        self.state = NodeState::Joining;
        debug!("{} initialized", self.address);
    }

    /// Introduces the node to the group through `rendezvous`.
    ///
    /// A node that is its own rendezvous point boots the group. Otherwise a
    /// JOINREQ is sent and the node stays `Joining` until a JOINREP arrives.
    /// Calling it again while `Joining` resends the request.
    pub fn join(&mut self, rendezvous: Address, now: i64) -> anyhow::Result<()> {
        match self.state {
            NodeState::Uninitialized => bail!("{} must be initialized before joining", self.address),
            NodeState::Active => {
                debug!("{} already in group, join through {} skipped", self.address, rendezvous);
                return Ok(());
            }
            NodeState::Joining => {}
        }
        if rendezvous.is_null() {
            bail!("{} has no rendezvous address to join through", self.address);
        }
        if rendezvous == self.address {
            info!("{} starting up group", self.address);
            self.enter_group(now);
            return Ok(());
        }
        let request = JoinRequest {
            address: self.address,
            heartbeat: self.heartbeat,
        };
        let bytes = encode_join_request(&request)
            .map_err(|e| anyhow!("{} encode join request failed: {:#}", self.address, e))?;
        debug!("{} trying to join via {}", self.address, rendezvous);
        self.send(rendezvous, bytes);
        Ok(())
    }

    /// Handles one inbound frame. Malformed or out of place frames are
    /// dropped without touching the table.
    pub fn on_message(&mut self, bytes: &[u8], now: i64) {
        self.stats.received += 1;
        if self.state == NodeState::Uninitialized {
            self.stats.ignored += 1;
            debug!("{} not initialized, drop {} bytes", self.address, bytes.len());
            return;
        }
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(FormatError::UnknownKind(kind)) => {
                self.stats.ignored += 1;
                debug!("{} ignore message of unknown kind {}", self.address, kind);
                return;
            }
            Err(error) => {
                self.stats.malformed += 1;
                warn!("{} drop malformed message: {}", self.address, error);
                return;
            }
        };
        trace!("{} recv {}", self.address, message);
        match message {
            Message::JoinReq(request) => self.on_join_request(request, now),
            Message::JoinRep(entries) => self.on_join_reply(entries, now),
            Message::Heartbeat(entries) => self.on_heartbeat(entries, now),
        }
    }

    /// One protocol round: advance the local heartbeat, evict stale peers and
    /// push the whole table to a fanout of known peers. No-op until the node
    /// is in the group.
    pub fn on_tick(&mut self, now: i64) {
        if self.state != NodeState::Active {
            return;
        }
        self.stats.rounds += 1;
        self.heartbeat += 1;
        self.table.tick_self(self.heartbeat, now);

        for peer in self.table.evict_stale(now) {
            debug!("{} evict {} at {}", self.address, peer, now);
            self.observer.on_node_removed(self.address, peer);
        }

        if self.table.len() > 1 {
            if let Err(error) = self.gossip(now) {
                warn!("{} gossip round at {} failed: {:#}", self.address, now, error);
            }
        }
    }

    fn gossip(&mut self, now: i64) -> anyhow::Result<()> {
        let candidates = self.table.peers();
        let fanout = self.config.fanout.min(candidates.len());
        let mut targets = self.selector.select(&candidates, fanout);
        targets.retain(|target| *target != self.address);
        targets.truncate(fanout);
        let bytes = encode_table_message(MessageKind::Heartbeat, &self.table, now)?;
        trace!("{} gossip {} entries to {:?}", self.address, self.table.len(), targets);
        for target in targets {
            self.send(target, bytes.clone());
        }
        Ok(())
    }

    fn on_join_request(&mut self, request: JoinRequest, now: i64) {
        let JoinRequest { address, heartbeat } = request;
        if address == self.address || address.is_null() {
            self.stats.ignored += 1;
            debug!("{} ignore join request from {}", self.address, address);
            return;
        }
        if self.table.upsert(address, heartbeat, now) {
            self.observer.on_node_joined(self.address, address);
        }
        match encode_table_message(MessageKind::JoinRep, &self.table, now) {
            Ok(bytes) => {
                debug!("{} admit {} with {} entries", self.address, address, self.table.len());
                self.send(address, bytes);
            }
            Err(error) => {
                warn!("{} encode join reply for {} failed: {:#}", self.address, address, error);
            }
        }
    }

    fn on_join_reply(&mut self, entries: Vec<MembershipEntry>, now: i64) {
        let joining = self.state != NodeState::Active;
        if joining {
            self.table.insert_self(self.heartbeat, now);
            self.observer.on_node_joined(self.address, self.address);
        }
        self.merge_all(&entries, now);
        if joining {
            self.state = NodeState::Active;
            info!("{} joined group with {} members", self.address, self.table.len());
        }
    }

    fn on_heartbeat(&mut self, entries: Vec<MembershipEntry>, now: i64) {
        if self.state != NodeState::Active {
            self.stats.ignored += 1;
            debug!("{} not in group, ignore heartbeat", self.address);
            return;
        }
        self.merge_all(&entries, now);
    }

    fn enter_group(&mut self, now: i64) {
        if self.table.insert_self(self.heartbeat, now) {
            self.observer.on_node_joined(self.address, self.address);
        }
        self.state = NodeState::Active;
    }

    fn merge_all(&mut self, entries: &[MembershipEntry], now: i64) {
        for entry in entries {
            if self.table.merge(entry, now) == MergeOutcome::Inserted {
                self.observer.on_node_joined(self.address, entry.address());
            }
        }
    }

    fn send(&mut self, to: Address, bytes: bytes::Bytes) {
        self.stats.sent += 1;
        self.transport.send(self.address, to, bytes);
    }
}
