#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Once};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::Level;

use gossip_membership::address::Address;
use gossip_membership::collaborator::{Clock, ManualClock, Transport};
use gossip_membership::config::MembershipConfig;
use gossip_membership::engine::MembershipEngine;
use gossip_membership::entry::MembershipEntry;
use gossip_membership::ext::init_logger;
use gossip_membership::message::Message;
use gossip_membership::selector::{PeerSelector, RandomSelector};

static LOGGER: Once = Once::new();

pub fn init() {
    LOGGER.call_once(|| init_logger(Level::DEBUG).expect("install test logger"));
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub sent_at: i64,
    pub from: Address,
    pub to: Address,
    pub bytes: Bytes,
}

impl Frame {
    pub fn decode(&self) -> Message {
        Message::decode(&self.bytes).expect("frame decodes")
    }

    /// Gossiped entries of a JOINREP or HEARTBEAT frame.
    pub fn entries(&self) -> Vec<MembershipEntry> {
        match self.decode() {
            Message::JoinRep(entries) | Message::Heartbeat(entries) => entries,
            Message::JoinReq(_) => Vec::new(),
        }
    }
}

/// Queues every frame until the next simulation step and keeps a log of
/// everything ever sent.
#[derive(Debug)]
pub struct SimNetwork {
    clock: ManualClock,
    pending: Mutex<VecDeque<Frame>>,
    log: Mutex<Vec<Frame>>,
}

impl SimNetwork {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            pending: Mutex::new(VecDeque::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    fn take_pending(&self) -> Vec<Frame> {
        self.pending.lock().drain(..).collect()
    }

    pub fn frames_from(&self, from: Address, sent_at: i64) -> Vec<Frame> {
        self.log
            .lock()
            .iter()
            .filter(|f| f.from == from && f.sent_at == sent_at)
            .cloned()
            .collect()
    }

    pub fn log(&self) -> Vec<Frame> {
        self.log.lock().clone()
    }
}

impl Transport for SimNetwork {
    fn send(&self, from: Address, to: Address, bytes: Bytes) {
        let frame = Frame {
            sent_at: self.clock.now(),
            from,
            to,
            bytes,
        };
        self.log.lock().push(frame.clone());
        self.pending.lock().push_back(frame);
    }
}

/// Many engines sharing one logical clock. Each step delivers the frames
/// sent during the previous step, then ticks every live node.
pub struct SimCluster {
    pub network: Arc<SimNetwork>,
    pub nodes: BTreeMap<Address, MembershipEngine>,
    pub crashed: BTreeSet<Address>,
    pub config: MembershipConfig,
    pub clock: ManualClock,
    seed: u64,
}

impl SimCluster {
    pub fn new(config: MembershipConfig) -> Self {
        init();
        let clock = ManualClock::new(0);
        Self {
            network: Arc::new(SimNetwork::new(clock.clone())),
            nodes: BTreeMap::new(),
            crashed: BTreeSet::new(),
            config,
            clock,
            seed: 0,
        }
    }

    pub fn address(index: u32) -> Address {
        Address::new(index + 1, 0)
    }

    pub fn add(&mut self, address: Address) -> &mut MembershipEngine {
        self.seed += 1;
        let selector: Box<dyn PeerSelector> = Box::new(RandomSelector::seeded(self.seed));
        self.add_with(address, selector)
    }

    pub fn add_with(&mut self, address: Address, selector: Box<dyn PeerSelector>) -> &mut MembershipEngine {
        let mut engine = MembershipEngine::builder()
            .address(address)
            .config(self.config.clone())
            .transport(self.network.clone())
            .selector(selector)
            .build();
        engine.initialize();
        self.nodes.insert(address, engine);
        self.nodes.get_mut(&address).expect("just inserted")
    }

    /// Adds a node and sends its join request to `rendezvous`.
    pub fn join(&mut self, address: Address, rendezvous: Address) {
        let now = self.now();
        self.add(address).join(rendezvous, now).expect("join");
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn node(&self, address: Address) -> &MembershipEngine {
        &self.nodes[&address]
    }

    pub fn crash(&mut self, address: Address) {
        self.crashed.insert(address);
    }

    pub fn step(&mut self) {
        let now = self.clock.advance(1);
        let mut inboxes: BTreeMap<Address, Vec<Frame>> = BTreeMap::new();
        for frame in self.network.take_pending() {
            inboxes.entry(frame.to).or_default().push(frame);
        }
        for (address, engine) in self.nodes.iter_mut() {
            if self.crashed.contains(address) {
                continue;
            }
            for frame in inboxes.remove(address).unwrap_or_default() {
                engine.on_message(&frame.bytes, now);
            }
            engine.on_tick(now);
        }
    }

    pub fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn live(&self) -> Vec<Address> {
        self.nodes
            .keys()
            .filter(|a| !self.crashed.contains(a))
            .copied()
            .collect()
    }

    pub fn converged(&self) -> bool {
        let live = self.live();
        live.iter().all(|a| self.node(*a).members() == live)
    }
}
