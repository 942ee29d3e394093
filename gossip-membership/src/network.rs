use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::address::Address;
use crate::collaborator::Transport;

/// In-process network: every registered node owns an unbounded inbox.
/// Frames to unknown or stopped nodes vanish, and a configurable share of
/// frames is dropped at random.
#[derive(Debug)]
pub struct ChannelNetwork {
    inboxes: DashMap<Address, UnboundedSender<Bytes>>,
    drop_rate: f64,
    rng: Mutex<StdRng>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::with_drop_rate(0.0, rand::random())
    }

    pub fn with_drop_rate(drop_rate: f64, seed: u64) -> Self {
        Self {
            inboxes: DashMap::new(),
            drop_rate: drop_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn register(&self, address: Address) -> UnboundedReceiver<Bytes> {
        let (tx, rx) = unbounded_channel();
        self.inboxes.insert(address, tx);
        rx
    }

    pub fn unregister(&self, address: &Address) {
        self.inboxes.remove(address);
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.inboxes.contains_key(address)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_drop(&self) -> bool {
        self.drop_rate > 0.0 && self.rng.lock().gen_bool(self.drop_rate)
    }
}

impl Default for ChannelNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ChannelNetwork {
    fn send(&self, from: Address, to: Address, bytes: Bytes) {
        if self.should_drop() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("drop {} bytes {} -> {}", bytes.len(), from, to);
            return;
        }
        let delivered = self
            .inboxes
            .get(&to)
            .map(|inbox| inbox.send(bytes).is_ok())
            .unwrap_or(false);
        if delivered {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("{} unreachable from {}", to, from);
        }
    }
}
