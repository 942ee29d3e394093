use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::info;

use crate::address::Address;

/// Best-effort, fire-and-forget delivery of raw frames between nodes.
/// Implementations must not block the caller.
pub trait Transport: Debug + Send + Sync {
    fn send(&self, from: Address, to: Address, bytes: Bytes);
}

/// Monotonically non-decreasing time in the host's units.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> i64;
}

/// Side channel for membership changes seen by one node.
pub trait MembershipObserver: Debug + Send + Sync {
    fn on_node_joined(&self, myself: Address, peer: Address);

    fn on_node_removed(&self, myself: Address, peer: Address);
}

#[derive(Debug, Default, Copy, Clone)]
pub struct TracingObserver;

impl MembershipObserver for TracingObserver {
    fn on_node_joined(&self, myself: Address, peer: Address) {
        info!(node = %myself, peer = %peer, "node joined");
    }

    fn on_node_removed(&self, myself: Address, peer: Address) {
        info!(node = %myself, peer = %peer, "node removed");
    }
}

/// A clock advanced by hand, shared by every node of a simulation.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn advance(&self, by: i64) -> i64 {
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }

    pub fn set(&self, now: i64) {
        self.now.fetch_max(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall time measured in whole protocol rounds since creation.
#[derive(Debug, Clone)]
pub struct RoundClock {
    start: Instant,
    round: Duration,
}

impl RoundClock {
    pub fn new(round: Duration) -> Self {
        Self {
            start: Instant::now(),
            round,
        }
    }
}

impl Clock for RoundClock {
    fn now(&self) -> i64 {
        let round = self.round.as_nanos().max(1);
        (self.start.elapsed().as_nanos() / round) as i64
    }
}
