use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::address::Address;

/// Chooses the gossip targets of one round.
///
/// `candidates` never contains the local node and `fanout` is never larger
/// than `candidates.len()`. Returned addresses must be distinct.
pub trait PeerSelector: Debug + Send {
    fn select(&mut self, candidates: &[Address], fanout: usize) -> Vec<Address>;
}

#[derive(Debug)]
pub struct RandomSelector {
    rng: StdRng,
}

impl RandomSelector {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl PeerSelector for RandomSelector {
    fn select(&mut self, candidates: &[Address], fanout: usize) -> Vec<Address> {
        candidates
            .choose_multiple(&mut self.rng, fanout)
            .copied()
            .collect()
    }
}

/// Walks the candidate list in order, resuming where the previous round
/// stopped.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    cursor: usize,
}

impl PeerSelector for RoundRobinSelector {
    fn select(&mut self, candidates: &[Address], fanout: usize) -> Vec<Address> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let start = self.cursor % candidates.len();
        self.cursor = start + fanout;
        candidates
            .iter()
            .cycle()
            .skip(start)
            .take(fanout.min(candidates.len()))
            .copied()
            .collect()
    }
}
