use ahash::HashMap;
use itertools::Itertools;
use tracing::trace;

use crate::address::Address;
use crate::entry::{MembershipEntry, DEAD_MARKER};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MergeOutcome {
    /// First sighting of the identity.
    Inserted,
    /// Strictly fresher heartbeat accepted.
    Refreshed,
    /// Stale, equal, dead marker or the local entry.
    Ignored,
}

/// A node's local view of the group, unique by `(id, port)`.
///
/// The table always knows which identity is the local node, but only holds an
/// entry for it once the node has joined. The local entry is written by
/// [`MembershipTable::tick_self`] alone and never evicted.
#[derive(Debug, Clone)]
pub struct MembershipTable {
    myself: Address,
    t_fail: i64,
    t_remove: i64,
    entries: HashMap<Address, MembershipEntry>,
}

impl MembershipTable {
    pub fn new(myself: Address, t_fail: i64, t_remove: i64) -> Self {
        debug_assert!(t_remove > t_fail, "t_remove must be greater than t_fail");
        Self {
            myself,
            t_fail,
            t_remove,
            entries: HashMap::default(),
        }
    }

    pub fn myself(&self) -> Address {
        self.myself
    }

    pub fn t_fail(&self) -> i64 {
        self.t_fail
    }

    pub fn t_remove(&self) -> i64 {
        self.t_remove
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, address: &Address) -> Option<&MembershipEntry> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MembershipEntry> {
        self.entries.values()
    }

    /// Entries ordered by address, for stable output.
    pub fn snapshot(&self) -> Vec<MembershipEntry> {
        self.entries
            .values()
            .copied()
            .sorted_by_key(|e| e.address())
            .collect()
    }

    /// Known identities other than the local node, ordered by address.
    pub fn peers(&self) -> Vec<Address> {
        self.entries
            .keys()
            .filter(|addr| **addr != self.myself)
            .copied()
            .sorted()
            .collect()
    }

    /// Peers not refreshed for more than `t_fail`. They are still members
    /// locally but are gossiped with the dead marker.
    pub fn suspected(&self, now: i64) -> Vec<Address> {
        self.entries
            .values()
            .filter(|e| e.address() != self.myself && self.is_suspected(e, now))
            .map(|e| e.address())
            .sorted()
            .collect()
    }

    pub fn is_suspected(&self, entry: &MembershipEntry, now: i64) -> bool {
        entry.staleness(now) > self.t_fail
    }

    /// Adds the local entry if absent. Returns `true` when it was inserted.
    pub fn insert_self(&mut self, heartbeat: i64, now: i64) -> bool {
        if self.entries.contains_key(&self.myself) {
            return false;
        }
        self.entries
            .insert(self.myself, MembershipEntry::new(self.myself, heartbeat, now));
        true
    }

    /// Overwrites the local entry with the owner's heartbeat. Returns `false`
    /// if the node has not joined yet.
    pub fn tick_self(&mut self, heartbeat: i64, now: i64) -> bool {
        match self.entries.get_mut(&self.myself) {
            None => false,
            Some(entry) => {
                entry.heartbeat = heartbeat;
                entry.last_updated = now;
                true
            }
        }
    }

    /// Inserts or overwrites a peer entry without the freshness comparison.
    /// Returns `true` if the peer was not known before.
    pub fn upsert(&mut self, address: Address, heartbeat: i64, now: i64) -> bool {
        if address == self.myself {
            return false;
        }
        self.entries
            .insert(address, MembershipEntry::new(address, heartbeat, now))
            .is_none()
    }

    /// Folds one gossiped entry into the table.
    pub fn merge(&mut self, incoming: &MembershipEntry, now: i64) -> MergeOutcome {
        let address = incoming.address();
        if address == self.myself {
            return MergeOutcome::Ignored;
        }
        match self.entries.get_mut(&address) {
            Some(local) => {
                if incoming.heartbeat != DEAD_MARKER && incoming.heartbeat > local.heartbeat {
                    trace!(
                        "{} heartbeat of {} advanced {} -> {}",
                        self.myself, address, local.heartbeat, incoming.heartbeat
                    );
                    local.heartbeat = incoming.heartbeat;
                    local.last_updated = now;
                    MergeOutcome::Refreshed
                } else {
                    MergeOutcome::Ignored
                }
            }
            None if incoming.heartbeat == DEAD_MARKER => MergeOutcome::Ignored,
            None => {
                self.entries
                    .insert(address, MembershipEntry::new(address, incoming.heartbeat, now));
                MergeOutcome::Inserted
            }
        }
    }

    /// Removes every peer whose last update is more than `t_remove` ago and
    /// returns the removed identities ordered by address.
    pub fn evict_stale(&mut self, now: i64) -> Vec<Address> {
        let myself = self.myself;
        let t_remove = self.t_remove;
        let mut removed = Vec::new();
        self.entries.retain(|addr, entry| {
            let stale = *addr != myself && entry.staleness(now) > t_remove;
            if stale {
                removed.push(*addr);
            }
            !stale
        });
        removed.sort();
        removed
    }
}
