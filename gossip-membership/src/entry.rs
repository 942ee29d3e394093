use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// Heartbeat value gossiped for a peer that looks unreachable. Real heartbeats
/// start at zero, so the marker compares older than any of them.
pub const DEAD_MARKER: i64 = -1;

/// Bytes per entry on the wire: id, port, heartbeat, last updated.
pub const ENTRY_WIRE_LEN: usize = 4 + 2 + 8 + 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub id: u32,
    pub port: u16,
    pub heartbeat: i64,
    pub last_updated: i64,
}

impl MembershipEntry {
    pub fn new(address: Address, heartbeat: i64, last_updated: i64) -> Self {
        Self {
            id: address.id,
            port: address.port,
            heartbeat,
            last_updated,
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.id, self.port)
    }

    pub fn is_dead_marker(&self) -> bool {
        self.heartbeat == DEAD_MARKER
    }

    pub fn staleness(&self, now: i64) -> i64 {
        now - self.last_updated
    }
}

impl Display for MembershipEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MembershipEntry({}, heartbeat: {}, last_updated: {})",
            self.address(),
            self.heartbeat,
            self.last_updated
        )
    }
}
