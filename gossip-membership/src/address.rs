use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::error::AddressParseError;

pub const ADDRESS_LEN: usize = 6;

/// Identity of a node: a 4 byte host id plus a 2 byte port.
///
/// The host id is stored as the little-endian interpretation of the four
/// address octets, so `1.0.0.0` has id `1`.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Encode,
    Decode,
    Serialize,
    Deserialize,
)]
pub struct Address {
    pub id: u32,
    pub port: u16,
}

impl Address {
    pub const NULL: Address = Address { id: 0, port: 0 };

    pub fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    /// Conventional rendezvous point every node joins through.
    pub fn default_introducer() -> Self {
        Self::new(1, 0)
    }

    pub fn is_null(&self) -> bool {
        self.to_bytes() == [0; ADDRESS_LEN]
    }

    pub fn to_bytes(&self) -> [u8; ADDRESS_LEN] {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[4..].copy_from_slice(&self.port.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        let id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let port = u16::from_le_bytes([bytes[4], bytes[5]]);
        Self { id, port }
    }

    pub fn octets(&self) -> [u8; 4] {
        self.id.to_le_bytes()
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{}.{}.{}.{}:{}", a, b, c, d, self.port)
    }
}

impl From<SocketAddrV4> for Address {
    fn from(value: SocketAddrV4) -> Self {
        Self {
            id: u32::from_le_bytes(value.ip().octets()),
            port: value.port(),
        }
    }
}

impl From<Address> for SocketAddrV4 {
    fn from(value: Address) -> Self {
        SocketAddrV4::new(Ipv4Addr::from(value.octets()), value.port)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s
            .parse()
            .map_err(|_| AddressParseError(s.to_string()))?;
        Ok(addr.into())
    }
}
