use std::fmt::{Display, Formatter};

use bincode::{Decode, Encode};
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::address::Address;
use crate::codec::{decode_table_from, encode_table_into};
use crate::entry::MembershipEntry;
use crate::error::FormatError;
use crate::ext::{decode_bytes, encode_bytes};
use crate::table::MembershipTable;

pub const HEADER_LEN: usize = 4;

/// Address, one reserved byte, heartbeat.
pub const JOIN_REQUEST_LEN: usize = 6 + 1 + 8;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    JoinReq = 0,
    JoinRep = 1,
    Heartbeat = 2,
}

impl TryFrom<u32> for MessageKind {
    type Error = FormatError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::JoinReq),
            1 => Ok(MessageKind::JoinRep),
            2 => Ok(MessageKind::Heartbeat),
            other => Err(FormatError::UnknownKind(other)),
        }
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::JoinReq => write!(f, "JOINREQ"),
            MessageKind::JoinRep => write!(f, "JOINREP"),
            MessageKind::Heartbeat => write!(f, "HEARTBEAT"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct JoinRequest {
    pub address: Address,
    pub heartbeat: i64,
}

#[derive(Debug, Encode, Decode)]
struct JoinRequestPacket {
    address: Address,
    reserved: u8,
    heartbeat: i64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
    JoinReq(JoinRequest),
    JoinRep(Vec<MembershipEntry>),
    Heartbeat(Vec<MembershipEntry>),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::JoinReq(_) => MessageKind::JoinReq,
            Message::JoinRep(_) => MessageKind::JoinRep,
            Message::Heartbeat(_) => MessageKind::Heartbeat,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, FormatError> {
        let mut src = bytes;
        if src.remaining() < HEADER_LEN {
            return Err(FormatError::Truncated {
                expected: HEADER_LEN,
                actual: src.remaining(),
            });
        }
        let kind = MessageKind::try_from(src.get_u32_le())?;
        let message = match kind {
            MessageKind::JoinReq => {
                if src.remaining() < JOIN_REQUEST_LEN {
                    return Err(FormatError::Truncated {
                        expected: JOIN_REQUEST_LEN,
                        actual: src.remaining(),
                    });
                }
                let packet = decode_bytes::<JoinRequestPacket>(&src[..JOIN_REQUEST_LEN])
                    .map_err(|e| FormatError::Record(format!("{:#}", e)))?;
                Message::JoinReq(JoinRequest {
                    address: packet.address,
                    heartbeat: packet.heartbeat,
                })
            }
            MessageKind::JoinRep => Message::JoinRep(decode_table_from(&mut src)?),
            MessageKind::Heartbeat => Message::Heartbeat(decode_table_from(&mut src)?),
        };
        Ok(message)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::JoinReq(req) => write!(f, "{}({}, heartbeat: {})", self.kind(), req.address, req.heartbeat),
            Message::JoinRep(entries) | Message::Heartbeat(entries) => {
                write!(f, "{}({} entries)", self.kind(), entries.len())
            }
        }
    }
}

pub fn encode_join_request(request: &JoinRequest) -> anyhow::Result<Bytes> {
    let packet = JoinRequestPacket {
        address: request.address,
        reserved: 0,
        heartbeat: request.heartbeat,
    };
    let body = encode_bytes(&packet)?;
    let mut dst = BytesMut::with_capacity(HEADER_LEN + body.len());
    dst.put_u32_le(MessageKind::JoinReq as u32);
    dst.put_slice(&body);
    Ok(dst.freeze())
}

/// Frames the whole table as a JOINREP or HEARTBEAT.
pub fn encode_table_message(kind: MessageKind, table: &MembershipTable, now: i64) -> anyhow::Result<Bytes> {
    debug_assert_ne!(kind, MessageKind::JoinReq);
    let mut dst = BytesMut::new();
    dst.put_u32_le(kind as u32);
    encode_table_into(table, now, &mut dst)?;
    Ok(dst.freeze())
}
