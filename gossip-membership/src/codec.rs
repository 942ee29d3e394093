use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::entry::{MembershipEntry, DEAD_MARKER, ENTRY_WIRE_LEN};
use crate::error::FormatError;
use crate::ext::{decode_bytes, encode_bytes};
use crate::table::MembershipTable;

pub const LENGTH_PREFIX_LEN: usize = 8;

/// Serializes the table as an 8 byte block length followed by one fixed width
/// record per entry.
///
/// Peers not refreshed for more than `t_fail` are sent with [`DEAD_MARKER`]
/// in place of their heartbeat, so suspicion reaches the rest of the group
/// before the entry is evicted here.
pub fn encode_table(table: &MembershipTable, now: i64) -> anyhow::Result<Bytes> {
    let mut dst = BytesMut::with_capacity(LENGTH_PREFIX_LEN + table.len() * ENTRY_WIRE_LEN);
    encode_table_into(table, now, &mut dst)?;
    Ok(dst.freeze())
}

pub fn encode_table_into(table: &MembershipTable, now: i64, dst: &mut BytesMut) -> anyhow::Result<()> {
    dst.put_u64_le((table.len() * ENTRY_WIRE_LEN) as u64);
    for entry in table.entries() {
        let mut record = *entry;
        if table.is_suspected(entry, now) {
            record.heartbeat = DEAD_MARKER;
        }
        dst.put_slice(&encode_bytes(&record)?);
    }
    Ok(())
}

/// Decodes a table block from the front of `src`. Bytes after the declared
/// block are left alone.
pub fn decode_table(src: &[u8]) -> Result<Vec<MembershipEntry>, FormatError> {
    decode_table_from(&mut &src[..])
}

pub fn decode_table_from(src: &mut &[u8]) -> Result<Vec<MembershipEntry>, FormatError> {
    if src.remaining() < LENGTH_PREFIX_LEN {
        return Err(FormatError::Truncated {
            expected: LENGTH_PREFIX_LEN,
            actual: src.remaining(),
        });
    }
    let block_len = src.get_u64_le();
    if block_len % ENTRY_WIRE_LEN as u64 != 0 {
        return Err(FormatError::Misaligned {
            len: block_len,
            record: ENTRY_WIRE_LEN,
        });
    }
    let expected = usize::try_from(block_len).unwrap_or(usize::MAX);
    if src.remaining() < expected {
        return Err(FormatError::Truncated {
            expected,
            actual: src.remaining(),
        });
    }
    let data: &[u8] = *src;
    let (block, rest) = data.split_at(expected);
    let entries = block
        .chunks_exact(ENTRY_WIRE_LEN)
        .map(|record| {
            decode_bytes::<MembershipEntry>(record).map_err(|e| FormatError::Record(format!("{:#}", e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    *src = rest;
    Ok(entries)
}
