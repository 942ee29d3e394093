use std::any::type_name;

use anyhow::{anyhow, Context};
use bincode::config::{Configuration, Fixint, LittleEndian, NoLimit};
use bincode::{Decode, Encode};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::EnvFilter;

/// Fixed width little-endian integers, the layout every peer expects.
pub fn wire_config() -> Configuration<LittleEndian, Fixint, NoLimit> {
    bincode::config::legacy()
}

pub fn encode_bytes<T>(value: &T) -> anyhow::Result<Vec<u8>>
where
    T: Encode,
{
    bincode::encode_to_vec(value, wire_config()).context(type_name::<T>())
}

pub fn decode_bytes<T>(bytes: &[u8]) -> anyhow::Result<T>
where
    T: Decode<()>,
{
    bincode::decode_from_slice(bytes, wire_config())
        .context(type_name::<T>())
        .map(|(t, _)| t)
}

/// Installs a compact subscriber, one line per event so interleaved node
/// output stays readable. Fails if a global subscriber is already set.
pub fn init_logger(level: tracing::Level) -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::format()
        .with_timer(LocalTime::rfc_3339())
        .compact()
        .with_target(true);
    tracing_subscriber::FmtSubscriber::builder()
        .event_format(format)
        .with_max_level(level)
        .try_init()
        .map_err(|error| anyhow!("install logger at {}: {}", level, error))
}

pub fn init_logger_with_filter(filter: impl Into<EnvFilter>) -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::format()
        .with_timer(LocalTime::rfc_3339())
        .compact()
        .with_target(true)
        .with_thread_ids(false);
    tracing_subscriber::FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow!("install filtered logger: {}", error))
}
