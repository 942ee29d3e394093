use std::time::Duration;

use anyhow::ensure;
use config::builder::DefaultState;
use config::{File, FileFormat, Source};
use serde::{Deserialize, Serialize};

use crate::MEMBERSHIP_CONFIG;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Rounds without a fresher heartbeat before a peer is gossiped as dead.
    pub t_fail: i64,
    /// Rounds without a fresher heartbeat before a peer is evicted.
    pub t_remove: i64,
    /// Peers pushed to per round.
    pub fanout: usize,
    pub tick_interval_ms: u64,
}

impl MembershipConfig {
    pub fn builder() -> MembershipConfigBuilder {
        MembershipConfigBuilder::default()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.t_fail >= 0, "t_fail must be >= 0, got {}", self.t_fail);
        ensure!(
            self.t_remove > self.t_fail,
            "t_remove ({}) must be greater than t_fail ({})",
            self.t_remove,
            self.t_fail
        );
        ensure!(self.fanout >= 1, "fanout must be >= 1");
        ensure!(self.tick_interval_ms >= 1, "tick_interval_ms must be >= 1");
        Ok(())
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            t_fail: 5,
            t_remove: 20,
            fanout: 3,
            tick_interval_ms: 100,
        }
    }
}

#[derive(Debug, Default)]
pub struct MembershipConfigBuilder {
    builder: config::ConfigBuilder<DefaultState>,
}

impl MembershipConfigBuilder {
    pub fn add_source<T>(self, source: T) -> Self
    where
        T: Source + Send + Sync + 'static,
    {
        Self {
            builder: self.builder.add_source(source),
        }
    }

    pub fn set_override(self, key: &str, value: impl Into<config::Value>) -> anyhow::Result<Self> {
        Ok(Self {
            builder: self.builder.set_override(key, value)?,
        })
    }

    pub fn build(self) -> anyhow::Result<MembershipConfig> {
        let defaults = config::Config::builder()
            .add_source(File::from_str(MEMBERSHIP_CONFIG, FileFormat::Toml))
            .build()?;
        let builder = config::Config::builder()
            .add_source(defaults)
            .add_source(self.builder.build()?);
        let config = builder.build()?.try_deserialize::<MembershipConfig>()?;
        config.validate()?;
        Ok(config)
    }
}
