//! Configuration for the outbox.
//!
//! [`OutboxConfig`] carries the sizing and timing constants for the slot
//! pools and the control ring. Defaults suit a small embedded-class device;
//! deployments override them from a TOML file and/or `OUTBOX_*` environment
//! variables via the `config` crate. Duration fields accept human-readable
//! values ("5s", "250ms") through `humantime-serde`.
//!
//! All values are fixed at construction time: the outbox never resizes its
//! static tier or its per-slot buffer capacities while running, which is what
//! bounds resident memory (see [`OutboxConfig::max_resident_bytes`]).

use crate::error::{OutboxError, OutboxResult};
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sizing and timing constants for an [`crate::outbox::Outbox`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Number of always-resident slots in the static tier (N₁).
    pub static_slots: usize,

    /// Slots per dynamic overflow block (N₂).
    pub block_slots: usize,

    /// Maximum number of dynamic blocks (B). Zero disables overflow growth;
    /// bursts beyond the static tier then evict the oldest in-flight message.
    pub max_blocks: usize,

    /// Topic buffer capacity per slot; stored topics are clamped to one byte
    /// less, preserving the wire-interop sizing convention.
    pub topic_max: usize,

    /// Payload buffer capacity per slot; stored payloads are clamped to one
    /// byte less.
    pub payload_max: usize,

    /// How long a tracked message may wait for its acknowledgement before the
    /// sweeper frees the slot.
    #[serde(with = "humantime_serde")]
    pub ack_timeout: Duration,

    /// How long a fully-free dynamic block survives before the sweeper
    /// returns it to the allocator. Generous by default to avoid alloc/free
    /// thrash across bursts.
    #[serde(with = "humantime_serde")]
    pub block_idle_timeout: Duration,

    /// Entry count of the control ring (R).
    pub ring_capacity: usize,

    /// Control-ring entries older than this many sweep ticks are expired.
    pub control_expiry_ticks: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            static_slots: 3,
            block_slots: 3,
            max_blocks: 8,
            topic_max: 128,
            payload_max: 512,
            ack_timeout: Duration::from_secs(5),
            block_idle_timeout: Duration::from_secs(60),
            ring_capacity: 8,
            control_expiry_ticks: 30,
        }
    }
}

impl OutboxConfig {
    /// Load configuration from an optional TOML file, then apply `OUTBOX_*`
    /// environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> OutboxResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let source = builder
            .add_source(config::Environment::with_prefix("OUTBOX").try_parsing(true))
            .build()?;

        // Missing keys fall back to the serde defaults.
        let cfg: Self = source.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the pools cannot be built from.
    pub fn validate(&self) -> OutboxResult<()> {
        if self.static_slots == 0 {
            return Err(OutboxError::Configuration(
                "static_slots must be at least 1".into(),
            ));
        }
        if self.block_slots == 0 {
            return Err(OutboxError::Configuration(
                "block_slots must be at least 1".into(),
            ));
        }
        if self.topic_max < 2 {
            return Err(OutboxError::Configuration(
                "topic_max must be at least 2 (one stored byte plus headroom)".into(),
            ));
        }
        if self.payload_max < 2 {
            return Err(OutboxError::Configuration(
                "payload_max must be at least 2 (one stored byte plus headroom)".into(),
            ));
        }
        if self.ack_timeout.is_zero() {
            return Err(OutboxError::Configuration(
                "ack_timeout must be greater than zero".into(),
            ));
        }
        if self.block_idle_timeout.is_zero() {
            return Err(OutboxError::Configuration(
                "block_idle_timeout must be greater than zero".into(),
            ));
        }
        if self.ring_capacity == 0 {
            return Err(OutboxError::Configuration(
                "ring_capacity must be at least 1".into(),
            ));
        }
        if self.control_expiry_ticks == 0 {
            return Err(OutboxError::Configuration(
                "control_expiry_ticks must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Upper bound on pool buffer memory:
    /// `N₁·(topic_max+payload_max) + B·N₂·(topic_max+payload_max)`.
    pub fn max_resident_bytes(&self) -> usize {
        let per_slot = self.topic_max + self.payload_max;
        self.static_slots * per_slot + self.max_blocks * self.block_slots * per_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = OutboxConfig::default();
        assert_eq!(cfg.static_slots, 3);
        assert_eq!(cfg.block_slots, 3);
        assert_eq!(cfg.max_blocks, 8);
        assert_eq!(cfg.topic_max, 128);
        assert_eq!(cfg.payload_max, 512);
        assert_eq!(cfg.ack_timeout, Duration::from_secs(5));
        assert_eq!(cfg.block_idle_timeout, Duration::from_secs(60));
        assert_eq!(cfg.ring_capacity, 8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn resident_bound_follows_formula() {
        let cfg = OutboxConfig::default();
        assert_eq!(cfg.max_resident_bytes(), (3 + 8 * 3) * (128 + 512));
    }

    #[test]
    fn zero_static_slots_is_rejected() {
        let cfg = OutboxConfig {
            static_slots: 0,
            ..OutboxConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(OutboxError::Configuration(_))
        ));
    }

    #[test]
    fn zero_ack_timeout_is_rejected() {
        let cfg = OutboxConfig {
            ack_timeout: Duration::ZERO,
            ..OutboxConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn loads_overrides_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "static_slots = 5\nack_timeout = \"250ms\"\npayload_max = 64"
        )
        .unwrap();

        let cfg = OutboxConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.static_slots, 5);
        assert_eq!(cfg.ack_timeout, Duration::from_millis(250));
        assert_eq!(cfg.payload_max, 64);
        // untouched keys keep their defaults
        assert_eq!(cfg.max_blocks, 8);
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "ring_capacity = 0").unwrap();

        assert!(OutboxConfig::load(Some(file.path())).is_err());
    }
}
