//! # MQTT Outbox
//!
//! A publish-tracking outbox for at-least-once delivery on long-running,
//! resource-constrained processes. The outbox sits between an application
//! that produces messages and a transport client that publishes them to a
//! broker: every acknowledgement-bearing publish is copied into a slot and
//! retained until the broker confirms delivery or a timeout expires.
//!
//! The interesting machinery is the tiered slot allocator: a small static
//! pool covers steady-state traffic, elastic overflow blocks absorb bursts,
//! and when everything is full the oldest in-flight message is evicted so
//! newer work keeps its delivery chance. Overflow blocks are reclaimed only
//! after an idle period, so weeks of bursty uptime do not churn the heap.
//!
//! ## Crate Structure
//!
//! - **`outbox`**: the [`outbox::Outbox`] facade — `publish`, `track`,
//!   `rebind`, `on_published`, `tick`, `clear_all`.
//! - **`pool`**: the two-tier slot pool — slot banks over contiguous buffer
//!   arenas, the dynamic block pool, and the tiered admission/eviction
//!   policy.
//! - **`control_ring`**: small fixed ring for control and QoS-0 traffic that
//!   shares the sweeper's tick.
//! - **`transport`**: the narrow transport contract the core consumes, plus
//!   an always-available mock for tests.
//! - **`clock`**: monotonic time injection; production `Instant` clock and a
//!   manually-advanced test clock.
//! - **`config`**: sizing and timing constants with TOML/env loading and
//!   validation.
//! - **`diagnostics`**: monotonic counters (peak burst, max payload,
//!   timeouts, late acks).
//! - **`error`**: the crate error type; nothing panics across the public
//!   boundary.
//! - **`telemetry`**: optional tracing-subscriber setup for embedders.
//! - **`ticker`**: optional tokio interval task driving `tick()` behind the
//!   shared mutex.

pub mod clock;
pub mod config;
pub mod control_ring;
pub mod diagnostics;
pub mod error;
pub mod outbox;
pub mod pool;
pub mod telemetry;
pub mod ticker;
pub mod transport;

pub use config::OutboxConfig;
pub use error::{OutboxError, OutboxResult};
pub use outbox::Outbox;
pub use transport::{MessageId, QoS, Transport};
