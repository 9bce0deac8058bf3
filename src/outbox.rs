//! Outbox facade: publish tracking, acknowledgement reconciliation, and
//! periodic maintenance.
//!
//! [`Outbox`] owns the tiered slot allocator, the control ring and the
//! diagnostics counters, and exposes the full public surface:
//!
//! - [`Outbox::publish`] / [`Outbox::track`] — admit a message into the slot
//!   pools (and, for `publish`, hand it to the transport).
//! - [`Outbox::on_published`] — reconcile an acknowledgement with its slot.
//! - [`Outbox::rebind`] — swap a provisional id for the transport-assigned
//!   one.
//! - [`Outbox::tick`] — the sweeper: timeout expiry, idle-block reclamation,
//!   control-ring expiry. Idempotent and safe at any frequency.
//! - [`Outbox::clear_all`] — coarse cancellation; drops everything.
//!
//! Every operation runs to completion on the calling thread; nothing here
//! suspends. Multi-threaded embedders serialise all entry points behind one
//! mutex (see [`crate::ticker`]).

use crate::clock::{Clock, MonotonicClock};
use crate::config::OutboxConfig;
use crate::control_ring::{ControlMessage, ControlRing, ControlState};
use crate::diagnostics::Diagnostics;
use crate::error::{OutboxError, OutboxResult};
use crate::pool::{Admission, TieredAllocator};
use crate::transport::{MessageId, QoS, Transport};
use tracing::{debug, info, warn};

/// MQTT PUBLISH packet type, recorded on untracked ring entries.
const PUBLISH_MSG_TYPE: u8 = 3;

/// Publish-tracking outbox over a two-tier slot pool.
pub struct Outbox {
    cfg: OutboxConfig,
    clock: Box<dyn Clock>,
    alloc: TieredAllocator,
    ring: ControlRing,
    diag: Diagnostics,
    tick_seq: u64,
}

impl Outbox {
    /// Build an outbox from a validated configuration, using the production
    /// monotonic clock.
    pub fn new(cfg: OutboxConfig) -> OutboxResult<Self> {
        Self::with_clock(cfg, Box::new(MonotonicClock::new()))
    }

    /// Build an outbox with an injected clock (tests drive timeouts with
    /// [`crate::clock::ManualClock`]).
    pub fn with_clock(cfg: OutboxConfig, clock: Box<dyn Clock>) -> OutboxResult<Self> {
        cfg.validate()?;
        let alloc = TieredAllocator::new(
            cfg.static_slots,
            cfg.block_slots,
            cfg.max_blocks,
            cfg.topic_max,
            cfg.payload_max,
        )?;
        let ring = ControlRing::new(cfg.ring_capacity);
        Ok(Self {
            cfg,
            clock,
            alloc,
            ring,
            diag: Diagnostics::new(),
            tick_seq: 0,
        })
    }

    /// Publish a message through `transport`, tracking it until the broker
    /// acknowledges when the QoS requires one.
    ///
    /// QoS-0 messages bypass the slot pools entirely: they are handed to the
    /// transport and recorded in the control ring as already transmitted.
    /// Over-long topics and payloads are clamped to the slot capacities with
    /// a warning; the tracked path rejects empty topics and payloads.
    pub fn publish(
        &mut self,
        transport: &mut dyn Transport,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> OutboxResult<MessageId> {
        if topic.is_empty() {
            return Err(OutboxError::InvalidArgument("topic must not be empty"));
        }

        if !qos.requires_ack() {
            let id = transport
                .publish(topic, payload, qos, retain)
                .map_err(OutboxError::Transport)?;
            if id < 0 {
                return Err(OutboxError::TransportRejected(id));
            }
            self.ring.enqueue(
                ControlMessage {
                    id,
                    msg_type: PUBLISH_MSG_TYPE,
                    qos,
                    data: payload.to_vec(),
                    remaining: 0,
                },
                self.tick_seq,
            );
            self.ring.set_state(id, ControlState::Transmitted);
            return Ok(id);
        }

        if payload.is_empty() {
            return Err(OutboxError::InvalidArgument(
                "acknowledged publish requires a payload",
            ));
        }

        let now_us = self.clock.now_micros();
        let (topic_clamped, payload_clamped) = self.clamp(topic, payload);

        // hygiene pass before admission
        self.sweep(now_us);

        let addr = self.admit(now_us, topic_clamped, payload_clamped, retain)?;

        let result = transport.publish(
            self.alloc.topic(addr),
            self.alloc.payload(addr),
            qos,
            retain,
        );
        match result {
            Ok(id) if id >= 0 => {
                self.alloc.set_msg_id(addr, id);
                debug!(msg_id = id, topic, "tracking publish until acknowledged");
                Ok(id)
            }
            Ok(id) => {
                self.alloc.release(addr, now_us);
                warn!(msg_id = id, topic, "transport rejected publish");
                Err(OutboxError::TransportRejected(id))
            }
            Err(err) => {
                self.alloc.release(addr, now_us);
                warn!(error = %err, topic, "transport publish failed");
                Err(OutboxError::Transport(err))
            }
        }
    }

    /// Register a message the transport has already emitted, storing the
    /// supplied id directly.
    ///
    /// The id may be a caller-chosen provisional value (negative) to be
    /// replaced later through [`Outbox::rebind`].
    pub fn track(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
        msg_id: MessageId,
    ) -> OutboxResult<MessageId> {
        if topic.is_empty() {
            return Err(OutboxError::InvalidArgument("topic must not be empty"));
        }
        if payload.is_empty() {
            return Err(OutboxError::InvalidArgument(
                "tracked message requires a payload",
            ));
        }

        let now_us = self.clock.now_micros();
        let (topic_clamped, payload_clamped) = self.clamp(topic, payload);
        self.sweep(now_us);

        let addr = self.admit(now_us, topic_clamped, payload_clamped, retain)?;
        self.alloc.set_msg_id(addr, msg_id);
        debug!(msg_id, topic, "tracking externally published message");
        Ok(msg_id)
    }

    /// Replace a provisional id with the transport-assigned one, in place.
    ///
    /// No-op when the provisional id is zero, the final id is not positive,
    /// the ids are equal, or no tracked message carries the provisional id
    /// (logged as a miss).
    pub fn rebind(&mut self, provisional_id: MessageId, final_id: MessageId) {
        if provisional_id == 0 || final_id <= 0 || provisional_id == final_id {
            return;
        }
        match self.alloc.find(provisional_id) {
            Some(addr) => {
                self.alloc.set_msg_id(addr, final_id);
                debug!(provisional_id, final_id, "rebound provisional message id");
            }
            None => {
                warn!(provisional_id, final_id, "rebind found no tracked message");
            }
        }
    }

    /// Reconcile a broker acknowledgement with its tracked slot.
    ///
    /// Late and duplicate acknowledgements are tolerated: a miss is counted
    /// and logged, nothing else changes.
    pub fn on_published(&mut self, msg_id: MessageId) {
        let now_us = self.clock.now_micros();
        match self.alloc.find(msg_id) {
            Some(addr) => {
                self.alloc.release(addr, now_us);
                debug!(msg_id, "delivery acknowledged");
            }
            None => {
                self.diag.record_late_ack();
                warn!(
                    msg_id,
                    "acknowledgement for unknown message id (late, duplicate, or evicted)"
                );
            }
        }
    }

    /// Periodic maintenance: expire overdue tracked messages, reclaim idle
    /// overflow blocks, expire stale control-ring entries.
    pub fn tick(&mut self) {
        self.tick_seq += 1;
        let now_us = self.clock.now_micros();
        self.sweep(now_us);
        let expired = self
            .ring
            .delete_expired(self.tick_seq, self.cfg.control_expiry_ticks);
        if expired > 0 {
            debug!(count = expired, "expired stale control-ring entries");
        }
    }

    /// Coarse cancellation: free every slot, drop every overflow block,
    /// empty the control ring, zero the diagnostics.
    pub fn clear_all(&mut self) {
        self.alloc.clear();
        self.ring.clear();
        self.diag.reset();
        info!("outbox cleared");
    }

    /// Emit the diagnostics counters and block count at info level.
    pub fn log_diagnostics(&self) {
        self.diag.emit(self.alloc.block_count());
    }

    /// Bytes currently held by the control ring.
    pub fn size(&self) -> usize {
        self.ring.total_bytes()
    }

    /// Snapshot of the diagnostics counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diag
    }

    /// Currently occupied tracking slots across both tiers.
    pub fn occupied(&self) -> usize {
        self.alloc.occupied()
    }

    /// Currently allocated overflow blocks.
    pub fn block_count(&self) -> usize {
        self.alloc.block_count()
    }

    /// Sweep tick counter, advanced by every [`Outbox::tick`].
    pub fn current_tick(&self) -> u64 {
        self.tick_seq
    }

    /// The configuration the outbox was built from.
    pub fn config(&self) -> &OutboxConfig {
        &self.cfg
    }

    /// Read access to the control ring.
    pub fn control(&self) -> &ControlRing {
        &self.ring
    }

    /// Queue a control message, stamped with the current sweep tick.
    pub fn enqueue_control(&mut self, msg: ControlMessage) -> usize {
        self.ring.enqueue(msg, self.tick_seq)
    }

    /// Mark a control entry's handshake step.
    pub fn set_control_state(&mut self, id: MessageId, state: ControlState) -> bool {
        self.ring.set_state(id, state)
    }

    /// Re-stamp a control entry with the current sweep tick, restarting its
    /// expiry lease (used by retransmission pumps).
    pub fn touch_control(&mut self, id: MessageId) -> bool {
        self.ring.set_tick(id, self.tick_seq)
    }

    /// First control entry in the requested state, if any.
    pub fn control_by_state(&self, state: ControlState) -> Option<&ControlMessage> {
        self.ring.dequeue_by_state(state)
    }

    /// Remove a control entry. Deletions of acknowledged-QoS entries are
    /// forwarded to the reconciler, since they signal completed delivery.
    pub fn delete_control(&mut self, id: MessageId) -> Option<ControlMessage> {
        let msg = self.ring.delete_by_id(id)?;
        if msg.qos.requires_ack() {
            self.on_published(id);
        }
        Some(msg)
    }

    /// Admission: sweep already ran; clamped buffers go into whichever slot
    /// the allocator hands out, with eviction logged.
    fn admit(
        &mut self,
        now_us: u64,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> OutboxResult<crate::pool::SlotAddr> {
        let admission = self.alloc.acquire().ok_or(OutboxError::NoCapacity)?;
        if let Admission::Evicted { lost_id, .. } = admission {
            warn!(
                lost_id,
                "slot pools saturated, evicted oldest in-flight message"
            );
        }
        let addr = admission.addr();
        self.alloc
            .fill(addr, topic.as_bytes(), payload, retain, -1, now_us);
        self.diag.record_burst(self.alloc.occupied());
        self.diag.record_payload_len(payload.len());
        Ok(addr)
    }

    /// Clamp topic and payload to the slot capacities, warning once per call
    /// when anything was cut.
    fn clamp<'a>(&self, topic: &'a str, payload: &'a [u8]) -> (&'a str, &'a [u8]) {
        let topic_clamped = clamp_str(topic, self.cfg.topic_max - 1);
        let payload_clamped = &payload[..payload.len().min(self.cfg.payload_max - 1)];
        if topic_clamped.len() < topic.len() || payload_clamped.len() < payload.len() {
            warn!(
                topic_truncated = topic_clamped.len() < topic.len(),
                payload_truncated = payload_clamped.len() < payload.len(),
                topic_max = self.cfg.topic_max,
                payload_max = self.cfg.payload_max,
                "message truncated to slot buffer capacity"
            );
        }
        (topic_clamped, payload_clamped)
    }

    /// The sweeper body, shared by `tick` and the pre-admission hygiene pass.
    fn sweep(&mut self, now_us: u64) {
        let ack_timeout_us = self.cfg.ack_timeout.as_micros() as u64;
        let timed_out = self.alloc.sweep_expired(now_us, ack_timeout_us);
        if timed_out > 0 {
            self.diag.record_timeouts(timed_out);
            warn!(
                count = timed_out,
                "in-flight messages timed out without acknowledgement"
            );
        }

        let idle_timeout_us = self.cfg.block_idle_timeout.as_micros() as u64;
        let reclaimed = self.alloc.reclaim_idle(now_us, idle_timeout_us);
        if reclaimed > 0 {
            info!(
                count = reclaimed,
                remaining = self.alloc.block_count(),
                "reclaimed idle overflow blocks"
            );
        }
    }
}

/// Cut `s` to at most `max` bytes without splitting a UTF-8 character.
fn clamp_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
