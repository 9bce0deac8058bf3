//! Fixed ring for control and non-acknowledged traffic.
//!
//! QoS-0 publishes, subscriptions, pings and similar messages never occupy a
//! tracking slot; they pass through this small ring instead. Each entry holds
//! an owned message descriptor, a pending-state tag and the sweep tick it was
//! last touched at. The ring shares the sweeper's tick: entries older than
//! the configured number of ticks are expired in bulk.
//!
//! Entry lifecycle: `Queued` when enqueued, `Transmitted` once on the wire,
//! `Acknowledged`/`Confirmed` as the handshake progresses, deleted when done
//! or expired. When the ring is full the oldest entry (smallest tick stamp)
//! is overwritten; drop-oldest is the documented degradation mode here.
//!
//! Byte accounting sums `data.len() + remaining` over occupied entries and
//! clamps to zero on underflow rather than wrapping.

use crate::transport::{MessageId, QoS};

/// Pending state of a control-ring entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Accepted, not yet on the wire.
    Queued,
    /// Handed to the transport.
    Transmitted,
    /// First acknowledgement of a multi-step handshake received.
    Acknowledged,
    /// Handshake complete.
    Confirmed,
}

/// Owned descriptor of one control message.
///
/// Unlike tracked slots, control messages are not bounded by the pool buffer
/// capacities; the descriptor owns its bytes.
#[derive(Debug, Clone)]
pub struct ControlMessage {
    /// Transport-assigned id, if any.
    pub id: MessageId,
    /// Transport-defined message type tag.
    pub msg_type: u8,
    /// Quality of service the message was sent at.
    pub qos: QoS,
    /// Serialized message bytes.
    pub data: Vec<u8>,
    /// Bytes still to transmit when a send was cut short; zero otherwise.
    pub remaining: usize,
}

#[derive(Debug)]
struct Entry {
    msg: ControlMessage,
    state: ControlState,
    tick: u64,
}

/// Fixed ring of R control entries with byte accounting.
#[derive(Debug)]
pub struct ControlRing {
    entries: Box<[Option<Entry>]>,
    bytes: usize,
}

impl ControlRing {
    /// Ring with `capacity` entries, all free.
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            entries: entries.into_boxed_slice(),
            bytes: 0,
        }
    }

    /// Number of occupied entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    /// True when no entry is occupied.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|entry| entry.is_none())
    }

    /// Insert a message in state [`ControlState::Queued`], stamped with
    /// `tick`. Returns the entry index.
    ///
    /// On a full ring the entry with the smallest tick stamp is dropped to
    /// make room, with a warning naming the lost id.
    pub fn enqueue(&mut self, msg: ControlMessage, tick: u64) -> usize {
        let idx = match self.entries.iter().position(|entry| entry.is_none()) {
            Some(idx) => idx,
            None => {
                let victim = self.oldest_index();
                if let Some(dropped) = self.entries[victim].take() {
                    self.bytes = self
                        .bytes
                        .saturating_sub(dropped.msg.data.len() + dropped.msg.remaining);
                    tracing::warn!(
                        msg_id = dropped.msg.id,
                        "control ring full, dropping oldest entry"
                    );
                }
                victim
            }
        };
        self.bytes = self.bytes.saturating_add(msg.data.len() + msg.remaining);
        self.entries[idx] = Some(Entry {
            msg,
            state: ControlState::Queued,
            tick,
        });
        idx
    }

    /// Index of the entry for `id`, scanning in ring order.
    pub fn find_by_id(&self, id: MessageId) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry
                .as_ref()
                .map(|entry| entry.msg.id == id)
                .unwrap_or(false)
        })
    }

    /// Update the pending state of the entry for `id`; false on miss.
    pub fn set_state(&mut self, id: MessageId, state: ControlState) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Re-stamp the entry for `id` with `tick`; false on miss.
    pub fn set_tick(&mut self, id: MessageId, tick: u64) -> bool {
        match self.entry_mut(id) {
            Some(entry) => {
                entry.tick = tick;
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `id`, returning its message.
    pub fn delete_by_id(&mut self, id: MessageId) -> Option<ControlMessage> {
        let idx = self.find_by_id(id)?;
        let entry = self.entries[idx].take()?;
        self.bytes = self
            .bytes
            .saturating_sub(entry.msg.data.len() + entry.msg.remaining);
        Some(entry.msg)
    }

    /// First entry in the requested state, in ring order.
    ///
    /// Peek semantics: the entry stays in the ring so it survives between
    /// transmission and confirmation; remove it with [`Self::delete_by_id`]
    /// or let expiry take it.
    pub fn dequeue_by_state(&self, state: ControlState) -> Option<&ControlMessage> {
        self.entries.iter().find_map(|entry| {
            entry
                .as_ref()
                .filter(|entry| entry.state == state)
                .map(|entry| &entry.msg)
        })
    }

    /// Remove every entry whose stamp is more than `expiry_ticks` behind
    /// `now_tick`; returns how many were removed.
    pub fn delete_expired(&mut self, now_tick: u64, expiry_ticks: u64) -> usize {
        let mut removed = 0;
        for slot in self.entries.iter_mut() {
            let expired = slot
                .as_ref()
                .map(|entry| now_tick.saturating_sub(entry.tick) > expiry_ticks)
                .unwrap_or(false);
            if expired {
                if let Some(entry) = slot.take() {
                    self.bytes = self
                        .bytes
                        .saturating_sub(entry.msg.data.len() + entry.msg.remaining);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Bytes held by occupied entries (`data.len() + remaining` each).
    pub fn total_bytes(&self) -> usize {
        self.bytes
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
        self.bytes = 0;
    }

    fn entry_mut(&mut self, id: MessageId) -> Option<&mut Entry> {
        self.entries
            .iter_mut()
            .find_map(|entry| entry.as_mut().filter(|entry| entry.msg.id == id))
    }

    fn oldest_index(&self) -> usize {
        let mut best = 0;
        let mut best_tick = u64::MAX;
        for (idx, entry) in self.entries.iter().enumerate() {
            if let Some(entry) = entry {
                if entry.tick < best_tick {
                    best_tick = entry.tick;
                    best = idx;
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: MessageId, bytes: usize) -> ControlMessage {
        ControlMessage {
            id,
            msg_type: 3,
            qos: QoS::AtMostOnce,
            data: vec![0xAB; bytes],
            remaining: 0,
        }
    }

    #[test]
    fn enqueue_uses_first_free_entry() {
        let mut ring = ControlRing::new(3);
        assert_eq!(ring.enqueue(msg(1, 4), 0), 0);
        assert_eq!(ring.enqueue(msg(2, 4), 0), 1);
        ring.delete_by_id(1);
        assert_eq!(ring.enqueue(msg(3, 4), 1), 0);
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn full_ring_drops_the_oldest_entry() {
        let mut ring = ControlRing::new(2);
        ring.enqueue(msg(1, 8), 5);
        ring.enqueue(msg(2, 8), 9);
        // entry for id 1 carries the smaller tick, it goes
        let idx = ring.enqueue(msg(3, 8), 12);
        assert_eq!(idx, 0);
        assert!(ring.find_by_id(1).is_none());
        assert!(ring.find_by_id(2).is_some());
        assert_eq!(ring.total_bytes(), 16);
    }

    #[test]
    fn state_transitions_by_id() {
        let mut ring = ControlRing::new(2);
        ring.enqueue(msg(7, 2), 0);
        assert!(ring.set_state(7, ControlState::Transmitted));
        assert_eq!(
            ring.dequeue_by_state(ControlState::Transmitted).map(|m| m.id),
            Some(7)
        );
        assert!(ring.dequeue_by_state(ControlState::Queued).is_none());
        assert!(!ring.set_state(99, ControlState::Confirmed));
    }

    #[test]
    fn dequeue_by_state_is_a_peek() {
        let mut ring = ControlRing::new(2);
        ring.enqueue(msg(7, 2), 0);
        assert!(ring.dequeue_by_state(ControlState::Queued).is_some());
        assert!(ring.dequeue_by_state(ControlState::Queued).is_some());
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn expiry_removes_stale_entries_only() {
        let mut ring = ControlRing::new(4);
        ring.enqueue(msg(1, 2), 0);
        ring.enqueue(msg(2, 2), 8);
        assert_eq!(ring.delete_expired(10, 5), 1);
        assert!(ring.find_by_id(1).is_none());
        assert!(ring.find_by_id(2).is_some());
        // set_tick refreshes an entry's lease
        assert!(ring.set_tick(2, 20));
        assert_eq!(ring.delete_expired(21, 5), 0);
    }

    #[test]
    fn byte_accounting_counts_data_plus_remaining() {
        let mut ring = ControlRing::new(4);
        let mut partial = msg(1, 10);
        partial.remaining = 6;
        ring.enqueue(partial, 0);
        ring.enqueue(msg(2, 4), 0);
        assert_eq!(ring.total_bytes(), 20);
        ring.delete_by_id(1);
        assert_eq!(ring.total_bytes(), 4);
        ring.delete_by_id(2);
        assert_eq!(ring.total_bytes(), 0);
        // deleting from an empty ring cannot underflow
        assert!(ring.delete_by_id(2).is_none());
        assert_eq!(ring.total_bytes(), 0);
    }

    #[test]
    fn clear_empties_ring_and_accounting() {
        let mut ring = ControlRing::new(2);
        ring.enqueue(msg(1, 16), 0);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.total_bytes(), 0);
    }
}
