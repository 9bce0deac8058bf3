//! Transport contract consumed by the outbox.
//!
//! The core knows nothing about wire encoding or network I/O. It consumes a
//! transport through one narrow operation: `publish` hands over borrowed
//! topic/payload buffers and returns the broker-facing message id. The
//! transport does not copy the buffers; the outbox keeps them alive in its
//! pools until the acknowledgement arrives or the tracking times out.
//! Acknowledgements travel the other way: the embedder's event pump calls
//! [`crate::outbox::Outbox::on_published`] with the id.
//!
//! [`MockTransport`] is always available (not gated behind `cfg(test)`) so
//! downstream crates can exercise their own outbox wiring without a broker.

use anyhow::Result;

/// Broker-assigned message identifier.
///
/// Non-negative ids are live transport ids. Negative values never come back
/// from a successful publish; callers may use them as provisional ids with
/// [`crate::outbox::Outbox::track`] until a `rebind` installs the real one.
pub type MessageId = i32;

/// Sentinel stored in a free slot.
pub const NO_MESSAGE_ID: MessageId = -1;

/// MQTT quality-of-service level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QoS {
    /// Fire-and-forget; never tracked in the slot pools.
    AtMostOnce,
    /// Acknowledged delivery; tracked until `on_published` or timeout.
    AtLeastOnce,
    /// Assured delivery; tracked the same way as [`QoS::AtLeastOnce`].
    ExactlyOnce,
}

impl QoS {
    /// Whether messages at this level carry a broker acknowledgement.
    pub fn requires_ack(self) -> bool {
        !matches!(self, QoS::AtMostOnce)
    }
}

/// Capability: publish a message to the broker.
///
/// # Contract
/// - Synchronous upcall: returns the assigned id (or an error) before the
///   caller's `publish` returns. No callback is delivered re-entrantly.
/// - The returned id is non-negative on success. A negative `Ok` value is
///   treated as a rejection by the outbox.
/// - Borrowed buffers are only valid for the duration of the call.
pub trait Transport {
    /// Send one message; returns the transport-assigned message id.
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
        -> Result<MessageId>;
}

/// One publish observed by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    /// Topic as handed to the transport.
    pub topic: String,
    /// Payload bytes as handed to the transport.
    pub payload: Vec<u8>,
    /// Requested quality of service.
    pub qos: QoS,
    /// Requested retain flag.
    pub retain: bool,
    /// Id the mock assigned.
    pub id: MessageId,
}

/// Scripted in-memory transport for tests and examples.
///
/// Assigns consecutive ids starting at 1 and records everything it is asked
/// to publish. Failure injection covers both error shapes the outbox has to
/// handle: `fail_next` makes the next call return `Err`, `reject_next` makes
/// it return a negative id.
#[derive(Debug)]
pub struct MockTransport {
    next_id: MessageId,
    published: Vec<PublishedRecord>,
    fail_next: bool,
    reject_next: bool,
}

impl MockTransport {
    /// Mock whose first assigned id is 1.
    pub fn new() -> Self {
        Self::with_start_id(1)
    }

    /// Mock whose first assigned id is `start_id`.
    pub fn with_start_id(start_id: MessageId) -> Self {
        Self {
            next_id: start_id,
            published: Vec::new(),
            fail_next: false,
            reject_next: false,
        }
    }

    /// Make the next `publish` return an error.
    pub fn fail_next(&mut self) {
        self.fail_next = true;
    }

    /// Make the next `publish` return a negative id.
    pub fn reject_next(&mut self) {
        self.reject_next = true;
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> &[PublishedRecord] {
        &self.published
    }

    /// Id assigned by the most recent successful publish, if any.
    pub fn last_id(&self) -> Option<MessageId> {
        self.published.last().map(|record| record.id)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId> {
        if self.fail_next {
            self.fail_next = false;
            anyhow::bail!("mock transport: connection lost");
        }
        if self.reject_next {
            self.reject_next = false;
            return Ok(-1);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.published.push(PublishedRecord {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
            id,
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_consecutive_ids() {
        let mut transport = MockTransport::new();
        let a = transport.publish("t", b"1", QoS::AtLeastOnce, false).unwrap();
        let b = transport.publish("t", b"2", QoS::AtLeastOnce, false).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(transport.published().len(), 2);
    }

    #[test]
    fn fail_next_is_one_shot() {
        let mut transport = MockTransport::new();
        transport.fail_next();
        assert!(transport.publish("t", b"x", QoS::AtLeastOnce, false).is_err());
        assert!(transport.publish("t", b"x", QoS::AtLeastOnce, false).is_ok());
    }

    #[test]
    fn reject_next_returns_negative_id() {
        let mut transport = MockTransport::new();
        transport.reject_next();
        assert_eq!(
            transport.publish("t", b"x", QoS::AtLeastOnce, false).unwrap(),
            -1
        );
    }

    #[test]
    fn qos_ack_requirement() {
        assert!(!QoS::AtMostOnce.requires_ack());
        assert!(QoS::AtLeastOnce.requires_ack());
        assert!(QoS::ExactlyOnce.requires_ack());
    }
}
