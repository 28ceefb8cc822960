//! Radio receiver state machine.
//!
//! Inbound packets pass through three phases, decoupled by bounded queues so
//! the radio can be serviced between any two of them:
//!
//! 1. **Ingest** ([`LoraReceiver::handle_packet`]): size gate, then enqueue
//!    the encrypted envelope.
//! 2. **Validate** (first half of [`LoraReceiver::poll`]): decrypt, verify
//!    the MAC, acknowledge, deduplicate, enqueue the decoded frame.
//! 3. **Decode** (second half of `poll`): walk the record stream and emit
//!    [`ReceiverAction::Deliver`] per record.
//!
//! The acknowledge goes out *before* the duplicate check: when a sender
//! retransmits because its acknowledge was lost, the duplicate must still be
//! re-acked or the sender keeps retrying to exhaustion.
//!
//! A MAC failure is dropped silently (trace log only) - on an open band it
//! is usually someone else's traffic, and answering it would leak timing.

use tracing::{debug, trace, warn};

use hauslink_proto::{
    AckFrame, PayloadFrame, RecordReader, BLOCK_SIZE, MAX_FRAME_SIZE,
};

use crate::{
    config::LinkKey,
    env::Environment,
    error::LinkError,
    lora::codec::LinkCrypto,
    queue::Bounded,
};

/// Actions returned by the receiver for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverAction {
    /// Transmit this acknowledge frame.
    TransmitAck([u8; AckFrame::SIZE]),
    /// Hand this decoded record to the application callbacks.
    Deliver(hauslink_proto::Record),
}

/// An encrypted envelope as read off the radio.
#[derive(Debug, Clone)]
struct Envelope {
    bytes: [u8; MAX_FRAME_SIZE],
    len: usize,
}

/// Validating, acknowledging, deduplicating radio receiver.
pub struct LoraReceiver<E: Environment> {
    env: E,
    crypto: LinkCrypto,
    inbound: Bounded<Envelope>,
    decoded: Bounded<PayloadFrame>,
    last_message_number: u16,
}

impl<E: Environment> LoraReceiver<E> {
    /// Create a receiver for the given link key with the given queue depth.
    pub fn new(env: E, key: &LinkKey, queue_capacity: usize) -> Self {
        Self {
            env,
            crypto: LinkCrypto::new(key),
            inbound: Bounded::new(queue_capacity),
            decoded: Bounded::new(queue_capacity),
            last_message_number: 0,
        }
    }

    /// Ingest one received radio packet.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::BadPacketSize`] for empty, oversized or
    /// unaligned packets and [`LinkError::QueueFull`] when the envelope was
    /// dropped. Both are drops; no state changes.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), LinkError> {
        let size = packet.len();
        if size == 0 || size > MAX_FRAME_SIZE || size % BLOCK_SIZE != 0 {
            warn!(size, "ignoring packet with unexpected length");
            return Err(LinkError::BadPacketSize { size });
        }

        let mut envelope = Envelope { bytes: [0; MAX_FRAME_SIZE], len: size };
        envelope.bytes[..size].copy_from_slice(packet);

        if !self.inbound.push(envelope) {
            warn!("inbound queue is full, packet dropped");
            return Err(LinkError::QueueFull);
        }

        debug!(size, "received frame");
        Ok(())
    }

    /// Advance the state machine one tick.
    ///
    /// Processes at most one envelope and one decoded frame per call.
    pub fn poll(&mut self) -> Vec<ReceiverAction> {
        let mut actions = Vec::new();

        self.validate_one(&mut actions);
        self.decode_one(&mut actions);

        actions
    }

    /// Message number of the last accepted frame (for diagnostics).
    #[must_use]
    pub fn last_message_number(&self) -> u16 {
        self.last_message_number
    }

    fn validate_one(&mut self, actions: &mut Vec<ReceiverAction>) {
        let Some(envelope) = self.inbound.pop() else {
            return;
        };

        let Some(frame) = self.crypto.open_payload(&envelope.bytes[..envelope.len]) else {
            trace!("frame failed authentication, dropped");
            return;
        };

        // Acknowledge before the duplicate check: a retransmission means the
        // sender never saw our previous acknowledge.
        actions.push(ReceiverAction::TransmitAck(self.crypto.seal_ack(&self.env, frame.number)));

        if frame.number == self.last_message_number {
            debug!(number = frame.number, "duplicate frame, dropped");
            return;
        }
        self.last_message_number = frame.number;

        if !self.decoded.push(frame) {
            warn!("decoded queue is full, frame dropped");
        }
    }

    fn decode_one(&mut self, actions: &mut Vec<ReceiverAction>) {
        let Some(frame) = self.decoded.pop() else {
            return;
        };

        for record in RecordReader::new(&frame.data, frame.length) {
            actions.push(ReceiverAction::Deliver(record));
        }
    }
}
