//! Radio sender state machine.
//!
//! Records aggregate into a 41-byte buffer until it overflows, a system
//! message forces a flush, or the optional collect time expires. Each
//! flushed buffer becomes one sealed frame that is transmitted and
//! retransmitted until its acknowledge arrives or the attempt budget is
//! spent.
//!
//! # State machine, one in-flight frame at a time
//!
//! ```text
//! IDLE ──(staged payload available)──▶ SEALED(attempts = 0)
//! SEALED ──pacing interval elapsed──▶ transmit, attempts += 1
//! SEALED ──matching acknowledge──▶ IDLE (frame retired)
//! SEALED ──attempts exhausted──▶ IDLE (frame dropped, logged)
//! ```
//!
//! The pacing interval (`package_rate_limit + uniform jitter`) does double
//! duty: it satisfies sub-GHz duty-cycle regulations and it is the wait for
//! an acknowledge before the next attempt.
//!
//! This is a pure state machine. Time comes in through `poll(now)`, radio
//! bytes through [`LoraSender::handle_packet`], and transmissions leave as
//! [`SenderAction`] values for the driver to execute.

use std::time::Duration;

use tracing::{debug, trace, warn};

use hauslink_proto::{AckFrame, Push, Record, RecordWriter, DATA_SIZE};

use crate::{
    config::{LinkKey, Tunables},
    env::Environment,
    error::LinkError,
    lora::codec::LinkCrypto,
    queue::Bounded,
};

/// Actions returned by the sender for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderAction {
    /// Transmit this frame over the radio.
    Transmit(Vec<u8>),
    /// Put the radio into idle mode.
    Idle,
}

/// A flushed record buffer waiting to be sealed.
#[derive(Debug, Clone)]
struct StagedPayload {
    data: [u8; DATA_SIZE],
    length: u8,
}

/// The sealed frame currently being delivered.
#[derive(Debug, Clone)]
struct InFlight {
    bytes: [u8; 48],
    wire_len: usize,
    number: u16,
    attempts: u8,
}

/// Aggregating, acknowledging radio sender.
pub struct LoraSender<E: Environment> {
    env: E,
    crypto: LinkCrypto,
    tunables: Tunables,

    writer: RecordWriter,
    staged: Bounded<StagedPayload>,
    acks: Bounded<[u8; AckFrame::SIZE]>,

    in_flight: Option<InFlight>,
    last_send: E::Instant,
    last_push: E::Instant,
    next_send_delay: Duration,
}

impl<E: Environment> LoraSender<E> {
    /// Create a sender for the given link key.
    pub fn new(env: E, key: &LinkKey, tunables: Tunables) -> Self {
        let now = env.now();
        Self {
            crypto: LinkCrypto::new(key),
            writer: RecordWriter::new(),
            staged: Bounded::new(tunables.queue_capacity),
            acks: Bounded::new(tunables.queue_capacity),
            in_flight: None,
            last_send: now,
            last_push: now,
            // Zero so the first frame of a boot transmits immediately.
            next_send_delay: Duration::ZERO,
            tunables,
            env,
        }
    }

    /// Queue an integer value. The smallest encoding is chosen by the codec.
    pub fn send_int(&mut self, key: u16, value: i32) {
        debug!(key, value, "sending int");
        self.append(Record::Int { key, value });
    }

    /// Queue a boolean value.
    pub fn send_boolean(&mut self, key: u16, value: bool) {
        debug!(key, value, "sending bool");
        self.append(Record::Bool { key, value });
    }

    /// Queue a string value.
    pub fn send_string(&mut self, key: u16, value: &str) {
        debug!(key, value, "sending string");
        self.append(Record::Str { key, value: value.to_string() });
    }

    /// Queue a system message and flush immediately.
    pub fn send_system_message(&mut self, message: &str) {
        debug!(message, "sending system message");
        self.append(Record::System { message: message.to_string() });
        self.flush();
    }

    /// Flush the aggregation buffer into the staging queue.
    pub fn flush(&mut self) {
        if self.writer.is_empty() {
            return;
        }

        let (data, length) = self.writer.take();
        if !self.staged.push(StagedPayload { data, length }) {
            warn!("staging queue is full, payload dropped");
        }
        self.last_push = self.env.now();
    }

    /// Request radio idle; call when no messages are expected for a while.
    /// The state machine is unaffected and resumes on the next poll.
    pub fn sleep(&mut self) -> SenderAction {
        debug!("putting radio to idle");
        SenderAction::Idle
    }

    /// Ingest one received radio packet (an acknowledge candidate).
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::BadPacketSize`] for anything that is not exactly
    /// one acknowledge frame, and [`LinkError::QueueFull`] when the entry
    /// was dropped. Both are drops; no state changes.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), LinkError> {
        let Ok(bytes) = <[u8; AckFrame::SIZE]>::try_from(packet) else {
            warn!(size = packet.len(), "ignoring packet with unexpected length");
            return Err(LinkError::BadPacketSize { size: packet.len() });
        };

        if !self.acks.push(bytes) {
            warn!("acknowledge queue is full, packet dropped");
            return Err(LinkError::QueueFull);
        }

        trace!("received acknowledge candidate");
        Ok(())
    }

    /// Advance the state machine one tick.
    ///
    /// Phases run in a fixed order: retire on acknowledge, collect-time
    /// flush, transmit or give up, seal the next payload. Each poll yields
    /// at most one transmission, so a driver that interleaves polls with
    /// radio servicing keeps the loop cooperative.
    pub fn poll(&mut self, now: E::Instant) -> Vec<SenderAction> {
        let mut actions = Vec::new();

        self.retire_on_ack();
        self.collect_time_flush(now);
        self.transmit_or_drop(now, &mut actions);
        self.seal_next();

        actions
    }

    /// True while a frame is awaiting its acknowledge.
    #[must_use]
    pub fn has_frame_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Bytes currently held in the aggregation buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.writer.len()
    }

    fn append(&mut self, record: Record) {
        match self.writer.push(&record) {
            Push::Done => {
                self.last_push = self.env.now();
            },
            Push::Full => {
                self.flush();
                match self.writer.push(&record) {
                    Push::Done => self.last_push = self.env.now(),
                    Push::Full | Push::TooBig => {
                        warn!(needed = record.encoded_len(), "record too big, dropped");
                    },
                }
            },
            Push::TooBig => {
                warn!(needed = record.encoded_len(), "record too big, dropped");
            },
        }
    }

    fn retire_on_ack(&mut self) {
        let Some(frame) = &self.in_flight else {
            // Stale acknowledges are worthless without an in-flight frame.
            return;
        };

        let Some(wire) = self.acks.pop() else {
            return;
        };

        match self.crypto.open_ack(&wire) {
            Some(number) if number == frame.number => {
                debug!(number, attempts = frame.attempts, "frame acknowledged");
                self.in_flight = None;
            },
            Some(number) => {
                debug!(number, expected = frame.number, "unexpected acknowledge number, ignoring");
            },
            None => {
                debug!("bad acknowledge mac, ignoring");
            },
        }
    }

    fn collect_time_flush(&mut self, now: E::Instant) {
        let Some(collect_time) = self.tunables.collect_time else {
            return;
        };

        if self.in_flight.is_none()
            && !self.writer.is_empty()
            && now - self.last_push > collect_time
        {
            trace!("collect time expired, flushing");
            self.flush();
        }
    }

    fn transmit_or_drop(&mut self, now: E::Instant, actions: &mut Vec<SenderAction>) {
        let Some(frame) = &mut self.in_flight else {
            return;
        };

        if now - self.last_send <= self.next_send_delay {
            return;
        }

        frame.attempts += 1;
        if frame.attempts <= self.tunables.max_sending_attempts {
            debug!(
                bytes = frame.wire_len,
                attempt = frame.attempts,
                max = self.tunables.max_sending_attempts,
                "transmitting frame"
            );
            actions.push(SenderAction::Transmit(frame.bytes[..frame.wire_len].to_vec()));
            self.last_send = now;
            self.next_send_delay =
                self.tunables.package_rate_limit + self.env.jitter(self.tunables.jitter_cap);
        } else {
            warn!(number = frame.number, "maximum sending attempts reached, frame dropped");
            self.in_flight = None;
        }
    }

    fn seal_next(&mut self) {
        if self.in_flight.is_some() {
            return;
        }

        if let Some(payload) = self.staged.pop() {
            let sealed = self.crypto.seal_payload(&self.env, payload.data, payload.length);
            self.in_flight = Some(InFlight {
                bytes: sealed.bytes,
                wire_len: sealed.wire_len,
                number: sealed.number,
                attempts: 0,
            });
        }
    }
}
