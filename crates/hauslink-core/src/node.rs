//! Node glue: capability traits and tick drivers.
//!
//! The state machines in [`lora`](crate::lora) return actions; the nodes
//! here wire those actions to a concrete [`Radio`] and fan decoded records
//! out to the embedder's [`RecordSink`]. One call to `tick()` runs one
//! cooperative loop iteration.

use serde_json::Value;
use tracing::debug;

use hauslink_proto::Record;

use crate::{
    config::{LinkKey, Tunables},
    env::Environment,
    hc::SessionAction,
    lora::{LoraReceiver, LoraSender, ReceiverAction, SenderAction},
    radio::Radio,
};

/// Application callbacks for decoded records.
///
/// Implemented by the embedder and passed at construction; there is no
/// global dispatch. Unhandled kinds are simply empty methods.
pub trait RecordSink {
    /// An integer value arrived for a feature key.
    fn on_int(&mut self, key: u16, value: i32);

    /// A boolean value arrived for a feature key.
    fn on_boolean(&mut self, key: u16, value: bool);

    /// A string value arrived for a feature key.
    fn on_string(&mut self, key: u16, value: &str);

    /// A keyless system message arrived.
    fn on_system_message(&mut self, message: &str);
}

/// Application callback for documents received from the appliance.
pub trait DocumentSink {
    /// A decrypted, parsed document arrived from the appliance.
    fn on_hc_message(&mut self, document: &Value);
}

/// WebSocket client seam for the appliance socket.
///
/// The concrete client (an external collaborator) feeds
/// [`WsEvent`](crate::hc::WsEvent) values into the session and executes the
/// actions the session returns through this trait.
pub trait SocketClient {
    /// Send one binary WebSocket message.
    fn send_binary(&mut self, frame: &[u8]);

    /// Tear the connection down and redial the appliance.
    fn reconnect(&mut self);
}

/// Execute session actions against a client and a document sink.
pub fn run_session_actions<C: SocketClient, D: DocumentSink>(
    actions: Vec<SessionAction>,
    client: &mut C,
    sink: &mut D,
) {
    for action in actions {
        match action {
            SessionAction::SendBinary(frame) => client.send_binary(&frame),
            SessionAction::Reconnect => client.reconnect(),
            SessionAction::Deliver(document) => sink.on_hc_message(&document),
        }
    }
}

/// Maps numeric feature keys to display names.
///
/// The table is generated from the appliance profile; the core only defines
/// the lookup interface so display nodes can label what they show.
pub trait KeyMap {
    /// Display name of a feature key, if one is known.
    fn name(&self, key: u16) -> Option<&str>;

    /// Display label of an enumerated value, if one is known.
    fn value_label(&self, key: u16, value: i32) -> Option<&str>;
}

/// [`KeyMap`] backed by static slice tables.
pub struct StaticKeyMap {
    /// `(key, name)` pairs, generated from the appliance profile.
    pub names: &'static [(u16, &'static str)],
    /// `(key, value, label)` triples for enumerated values.
    pub labels: &'static [(u16, i32, &'static str)],
}

impl KeyMap for StaticKeyMap {
    fn name(&self, key: u16) -> Option<&str> {
        self.names.iter().find(|(k, _)| *k == key).map(|(_, name)| *name)
    }

    fn value_label(&self, key: u16, value: i32) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, v, _)| *k == key && *v == value)
            .map(|(_, _, label)| *label)
    }
}

/// Display-side node: radio in, callbacks out.
pub struct ReceiverNode<E: Environment, R: Radio, S: RecordSink> {
    receiver: LoraReceiver<E>,
    radio: R,
    sink: S,
}

impl<E: Environment, R: Radio, S: RecordSink> ReceiverNode<E, R, S> {
    /// Assemble a receiver node.
    pub fn new(env: E, key: &LinkKey, queue_capacity: usize, radio: R, sink: S) -> Self {
        Self { receiver: LoraReceiver::new(env, key, queue_capacity), radio, sink }
    }

    /// Run one loop iteration: ingest a pending packet, then validate,
    /// acknowledge and deliver.
    pub fn tick(&mut self) {
        if let Some(packet) = self.radio.poll_packet() {
            // Drops are logged inside; the loop must keep running.
            let _ = self.receiver.handle_packet(&packet);
        }

        for action in self.receiver.poll() {
            match action {
                ReceiverAction::TransmitAck(frame) => self.radio.transmit(&frame),
                ReceiverAction::Deliver(record) => dispatch(&mut self.sink, record),
            }
        }
    }

    /// Signal strength of the last received packet, in dBm.
    #[must_use]
    pub fn rssi(&self) -> i16 {
        self.radio.rssi()
    }

    /// The radio driver, e.g. for simulation inspection.
    #[must_use]
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable access to the radio driver.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// The record sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Gateway-side node: application values in, radio frames out.
pub struct SenderNode<E: Environment, R: Radio> {
    env: E,
    sender: LoraSender<E>,
    radio: R,
}

impl<E: Environment, R: Radio> SenderNode<E, R> {
    /// Assemble a sender node.
    pub fn new(env: E, key: &LinkKey, tunables: Tunables, radio: R) -> Self {
        Self { sender: LoraSender::new(env.clone(), key, tunables), env, radio }
    }

    /// Queue an integer value.
    pub fn send_int(&mut self, key: u16, value: i32) {
        self.sender.send_int(key, value);
    }

    /// Queue a boolean value.
    pub fn send_boolean(&mut self, key: u16, value: bool) {
        self.sender.send_boolean(key, value);
    }

    /// Queue a string value.
    pub fn send_string(&mut self, key: u16, value: &str) {
        self.sender.send_string(key, value);
    }

    /// Queue a system message and flush immediately.
    pub fn send_system_message(&mut self, message: &str) {
        self.sender.send_system_message(message);
    }

    /// Flush the aggregation buffer.
    pub fn flush(&mut self) {
        self.sender.flush();
    }

    /// Put the radio to idle until the next tick that has work.
    pub fn sleep(&mut self) {
        match self.sender.sleep() {
            SenderAction::Idle => self.radio.idle(),
            SenderAction::Transmit(frame) => self.radio.transmit(&frame),
        }
    }

    /// Run one loop iteration: ingest a pending acknowledge, then pace,
    /// transmit or retire.
    pub fn tick(&mut self) {
        if let Some(packet) = self.radio.poll_packet() {
            let _ = self.sender.handle_packet(&packet);
        }

        for action in self.sender.poll(self.env.now()) {
            match action {
                SenderAction::Transmit(frame) => self.radio.transmit(&frame),
                SenderAction::Idle => self.radio.idle(),
            }
        }
    }

    /// Signal strength of the last received packet, in dBm.
    #[must_use]
    pub fn rssi(&self) -> i16 {
        self.radio.rssi()
    }

    /// The radio driver, e.g. for simulation inspection.
    #[must_use]
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Mutable access to the radio driver.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }
}

fn dispatch<S: RecordSink>(sink: &mut S, record: Record) {
    match record {
        Record::Int { key, value } => {
            debug!(key, value, "delivering int");
            sink.on_int(key, value);
        },
        Record::Bool { key, value } => {
            debug!(key, value, "delivering bool");
            sink.on_boolean(key, value);
        },
        Record::Str { key, value } => {
            debug!(key, %value, "delivering string");
            sink.on_string(key, &value);
        },
        Record::System { message } => {
            debug!(%message, "delivering system message");
            sink.on_system_message(&message);
        },
    }
}
