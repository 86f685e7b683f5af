//! In-memory vehicle link for tests.

use std::collections::HashSet;

use anyhow::Result;
use parking_lot::Mutex;

use crate::telemetry::TelemetrySnapshot;

use super::messages::{ACK_ACCEPTED, LinkMessage};
use super::vehicle::{ListenerId, ListenerRegistry, MessageCallback, MessagePredicate, VehicleLink};

/// Records outbound traffic and lets tests inject inbound messages.
#[derive(Default)]
pub struct MockVehicleLink {
    telemetry: Mutex<Option<TelemetrySnapshot>>,
    sent: Mutex<Vec<LinkMessage>>,
    auto_ack: Mutex<HashSet<u16>>,
    listeners: ListenerRegistry,
}

impl MockVehicleLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_telemetry(snapshot: TelemetrySnapshot) -> Self {
        let link = Self::new();
        link.set_telemetry(Some(snapshot));
        link
    }

    pub fn set_telemetry(&self, snapshot: Option<TelemetrySnapshot>) {
        *self.telemetry.lock() = snapshot;
    }

    /// Answer every sent message with id in `ids` by an accepted ack.
    pub fn auto_ack(&self, ids: &[u16]) {
        self.auto_ack.lock().extend(ids.iter().copied());
    }

    /// Simulate an inbound message.
    pub fn deliver(&self, message: &LinkMessage) -> usize {
        self.listeners.dispatch(message)
    }

    pub fn sent(&self) -> Vec<LinkMessage> {
        self.sent.lock().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl VehicleLink for MockVehicleLink {
    fn read_telemetry(&self) -> Option<TelemetrySnapshot> {
        *self.telemetry.lock()
    }

    fn send(&self, message: &LinkMessage) -> Result<()> {
        self.sent.lock().push(message.clone());
        let id = message.id();
        let ack = self.auto_ack.lock().contains(&id);
        if ack {
            self.listeners.dispatch(&LinkMessage::CommandAck {
                command: id,
                result: ACK_ACCEPTED,
            });
        }
        Ok(())
    }

    fn subscribe(&self, predicate: MessagePredicate, callback: MessageCallback) -> ListenerId {
        self.listeners.subscribe(predicate, callback)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}
