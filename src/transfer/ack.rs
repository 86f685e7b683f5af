use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};

use crate::link::{LinkMessage, ListenerId, VehicleLink};

/// Listener for one acknowledgement of `command`.
///
/// Register before sending the message being acknowledged so a fast reply
/// is not missed. The listener is removed when the waiter is dropped,
/// whatever the outcome.
pub struct AckWaiter<'a> {
    link: &'a dyn VehicleLink,
    id: ListenerId,
    result: Receiver<u8>,
}

impl<'a> AckWaiter<'a> {
    pub fn register(link: &'a dyn VehicleLink, command: u16) -> Self {
        let (tx, rx) = bounded(1);
        let id = link.subscribe(
            Box::new(move |m: &LinkMessage| m.is_ack_for(command)),
            Box::new(move |m: &LinkMessage| {
                if let LinkMessage::CommandAck { result, .. } = m {
                    // only the first ack matters
                    let _ = tx.try_send(*result);
                }
            }),
        );
        Self {
            link,
            id,
            result: rx,
        }
    }

    /// Block up to `timeout` for the ack. Returns its result code.
    pub fn wait(self, timeout: Duration) -> Option<u8> {
        self.result.recv_timeout(timeout).ok()
    }
}

impl Drop for AckWaiter<'_> {
    fn drop(&mut self) {
        self.link.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockVehicleLink;

    #[test]
    fn test_ack_received_and_listener_removed() {
        let link = MockVehicleLink::new();
        let waiter = AckWaiter::register(&link, 130);
        assert_eq!(link.listener_count(), 1);

        link.deliver(&LinkMessage::CommandAck { command: 263, result: 0 });
        link.deliver(&LinkMessage::CommandAck { command: 130, result: 4 });
        assert_eq!(waiter.wait(Duration::from_millis(100)), Some(4));
        assert_eq!(link.listener_count(), 0);
    }

    #[test]
    fn test_timeout_removes_listener() {
        let link = MockVehicleLink::new();
        for _ in 0..3 {
            let waiter = AckWaiter::register(&link, 263);
            assert_eq!(waiter.wait(Duration::from_millis(20)), None);
        }
        assert_eq!(link.listener_count(), 0);
    }
}
