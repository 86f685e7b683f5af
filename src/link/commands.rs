//! Bridge from the link's listener context to the orchestrator.
//!
//! Listener callbacks only translate and enqueue; the orchestrator applies
//! commands from its own loop, so it stays the single writer of its state.

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::flight::FlightState;

use super::messages::{
    CMD_REQUEST_IMAGE_RELAY, CMD_SET_FLIGHT_MODE, CMD_SET_INDICATOR, LinkMessage,
};
use super::vehicle::{ListenerId, VehicleLink};

/// Control intents sent to the companion computer by the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleCommand {
    SetMode(FlightState),
    /// Indicator pattern, not interpreted by the pipeline.
    SetIndicator(f32),
    RequestImageRelay,
}

impl VehicleCommand {
    /// Translate an inbound command message. Unrelated messages and
    /// malformed mode requests yield `None`.
    pub fn from_message(message: &LinkMessage) -> Option<Self> {
        let LinkMessage::Command { command, param1 } = *message else {
            return None;
        };
        match command {
            CMD_SET_FLIGHT_MODE => {
                let ordinal = param1.round();
                if !(0.0..=u8::MAX as f32).contains(&ordinal) {
                    warn!(param1, "set-mode ordinal out of range");
                    return None;
                }
                match FlightState::from_ordinal(ordinal as u8) {
                    Some(state) => Some(VehicleCommand::SetMode(state)),
                    None => {
                        warn!(ordinal, "set-mode with unknown flight state");
                        None
                    }
                }
            }
            CMD_SET_INDICATOR => Some(VehicleCommand::SetIndicator(param1)),
            CMD_REQUEST_IMAGE_RELAY => Some(VehicleCommand::RequestImageRelay),
            _ => None,
        }
    }
}

/// Subscribe a listener that forwards every recognised command onto
/// `sender`, in arrival order.
///
/// The send blocks when the channel is full rather than dropping a command.
/// Listeners run on the link's receive thread, so a full channel also holds
/// up dispatch of every later message until the consumer catches up.
pub fn install_command_listener(
    link: &dyn VehicleLink,
    sender: Sender<VehicleCommand>,
) -> ListenerId {
    link.subscribe(
        Box::new(|m: &LinkMessage| VehicleCommand::from_message(m).is_some()),
        Box::new(move |m: &LinkMessage| {
            if let Some(command) = VehicleCommand::from_message(m) {
                debug!(?command, "vehicle command received");
                if sender.send(command).is_err() {
                    debug!("command channel closed, dropping {:?}", command);
                }
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockVehicleLink;
    use std::sync::Arc;
    use std::thread;

    fn command(command: u16, param1: f32) -> LinkMessage {
        LinkMessage::Command { command, param1 }
    }

    #[test]
    fn test_translate_commands() {
        assert_eq!(
            VehicleCommand::from_message(&command(CMD_SET_FLIGHT_MODE, 3.0)),
            Some(VehicleCommand::SetMode(FlightState::LandingSearch))
        );
        assert_eq!(
            VehicleCommand::from_message(&command(CMD_REQUEST_IMAGE_RELAY, 0.0)),
            Some(VehicleCommand::RequestImageRelay)
        );
        assert_eq!(
            VehicleCommand::from_message(&command(CMD_SET_INDICATOR, 2.0)),
            Some(VehicleCommand::SetIndicator(2.0))
        );
        assert_eq!(VehicleCommand::from_message(&command(CMD_SET_FLIGHT_MODE, 9.0)), None);
        assert_eq!(VehicleCommand::from_message(&command(CMD_SET_FLIGHT_MODE, -1.0)), None);
        assert_eq!(VehicleCommand::from_message(&command(400, 1.0)), None);
        assert_eq!(
            VehicleCommand::from_message(&LinkMessage::StatusText("x".into())),
            None
        );
    }

    #[test]
    fn test_commands_forwarded_in_order_across_threads() {
        let link = Arc::new(MockVehicleLink::new());
        let (tx, rx) = crossbeam_channel::bounded(8);
        install_command_listener(link.as_ref(), tx);

        let producer_link = link.clone();
        let producer = thread::spawn(move || {
            for i in 0..200u32 {
                let ordinal = (i % 5) as f32;
                producer_link.deliver(&command(CMD_SET_FLIGHT_MODE, ordinal));
            }
        });

        let mut received = Vec::new();
        while received.len() < 200 {
            received.push(rx.recv().unwrap());
        }
        producer.join().unwrap();

        for (i, cmd) in received.iter().enumerate() {
            let expected = FlightState::from_ordinal((i % 5) as u8).unwrap();
            assert_eq!(*cmd, VehicleCommand::SetMode(expected));
        }
    }
}
