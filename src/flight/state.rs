//! Flight state machine phases.

use std::fmt;

/// Operating phase of the vehicle as seen by the onboard pipeline.
///
/// The discriminants are the ordinals used by the set-mode command on the
/// vehicle link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FlightState {
    /// On the ground or holding, nothing requested yet.
    #[default]
    Idle = 0,
    /// Climbing out.
    Takeoff = 1,
    /// Flying the uploaded mission.
    FollowMission = 2,
    /// Searching for the landing target; the only phase where images are analyzed.
    LandingSearch = 3,
    /// Target acquired, landing.
    Landing = 4,
}

impl FlightState {
    /// All states in ordinal order.
    pub const ALL: [FlightState; 5] = [
        FlightState::Idle,
        FlightState::Takeoff,
        FlightState::FollowMission,
        FlightState::LandingSearch,
        FlightState::Landing,
    ];

    /// Map a set-mode ordinal to a state. Unknown ordinals yield `None`.
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Ordinal as carried on the wire.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Whether images captured in this state go to the detector.
    pub fn analyzes_images(self) -> bool {
        self == FlightState::LandingSearch
    }
}

impl fmt::Display for FlightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightState::Idle => "idle",
            FlightState::Takeoff => "takeoff",
            FlightState::FollowMission => "follow-mission",
            FlightState::LandingSearch => "landing-search",
            FlightState::Landing => "landing",
        };
        f.write_str(name)
    }
}
