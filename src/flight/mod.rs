//! Flight phase tracking.
//!
//! The orchestrator owns the only `FlightState` value in the system; every
//! other component receives it by argument when it needs it.

pub mod state;

pub use state::FlightState;
