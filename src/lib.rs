pub mod capture;
pub mod config;
pub mod detection;
pub mod flight;
pub mod geometry;
pub mod link;
pub mod system;
pub mod telemetry;
pub mod transfer;
