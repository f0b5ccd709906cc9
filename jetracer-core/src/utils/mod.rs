//! Utility re-exports for the JetRacer actuators.
//!
//! - `controllers`: PWM device contract, drive and steering actuators, and the
//!   vehicle controller that owns them
//! - `math`: duty-cycle and prescaler conversions

pub mod controllers;
pub mod math;

pub use controllers::{VehicleCommand, VehicleConfig, VehicleController, VehicleError};
