//! Math utilities for the JetRacer actuators.
//!
//! This module provides duty-cycle, pulse-width and prescaler conversions.

pub mod duty;
