//! Drive and steering actuation for a PCA9685-based JetRacer chassis on no-std platforms.
//!
//! For a runnable host-side driver, see the `bench-racer` application.
#![no_std]

pub mod utils;
