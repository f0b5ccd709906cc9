//! Steering servo on a single 50 Hz PWM channel.

use serde::{Deserialize, Serialize};

use super::pwm::PwmDevice;
use crate::utils::math::duty::{normalized_to_pulse_width, pulse_width_duty};

/// Pulse-width limits of the steering servo, in microseconds.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SteeringCalibration {
    pub min_us: u16,
    pub max_us: u16,
    pub center_us: u16,
    /// Offset from center produced by a normalized command of 1.0.
    pub span_us: u16,
}

impl Default for SteeringCalibration {
    fn default() -> Self {
        Self {
            min_us: 1000,
            max_us: 2400,
            center_us: 1700,
            span_us: 300,
        }
    }
}

impl SteeringCalibration {
    pub fn clamp(
        &self,
        us: i32,
    ) -> u16 {
        // max/min rather than clamp: a bad calibration must not panic
        us.max(self.min_us as i32).min(self.max_us as i32) as u16
    }
}

/// Maps steering commands onto a pulse-width duty for one servo channel.
pub struct SteeringActuator<D> {
    device: D,
    channel: u8,
    period_us: u32,
    calibration: SteeringCalibration,
}

impl<D: PwmDevice> SteeringActuator<D> {
    /// `period_us` is the length of one PWM period on the device (20000 at 50 Hz).
    pub fn new(
        device: D,
        channel: u8,
        period_us: u32,
        calibration: SteeringCalibration,
    ) -> Self {
        Self {
            device,
            channel,
            period_us,
            calibration,
        }
    }

    /// Command an absolute pulse width. Returns the clamped width written.
    pub fn set_pulse_width(
        &mut self,
        us: i32,
    ) -> Result<u16, D::Error> {
        let us = self.calibration.clamp(us);
        let duty = pulse_width_duty(us, self.period_us);
        self.device.set_channel_duty(self.channel, duty)?;
        Ok(us)
    }

    /// Command a normalized position, `-1.0` left through `1.0` right.
    ///
    /// The value is mapped linearly first and only clamped in microseconds,
    /// so inputs beyond +-1.0 saturate at the pulse-width limits.
    pub fn set_normalized(
        &mut self,
        value: f32,
    ) -> Result<u16, D::Error> {
        let us =
            normalized_to_pulse_width(value, self.calibration.center_us, self.calibration.span_us);
        self.set_pulse_width(us)
    }

    pub fn release(&mut self) -> Result<(), D::Error> {
        self.device.release()
    }
}
