//! Synchronized drive for the two TB6612FNG motor channels.
//!
//! Both motors always receive the same direction and magnitude. Which PCA9685
//! channels feed which H-bridge input is described by a [`DriveWiring`]
//! table so that a rewired chassis only needs a different table.

use serde::{Deserialize, Serialize};

use super::pwm::PwmDevice;
use crate::utils::math::duty::{clamp_throttle, throttle_duty, Direction};

/// PWM and direction inputs of one H-bridge channel.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MotorWiring {
    /// Speed input (PWMA / PWMB).
    pub pwm: u8,
    /// Direction input 1 (AIN1 / BIN1), high when driving forward.
    pub in1: u8,
    /// Direction input 2 (AIN2 / BIN2), high when driving in reverse.
    pub in2: u8,
}

/// Channel table for both motors on the drive board.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DriveWiring {
    pub motor_a: MotorWiring,
    pub motor_b: MotorWiring,
}

/// Channel map of the stock JetRacer motor board.
pub const JETRACER_WIRING: DriveWiring = DriveWiring {
    motor_a: MotorWiring {
        pwm: 7,
        in1: 5,
        in2: 6,
    },
    motor_b: MotorWiring {
        pwm: 0,
        in1: 2,
        in2: 1,
    },
};

impl Default for DriveWiring {
    fn default() -> Self {
        JETRACER_WIRING
    }
}

impl DriveWiring {
    pub fn motors(&self) -> [MotorWiring; 2] {
        [self.motor_a, self.motor_b]
    }
}

/// Converts one throttle value into direction pins and PWM duty for both motors.
pub struct DriveActuator<D> {
    device: D,
    wiring: DriveWiring,
}

impl<D: PwmDevice> DriveActuator<D> {
    pub fn new(
        device: D,
        wiring: DriveWiring,
    ) -> Self {
        Self { device, wiring }
    }

    /// Drive both motors at `speed`, clamped to `[-1.0, 1.0]`.
    ///
    /// Per motor the write order is in1, in2, then PWM duty. Returns the
    /// clamped speed that was applied.
    pub fn set_speed(
        &mut self,
        speed: f32,
    ) -> Result<f32, D::Error> {
        let speed = clamp_throttle(speed);
        let direction = Direction::from_speed(speed);
        let duty = throttle_duty(speed);

        for motor in self.wiring.motors() {
            self.drive_motor(motor, direction, duty)?;
        }
        Ok(speed)
    }

    fn drive_motor(
        &mut self,
        motor: MotorWiring,
        direction: Direction,
        duty: u16,
    ) -> Result<(), D::Error> {
        let (in1, in2) = direction.pin_levels();
        self.device.set_digital(motor.in1, in1)?;
        self.device.set_digital(motor.in2, in2)?;
        self.device.set_channel_duty(motor.pwm, duty)
    }

    pub fn release(&mut self) -> Result<(), D::Error> {
        self.device.release()
    }
}
