//! Module Exports
//!
//! This file exports the actuator modules and the [`VehicleController`] that
//! owns them.
//!
//! - `pwm`: the [`PwmDevice`] contract and its PCA9685 implementation.
//! - `drive`: synchronized throttle for the two drive motors.
//! - `steering`: pulse-width control of the steering servo.

pub mod drive;
pub mod pwm;
pub mod steering;

use core::{cell::RefCell, fmt};

use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};

pub use drive::{DriveActuator, DriveWiring, MotorWiring, JETRACER_WIRING};
pub use pwm::{BoardHandle, PwmDevice, PwmError};
pub use steering::{SteeringActuator, SteeringCalibration};

use crate::utils::math::duty::period_us;

/// Default I2C address of the steering PCA9685.
pub const STEERING_ADDRESS: u8 = 0x40;
/// Default I2C address of the motor PCA9685.
pub const MOTOR_ADDRESS: u8 = 0x60;
/// Servo signal frequency (Hz).
pub const STEERING_FREQ_HZ: u16 = 50;
/// H-bridge PWM frequency (Hz).
pub const MOTOR_FREQ_HZ: u16 = 1000;

/// Commands accepted by [`VehicleController::execute_command`].
///
/// Serialized as JSON with tag `"vc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "vc", rename_all = "snake_case")] // vc = vehicle command
pub enum VehicleCommand {
    /// Synchronized throttle for both motors.
    Throttle { s: f32 },
    /// Absolute steering pulse width in microseconds.
    SteerUs { us: i32 },
    /// Normalized steering, -1.0 (left) to 1.0 (right).
    Steer { v: f32 },
    /// Zero the throttle, keep the steering.
    Stop,
    /// Stop and release both boards.
    Shutdown,
}

/// Hardware layout and limits of the vehicle.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct VehicleConfig {
    pub steering_address: u8,
    pub motor_address: u8,
    pub steering_channel: u8,
    pub steering_hz: u16,
    pub motor_hz: u16,
    pub steering: SteeringCalibration,
    pub wiring: DriveWiring,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            steering_address: STEERING_ADDRESS,
            motor_address: MOTOR_ADDRESS,
            steering_channel: 0,
            steering_hz: STEERING_FREQ_HZ,
            motor_hz: MOTOR_FREQ_HZ,
            steering: SteeringCalibration::default(),
            wiring: JETRACER_WIRING,
        }
    }
}

/// Errors surfaced by the [`VehicleController`].
#[derive(Debug)]
pub enum VehicleError<E: fmt::Debug> {
    /// A board could not be bound or configured; no controller was built.
    Initialization(E),
    /// A duty or frequency write failed while executing a command.
    WriteFault(E),
    /// The controller was already shut down.
    DeviceClosed,
}

impl<E: fmt::Debug> fmt::Display for VehicleError<E> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            VehicleError::Initialization(e) => {
                write!(f, "PWM device initialization failed: {:?}", e)
            }
            VehicleError::WriteFault(e) => write!(f, "PWM device write failed: {:?}", e),
            VehicleError::DeviceClosed => f.write_str("PWM devices already released"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for VehicleError<E> {}

struct Actuators<D> {
    steering: SteeringActuator<D>,
    drive: DriveActuator<D>,
}

impl<D: PwmDevice> Actuators<D> {
    /// Release both boards, steering first. Both are attempted.
    fn release(&mut self) -> Result<(), D::Error> {
        let steering = self.steering.release();
        let drive = self.drive.release();
        steering.and(drive)
    }
}

/// Owns the steering and drive actuators and tracks the last applied command.
///
/// There is no internal locking; callers sharing a controller across threads
/// must serialize access themselves.
pub struct VehicleController<D> {
    actuators: Option<Actuators<D>>,
    current_throttle: f32,
    current_steering_us: u16,
}

impl<D> VehicleController<D>
where
    D: PwmDevice,
{
    /// Configure both boards and force the vehicle into its safe state
    /// (throttle 0, steering centered).
    ///
    /// On failure every board is released and no controller is returned.
    pub fn new(
        mut steering_dev: D,
        mut motor_dev: D,
        config: &VehicleConfig,
    ) -> Result<Self, VehicleError<D::Error>> {
        let setup = steering_dev
            .set_frequency(config.steering_hz)
            .and_then(|()| motor_dev.set_frequency(config.motor_hz));
        if let Err(e) = setup {
            tracing::error!("PWM frequency setup failed: {:?}", e);
            let released = steering_dev.release().and(motor_dev.release());
            if let Err(release) = released {
                tracing::warn!("Release after failed init also failed: {:?}", release);
            }
            return Err(VehicleError::Initialization(e));
        }

        let mut actuators = Actuators {
            steering: SteeringActuator::new(
                steering_dev,
                config.steering_channel,
                period_us(config.steering_hz),
                config.steering,
            ),
            drive: DriveActuator::new(motor_dev, config.wiring),
        };

        let safe_state = actuators.drive.set_speed(0.0).and_then(|throttle| {
            let steering_us = actuators
                .steering
                .set_pulse_width(config.steering.center_us as i32)?;
            Ok((throttle, steering_us))
        });

        match safe_state {
            Ok((throttle, steering_us)) => {
                tracing::info!(
                    "Vehicle initialized - Steering: 0x{:02x}, Motor: 0x{:02x}",
                    config.steering_address,
                    config.motor_address
                );
                Ok(Self {
                    actuators: Some(actuators),
                    current_throttle: throttle,
                    current_steering_us: steering_us,
                })
            }
            Err(e) => {
                tracing::error!("Failed to force safe state: {:?}", e);
                if let Err(release) = actuators.release() {
                    tracing::warn!("Release after failed init also failed: {:?}", release);
                }
                Err(VehicleError::Initialization(e))
            }
        }
    }

    fn actuators(&mut self) -> Result<&mut Actuators<D>, VehicleError<D::Error>> {
        self.actuators.as_mut().ok_or(VehicleError::DeviceClosed)
    }

    /// Drive both motors at `speed`, clamped to `[-1.0, 1.0]`.
    pub fn set_throttle(
        &mut self,
        speed: f32,
    ) -> Result<(), VehicleError<D::Error>> {
        let applied = self
            .actuators()?
            .drive
            .set_speed(speed)
            .map_err(VehicleError::WriteFault)?;
        self.current_throttle = applied;
        tracing::debug!(requested = speed, applied, "throttle set");
        Ok(())
    }

    /// Steer to an absolute pulse width, clamped to the calibration limits.
    pub fn set_steering_us(
        &mut self,
        us: i32,
    ) -> Result<(), VehicleError<D::Error>> {
        let applied = self
            .actuators()?
            .steering
            .set_pulse_width(us)
            .map_err(VehicleError::WriteFault)?;
        self.current_steering_us = applied;
        tracing::debug!(requested = us, applied, "steering set");
        Ok(())
    }

    /// Steer with a normalized value around center.
    pub fn set_steering_normalized(
        &mut self,
        value: f32,
    ) -> Result<(), VehicleError<D::Error>> {
        let applied = self
            .actuators()?
            .steering
            .set_normalized(value)
            .map_err(VehicleError::WriteFault)?;
        self.current_steering_us = applied;
        tracing::debug!(requested = value, applied, "normalized steering set");
        Ok(())
    }

    /// Last throttle that was clamped and written.
    pub fn throttle(&self) -> f32 {
        self.current_throttle
    }

    /// Last steering pulse width (µs) that was clamped and written.
    pub fn steering_us(&self) -> u16 {
        self.current_steering_us
    }

    pub fn is_shut_down(&self) -> bool {
        self.actuators.is_none()
    }

    /// Zero the throttle. Steering is left where it is.
    pub fn stop(&mut self) -> Result<(), VehicleError<D::Error>> {
        self.set_throttle(0.0)
    }

    /// Stop the motors and release both boards.
    ///
    /// Both boards are released even if the stop write fails; the first error
    /// is returned. Every later command fails with [`VehicleError::DeviceClosed`].
    pub fn shutdown(&mut self) -> Result<(), VehicleError<D::Error>> {
        if self.is_shut_down() {
            return Err(VehicleError::DeviceClosed);
        }
        tracing::info!("Shutting down vehicle...");

        let stopped = self.stop();
        if let Err(e) = &stopped {
            tracing::error!("Stop before release failed: {:?}", e);
        }
        let released = match self.actuators.take() {
            Some(mut actuators) => actuators.release().map_err(VehicleError::WriteFault),
            None => Ok(()),
        };

        tracing::info!("Vehicle shutdown complete");
        stopped.and(released)
    }

    /// Execute a high-level [`VehicleCommand`].
    pub fn execute_command(
        &mut self,
        command: VehicleCommand,
    ) -> Result<(), VehicleError<D::Error>> {
        match command {
            VehicleCommand::Throttle { s } => self.set_throttle(s),
            VehicleCommand::SteerUs { us } => self.set_steering_us(us),
            VehicleCommand::Steer { v } => self.set_steering_normalized(v),
            VehicleCommand::Stop => self.stop(),
            VehicleCommand::Shutdown => self.shutdown(),
        }
    }
}

impl<'a, I2C> VehicleController<BoardHandle<'a, I2C>>
where
    I2C: I2c,
{
    /// Bind both boards on a shared I2C bus and initialize the vehicle.
    ///
    /// If a board cannot be bound or configured the bus is scanned and every
    /// responding address is logged before the error is returned.
    pub fn initialize(
        bus: &'a RefCell<I2C>,
        config: &VehicleConfig,
    ) -> Result<Self, VehicleError<PwmError<I2C::Error>>> {
        let handles = pwm::bind(bus, config.steering_address)
            .and_then(|steering| Ok((steering, pwm::bind(bus, config.motor_address)?)));

        let result = match handles {
            Ok((steering, motor)) => Self::new(steering, motor, config),
            Err(e) => Err(VehicleError::Initialization(e)),
        };

        if let Err(e) = &result {
            tracing::warn!("Vehicle init failed, scanning instead: {}", e);
            pwm::scan_bus(bus, |_| {});
        }
        result
    }
}
