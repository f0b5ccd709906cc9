//! PWM device abstraction and its PCA9685 implementation.
//!
//! Actuators only ever talk to a [`PwmDevice`]. On the vehicle that is a
//! PCA9685 sitting on a shared I2C bus; in tests it can be anything that
//! records writes.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use pwm_pca9685::{Address as PwmAddress, Channel, Pca9685};

pub use pwm_pca9685::Error as PwmError;

use crate::utils::math::duty::{prescale_for, FULL_SCALE_DUTY};

/// Number of output channels on a PCA9685.
pub const CHANNEL_COUNT: u8 = 16;

/// A PCA9685 bound to one address on a shared `RefCell` bus.
pub type BoardHandle<'a, I2C> = Pca9685<RefCellDevice<'a, I2C>>;

/// Minimal capability the actuators need from a PWM controller chip.
pub trait PwmDevice {
    type Error: core::fmt::Debug;

    /// Configure the signal frequency for every channel on the device.
    ///
    /// Must be called once before the first duty write.
    fn set_frequency(
        &mut self,
        hz: u16,
    ) -> Result<(), Self::Error>;

    /// Set the on-time of `channel`; `0` is always low, `0xFFFF` always high.
    fn set_channel_duty(
        &mut self,
        channel: u8,
        duty: u16,
    ) -> Result<(), Self::Error>;

    /// Tear the device down. No channel writes are valid afterwards.
    fn release(&mut self) -> Result<(), Self::Error>;

    /// Drive a channel as a plain digital output.
    fn set_digital(
        &mut self,
        channel: u8,
        high: bool,
    ) -> Result<(), Self::Error> {
        self.set_channel_duty(channel, if high { FULL_SCALE_DUTY } else { 0 })
    }
}

impl<I2C, E> PwmDevice for Pca9685<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = PwmError<E>;

    fn set_frequency(
        &mut self,
        hz: u16,
    ) -> Result<(), Self::Error> {
        let prescale = prescale_for(hz).ok_or(PwmError::InvalidInputData)?;
        self.enable()?;
        self.set_prescale(prescale)?;
        tracing::debug!(hz, prescale, "PWM frequency configured");
        Ok(())
    }

    fn set_channel_duty(
        &mut self,
        channel: u8,
        duty: u16,
    ) -> Result<(), Self::Error> {
        let channel = channel_from_index(channel).ok_or(PwmError::InvalidInputData)?;
        if duty == FULL_SCALE_DUTY {
            self.set_channel_full_on(channel, 0)
        } else {
            // 16-bit duty onto the 12-bit counter; 0xFFFE + 1 stays within 4095
            self.set_channel_on_off(channel, 0, (duty + 1) >> 4)
        }
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.disable()
    }
}

/// Map a raw channel index onto the driver's channel enum.
pub fn channel_from_index(index: u8) -> Option<Channel> {
    let channel = match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    };
    Some(channel)
}

/// Bind a PCA9685 handle at `address` on a shared bus.
///
/// No bus traffic happens here; the first transaction is the frequency setup.
pub fn bind<'a, I2C>(
    bus: &'a RefCell<I2C>,
    address: u8,
) -> Result<BoardHandle<'a, I2C>, PwmError<I2C::Error>>
where
    I2C: I2c,
{
    Pca9685::new(RefCellDevice::new(bus), PwmAddress::from(address))
}

/// Probe the bus for devices and report every acknowledging address.
///
/// Returns the number of devices found.
pub fn scan_bus<I2C: I2c>(
    bus: &RefCell<I2C>,
    mut found: impl FnMut(u8),
) -> usize {
    let mut bus = bus.borrow_mut();
    let mut count = 0;
    for addr in 0x03..0x78 {
        if bus.write(addr, &[]).is_ok() {
            tracing::warn!("I2C device found at 0x{:02X}", addr);
            found(addr);
            count += 1;
        }
    }
    count
}
