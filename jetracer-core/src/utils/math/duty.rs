//! Duty-cycle arithmetic for the drive and steering channels.
//!
//! All conversions target a 16-bit full-scale duty (`0xFFFF` = always high).
//! The PCA9685 itself only resolves 12 bits; narrowing happens in the
//! device layer, not here.
//!
//! # Example
//! ```rust
//! use jetracer_core::utils::math::duty;
//! assert_eq!(duty::throttle_duty(0.5), 32768);
//! assert_eq!(duty::pulse_width_duty(1700, 20_000), 5570);
//! ```

/// Maximum duty value for a 16-bit PWM channel.
pub const FULL_SCALE_DUTY: u16 = 0xFFFF;

/// Internal oscillator of the PCA9685 (Hz).
pub const PCA9685_OSC_HZ: f32 = 25_000_000.0;

/// Sign of a throttle command as seen by a dual H-bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
    /// Both inputs low.
    Coast,
}

impl Direction {
    /// Direction selected by an already-clamped speed.
    pub fn from_speed(speed: f32) -> Self {
        if speed > 0.0 {
            Direction::Forward
        } else if speed < 0.0 {
            Direction::Reverse
        } else {
            Direction::Coast
        }
    }

    /// Levels for the `(in1, in2)` pin pair.
    pub fn pin_levels(self) -> (bool, bool) {
        match self {
            Direction::Forward => (true, false),
            Direction::Reverse => (false, true),
            Direction::Coast => (false, false),
        }
    }
}

/// Clamp a throttle to `[-1.0, 1.0]`. `NaN` collapses to `0.0`.
pub fn clamp_throttle(speed: f32) -> f32 {
    if speed.is_nan() {
        0.0
    } else {
        speed.clamp(-1.0, 1.0)
    }
}

/// Magnitude duty for a clamped throttle, `round(|speed| * FULL_SCALE_DUTY)`.
pub fn throttle_duty(speed: f32) -> u16 {
    let magnitude = libm::fabsf(clamp_throttle(speed));
    libm::roundf(magnitude * FULL_SCALE_DUTY as f32) as u16
}

/// Duty representing a pulse of `pulse_us` inside a period of `period_us`.
///
/// Integer round-half-up, so 2000 µs in a 20 ms period gives 6554.
pub fn pulse_width_duty(
    pulse_us: u16,
    period_us: u32,
) -> u16 {
    if period_us == 0 {
        return FULL_SCALE_DUTY;
    }
    let scaled = pulse_us as u64 * FULL_SCALE_DUTY as u64 + (period_us as u64 / 2);
    (scaled / period_us as u64).min(FULL_SCALE_DUTY as u64) as u16
}

/// Map a normalized steering value onto a pulse width around `center_us`.
///
/// The value is not clamped to `[-1.0, 1.0]`; the caller clamps
/// in microsecond space afterwards. Fractional microseconds truncate toward
/// zero. `NaN` maps to the center.
pub fn normalized_to_pulse_width(
    value: f32,
    center_us: u16,
    span_us: u16,
) -> i32 {
    let value = if value.is_nan() { 0.0 } else { value };
    // `as` truncates and saturates, so +-inf lands on i32::MAX / i32::MIN
    (center_us as f32 + value * span_us as f32) as i32
}

/// PCA9685 prescaler for a target output frequency.
///
/// Returns `None` when the frequency is unreachable (prescale outside `3..=255`).
pub fn prescale_for(hz: u16) -> Option<u8> {
    if hz == 0 {
        return None;
    }
    let prescale = libm::floorf(PCA9685_OSC_HZ / (4096.0 * hz as f32) + 0.5);
    if (3.0..=255.0).contains(&prescale) {
        Some(prescale as u8)
    } else {
        None
    }
}

/// Servo period in microseconds for a given signal frequency.
pub fn period_us(hz: u16) -> u32 {
    if hz == 0 {
        0
    } else {
        1_000_000 / hz as u32
    }
}
