use core::cell::RefCell;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use jetracer_core::utils::controllers::{
    pwm::{self, PwmDevice},
    PwmError, VehicleConfig, VehicleController, VehicleError,
};

/// Default I2C address of the steering board.
pub const STEERING_ADDRESS: u8 = 0x40;
/// Default I2C address of the motor board.
pub const MOTOR_ADDRESS: u8 = 0x60;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}

/// A channel write with `on = 0` and the given 12-bit `off` count.
pub fn channel_off_at(
    addr: u8,
    channel: u8,
    off: u16,
) -> I2cTrans {
    write(
        addr,
        vec![0x06 + 4 * channel, 0x00, 0x00, off as u8, (off >> 8) as u8],
    )
}

/// Wake the chip and program the prescaler.
pub fn frequency_setup(
    addr: u8,
    prescale: u8,
) -> Vec<I2cTrans> {
    vec![
        write(addr, vec![0x00, 0x01]),
        write(addr, vec![0x00, 0x11]),
        write(addr, vec![0xFE, prescale]),
        write(addr, vec![0x00, 0x01]),
    ]
}

/// All six drive channels written low, motor A (5, 6, 7) then motor B (2, 1, 0).
pub fn drive_all_low() -> Vec<I2cTrans> {
    [5, 6, 7, 2, 1, 0]
        .into_iter()
        .map(|ch| channel_off_at(MOTOR_ADDRESS, ch, 0))
        .collect()
}

/// Every transaction issued by a successful default initialization.
pub fn init_sequence() -> Vec<I2cTrans> {
    let mut expectations = frequency_setup(STEERING_ADDRESS, 122);
    expectations.extend(frequency_setup(MOTOR_ADDRESS, 6));
    // first channel write on each board enables auto-increment
    expectations.push(write(MOTOR_ADDRESS, vec![0x00, 0x21]));
    expectations.extend(drive_all_low());
    expectations.push(write(STEERING_ADDRESS, vec![0x00, 0x21]));
    // 1700us -> duty 5570 -> off 348
    expectations.push(channel_off_at(STEERING_ADDRESS, 0, 348));
    expectations
}

#[test]
fn test_initialize_sets_frequencies_and_safe_state() {
    let expectations = init_sequence();

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let racer = VehicleController::initialize(&i2c_bus, &VehicleConfig::default()).unwrap();
    assert_eq!(racer.throttle(), 0.0);
    assert_eq!(racer.steering_us(), 1700);
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_steering_pulse_width_writes() {
    let mut expectations = init_sequence();
    // 2000us -> 6554 -> off 409
    expectations.push(channel_off_at(STEERING_ADDRESS, 0, 409));
    // 5000us clamps to 2400us -> 7864 -> off 491
    expectations.push(channel_off_at(STEERING_ADDRESS, 0, 491));
    // -1.0 -> 1400us -> 4587 -> off 286
    expectations.push(channel_off_at(STEERING_ADDRESS, 0, 286));

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut racer = VehicleController::initialize(&i2c_bus, &VehicleConfig::default()).unwrap();
    racer.set_steering_us(2000).unwrap();
    racer.set_steering_us(5000).unwrap();
    assert_eq!(racer.steering_us(), 2400);
    racer.set_steering_normalized(-1.0).unwrap();
    assert_eq!(racer.steering_us(), 1400);
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_shutdown_stops_then_sleeps_both_boards() {
    let mut expectations = init_sequence();
    expectations.extend(drive_all_low());
    expectations.push(write(STEERING_ADDRESS, vec![0x00, 0x31]));
    expectations.push(write(MOTOR_ADDRESS, vec![0x00, 0x31]));

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut racer = VehicleController::initialize(&i2c_bus, &VehicleConfig::default()).unwrap();
    racer.shutdown().unwrap();
    assert!(racer.is_shut_down());
    assert!(matches!(
        racer.set_throttle(0.2),
        Err(VehicleError::DeviceClosed)
    ));
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_bus_error_keeps_last_applied_steering() {
    let mut expectations = init_sequence();
    expectations.push(channel_off_at(STEERING_ADDRESS, 0, 409).with_error(ErrorKind::Other));

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut racer = VehicleController::initialize(&i2c_bus, &VehicleConfig::default()).unwrap();
    let err = racer.set_steering_us(2000).unwrap_err();
    assert!(matches!(
        err,
        VehicleError::WriteFault(PwmError::I2C(ErrorKind::Other))
    ));
    assert_eq!(racer.steering_us(), 1700);
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_initialize_rejects_reserved_address_and_scans() {
    // 0x70 is the PCA9685 all-call address, so the motor handle is refused
    // before any traffic and the only transactions are the scan.
    let expectations: Vec<I2cTrans> = (0x03..0x78u8)
        .map(|addr| {
            let probe = write(addr, vec![]);
            if addr == STEERING_ADDRESS {
                probe
            } else {
                probe.with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
            }
        })
        .collect();

    let config = VehicleConfig {
        motor_address: 0x70,
        ..VehicleConfig::default()
    };
    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let result = VehicleController::initialize(&i2c_bus, &config);
    assert!(matches!(
        result,
        Err(VehicleError::Initialization(PwmError::InvalidInputData))
    ));
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_pca9685_duty_mapping() {
    let expectations = [
        write(MOTOR_ADDRESS, vec![0x00, 0x31]),
        channel_off_at(MOTOR_ADDRESS, 3, 0),
        channel_off_at(MOTOR_ADDRESS, 3, 2048),
        channel_off_at(MOTOR_ADDRESS, 3, 4095),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut board = pwm::bind(&i2c_bus, MOTOR_ADDRESS).unwrap();
    board.set_channel_duty(3, 0).unwrap();
    board.set_channel_duty(3, 32768).unwrap();
    board.set_channel_duty(3, 0xFFFE).unwrap();
    assert!(matches!(
        board.set_channel_duty(16, 100),
        Err(PwmError::InvalidInputData)
    ));
    assert!(matches!(
        board.set_frequency(5000),
        Err(PwmError::InvalidInputData)
    ));
    i2c_bus.borrow_mut().done();
}

#[test]
fn test_scan_bus_reports_responding_addresses() {
    let expectations: Vec<I2cTrans> = (0x03..0x78u8)
        .map(|addr| {
            let probe = write(addr, vec![]);
            if addr == STEERING_ADDRESS || addr == MOTOR_ADDRESS {
                probe
            } else {
                probe.with_error(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
            }
        })
        .collect();

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut found = Vec::new();
    let count = pwm::scan_bus(&i2c_bus, |addr| found.push(addr));
    assert_eq!(count, 2);
    assert_eq!(found, vec![STEERING_ADDRESS, MOTOR_ADDRESS]);
    i2c_bus.borrow_mut().done();
}
