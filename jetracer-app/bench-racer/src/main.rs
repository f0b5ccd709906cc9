use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use core::cell::RefCell;
use embedded_hal::i2c::{ErrorType, I2c, Operation};
use jetracer_core::utils::controllers::{
    pwm::{self, PwmDevice, CHANNEL_COUNT},
    BoardHandle, PwmError,
};
use jetracer_core::utils::{VehicleCommand, VehicleConfig, VehicleController};
use std::convert::Infallible;
use std::io::BufRead;
use std::path::PathBuf;
use std::{fs, thread, time::Duration};
use tracing::{debug, error, info, warn};

const FORWARD_RAMP: [f32; 4] = [0.10, 0.15, 0.20, 0.25];
const REVERSE_RAMP: [f32; 3] = [-0.10, -0.15, -0.20];
const BENCH_THROTTLE: f32 = 0.2;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// steering board address, hex (0x40) or decimal
    #[clap(long, value_parser = parse_address)]
    steering_addr: Option<u8>,
    /// motor board address, hex (0x60) or decimal
    #[clap(long, value_parser = parse_address)]
    motor_addr: Option<u8>,
    /// JSON file holding a vehicle config
    #[clap(long)]
    config: Option<PathBuf>,
    /// hold time for each bench step, in milliseconds
    #[clap(long, default_value_t = 1000)]
    dwell_ms: u64,
    #[clap(subcommand)]
    routine: Routine,
}

#[derive(Subcommand, Clone, Copy)]
enum Routine
{
    /// center, forward 20%, stop, reverse 20%, stop
    QuickTest,
    /// forward and reverse throttle ramps
    Ramp,
    /// steering full left, center, full right, center
    Sweep,
    /// toggle every motor-board channel to find the wiring
    ScanChannels,
    /// execute one JSON command per stdin line
    Replay,
}

/// I2C bus that logs every transaction instead of driving hardware.
struct TraceBus;

impl ErrorType for TraceBus {
    type Error = Infallible;
}

impl I2c for TraceBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for op in operations {
            match op {
                Operation::Write(bytes) => debug!("i2c 0x{:02X} <- {:02X?}", address, bytes),
                Operation::Read(buffer) => {
                    buffer.fill(0);
                    debug!("i2c 0x{:02X} -> {} zero bytes", address, buffer.len());
                }
            }
        }
        Ok(())
    }
}

type Racer<'a> = VehicleController<BoardHandle<'a, TraceBus>>;

fn parse_address(text: &str) -> Result<u8, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid I2C address {:?}: {}", text, e))
}

fn load_config(opts: &Opts) -> Result<VehicleConfig> {
    let mut config = match &opts.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid vehicle config in {}", path.display()))?
        }
        None => VehicleConfig::default(),
    };
    if let Some(addr) = opts.steering_addr {
        config.steering_address = addr;
    }
    if let Some(addr) = opts.motor_addr {
        config.motor_address = addr;
    }
    Ok(config)
}

fn board_error(e: PwmError<Infallible>) -> anyhow::Error {
    anyhow!("PWM board error: {:?}", e)
}

/// Initialize the vehicle, run `routine`, and shut down on every exit path.
fn with_vehicle<'a>(
    bus: &'a RefCell<TraceBus>,
    config: &VehicleConfig,
    routine: impl FnOnce(&mut Racer<'a>) -> Result<()>,
) -> Result<()> {
    let mut racer =
        VehicleController::initialize(bus, config).context("Failed to initialize vehicle")?;

    let outcome = routine(&mut racer);
    if let Err(e) = &outcome {
        error!("Routine failed: {:#}", e);
    }
    if !racer.is_shut_down() {
        racer.shutdown().context("Shutdown failed")?;
    }
    outcome
}

fn quick_test(
    racer: &mut Racer<'_>,
    dwell: Duration,
) -> Result<()> {
    info!("[1/4] Steering center...");
    racer.set_steering_normalized(0.0)?;
    thread::sleep(dwell);

    info!("[2/4] Forward ({:.0}%)...", BENCH_THROTTLE * 100.0);
    racer.set_throttle(BENCH_THROTTLE)?;
    thread::sleep(dwell * 2);
    racer.stop()?;
    thread::sleep(dwell);

    info!("[3/4] Reverse ({:.0}%)...", BENCH_THROTTLE * 100.0);
    racer.set_throttle(-BENCH_THROTTLE)?;
    thread::sleep(dwell * 2);
    racer.stop()?;
    thread::sleep(dwell);

    info!("[4/4] Shutting down...");
    racer.shutdown()?;
    info!("Quick test passed");
    Ok(())
}

fn ramp(
    racer: &mut Racer<'_>,
    dwell: Duration,
) -> Result<()> {
    for (label, steps) in [("Forward", &FORWARD_RAMP[..]), ("Reverse", &REVERSE_RAMP[..])] {
        info!("{} ramp...", label);
        for &speed in steps {
            racer.set_throttle(speed)?;
            info!(throttle = racer.throttle(), "holding");
            thread::sleep(dwell);
        }
        info!("Stop...");
        racer.stop()?;
        thread::sleep(dwell);
    }
    Ok(())
}

fn sweep(
    racer: &mut Racer<'_>,
    dwell: Duration,
) -> Result<()> {
    for (label, value) in [("left", -1.0), ("center", 0.0), ("right", 1.0), ("center", 0.0)] {
        racer.set_steering_normalized(value)?;
        info!("Steering {} at {}us", label, racer.steering_us());
        thread::sleep(dwell);
    }
    Ok(())
}

/// Execute one `VehicleCommand` per line until `shutdown` or end of input.
///
/// Malformed lines are logged and skipped.
fn replay(
    racer: &mut Racer<'_>,
    input: impl BufRead,
) -> Result<()> {
    for (index, line) in input.lines().enumerate() {
        let line = line.context("Failed to read command stream")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command: VehicleCommand = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(line = index + 1, "Skipping malformed command: {}", e);
                continue;
            }
        };
        racer.execute_command(command)?;
        info!(
            throttle = racer.throttle(),
            steering_us = racer.steering_us(),
            "Applied {:?}",
            command
        );
        if racer.is_shut_down() {
            break;
        }
    }
    Ok(())
}

/// Toggle each motor-board channel high then low, one at a time.
fn scan_channels(
    bus: &RefCell<TraceBus>,
    config: &VehicleConfig,
    dwell: Duration,
) -> Result<()> {
    let mut board = pwm::bind(bus, config.motor_address).map_err(board_error)?;
    let outcome = board
        .set_frequency(config.motor_hz)
        .and_then(|()| {
            for channel in 0..CHANNEL_COUNT {
                info!("ch {}", channel);
                board.set_digital(channel, true)?;
                thread::sleep(dwell);
                board.set_digital(channel, false)?;
                thread::sleep(dwell / 5);
            }
            Ok(())
        })
        .map_err(board_error);
    board.release().map_err(board_error)?;
    outcome
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts: Opts = Opts::parse();
    let config = load_config(&opts)?;
    let dwell = Duration::from_millis(opts.dwell_ms);

    warn!("No hardware bus attached, I2C traffic is logged at debug level");
    let bus = RefCell::new(TraceBus);

    match opts.routine {
        Routine::QuickTest => with_vehicle(&bus, &config, |racer| quick_test(racer, dwell)),
        Routine::Ramp => with_vehicle(&bus, &config, |racer| ramp(racer, dwell)),
        Routine::Sweep => with_vehicle(&bus, &config, |racer| sweep(racer, dwell)),
        Routine::Replay => {
            with_vehicle(&bus, &config, |racer| replay(racer, std::io::stdin().lock()))
        }
        Routine::ScanChannels => scan_channels(&bus, &config, dwell),
    }
}
