/*!
# MCU Bridge

Host-side serial bridge to the motor-control microcontroller. Queued
commands go out one 12-byte frame per transmit tick in strict priority
order; IMU heading reports coming back are resynchronized, validated and
printed.

## Usage

### Run the bridge (default)
```bash
mcu_bridge run --port /dev/ttyUSB0
```

### Without hardware (synthetic IMU, discarded output)
```bash
mcu_bridge run --debug --json
```

### One-shot commands
```bash
mcu_bridge send velocity -- -2.5
mcu_bridge send control emergency_stop
mcu_bridge send base-control 3
```
*/

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use mcu_link::{BaseCommand, Commander, ControlFrame, Frame, Priority, Telemetry};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::info;

mod config;
mod frame_sync;
mod serial;
mod synthetic;
mod transport;

use config::AppConfig;
use synthetic::SyntheticImu;
use transport::McuLink;

/// Report period of the synthetic IMU
const SYNTHETIC_PERIOD: Duration = Duration::from_millis(10);

/// How long `send` waits for the queue to drain
const SEND_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "mcu_bridge")]
#[command(about = "Serial bridge between the host and the motor-control MCU")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "mcu_bridge.toml")]
    config: PathBuf,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge and print IMU telemetry
    Run {
        /// Serial device, overrides the config file
        #[arg(short, long)]
        port: Option<String>,

        /// Print telemetry as JSON lines
        #[arg(long)]
        json: bool,

        /// Use a synthetic IMU instead of the serial port
        #[arg(long)]
        debug: bool,
    },

    /// Queue commands, transmit them and exit
    Send {
        /// Serial device, overrides the config file
        #[arg(short, long)]
        port: Option<String>,

        #[command(subcommand)]
        action: SendAction,
    },

    /// List available serial ports
    Ports,

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "mcu_bridge.toml")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum SendAction {
    /// Base velocity
    Velocity {
        #[arg(allow_negative_numbers = true)]
        value: f32,
    },

    /// Base heading angle
    Angle {
        #[arg(allow_negative_numbers = true)]
        value: f32,
    },

    /// Rotate-mode byte
    RotateMode { mode: u8 },

    /// Velocity, angle and rotate mode together
    Drive {
        #[arg(allow_negative_numbers = true)]
        velocity: f32,
        #[arg(allow_negative_numbers = true)]
        angle: f32,
        #[arg(default_value = "0")]
        rotate: u8,
    },

    /// Fixed control frame by name (idle, homing, emergency_stop, ...)
    Control {
        name: String,

        #[arg(long, value_enum, default_value = "high")]
        priority: Tier,
    },

    /// Numbered base-control operation (0-10)
    BaseControl { code: u8 },

    /// Rotate the base to an absolute angle
    RotateBase {
        #[arg(allow_negative_numbers = true)]
        angle: f32,
    },

    /// Fire the ball pusher
    PushBall,

    /// Raw 12-byte frame as hex, checksum must be valid
    Raw {
        hex: String,

        #[arg(long, value_enum, default_value = "mid")]
        priority: Tier,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Tier {
    High,
    Mid,
    Low,
}

impl From<Tier> for Priority {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::High => Priority::High,
            Tier::Mid => Priority::Mid,
            Tier::Low => Priority::Low,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config { output }) = &cli.command {
        return generate_config_file(output);
    }

    let config = AppConfig::load_or_default(&cli.config)?;
    init_logging(&config, cli.verbose)?;

    match cli.command {
        Some(Commands::Run { port, json, debug }) => {
            run_bridge(with_port(config, port), json, debug)
        }

        Some(Commands::Send { port, action }) => run_send(with_port(config, port), action),

        Some(Commands::Ports) => list_ports(),

        Some(Commands::Config { .. }) => Ok(()),

        None => run_bridge(config, false, false),
    }
}

/// Initialize logging to stderr to keep stdout clean for telemetry
fn init_logging(config: &AppConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config
            .logging
            .level
            .parse::<tracing::Level>()
            .with_context(|| format!("Invalid log level: {}", config.logging.level))?
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    Ok(())
}

fn with_port(mut config: AppConfig, port: Option<String>) -> AppConfig {
    if let Some(port) = port {
        config.serial.port = port;
    }
    config
}

/// Run the bridge until Ctrl+C, printing every decoded heading
fn run_bridge(config: AppConfig, json: bool, debug: bool) -> Result<()> {
    let link = McuLink::new(config.transport.clone());

    // Set up Ctrl+C handler
    let running = link.get_running_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, shutting down gracefully...");
        running.store(false, Ordering::SeqCst);
    })?;

    let handles = if debug {
        info!("🧪 Debug mode: synthetic IMU, transmitted frames are discarded");
        link.start(SyntheticImu::new(SYNTHETIC_PERIOD), std::io::sink())?
    } else {
        let port = serial::open(&config.serial).context("MCU serial port unavailable")?;
        link.start(port.reader, port.writer)?
    };

    let running = link.get_running_flag();
    let stats_interval = config.transport.stats_interval();
    let mut last_stats = Instant::now();
    let mut samples = 0u64;

    while running.load(Ordering::SeqCst) {
        match handles.telemetry.recv_timeout(Duration::from_millis(100)) {
            Ok(telemetry) => {
                samples += 1;
                print_telemetry(&telemetry, json)?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Telemetry channel disconnected - receive thread has stopped");
                break;
            }
        }

        if last_stats.elapsed() >= stats_interval {
            let queue_stats = link.queue().stats();
            info!(
                "📊 {} headings received, {} frames dequeued, {} dropped by overflow",
                samples, queue_stats.dequeued, queue_stats.dropped
            );
            last_stats = Instant::now();
        }
    }

    link.stop();
    handles.join()?;

    println!("✅ MCU bridge stopped");
    Ok(())
}

fn print_telemetry(telemetry: &Telemetry, json: bool) -> Result<()> {
    let now = Local::now();
    let mut stdout = std::io::stdout().lock();

    if json {
        let line = serde_json::json!({
            "timestamp": now.to_rfc3339(),
            "angle": telemetry.angle,
        });
        writeln!(stdout, "{}", line)?;
    } else {
        writeln!(stdout, "{} heading {:+8.2}°", now.format("%H:%M:%S%.3f"), telemetry.angle)?;
    }

    stdout.flush()?;
    Ok(())
}

/// Queue the requested frames on the commander
fn queue_action(commander: &Commander, action: SendAction) -> Result<()> {
    match action {
        SendAction::Velocity { value } => {
            commander.submit(Priority::Low, mcu_link::commands::velocity(value));
        }
        SendAction::Angle { value } => {
            commander.submit(Priority::Low, mcu_link::commands::angle(value));
        }
        SendAction::RotateMode { mode } => {
            commander.submit(Priority::Low, mcu_link::commands::rotate_mode(mode));
        }
        SendAction::Drive { velocity, angle, rotate } => {
            commander.base_command(BaseCommand { velocity, angle, rotate });
        }
        SendAction::Control { name, priority } => {
            let op = ControlFrame::from_name(&name)
                .with_context(|| format!("Unknown control frame: {}", name))?;
            commander.control(priority.into(), op);
        }
        SendAction::BaseControl { code } => {
            commander.base_control(code)?;
        }
        SendAction::RotateBase { angle } => commander.rotate_base(angle),
        SendAction::PushBall => commander.push_ball(true)?,
        SendAction::Raw { hex, priority } => {
            let bytes = hex::decode(hex.replace(' ', ""))
                .with_context(|| format!("Invalid hex frame: {}", hex))?;
            let frame = Frame::from_slice(&bytes)?;
            commander.submit(priority.into(), frame);
        }
    }
    Ok(())
}

/// Open the port, transmit the requested frames and exit
fn run_send(config: AppConfig, action: SendAction) -> Result<()> {
    let mut transport = config.transport.clone();
    transport.send_init_sequence = false;

    let link = McuLink::new(transport);
    queue_action(&link.commander(), action)?;
    let queued = link.queue().total_len();

    let port = serial::open(&config.serial).context("MCU serial port unavailable")?;
    let handles = link.start(port.reader, port.writer)?;

    let drained = link.flush(SEND_FLUSH_TIMEOUT);
    link.stop();
    let (tx_stats, _) = handles.join()?;

    if !drained {
        bail!(
            "Timed out after {:?}: {} of {} frame(s) sent",
            SEND_FLUSH_TIMEOUT,
            tx_stats.frames_sent,
            queued
        );
    }

    println!("✅ Sent {} frame(s) to {}", tx_stats.frames_sent, config.serial.port);
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serial::list_ports()?;

    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{:<24} {}", port.name, port.kind);
    }
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: &Path) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   mcu_bridge --config {} run", output_path.display());

    Ok(())
}
