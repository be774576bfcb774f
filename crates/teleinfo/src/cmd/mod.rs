use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use teleinfo_bus::DEFAULT_CLIENT_ID;
use teleinfo_pipeline::DEFAULT_TOPIC_PREFIX;
use teleinfo_transport::{SerialConfig, TELEINFO_BAUD_RATE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod checksum;
pub mod listen;
pub mod run;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read frames from the meter and publish every field on MQTT.
    Run(RunArgs),
    /// Decode and print frames without publishing.
    Listen(ListenArgs),
    /// Print the checksum character of a field.
    Checksum(ChecksumArgs),
    /// Write synthetic frames to a device or file.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Checksum(args) => checksum::run(args, format),
        Command::Simulate(args) => simulate::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serial device the meter is wired to.
    #[arg(long, env = "TELEINFO_DEVICE")]
    pub device: PathBuf,
    /// Broker address: host[:port], optionally prefixed by tcp:// or mqtt://.
    #[arg(long, env = "MQTT_URL")]
    pub mqtt_url: String,
    /// Broker username.
    #[arg(long, env = "MQTT_LOGIN")]
    pub mqtt_login: Option<String>,
    /// Broker password.
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,
    /// MQTT client identifier.
    #[arg(long, default_value = DEFAULT_CLIENT_ID)]
    pub client_id: String,
    /// Topic prefix; fields are published on <PREFIX>/<NAME>.
    #[arg(long, default_value = DEFAULT_TOPIC_PREFIX)]
    pub topic_prefix: String,
    /// Bound the reader/publisher queue to N frames. Default: unbounded.
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,
    /// Stop after N decode errors in a row. Default: retry forever.
    #[arg(long, value_name = "N")]
    pub max_consecutive_errors: Option<u32>,
    /// Serial line speed.
    #[arg(long, default_value_t = TELEINFO_BAUD_RATE)]
    pub baud: u32,
    /// Broker connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// MQTT keep-alive interval announced to the broker. Default: disabled.
    #[arg(long)]
    pub keep_alive: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial device the meter is wired to.
    #[arg(long, env = "TELEINFO_DEVICE", required_unless_present = "replay")]
    pub device: Option<PathBuf>,
    /// Decode a captured byte stream from a file instead of a device.
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Serial line speed.
    #[arg(long, default_value_t = TELEINFO_BAUD_RATE)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Field name (label).
    pub name: String,
    /// Field value.
    pub value: String,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Serial device or file to write frames to.
    pub output: PathBuf,
    /// Number of frames to write.
    #[arg(long, default_value_t = 1)]
    pub count: u64,
    /// Pause between frames (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Serial line speed when OUTPUT is a device.
    #[arg(long, default_value_t = TELEINFO_BAUD_RATE)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the meter's serial line for reading.
#[cfg(unix)]
fn open_device(path: &Path, baud: u32) -> CliResult<teleinfo_transport::SerialPort> {
    let config = SerialConfig::default().with_baud_rate(baud);
    teleinfo_transport::SerialPort::open(path, &config)
        .map_err(|err| crate::exit::transport_error("failed to open serial device", err))
}

#[cfg(unix)]
fn open_device_reader(path: &Path, baud: u32) -> CliResult<Box<dyn Read + Send>> {
    Ok(Box::new(open_device(path, baud)?))
}

#[cfg(not(unix))]
fn open_device_reader(path: &Path, baud: u32) -> CliResult<Box<dyn Read + Send>> {
    let config = SerialConfig::default().with_baud_rate(baud);
    Err(CliError::new(
        USAGE,
        format!(
            "serial devices ({config}) are only supported on unix: {}",
            path.display()
        ),
    ))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Like [`parse_duration`], zero rejected.
fn parse_nonzero_duration(input: &str) -> CliResult<Duration> {
    let duration = parse_duration(input)?;
    if duration.is_zero() {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(duration)
}
