use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use heaterlink_control::DEFAULT_QUEUE_CAPACITY;
use heaterlink_transport::{
    available_ports, select_port, LinkConfig, SerialLink, DEFAULT_BAUD_RATE,
};

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

#[cfg(unix)]
pub mod end_test;
pub mod monitor;
pub mod ports;
pub mod run;
pub mod settings;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a heater-control session until the test ends.
    Run(RunArgs),
    /// List serial ports.
    Ports(PortsArgs),
    /// Print frames arriving on a port without writing to it.
    Monitor(MonitorArgs),
    /// Record new settings for a run.
    Settings(SettingsArgs),
    /// Tell a running session the test has ended.
    #[cfg(unix)]
    EndTest(EndTestArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Ports(args) => ports::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Settings(args) => settings::run(args, format),
        #[cfg(unix)]
        Command::EndTest(args) => end_test::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serial port. Default: the only USB serial device.
    #[arg(long, env = "HEATERLINK_PORT")]
    pub port: Option<String>,
    /// Line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Test run identifier ([A-Za-z0-9_-], up to 64 characters).
    #[arg(long)]
    pub run_id: String,
    /// Directory holding one subdirectory per run.
    #[arg(long, value_name = "DIR", default_value = "./heaterlink-data")]
    pub data_dir: PathBuf,
    /// Control tick period (e.g. 500ms, 1s).
    #[arg(long, default_value = "500ms")]
    pub tick: String,
    /// Listen for control-plane notifications on this Unix socket.
    #[cfg(unix)]
    #[arg(long, value_name = "PATH")]
    pub control_socket: Option<PathBuf>,
    /// Supply voltage in volts.
    #[arg(long, default_value_t = 12.0)]
    pub supply_voltage: f64,
    /// Heater resistances in ohms.
    #[arg(long, num_args = 2, value_names = ["HEATER0", "HEATER1"], default_values_t = [0.05, 0.05])]
    pub resistance: Vec<f64>,
    /// Thermal-mass scalars.
    #[arg(long, num_args = 2, value_names = ["HEATER0", "HEATER1"], default_values_t = [1.0, 1.0])]
    pub scalar: Vec<f64>,
    /// Telemetry samples buffered ahead of storage.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {
    /// Only list USB serial devices.
    #[arg(long)]
    pub usb: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Serial port. Default: the only USB serial device.
    #[arg(long, env = "HEATERLINK_PORT")]
    pub port: Option<String>,
    /// Line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Test run identifier.
    #[arg(long)]
    pub run_id: String,
    /// Directory holding one subdirectory per run.
    #[arg(long, value_name = "DIR", default_value = "./heaterlink-data")]
    pub data_dir: PathBuf,
    /// Test mode.
    #[arg(long, default_value = "power")]
    pub mode: String,
    /// Waveform frequency in Hz.
    #[arg(long)]
    pub frequency: f64,
    /// Waveform amplitude (watts in power mode).
    #[arg(long)]
    pub amplitude: f64,
    /// Notify the session listening on this socket.
    #[cfg(unix)]
    #[arg(long, value_name = "SOCKET")]
    pub notify: Option<PathBuf>,
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct EndTestArgs {
    /// Control socket of the running session.
    pub socket: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

/// Resolve the requested (or only) USB serial port and open it.
pub fn open_link(requested: Option<&str>, baud_rate: u32) -> CliResult<SerialLink> {
    let ports =
        available_ports().map_err(|err| transport_error("port enumeration failed", err))?;
    let port = select_port(requested, &ports)
        .map_err(|err| transport_error("port selection failed", err))?;
    let config = LinkConfig {
        baud_rate,
        ..LinkConfig::default()
    };
    SerialLink::open(&port, &config).map_err(|err| transport_error("open failed", err))
}

/// Parse `"2s"`, `"150ms"` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
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

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
