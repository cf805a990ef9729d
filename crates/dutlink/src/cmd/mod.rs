use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use dutlink_dut::{AtDevice, GpioPin, LedMode, StationConfig};
use dutlink_transport::SerialTransport;

use crate::exit::{dut_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod charger;
pub mod dts;
pub mod monitor;
pub mod ports;
pub mod transact;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one AT transaction and print the response lines.
    Transact(TransactArgs),
    /// Print lines received from a port.
    Monitor(MonitorArgs),
    /// List serial ports on this host.
    Ports(PortsArgs),
    /// Query a charging case.
    Charger(ChargerArgs),
    /// Query a DTS earbud.
    Dts(DtsArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Shared state for every subcommand.
#[derive(Debug)]
pub struct Context {
    pub format: OutputFormat,
    pub config: Option<PathBuf>,
}

impl Context {
    /// Station file settings, or defaults when no file is given.
    pub fn station(&self) -> CliResult<StationConfig> {
        match &self.config {
            Some(path) => StationConfig::load(path).map_err(|err| {
                dut_error(
                    &format!("failed loading station config {}", path.display()),
                    err,
                )
            }),
            None => Ok(StationConfig::default()),
        }
    }

    /// Station settings with command-line overrides applied.
    pub fn station_with(&self, link: &LinkArgs) -> CliResult<StationConfig> {
        let mut station = self.station()?;
        link.apply(&mut station)?;
        station
            .validate()
            .map_err(|err| dut_error("invalid link settings", err))?;
        Ok(station)
    }
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Transact(args) => transact::run(args, ctx),
        Command::Monitor(args) => monitor::run(args, ctx),
        Command::Ports(args) => ports::run(args, ctx),
        Command::Charger(args) => charger::run(args, ctx),
        Command::Dts(args) => dts::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

/// Link settings that override the station file.
#[derive(Args, Debug, Default, Clone)]
pub struct LinkArgs {
    /// Transaction timeout (e.g. 3s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// Expect the device to echo each command.
    #[arg(long)]
    pub echo: bool,
    /// Newline marker: crlf, lf, cr.
    #[arg(long)]
    pub newline: Option<String>,
    /// Baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
    /// Transport read size while polling.
    #[arg(long)]
    pub block_len: Option<usize>,
    /// Extra attempts after a failed one.
    #[arg(long)]
    pub retries: Option<u32>,
}

impl LinkArgs {
    fn apply(&self, station: &mut StationConfig) -> CliResult<()> {
        if let Some(timeout) = &self.timeout {
            station.timeout_ms = u64::try_from(parse_duration(timeout)?.as_millis())
                .map_err(|_| CliError::new(USAGE, format!("timeout too large: {timeout}")))?;
        }
        if self.echo {
            station.expect_echo = true;
        }
        if let Some(newline) = &self.newline {
            station.newline = newline.clone();
        }
        if let Some(baud) = self.baud {
            station.baud_rate = baud;
        }
        if let Some(block_len) = self.block_len {
            station.read_block_len = block_len;
        }
        if let Some(retries) = self.retries {
            station.retries = retries;
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct TransactArgs {
    /// Serial port (e.g. /dev/ttyUSB0, COM7).
    pub port: String,
    /// AT command, without newline.
    pub command: String,
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Serial port (e.g. /dev/ttyUSB0, COM7).
    pub port: String,
    /// Exit after printing N lines.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long without data (e.g. 5s, 500ms).
    #[arg(long)]
    pub idle: Option<String>,
    /// Newline marker: crlf, lf, cr.
    #[arg(long)]
    pub newline: Option<String>,
    /// Baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {}

#[derive(Args, Debug)]
pub struct ChargerArgs {
    /// Serial port of the case.
    pub port: String,
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(subcommand)]
    pub action: ChargerAction,
}

#[derive(Subcommand, Debug)]
pub enum ChargerAction {
    /// Battery voltage (mV).
    Battery,
    /// Read a configuration value.
    ConfigGet {
        name: String,
    },
    /// Write a configuration value.
    ConfigSet {
        name: String,
        value: String,
    },
    /// Set the case LED (off, red, green, amber, blue, magenta, cyan, white).
    Led {
        mode: LedMode,
    },
    /// Status of both earbuds.
    Earbuds,
    /// Board and firmware identity.
    Id,
    /// Function and level of a case GPIO (A0-C15).
    Gpio {
        pin: GpioPin,
    },
}

#[derive(Args, Debug)]
pub struct DtsArgs {
    /// Serial port of the earbud's DTS link.
    pub port: String,
    /// DTS authentication key as 16 hex octets; overrides the station file.
    /// When a key is known the earbud is authenticated before the query.
    #[arg(long, value_name = "OCTETS")]
    pub auth_key: Option<String>,
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(subcommand)]
    pub action: DtsAction,
}

#[derive(Subcommand, Debug)]
pub enum DtsAction {
    /// Die temperature (degrees C).
    Temperature,
    /// Battery voltage (mV).
    Battery,
    /// RSSI of the active link (dBm).
    Rssi,
    /// Authenticate with the configured key and stop.
    Auth,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open `port` with the station settings.
pub fn open_device(port: &str, station: &StationConfig) -> CliResult<AtDevice<SerialTransport>> {
    dutlink_dut::open(port, station).map_err(|err| dut_error(&format!("cannot open {port}"), err))
}

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

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
