//! Charging-case facade.
//!
//! The case firmware answers plain `AT+` commands with unprefixed value
//! lines. Earbud status is not part of the response at all: the case
//! relays it from each bud as `EBSTATUS (L): <value>` indications some
//! time after `OK`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use dutlink_at::{Clock, SystemClock};
use dutlink_transport::DutTransport;
use serde::Serialize;
use tracing::{debug, info};

use crate::device::AtDevice;
use crate::error::{DutError, Result};
use crate::parse;

/// How long the earbuds get to report through the case.
pub const EARBUD_TIMEOUT: Duration = Duration::from_millis(10_000);

/// `AT+TEST` leaves room for earbud chatter emitted outside test mode.
pub const TEST_MODE_TIMEOUT: Duration = Duration::from_millis(5000);

const EBSTATUS_TAG: &str = "EBSTATUS";

/// Case LED colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LedMode {
    Off = 0,
    Red = 1,
    Green = 2,
    Amber = 3,
    Blue = 4,
    Magenta = 5,
    Cyan = 6,
    White = 7,
}

impl LedMode {
    pub const ALL: [LedMode; 8] = [
        Self::Off,
        Self::Red,
        Self::Green,
        Self::Amber,
        Self::Blue,
        Self::Magenta,
        Self::Cyan,
        Self::White,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Red => "red",
            Self::Green => "green",
            Self::Amber => "amber",
            Self::Blue => "blue",
            Self::Magenta => "magenta",
            Self::Cyan => "cyan",
            Self::White => "white",
        }
    }
}

impl fmt::Display for LedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LedMode {
    type Err = DutError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == wanted || (*mode as u8).to_string() == wanted)
            .ok_or_else(|| DutError::Config(format!("unknown LED mode \"{s}\"")))
    }
}

/// Earbud supply regulator level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegLevel {
    High = 0,
    Low = 1,
    Reset = 2,
}

/// Case battery charger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChargerMode {
    Current100mA = 0,
    Current500mA = 1,
    CurrentLimit = 2,
    Standby = 3,
}

/// Case low-power mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LowPowerMode {
    Standby = 1,
    Stop = 2,
}

/// Which earbud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Earbud {
    Left,
    Right,
}

impl Earbud {
    pub fn tag(self) -> char {
        match self {
            Self::Left => 'L',
            Self::Right => 'R',
        }
    }

    fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'L' => Some(Self::Left),
            'R' => Some(Self::Right),
            _ => None,
        }
    }
}

/// Status reported by both earbuds (battery percentage or `Failed`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EarbudStatus {
    pub left: String,
    pub right: String,
}

/// Left and right earbud current-sense ADC readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentSense {
    pub left: u16,
    pub right: u16,
}

/// Result of `AT+ID?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargerIdentity {
    pub variant: String,
    pub board_number: u32,
    pub firmware_id: u32,
    pub firmware_name: String,
}

impl ChargerIdentity {
    /// ST2 boards support the faster case-comms rate.
    pub fn supports_fast_comms(&self) -> bool {
        self.variant == "\"ST2\""
    }
}

/// Pins per GPIO port.
pub const GPIO_PORT_PINS: u8 = 16;

/// How a GPIO pin is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpioFunction {
    DigitalInput,
    DigitalOutput,
    Analogue,
    Alternative,
}

/// Pin level; only known for digital pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpioState {
    Unknown,
    Low,
    High,
}

impl fmt::Display for GpioFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DigitalInput => "digital input",
            Self::DigitalOutput => "digital output",
            Self::Analogue => "analogue",
            Self::Alternative => "alternative",
        })
    }
}

impl fmt::Display for GpioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpioStatus {
    pub function: GpioFunction,
    pub state: GpioState,
}

/// A case GPIO such as `A12` (port A to C, pin 0 to 15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPin {
    port: char,
    pin: u8,
}

impl GpioPin {
    pub fn new(port: char, pin: u8) -> Result<Self> {
        let port = port.to_ascii_uppercase();
        if !matches!(port, 'A'..='C') || pin >= GPIO_PORT_PINS {
            return Err(invalid_gpio());
        }
        Ok(Self { port, pin })
    }

    pub fn port(&self) -> char {
        self.port
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Index of this port's row in the `AT+GPIO` table (row 0 is the header).
    fn row(&self) -> usize {
        usize::from(self.port as u8 - b'A') + 1
    }
}

impl FromStr for GpioPin {
    type Err = DutError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let port = chars.next().ok_or_else(invalid_gpio)?;
        let digits = chars.as_str();
        if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_gpio());
        }
        let pin = digits.parse().map_err(|_| invalid_gpio())?;
        Self::new(port, pin)
    }
}

impl fmt::Display for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.port, self.pin)
    }
}

fn invalid_gpio() -> DutError {
    DutError::Config(
        "GPIO specifier is invalid, must start with A, B or C followed by 0-15".to_string(),
    )
}

/// Charging-case device.
pub struct ChargerDevice<T, C = SystemClock> {
    device: AtDevice<T, C>,
}

impl<T: DutTransport, C: Clock> ChargerDevice<T, C> {
    pub fn new(device: AtDevice<T, C>) -> Self {
        Self { device }
    }

    /// Purge stale output, stop normal activity and read the identity.
    pub fn prepare(&mut self) -> Result<ChargerIdentity> {
        self.device.purge()?;
        self.test_mode(true)?;
        let id = self.identify()?;
        info!(
            variant = %id.variant,
            board = id.board_number,
            firmware = id.firmware_id,
            "charger identified"
        );
        Ok(id)
    }

    /// Reboot the case. No response is expected.
    pub fn reboot(&mut self) -> Result<()> {
        info!("rebooting charger");
        self.device.send_only("AT+REBOOT")
    }

    pub fn test_mode(&mut self, enable: bool) -> Result<()> {
        let cmd = format!("AT+TEST={}", u8::from(enable));
        self.device.command_with_timeout(&cmd, TEST_MODE_TIMEOUT)
    }

    pub fn identify(&mut self) -> Result<ChargerIdentity> {
        const CMD: &str = "AT+ID?";
        let lines = self.device.query(CMD)?;
        let line = parse::first_line(&lines, "ID values")?;

        // "<variant>",<board_number>,<firmware_id>,"<firmware_name>"
        let fields: Vec<&str> = line.split(',').collect();
        let [variant, board, firmware, name] = fields.as_slice() else {
            return Err(DutError::InvalidResponse(format!(
                "{CMD} returned \"{line}\", expected 4 comma-separated fields"
            )));
        };

        Ok(ChargerIdentity {
            variant: variant.to_string(),
            board_number: parse::parse_value(board, "board number")?,
            firmware_id: parse::parse_value(firmware, "firmware id")?,
            firmware_name: name.to_string(),
        })
    }

    /// Read a named configuration value.
    pub fn config_read(&mut self, name: &str) -> Result<String> {
        let lines = self.device.query(&format!("AT+CONFIG={}", quote_arg(name)))?;
        parse::first_line(&lines, "config value").map(str::to_string)
    }

    pub fn config_write(&mut self, name: &str, value: &str) -> Result<()> {
        self.device.command(&format!(
            "AT+CONFIG={},{}",
            quote_arg(name),
            quote_arg(value)
        ))
    }

    pub fn led_set(&mut self, mode: LedMode) -> Result<()> {
        self.device.command(&format!("AT+LED={}", mode as u8))
    }

    pub fn regulator_set(&mut self, enable: bool, level: RegLevel) -> Result<()> {
        self.device.command(&format!(
            "AT+REGULATOR={},{}",
            u8::from(enable),
            level as u8
        ))
    }

    /// Case-comms pull-up.
    pub fn pull_up_set(&mut self, enable: bool) -> Result<()> {
        self.device.command(&format!("AT+PULL={}", u8::from(enable)))
    }

    pub fn charger_set(&mut self, enable: bool, mode: ChargerMode) -> Result<()> {
        self.device.command(&format!(
            "AT+CHARGER={},{}",
            u8::from(enable),
            mode as u8
        ))
    }

    pub fn low_power_set(&mut self, mode: LowPowerMode) -> Result<()> {
        self.device.command(&format!("AT+POWER={}", mode as u8))
    }

    /// Battery voltage in mV. The response also carries a percentage.
    pub fn battery_mv(&mut self) -> Result<u16> {
        let lines = self.device.query("AT+BATTERY?")?;
        let line = parse::first_line(&lines, "battery status values")?;
        let values = parse::split_values(line);
        parse::parse_value(values[0], "battery voltage")
    }

    /// Thermistor voltage in mV.
    pub fn thermistor_mv(&mut self) -> Result<u16> {
        let lines = self.device.query("AT+NTC?")?;
        let line = parse::first_line(&lines, "NTC value")?;
        parse::parse_value(line, "NTC voltage")
    }

    pub fn current_sense(&mut self) -> Result<CurrentSense> {
        let lines = self.device.query("AT+SENSE?")?;
        let line = parse::first_line(&lines, "current sense values")?;
        let values = parse::split_values(line);
        let [left, right] = values.as_slice() else {
            return Err(DutError::InvalidResponse(format!(
                "AT+SENSE? returned \"{line}\", expected 2 values"
            )));
        };
        Ok(CurrentSense {
            left: parse::parse_value(left, "current sense")?,
            right: parse::parse_value(right, "current sense")?,
        })
    }

    pub fn lid_open(&mut self) -> Result<bool> {
        let lines = self.device.query("AT+LID?")?;
        let line = lines.first().map(String::as_str).unwrap_or_default();
        parse::parse_flag(line, true, "AT+LID? response")
    }

    /// Whether a charger is plugged in. Only the first of
    /// `<connected>,<charging>,<mode>` is inspected.
    pub fn charger_connected(&mut self) -> Result<bool> {
        let lines = self.device.query("AT+CHARGER?")?;
        let line = lines.first().map(String::as_str).unwrap_or_default();
        parse::parse_flag(line, false, "AT+CHARGER? response")
    }

    /// Run the case-to-bud comms loop test. Returns `true` on `PASS`.
    pub fn bud_comms_loop(&mut self, state: bool) -> Result<bool> {
        let cmd = format!("AT+TXTEST={}", u8::from(state));
        let lines = self.device.query(&cmd)?;
        match lines.first().map(String::as_str) {
            Some("PASS") => Ok(true),
            Some("FAIL") => Ok(false),
            _ => Err(DutError::InvalidResponse(format!(
                "{cmd} should answer \"PASS\" or \"FAIL\""
            ))),
        }
    }

    /// Put both earbuds into shipping mode.
    ///
    /// Confirmation lines `Shipping mode (L|R)` arrive before `OK`.
    pub fn shipping_mode(&mut self) -> Result<()> {
        let lines = self.device.query_with_timeout("AT+SHIP", EARBUD_TIMEOUT)?;
        let mut left = false;
        let mut right = false;
        for line in &lines {
            match shipping_confirmation(line) {
                Some(Earbud::Left) => left = true,
                Some(Earbud::Right) => right = true,
                None => {
                    return Err(DutError::InvalidResponse(format!(
                        "unexpected line \"{line}\", expecting \"Shipping mode (L|R)\""
                    )))
                }
            }
        }
        if !(left && right) {
            return Err(DutError::MissingValue(format!(
                "failed to receive shipping mode confirmation for {} earbud(s)",
                missing_sides(left, right)
            )));
        }
        Ok(())
    }

    /// Status of both earbuds, relayed as indications after `OK`.
    pub fn earbud_status(&mut self) -> Result<EarbudStatus> {
        let lines = self.device.query("AT+EBSTATUS")?;
        let newline = self.device.messenger().newline().to_string();

        let mut left = None;
        let mut right = None;
        let complete = self
            .device
            .collect_indications(&lines, EARBUD_TIMEOUT, |text| {
                for (bud, value) in take_earbud_reports(text, &newline) {
                    match bud {
                        Earbud::Left => left = Some(value),
                        Earbud::Right => right = Some(value),
                    }
                }
                left.is_some() && right.is_some()
            })?;

        match (left, right) {
            (Some(left), Some(right)) if complete => {
                debug!(%left, %right, "earbud status");
                Ok(EarbudStatus { left, right })
            }
            (left, right) => Err(DutError::IndicationTimeout {
                what: format!(
                    "status for {} earbud(s)",
                    missing_sides(left.is_some(), right.is_some())
                ),
                timeout: EARBUD_TIMEOUT,
            }),
        }
    }

    /// Bluetooth address of one earbud as 12 upper-case hex digits.
    ///
    /// The bud reports it as `NAP,UAP,LAP`, e.g. `0002,5B,00FF0A`.
    pub fn earbud_bd_address(&mut self, bud: Earbud) -> Result<String> {
        let cmd = format!("AT+EBSTATUS={},0", bud.tag());
        let lines = self.device.query(&cmd)?;
        let newline = self.device.messenger().newline().to_string();

        let mut address = None;
        self.device
            .collect_indications(&lines, EARBUD_TIMEOUT, |text| {
                for (reported, value) in take_earbud_reports(text, &newline) {
                    if reported == bud {
                        address = Some(value);
                    }
                }
                address.is_some()
            })?;

        let Some(address) = address else {
            return Err(DutError::IndicationTimeout {
                what: format!("device address for {} earbud", bud.tag()),
                timeout: EARBUD_TIMEOUT,
            });
        };
        let address = address.to_ascii_uppercase();
        if address == "FAILED" {
            return Err(DutError::MissingValue(format!(
                "{} earbud could not report its device address",
                bud.tag()
            )));
        }

        let parts: Vec<&str> = address.split(',').collect();
        if parts.len() != 3 {
            return Err(DutError::InvalidResponse(format!(
                "address \"{address}\" for {} earbud is not in NAP,UAP,LAP form",
                bud.tag()
            )));
        }
        let joined = parts.concat();
        if joined.len() != 12 || !joined.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DutError::InvalidResponse(format!(
                "address \"{address}\" for {} earbud is not 12 hexadecimal digits",
                bud.tag()
            )));
        }
        Ok(joined)
    }

    /// Read one pin from the `AT+GPIO` table.
    ///
    /// The case answers with a header row and one row per port:
    ///
    /// ```text
    ///        0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15
    /// GPIOA i0 i1 o1 i0 an o1 an i0 o0 i0 o1 i1 i1 af af i1
    /// ```
    ///
    /// `i`/`o` are digital input/output followed by the level, `an` is
    /// analogue and `af` an alternative function.
    pub fn gpio(&mut self, gpio: GpioPin) -> Result<GpioStatus> {
        const CMD: &str = "AT+GPIO";
        const ROWS: usize = 4;

        let lines = self.device.query(CMD)?;
        if lines.is_empty() {
            return Err(DutError::MissingValue(
                "GPIO status not received from device".to_string(),
            ));
        }
        if lines.len() != ROWS {
            return Err(DutError::InvalidResponse(format!(
                "{CMD} returned {} lines, expected {ROWS}",
                lines.len()
            )));
        }

        let row = gpio.row();
        let fields: Vec<&str> = lines[row].split_whitespace().collect();
        if fields.len() != 1 + usize::from(GPIO_PORT_PINS) {
            return Err(DutError::InvalidResponse(format!(
                "{CMD} line {row} has {} fields, expected {}",
                fields.len(),
                1 + GPIO_PORT_PINS
            )));
        }

        let field = fields[usize::from(gpio.pin()) + 1];
        let status = parse_gpio_field(field).ok_or_else(|| {
            DutError::InvalidResponse(format!("{CMD} status \"{field}\" for {gpio} is invalid"))
        })?;
        debug!(%gpio, ?status, "gpio read");
        Ok(status)
    }

    pub fn device(&self) -> &AtDevice<T, C> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut AtDevice<T, C> {
        &mut self.device
    }

    pub fn into_inner(self) -> AtDevice<T, C> {
        self.device
    }
}

fn parse_gpio_field(field: &str) -> Option<GpioStatus> {
    let digital = |function, level| {
        let state = match level {
            '0' => GpioState::Low,
            '1' => GpioState::High,
            _ => return None,
        };
        Some(GpioStatus { function, state })
    };
    let analog = |function| {
        Some(GpioStatus {
            function,
            state: GpioState::Unknown,
        })
    };

    let mut chars = field.chars();
    match (chars.next()?, chars.next()?, chars.next()) {
        ('a', 'n', None) => analog(GpioFunction::Analogue),
        ('a', 'f', None) => analog(GpioFunction::Alternative),
        ('i', level, None) => digital(GpioFunction::DigitalInput, level),
        ('o', level, None) => digital(GpioFunction::DigitalOutput, level),
        _ => None,
    }
}

/// Quote an argument containing spaces unless it is already quoted.
fn quote_arg(arg: &str) -> String {
    if !arg.starts_with('"') && arg.contains(' ') {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

fn missing_sides(left: bool, right: bool) -> &'static str {
    match (left, right) {
        (false, false) => "L & R",
        (false, true) => "L",
        _ => "R",
    }
}

fn shipping_confirmation(line: &str) -> Option<Earbud> {
    let rest = line.strip_prefix("Shipping mode")?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let mut chars = rest.chars();
    let bud = Earbud::from_tag(chars.next()?)?;
    let tail = chars.as_str().strip_prefix(')')?;
    tail.trim().is_empty().then_some(bud)
}

/// Remove every complete `EBSTATUS (L|R): <value><newline>` report from
/// `text` and return them in order.
///
/// Incomplete reports are left in place for the next pass.
fn take_earbud_reports(text: &mut String, newline: &str) -> Vec<(Earbud, String)> {
    let mut reports = Vec::new();
    let mut from = 0;
    while let Some(offset) = text[from..].find(EBSTATUS_TAG) {
        let start = from + offset;
        match match_report(&text[start..], newline) {
            Some((bud, value, len)) => {
                text.replace_range(start..start + len, "");
                if !value.is_empty() {
                    reports.push((bud, value));
                }
                from = start;
            }
            None => from = start + EBSTATUS_TAG.len(),
        }
    }
    reports
}

/// Match one report at the start of `s`, returning the bud, its value and
/// the matched length.
fn match_report(s: &str, newline: &str) -> Option<(Earbud, String, usize)> {
    let rest = s.strip_prefix(EBSTATUS_TAG)?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let mut chars = rest.chars();
    let bud = Earbud::from_tag(chars.next()?)?;
    let rest = chars.as_str().strip_prefix(')')?.trim_start();
    let rest = rest.strip_prefix(':')?;
    let rest = rest.trim_start_matches([' ', '\t']);

    let value_len = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let (value, rest) = rest.split_at(value_len);
    let rest = rest.strip_prefix(newline)?;

    Some((bud, value.to_string(), s.len() - rest.len()))
}
