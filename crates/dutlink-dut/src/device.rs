//! Generic AT device: an [`AtMessenger`] plus the standard timeout.
//!
//! The typed facades ([`ChargerDevice`](crate::ChargerDevice),
//! [`DtsDevice`](crate::DtsDevice)) are thin command builders on top of
//! the operations here.

use std::str::FromStr;
use std::time::Duration;

use dutlink_at::{take_complete_lines, AtError, AtMessenger, Clock, MessengerConfig, SystemClock};
use dutlink_transport::{DutTransport, SerialTransport};
use tracing::{debug, info};

use crate::config::StationConfig;
use crate::error::{DutError, Result};
use crate::parse;

/// Standard transaction timeout.
pub const STD_TIMEOUT: Duration = Duration::from_millis(3000);

/// Read size while waiting for unsolicited indications.
pub const INDICATION_READ_LEN: usize = 128;

/// An AT-command device on some transport.
pub struct AtDevice<T, C = SystemClock> {
    messenger: AtMessenger<T, C>,
    timeout: Duration,
}

impl<T: DutTransport> AtDevice<T> {
    /// Create a device over `transport` with the given engine configuration.
    pub fn new(transport: T, config: MessengerConfig) -> Result<Self> {
        Ok(Self::from_messenger(AtMessenger::with_config(transport, config)?))
    }
}

impl<T: DutTransport, C: Clock> AtDevice<T, C> {
    /// Wrap an existing messenger.
    pub fn from_messenger(messenger: AtMessenger<T, C>) -> Self {
        Self {
            messenger,
            timeout: STD_TIMEOUT,
        }
    }

    /// Replace the standard timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drop pending bytes and anything the link has buffered.
    pub fn purge(&mut self) -> Result<()> {
        self.messenger.clear_pending();
        self.messenger.get_mut().purge()?;
        debug!("device buffers purged");
        Ok(())
    }

    /// Run `command`, caring only that it completes with `OK`.
    pub fn command(&mut self, command: &str) -> Result<()> {
        self.command_with_timeout(command, self.timeout)
    }

    pub fn command_with_timeout(&mut self, command: &str, timeout: Duration) -> Result<()> {
        self.query_with_timeout(command, timeout).map(|_| ())
    }

    /// Run `command` and return its response lines.
    pub fn query(&mut self, command: &str) -> Result<Vec<String>> {
        self.query_with_timeout(command, self.timeout)
    }

    pub fn query_with_timeout(&mut self, command: &str, timeout: Duration) -> Result<Vec<String>> {
        self.messenger
            .transact(command, timeout)
            .map_err(|err| rejected(command, err))
    }

    /// Run `command` and strip `prefix:` from every response line.
    pub fn query_prefixed(&mut self, command: &str, prefix: &str) -> Result<Vec<String>> {
        self.query_prefixed_with_timeout(command, prefix, self.timeout)
    }

    pub fn query_prefixed_with_timeout(
        &mut self,
        command: &str,
        prefix: &str,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let lines = self.query_with_timeout(command, timeout)?;
        parse::strip_prefix(lines, prefix)
    }

    /// Run `command` and parse the first `prefix:` value.
    pub fn query_value<V: FromStr>(&mut self, command: &str, prefix: &str) -> Result<V> {
        let lines = self.query_prefixed(command, prefix)?;
        let what = prefix.trim_start_matches('+').to_ascii_lowercase();
        let text = parse::first_line(&lines, &what)?;
        parse::parse_value(text, &what)
    }

    /// Keep reading after a transaction until `scan` has what it needs.
    ///
    /// `initial` (usually the transaction's own lines) seeds the text buffer,
    /// one line per newline marker. Received bytes join the buffer a whole
    /// line at a time. `scan` is called with the buffer before each read and
    /// may consume what it recognises; it returns `true` once satisfied.
    /// Returns `false` if `timeout` expires first.
    pub fn collect_indications<F>(
        &mut self,
        initial: &[String],
        timeout: Duration,
        mut scan: F,
    ) -> Result<bool>
    where
        F: FnMut(&mut String) -> bool,
    {
        let newline = self.messenger.newline().to_string();
        let mut text = String::new();
        let mut raw = Vec::new();
        for line in initial {
            text.push_str(line);
            text.push_str(&newline);
        }

        let start = self.messenger.clock().now();
        loop {
            if scan(&mut text) {
                return Ok(true);
            }
            if self.messenger.clock().now().saturating_duration_since(start) >= timeout {
                debug!(?timeout, unconsumed = text.len(), "indication wait expired");
                return Ok(false);
            }

            let chunk = self.messenger.read(INDICATION_READ_LEN, false)?;
            if chunk.is_empty() {
                let poll = self.messenger.config().poll_interval;
                self.messenger.clock_mut().sleep(poll);
            } else {
                raw.extend_from_slice(&chunk);
                if let Some(lines) = take_complete_lines(&mut raw, &newline) {
                    text.push_str(&lines);
                }
            }
        }
    }

    /// Write `command` without waiting for any response.
    pub fn send_only(&mut self, command: &str) -> Result<()> {
        self.messenger.write(command)?;
        Ok(())
    }

    pub fn messenger(&self) -> &AtMessenger<T, C> {
        &self.messenger
    }

    pub fn messenger_mut(&mut self) -> &mut AtMessenger<T, C> {
        &mut self.messenger
    }

    pub fn into_inner(self) -> AtMessenger<T, C> {
        self.messenger
    }
}

/// Open the station's serial port and wrap it in a device.
pub fn open(port: &str, config: &StationConfig) -> Result<AtDevice<SerialTransport>> {
    config.validate()?;
    let transport = SerialTransport::open(port, &config.serial_config())?;
    let device =
        AtDevice::new(transport, config.messenger_config()?)?.with_timeout(config.timeout());
    info!(port, timeout_ms = config.timeout_ms, "device ready");
    Ok(device)
}

fn rejected(command: &str, err: AtError) -> DutError {
    if err.is_device_error() {
        DutError::Rejected {
            command: command.to_string(),
        }
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use dutlink_at::{ManualClock, ProtocolErrorKind};
    use dutlink_transport::ScriptedTransport;

    use super::*;

    fn device(transport: ScriptedTransport) -> AtDevice<ScriptedTransport, ManualClock> {
        let messenger =
            AtMessenger::with_clock(transport, MessengerConfig::default(), ManualClock::new())
                .unwrap();
        AtDevice::from_messenger(messenger)
    }

    #[test]
    fn command_discards_lines() {
        let mut t = ScriptedTransport::new();
        t.reply_to("AT+LED=2", ["noise\r\nOK\r\n"]);
        let mut dev = device(t);
        dev.command("AT+LED=2").unwrap();
        assert_eq!(dev.messenger().get_ref().written_text(), vec!["AT+LED=2\r\n"]);
    }

    #[test]
    fn error_becomes_rejected_with_command() {
        let mut t = ScriptedTransport::new();
        t.reply_to("AT+PULL=1", ["ERROR\r\n"]);
        let err = device(t).command("AT+PULL=1").unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.to_string(), "device rejected \"AT+PULL=1\"");
    }

    #[test]
    fn silence_is_a_timeout() {
        let err = device(ScriptedTransport::new()).query("AT").unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(
            err,
            DutError::At(ref e) if e.protocol_kind() == Some(ProtocolErrorKind::NoResponse)
        ));
    }

    #[test]
    fn transport_failure_maps_to_transport_variant() {
        let mut t = ScriptedTransport::new();
        t.fail_writes();
        let err = device(t).query("AT").unwrap_err();
        assert!(matches!(err, DutError::Transport(_)));
    }

    #[test]
    fn query_value_parses_first_line() {
        let mut t = ScriptedTransport::new();
        t.reply_to("AT+TEMPERATURE?", ["+TEMPERATURE:27\r\nOK\r\n"]);
        let temp: i16 = device(t)
            .query_value("AT+TEMPERATURE?", "+TEMPERATURE")
            .unwrap();
        assert_eq!(temp, 27);
    }

    #[test]
    fn query_value_without_lines() {
        let mut t = ScriptedTransport::new();
        t.reply_to("AT+TEMPERATURE?", ["OK\r\n"]);
        let err = device(t)
            .query_value::<i16>("AT+TEMPERATURE?", "+TEMPERATURE")
            .unwrap_err();
        assert!(matches!(err, DutError::MissingValue(ref m) if m.contains("temperature")));
    }

    #[test]
    fn purge_clears_pending_and_link() {
        let mut t = ScriptedTransport::new();
        t.reply_to("AT", ["OK\r\nleftover"]);
        let mut dev = device(t);
        dev.query("AT").unwrap();
        assert_eq!(dev.messenger().pending(), b"leftover");

        dev.purge().unwrap();
        assert!(dev.messenger().pending().is_empty());
        assert_eq!(dev.messenger().get_ref().purge_count(), 1);
    }

    #[test]
    fn send_only_does_not_read() {
        let mut dev = device(ScriptedTransport::new());
        dev.send_only("AT+REBOOT").unwrap();
        assert_eq!(dev.messenger().get_ref().read_count(), 0);
        assert_eq!(dev.messenger().get_ref().written_text(), vec!["AT+REBOOT\r\n"]);
    }

    #[test]
    fn indications_from_initial_lines_need_no_read() {
        let mut dev = device(ScriptedTransport::new());
        let found = dev
            .collect_indications(&["READY".to_string()], Duration::from_secs(1), |text| {
                text.contains("READY\r\n")
            })
            .unwrap();
        assert!(found);
        assert_eq!(dev.messenger().get_ref().read_count(), 0);
    }

    #[test]
    fn indications_accumulate_across_reads() {
        let t = ScriptedTransport::with_chunks(["", "IND", "", "ICATION\r\n"]);
        let mut dev = device(t);
        let found = dev
            .collect_indications(&[], Duration::from_secs(1), |text| {
                text.contains("INDICATION\r\n")
            })
            .unwrap();
        assert!(found);
        assert_eq!(dev.messenger().clock().sleeps().len(), 2);
    }

    #[test]
    fn indications_decode_characters_split_across_reads() {
        let chunks: [&[u8]; 2] = [b"STATE:\xC3", b"\xA9t\xC3\xA9\r\n"];
        let t = ScriptedTransport::with_chunks(chunks);
        let mut dev = device(t);
        let mut seen = String::new();
        let found = dev
            .collect_indications(&[], Duration::from_secs(1), |text| {
                seen = text.clone();
                text.ends_with("\r\n")
            })
            .unwrap();
        assert!(found);
        assert_eq!(seen, "STATE:\u{e9}t\u{e9}\r\n");
        assert!(!seen.contains('\u{fffd}'));
    }

    #[test]
    fn indications_start_with_pending_bytes() {
        let mut t = ScriptedTransport::new();
        t.reply_to("AT+GO", ["OK\r\nDONE\r\n"]);
        let mut dev = device(t);
        let lines = dev.query("AT+GO").unwrap();
        assert!(lines.is_empty());

        let found = dev
            .collect_indications(&lines, Duration::ZERO, |text| text.contains("DONE"))
            .unwrap();
        // Zero timeout still scans the seed, then gives up before reading.
        assert!(!found);

        let found = dev
            .collect_indications(&lines, Duration::from_millis(500), |text| {
                text.contains("DONE")
            })
            .unwrap();
        assert!(found);
    }

    #[test]
    fn indication_timeout_uses_the_clock() {
        let mut dev = device(ScriptedTransport::new());
        let found = dev
            .collect_indications(&[], Duration::from_secs(10), |_| false)
            .unwrap();
        assert!(!found);
        assert_eq!(dev.messenger().clock().elapsed(), Duration::from_secs(10));
    }
}
