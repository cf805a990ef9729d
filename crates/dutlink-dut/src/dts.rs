//! DTS (device test service) earbud facade.
//!
//! DTS responses carry a `+NAME:` prefix on every value line, e.g.
//! `+TEMPERATURE:24`. The engine runs without command echo.

use std::time::Duration;

use dutlink_at::{Clock, SystemClock};
use dutlink_transport::DutTransport;
use serde::Serialize;
use tracing::{debug, info};

use crate::auth::{self, AuthKey};
use crate::device::AtDevice;
use crate::error::{DutError, Result};
use crate::parse;

/// Duration requested for an open-ended touch test; stopped explicitly.
const TOUCH_TEST_SPAN_S: u16 = 70;

/// Highest audio hardware instance.
pub const AUDIO_INSTANCE_MAX: u8 = 3;

/// Highest tone number (0 is C0, 119 is B9).
pub const AUDIO_TONE_MAX: u8 = 119;

/// Tones play for the longest duration the firmware accepts and are stopped explicitly.
const TONE_SPAN_MS: u16 = u16::MAX;

const LOOPBACK_SAMPLE_RATE_HZ: u32 = 44_100;

/// Touch sensor action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum TouchAction {
    Unknown = 0,
    Touch = 1,
    Slide = 2,
    HandCover = 3,
}

/// One `+RSSIREAD:` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RssiReport {
    pub address: String,
    pub rssi_dbm: i16,
}

/// Audio hardware, numbered as the firmware's `audio_hardware` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AudioHardware {
    Pcm = 0,
    I2s = 1,
    Spdif = 2,
    Codec = 3,
    DigitalMic = 4,
    Fm = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AudioChannel {
    Left = 0,
    Right = 1,
    LeftAndRight = 2,
}

/// Where audio is routed: hardware, instance and channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioOutput {
    pub hardware: AudioHardware,
    pub instance: u8,
    pub channel: AudioChannel,
}

impl AudioOutput {
    /// Speaker mask `HHHIICC`: hardware in bits 4-6, instance in 2-3,
    /// channel in 0-1.
    pub fn mask(&self) -> Result<u8> {
        if self.instance > AUDIO_INSTANCE_MAX {
            return Err(DutError::Config(format!(
                "audio instance {} is invalid (must be between 0 and {AUDIO_INSTANCE_MAX})",
                self.instance
            )));
        }
        Ok(self.channel as u8 | (self.instance << 2) | ((self.hardware as u8) << 4))
    }
}

/// DTS earbud device.
pub struct DtsDevice<T, C = SystemClock> {
    device: AtDevice<T, C>,
}

impl<T: DutTransport, C: Clock> DtsDevice<T, C> {
    pub fn new(device: AtDevice<T, C>) -> Self {
        Self { device }
    }

    /// Enable or disable DTS mode for subsequent boots.
    pub fn set_test_mode(&mut self, enable: bool) -> Result<()> {
        self.device
            .command(&format!("AT+DTSSETTESTMODE={}", u8::from(enable)))
    }

    /// Prove knowledge of the shared key before any protected command.
    ///
    /// A device `ERROR` to the response means the key is wrong and is
    /// reported as [`DutError::AuthenticationFailed`].
    pub fn authenticate(&mut self, key: &AuthKey) -> Result<()> {
        let lines = self.device.query_prefixed("AT+AUTHSTART", "+AUTHSTART")?;
        let nonce_text = lines.first().ok_or_else(|| {
            DutError::MissingValue("device authentication start response not received".to_string())
        })?;
        let nonce = auth::parse_challenge(nonce_text)?;
        let response = auth::to_hex_upper(&key.sign(&nonce)?);

        match self.device.command(&format!("AT+AUTHRESP:{response}")) {
            Ok(()) => {
                info!("DTS authenticated");
                Ok(())
            }
            Err(err) if err.is_rejected() => Err(DutError::AuthenticationFailed),
            Err(err) => Err(err),
        }
    }

    /// Leave the test session, optionally rebooting the earbud.
    pub fn end_testing(&mut self, reboot: bool) -> Result<()> {
        info!(reboot, "ending DTS session");
        self.device
            .command(&format!("AT+DTSENDTESTING={}", u8::from(reboot)))
    }

    /// Post-test sequence: on a pass, optionally disable DTS mode; always reboot.
    pub fn finish(&mut self, passed: bool, disable_on_pass: bool) -> Result<()> {
        if passed && disable_on_pass {
            self.set_test_mode(false)?;
        }
        self.end_testing(true)
    }

    pub fn led_set(&mut self, mask: u8) -> Result<()> {
        self.device.command(&format!("AT+TESTLED={mask}"))
    }

    /// Write a persistent-store key as 16-bit words.
    pub fn ps_set_value(&mut self, key: u16, words: &[u16]) -> Result<()> {
        let value = words
            .iter()
            .map(|w| format!("{w:04X}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.device.command(&format!("AT+PSKEYSET={key},{value}"))
    }

    pub fn ps_clear(&mut self, key: u16) -> Result<()> {
        self.device.command(&format!("AT+PSKEYCLEAR={key}"))
    }

    /// Play `tone` on `output` until [`audio_tone_stop`](Self::audio_tone_stop).
    pub fn audio_tone_start(&mut self, output: AudioOutput, tone: u8) -> Result<()> {
        if tone > AUDIO_TONE_MAX {
            return Err(DutError::Config(format!(
                "audio tone {tone} is invalid (must be between 0 and {AUDIO_TONE_MAX})"
            )));
        }
        let mask = output.mask()?;
        debug!(?output, tone, "starting tone");
        self.device
            .command(&format!("AT+AUDIOPLAYTONE={tone},{mask},{TONE_SPAN_MS}"))
    }

    pub fn audio_tone_stop(&mut self) -> Result<()> {
        self.device.command("AT+AUDIOPLAYTONE=0,0,0")
    }

    /// Route microphone `mic` (numbered from 1) to `output`.
    pub fn audio_loopback_start(&mut self, mic: u8, output: AudioOutput) -> Result<()> {
        let mask = output.mask()?;
        debug!(mic, ?output, "starting loopback");
        self.device.command(&format!(
            "AT+LOOPBACKSTART={mic},{mask},{LOOPBACK_SAMPLE_RATE_HZ}"
        ))
    }

    pub fn audio_loopback_stop(&mut self) -> Result<()> {
        self.device.command("AT+LOOPBACKSTOP")
    }

    /// End the next RF test when `pio` changes.
    pub fn rf_stop_on_pio(&mut self, pio: u8) -> Result<()> {
        self.device.command(&format!("AT+RFTESTCFGSTOPPIO={pio}"))
    }

    /// End the next RF test after `seconds`, then reboot.
    pub fn rf_stop_after(&mut self, seconds: u8) -> Result<()> {
        let ms = u32::from(seconds) * 1000;
        self.device.command(&format!("AT+RFTESTCFGSTOPTIME=1,{ms}"))
    }

    /// End the next RF test on a touch.
    pub fn rf_stop_on_touch(&mut self) -> Result<()> {
        self.device.command("AT+RFTESTCFGSTOPTOUCH")
    }

    pub fn rf_tx_power(&mut self, level: u8) -> Result<()> {
        self.device.command(&format!("AT+RFTESTCFGPOWER={level}"))
    }

    /// Start a continuous-wave carrier on `channel`.
    ///
    /// The earbud drops the link while transmitting, so the device is
    /// consumed and the port closed.
    pub fn rf_carrier_start(mut self, channel: u8) -> Result<()> {
        self.device
            .command(&format!("AT+RFTESTCARRIER={channel}"))?;
        info!(channel, "carrier started, link released");
        Ok(())
    }

    pub fn temperature_c(&mut self) -> Result<i16> {
        self.device.query_value("AT+TEMPERATURE?", "+TEMPERATURE")
    }

    pub fn battery_mv(&mut self) -> Result<u16> {
        self.device.query_value("AT+BATTERYLEVEL?", "+BATTERYLEVEL")
    }

    /// RSSI of the single active link.
    pub fn rssi(&mut self) -> Result<RssiReport> {
        let reports = self.device.query_prefixed("AT+RSSIREAD", "+RSSIREAD")?;
        let line = match reports.as_slice() {
            [] => {
                return Err(DutError::MissingValue(
                    "no RSSI report received from device".to_string(),
                ))
            }
            [line] => line,
            _ => {
                return Err(DutError::InvalidResponse(format!(
                    "can't determine RSSI, device reported {} active connections",
                    reports.len()
                )))
            }
        };

        let values = parse::split_values(line);
        let [address, rssi] = values.as_slice() else {
            return Err(DutError::InvalidResponse(format!(
                "RSSI report \"{line}\" is invalid, expecting \"<address>,<rssi>\""
            )));
        };
        Ok(RssiReport {
            address: address.to_string(),
            rssi_dbm: parse::parse_value(rssi, "RSSI")?,
        })
    }

    pub fn rssi_dbm(&mut self) -> Result<i16> {
        self.rssi().map(|report| report.rssi_dbm)
    }

    /// Wait up to `timeout_s` for the proximity sensor to change state.
    pub fn proximity_changed(&mut self, timeout_s: u16) -> Result<bool> {
        self.sensor_changed("AT+TESTPROXIMITY", "+PROXIMITY", "proximity status", timeout_s)
    }

    /// Wait up to `timeout_s` for the hall-effect sensor to change state.
    pub fn hall_effect_changed(&mut self, timeout_s: u16) -> Result<bool> {
        self.sensor_changed(
            "AT+TESTHALLEFFECT",
            "+HALLEFFECT",
            "hall effect sensor",
            timeout_s,
        )
    }

    /// Wait up to `timeout_s` for any touch sensor report.
    pub fn touch_detected(&mut self, timeout_s: u16) -> Result<bool> {
        let cmd = format!("AT+TESTTOUCH={timeout_s},1");
        let timeout = sensor_timeout(self.device.timeout(), timeout_s);
        let reports = self
            .device
            .query_prefixed_with_timeout(&cmd, "+TOUCH", timeout)?;
        Ok(!reports.is_empty())
    }

    /// Wait up to `timeout_s` for a report of one specific touch action.
    ///
    /// Reports for other actions are ignored. The touch test runs
    /// open-ended and is stopped once the wait ends.
    pub fn touch_action_detected(&mut self, timeout_s: u16, action: TouchAction) -> Result<bool> {
        self.device
            .send_only(&format!("AT+TESTTOUCH={TOUCH_TEST_SPAN_S},0"))?;
        let newline = self.device.messenger().newline().to_string();

        let mut failure = None;
        let mut detected = false;
        self.device.collect_indications(
            &[],
            Duration::from_secs(u64::from(timeout_s)),
            |text| {
                while let Some(end) = text.find(&newline) {
                    let line: String = text.drain(..end + newline.len()).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_touch_report(line) {
                        Ok(reported) if reported == action as u16 => detected = true,
                        Ok(reported) => debug!(reported, "ignoring touch report"),
                        Err(err) => {
                            failure = Some(err);
                            return true;
                        }
                    }
                }
                detected
            },
        )?;
        if let Some(err) = failure {
            return Err(err);
        }

        self.device.command("AT+TESTTOUCH=0,1")?;
        Ok(detected)
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

    /// Stop-after-report sensor test.
    ///
    /// Two differing reports mean the sensor changed; a single report (or
    /// none) means it did not. Two identical reports are a device fault.
    fn sensor_changed(
        &mut self,
        command: &str,
        prefix: &str,
        what: &str,
        timeout_s: u16,
    ) -> Result<bool> {
        let cmd = format!("{command}={timeout_s},1");
        let timeout = sensor_timeout(self.device.timeout(), timeout_s);
        let reports = self
            .device
            .query_prefixed_with_timeout(&cmd, prefix, timeout)?;

        match reports.as_slice() {
            [first, second] if first == second => Err(DutError::InvalidResponse(format!(
                "device response indicates no {what} change"
            ))),
            [_, _] => Ok(true),
            _ => Ok(false),
        }
    }
}

/// Transaction timeout for a sensor test lasting `timeout_s`.
fn sensor_timeout(standard: Duration, timeout_s: u16) -> Duration {
    Duration::from_secs(u64::from(timeout_s)) + standard
}

/// Parse `+TOUCH:<action>,<count>` and return the action.
fn parse_touch_report(line: &str) -> Result<u16> {
    let invalid = || {
        DutError::InvalidResponse(format!(
            "unexpected line \"{line}\" received in touch test mode"
        ))
    };
    let body = line.strip_prefix("+TOUCH:").ok_or_else(invalid)?;
    let (action, count) = body.split_once(',').ok_or_else(invalid)?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(action) || !all_digits(count) {
        return Err(invalid());
    }
    parse::parse_value(action, "touch action")
}
