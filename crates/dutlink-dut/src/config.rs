//! Station configuration.
//!
//! A station file is a small JSON object naming the port and the link
//! tuning. Every field is optional; missing fields take the defaults below.
//!
//! ```json
//! { "port": "/dev/ttyUSB0", "newline": "crlf", "timeout_ms": 3000, "retries": 1 }
//! ```

use std::path::Path;
use std::time::Duration;

use dutlink_at::{MessengerConfig, DEFAULT_NEWLINE, DEFAULT_READ_BLOCK_LEN};
use dutlink_transport::{SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_MAX_READ_LEN};
use serde::{Deserialize, Serialize};

use crate::auth::AuthKey;
use crate::error::{DutError, Result};
use crate::retry::RetryPolicy;

/// Standard transaction timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Per-station link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StationConfig {
    /// Serial port name, e.g. `/dev/ttyUSB0` or `COM7`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// `crlf`, `lf`, `cr`, or a literal marker.
    pub newline: String,
    pub expect_echo: bool,
    pub read_block_len: usize,
    pub timeout_ms: u64,
    /// Extra attempts after the first.
    pub retries: u32,
    pub read_timeout_ms: u64,
    /// DTS authentication key as 16 hex octets, e.g. `"0x2b,0x7e,..."`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dts_auth_key: Option<String>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            newline: "crlf".to_string(),
            expect_echo: false,
            read_block_len: DEFAULT_READ_BLOCK_LEN,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: 1,
            read_timeout_ms: 50,
            dts_auth_key: None,
        }
    }
}

impl StationConfig {
    /// Load and validate a station file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the link layers would otherwise reject later.
    pub fn validate(&self) -> Result<()> {
        resolve_newline(&self.newline)?;
        if self.read_block_len == 0 {
            return Err(DutError::Config("read_block_len must be at least 1".to_string()));
        }
        if self.read_block_len > DEFAULT_MAX_READ_LEN {
            return Err(DutError::Config(format!(
                "read_block_len {} exceeds the serial read limit of {DEFAULT_MAX_READ_LEN}",
                self.read_block_len
            )));
        }
        if self.baud_rate == 0 {
            return Err(DutError::Config("baud_rate must be non-zero".to_string()));
        }
        self.auth_key()?;
        Ok(())
    }

    /// Standard transaction timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            ..SerialConfig::default()
        }
    }

    pub fn messenger_config(&self) -> Result<MessengerConfig> {
        Ok(MessengerConfig {
            newline: resolve_newline(&self.newline)?,
            expect_echo: self.expect_echo,
            read_block_len: self.read_block_len,
            ..MessengerConfig::default()
        })
    }

    /// Parsed DTS authentication key, if the station has one.
    pub fn auth_key(&self) -> Result<Option<AuthKey>> {
        self.dts_auth_key.as_deref().map(str::parse::<AuthKey>).transpose()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.retries)
    }
}

/// Map a newline name to its marker. Unknown names are taken literally.
pub fn resolve_newline(name: &str) -> Result<String> {
    let marker = match name.to_ascii_lowercase().as_str() {
        "crlf" => DEFAULT_NEWLINE.to_string(),
        "lf" => "\n".to_string(),
        "cr" => "\r".to_string(),
        _ => name.to_string(),
    };
    if marker.is_empty() {
        return Err(DutError::Config("newline must not be empty".to_string()));
    }
    Ok(marker)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "dutlink-station-{}-{}.json",
            std::process::id(),
            name
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults() {
        let config = StationConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.timeout(), Duration::from_millis(3000));
        assert_eq!(config.retries, 1);
        assert_eq!(config.messenger_config().unwrap().newline, "\r\n");
        assert_eq!(config.serial_config().read_timeout, Duration::from_millis(50));
        assert_eq!(config.retry_policy().max_attempts, 2);
    }

    #[test]
    fn newline_names() {
        assert_eq!(resolve_newline("CRLF").unwrap(), "\r\n");
        assert_eq!(resolve_newline("lf").unwrap(), "\n");
        assert_eq!(resolve_newline("cr").unwrap(), "\r");
        assert_eq!(resolve_newline("\n\r").unwrap(), "\n\r");
        assert!(matches!(resolve_newline(""), Err(DutError::Config(_))));
    }

    #[test]
    fn load_partial_file() {
        let path = write_temp(
            "partial",
            r#"{ "port": "/dev/ttyACM0", "newline": "lf", "expect_echo": true }"#,
        );
        let config = StationConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert!(config.expect_echo);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        let messenger = config.messenger_config().unwrap();
        assert_eq!(messenger.newline, "\n");
        assert!(messenger.expect_echo);
    }

    #[test]
    fn load_rejects_zero_block_len() {
        let path = write_temp("zero-block", r#"{ "read_block_len": 0 }"#);
        let err = StationConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, DutError::Config(_)));
    }

    #[test]
    fn block_len_bounded_by_serial_reads() {
        let at_limit = StationConfig {
            read_block_len: DEFAULT_MAX_READ_LEN,
            ..StationConfig::default()
        };
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.serial_config().max_read_len, DEFAULT_MAX_READ_LEN);

        let oversized = StationConfig {
            read_block_len: 5000,
            ..StationConfig::default()
        };
        let err = oversized.validate().unwrap_err();
        assert!(matches!(err, DutError::Config(ref m) if m.contains("5000")));
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let path = write_temp("unknown", r#"{ "baud": 9600 }"#);
        let err = StationConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, DutError::Json(_)));
    }

    #[test]
    fn load_missing_file() {
        let err = StationConfig::load("/nonexistent/dutlink/station.json").unwrap_err();
        assert!(matches!(err, DutError::Io(_)));
    }

    #[test]
    fn auth_key_is_optional_and_checked() {
        assert_eq!(StationConfig::default().auth_key().unwrap(), None);

        let station: StationConfig = serde_json::from_str(
            r#"{ "dts_auth_key": "0x00,0x01,0x02,0x03,0x04,0x05,0x06,0x07,0x08,0x09,0x0a,0x0b,0x0c,0x0d,0x0e,0x0f" }"#,
        )
        .unwrap();
        station.validate().unwrap();
        assert_eq!(
            station.auth_key().unwrap(),
            Some(AuthKey::new([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]))
        );

        let short = StationConfig {
            dts_auth_key: Some("0x00,0x01".to_string()),
            ..StationConfig::default()
        };
        assert!(matches!(short.validate(), Err(DutError::Config(_))));
    }
}
