use std::fmt;
use std::io;

use dutlink_at::{AtError, ProtocolErrorKind};
use dutlink_dut::DutError;
use dutlink_transport::TransportError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const DEVICE_REJECTED: i32 = 61;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        err if err.is_permission_denied() => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Io(source) if source.kind() == io::ErrorKind::TimedOut => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn at_error(context: &str, err: AtError) -> CliError {
    match err {
        AtError::Transport(err) => transport_error(context, err),
        AtError::Device(_) => CliError::new(DEVICE_REJECTED, format!("{context}: {err}")),
        AtError::Protocol(
            ProtocolErrorKind::NoResponse | ProtocolErrorKind::IncompleteResponse,
        ) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        AtError::Protocol(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        AtError::Configuration(_) => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn dut_error(context: &str, err: DutError) -> CliError {
    match err {
        DutError::At(err) => at_error(context, err),
        DutError::Transport(err) => transport_error(context, err),
        DutError::Rejected { .. } | DutError::AuthenticationFailed => {
            CliError::new(DEVICE_REJECTED, format!("{context}: {err}"))
        }
        DutError::InvalidResponse(_) | DutError::MissingValue(_) | DutError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        DutError::IndicationTimeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        DutError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        DutError::Io(source) => io_error(context, source),
    }
}

#[cfg(test)]
mod tests {
    use dutlink_at::DeviceErrorKind;

    use super::*;

    #[test]
    fn at_errors_map_to_codes() {
        let code = |err| at_error("transact", err).code;
        assert_eq!(code(AtError::Device(DeviceErrorKind::DeviceReportedFailure)), DEVICE_REJECTED);
        assert_eq!(code(AtError::Protocol(ProtocolErrorKind::NoResponse)), TIMEOUT);
        assert_eq!(code(AtError::Protocol(ProtocolErrorKind::MissingCommandEcho)), DATA_INVALID);
        assert_eq!(code(AtError::Configuration("empty newline".into())), USAGE);
        assert_eq!(code(AtError::Transport(TransportError::Closed)), TRANSPORT_ERROR);
    }

    #[test]
    fn dut_errors_map_to_codes() {
        let code = |err| dut_error("charger", err).code;
        assert_eq!(code(DutError::Rejected { command: "AT+LED=1".into() }), DEVICE_REJECTED);
        assert_eq!(code(DutError::AuthenticationFailed), DEVICE_REJECTED);
        assert_eq!(code(DutError::MissingValue("none".into())), DATA_INVALID);
        assert_eq!(
            code(DutError::IndicationTimeout {
                what: "status".into(),
                timeout: std::time::Duration::from_secs(10),
            }),
            TIMEOUT
        );
        assert_eq!(code(DutError::Config("bad".into())), USAGE);
    }
}
