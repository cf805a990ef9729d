use dutlink_transport::TransportError;

/// Violations of the expected AT-command framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolErrorKind {
    /// A read of zero bytes was requested.
    #[error("request to read nothing")]
    EmptyReadRequest,

    /// Nothing at all was received before the timeout.
    #[error("no response received from the DUT")]
    NoResponse,

    /// Data arrived but no terminal line before the timeout.
    #[error("AT command response incomplete (expecting \"OK\" or \"ERROR\" result)")]
    IncompleteResponse,

    /// Echo was expected but no response line ends with the command.
    #[error("DUT response does not contain expected command")]
    MissingCommandEcho,
}

/// Failures reported by the device itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeviceErrorKind {
    /// The response ended with an `ERROR` line.
    #[error("device response indicates failure (expected \"OK\" result)")]
    DeviceReportedFailure,
}

/// Errors that can occur in AT messenger operations.
#[derive(Debug, thiserror::Error)]
pub enum AtError {
    /// Invalid construction or tuning parameters.
    #[error("invalid messenger configuration: {0}")]
    Configuration(String),

    /// AT framing violation.
    #[error("AT protocol error: {0}")]
    Protocol(ProtocolErrorKind),

    /// The DUT rejected the command.
    #[error("device command error: {0}")]
    Device(DeviceErrorKind),

    /// Transport-level error, passed through unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl AtError {
    /// True when the device answered `ERROR`.
    ///
    /// Callers use this to replace the generic message with one specific to
    /// the command that was rejected.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device(_))
    }

    /// The protocol error kind, if this is a framing failure.
    pub fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            Self::Protocol(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<ProtocolErrorKind> for AtError {
    fn from(kind: ProtocolErrorKind) -> Self {
        Self::Protocol(kind)
    }
}

impl From<DeviceErrorKind> for AtError {
    fn from(kind: DeviceErrorKind) -> Self {
        Self::Device(kind)
    }
}

pub type Result<T> = std::result::Result<T, AtError>;
