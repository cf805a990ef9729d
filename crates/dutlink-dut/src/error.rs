use std::time::Duration;

use dutlink_at::AtError;
use dutlink_transport::TransportError;

/// Errors that can occur in device operations.
#[derive(Debug, thiserror::Error)]
pub enum DutError {
    /// AT engine error (protocol, device rejection, configuration).
    #[error("{0}")]
    At(AtError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered `ERROR` to a command.
    #[error("device rejected \"{command}\"")]
    Rejected { command: String },

    /// The device refused the authentication response.
    #[error("DTS authentication failed, check that the configured key is correct for the DUT")]
    AuthenticationFailed,

    /// A response line did not have the expected layout.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The response was complete but carried no value.
    #[error("{0}")]
    MissingValue(String),

    /// Unsolicited indications did not all arrive in time.
    #[error("failed to receive {what} within {timeout:?}")]
    IndicationTimeout { what: String, timeout: Duration },

    /// Station configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error reading a configuration file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DutError {
    /// Whether the device itself refused the command.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::AuthenticationFailed)
            || matches!(self, Self::At(e) if e.is_device_error())
    }

    /// Whether the operation gave up waiting on the device.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::IndicationTimeout { .. })
            || matches!(
                self,
                Self::At(e) if matches!(
                    e.protocol_kind(),
                    Some(dutlink_at::ProtocolErrorKind::NoResponse)
                        | Some(dutlink_at::ProtocolErrorKind::IncompleteResponse)
                )
            )
    }
}

impl From<AtError> for DutError {
    fn from(err: AtError) -> Self {
        // Link failures always surface as `Transport`.
        match err {
            AtError::Transport(inner) => Self::Transport(inner),
            other => Self::At(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DutError>;
