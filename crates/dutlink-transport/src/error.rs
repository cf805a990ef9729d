/// Errors that can occur in DUT transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the specified port.
    #[error("failed to open port {port}: {source}")]
    Open {
        port: String,
        source: serialport::Error,
    },

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial driver reported an error.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Fewer bytes were accepted by the port than requested.
    #[error("short write ({written} of {requested} bytes)")]
    ShortWrite { written: usize, requested: usize },

    /// A write of zero bytes was requested.
    #[error("message to write is empty")]
    EmptyWrite,

    /// A read of zero bytes was requested.
    #[error("asked to read nothing")]
    EmptyRead,

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether the OS refused access to the port.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Open { source, .. } | Self::Serial(source) => matches!(
                source.kind(),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
            ),
            Self::Io(err) => err.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_detection() {
        let denied = TransportError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(denied.is_permission_denied());

        let open = TransportError::Open {
            port: "/dev/ttyUSB0".to_string(),
            source: serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"),
        };
        assert!(!open.is_permission_denied());
        assert!(!TransportError::Closed.is_permission_denied());
    }
}
