use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::DutTransport;

/// Default baud rate. Irrelevant for Bluetooth SPP and USB virtual COM links.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default cap on a single read.
pub const DEFAULT_MAX_READ_LEN: usize = 4 * 1024;

/// Configuration for opening a serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Line speed. Default: 115200.
    pub baud_rate: u32,
    /// How long a single read waits for data before returning empty. Default: 50 ms.
    pub read_timeout: Duration,
    /// Largest read issued to the driver in one call; longer requests are capped. Default: 4 KiB.
    pub max_read_len: usize,
    /// Assert DTR after opening. Charger PCB USB ports do not transmit without it.
    pub assert_dtr: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(50),
            max_read_len: DEFAULT_MAX_READ_LEN,
            assert_dtr: true,
        }
    }
}

/// Serial port transport (8N1, no flow control).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    max_read_len: usize,
}

impl SerialTransport {
    /// Open `port` with the given configuration.
    pub fn open(port: &str, config: &SerialConfig) -> Result<Self> {
        let mut handle = serialport::new(port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: port.to_string(),
                source,
            })?;

        handle.write_data_terminal_ready(config.assert_dtr)?;
        handle.write_request_to_send(false)?;

        info!(port, baud_rate = config.baud_rate, "opened serial port");

        Ok(Self {
            port: handle,
            name: port.to_string(),
            max_read_len: config.max_read_len,
        })
    }

    /// Port name this transport was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DutTransport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(TransportError::EmptyWrite);
        }

        let written = loop {
            match self.port.write(bytes) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        };
        if written != bytes.len() {
            return Err(TransportError::ShortWrite {
                written,
                requested: bytes.len(),
            });
        }

        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let len = capped_read_len(max_len, self.max_read_len)?;
        let mut buf = vec![0u8; len];
        loop {
            match self.port.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(Vec::new()),
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn purge(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        debug!(port = %self.name, "purged serial port buffers");
        Ok(())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .finish()
    }
}

/// A serial port found on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
}

/// Enumerate serial ports available on this host.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            name: p.port_name,
            kind: port_kind(&p.port_type),
        })
        .collect())
}

/// Size of the driver read for a request of `requested` bytes.
///
/// Returning fewer bytes than asked is within the transport contract, so
/// oversized requests shrink to `limit` rather than failing.
fn capped_read_len(requested: usize, limit: usize) -> Result<usize> {
    if requested == 0 {
        return Err(TransportError::EmptyRead);
    }
    Ok(requested.min(limit.max(1)))
}

fn port_kind(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => match &usb.product {
            Some(product) => format!("usb {:04x}:{:04x} {product}", usb.vid, usb.pid),
            None => format!("usb {:04x}:{:04x}", usb.vid, usb.pid),
        },
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_station_link() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.read_timeout, Duration::from_millis(50));
        assert!(cfg.assert_dtr);
        assert_eq!(cfg.max_read_len, DEFAULT_MAX_READ_LEN);
    }

    #[test]
    fn oversized_reads_are_capped() {
        assert_eq!(capped_read_len(5000, DEFAULT_MAX_READ_LEN).unwrap(), 4096);
        assert_eq!(capped_read_len(64, DEFAULT_MAX_READ_LEN).unwrap(), 64);
        assert_eq!(capped_read_len(8, 0).unwrap(), 1);
        assert!(matches!(
            capped_read_len(0, DEFAULT_MAX_READ_LEN),
            Err(TransportError::EmptyRead)
        ));
    }

    #[test]
    fn open_missing_port_reports_port_name() {
        let err = SerialTransport::open("/dev/dutlink-does-not-exist", &SerialConfig::default())
            .unwrap_err();
        match err {
            TransportError::Open { port, .. } => assert_eq!(port, "/dev/dutlink-does-not-exist"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn port_kind_names() {
        assert_eq!(port_kind(&SerialPortType::PciPort), "pci");
        assert_eq!(port_kind(&SerialPortType::BluetoothPort), "bluetooth");
        assert_eq!(port_kind(&SerialPortType::Unknown), "unknown");
    }
}
