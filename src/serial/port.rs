//! Port Reader
//!
//! Owns the open serial device and turns it into a stream of raw chunks.
//! Each read blocks for at most the configured byte timeout; a timeout yields
//! an empty chunk so the session controller can re-check its deadlines.

use crate::config::{CaptureConfig, Framing};
use crate::error::DeviceError;
use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{SerialPort, SerialPortType};
use std::io::{ErrorKind, Read};
use std::time::Duration;

/// Size of a single read
pub const READ_BUFFER_SIZE: usize = 4096;

/// Bytes returned by one read; empty when the read timed out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChunk {
    pub bytes: Vec<u8>,
}

impl RawChunk {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// A chunk produced by a read that timed out
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Anything that yields raw chunks with a bounded wait
pub trait ChunkSource {
    /// Read the next chunk, waiting at most one byte timeout
    fn read_chunk(&mut self) -> Result<RawChunk, DeviceError>;

    /// Human readable name of the source
    fn name(&self) -> &str;
}

/// Settings needed to open the port
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, /dev/ttyACM0)
    pub port_path: String,
    pub baud_rate: u32,
    pub framing: Framing,
    /// Read timeout
    pub timeout: Duration,
}

impl PortConfig {
    pub fn from_capture(config: &CaptureConfig) -> Self {
        Self {
            port_path: config.device.clone(),
            baud_rate: config.baud_rate,
            framing: config.framing,
            timeout: config.byte_timeout,
        }
    }
}

/// Exclusive owner of an open serial device
///
/// The handle is closed when the reader is dropped, on every exit path.
pub struct PortReader {
    port: Box<dyn SerialPort>,
    config: PortConfig,
    buffer: Vec<u8>,
}

impl PortReader {
    /// Open the serial device with the given configuration
    pub fn open(config: PortConfig) -> Result<Self, DeviceError> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.framing.data_bits)
            .parity(config.framing.parity)
            .stop_bits(config.framing.stop_bits)
            .flow_control(config.framing.flow_control)
            .timeout(config.timeout)
            .open()
            .map_err(|source| DeviceError::Open {
                path: config.port_path.clone(),
                source,
            })?;

        log::debug!(
            "opened {} at {} baud (timeout {:?})",
            config.port_path,
            config.baud_rate,
            config.timeout
        );

        Ok(Self {
            port,
            config,
            buffer: vec![0u8; READ_BUFFER_SIZE],
        })
    }
}

impl ChunkSource for PortReader {
    fn read_chunk(&mut self) -> Result<RawChunk, DeviceError> {
        match self.port.read(&mut self.buffer) {
            // A readable port returning no data has hung up
            Ok(0) => Err(DeviceError::Disconnected {
                path: self.config.port_path.clone(),
            }),
            Ok(n) => Ok(RawChunk::new(&self.buffer[..n])),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(RawChunk::idle()),
            // SIGINT lands here; the controller sees the cancellation next
            Err(ref e) if e.kind() == ErrorKind::Interrupted => Ok(RawChunk::idle()),
            Err(source) => Err(DeviceError::Read {
                path: self.config.port_path.clone(),
                source,
            }),
        }
    }

    fn name(&self) -> &str {
        &self.config.port_path
    }
}

impl Drop for PortReader {
    fn drop(&mut self) {
        log::debug!("closing {}", self.config.port_path);
    }
}

/// One-line description of a port, e.g. `usb 0403:6001 FTDI FT232R USB UART`
pub fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let mut text = format!("usb {:04x}:{:04x}", usb.vid, usb.pid);
            for field in [&usb.manufacturer, &usb.product, &usb.serial_number]
                .into_iter()
                .flatten()
            {
                text.push(' ');
                text.push_str(field.trim());
            }
            text
        }
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// Print every candidate capture device, one per line
pub fn print_ports() -> Result<()> {
    let mut ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        eprintln!("{}", "No serial ports found".yellow());
        return Ok(());
    }

    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    let width = ports.iter().map(|p| p.port_name.len()).max().unwrap_or(0);
    for port in ports {
        println!("{:<width$}  {}", port.port_name, describe(&port.port_type));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_config_from_capture() {
        let mut capture = CaptureConfig::new("/dev/ttyACM0");
        capture.baud_rate = 9600;
        capture.byte_timeout = Duration::from_millis(250);

        let config = PortConfig::from_capture(&capture);
        assert_eq!(config.port_path, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_open_missing_device() {
        let capture = CaptureConfig::new("/dev/grabserial-does-not-exist");
        let err = PortReader::open(PortConfig::from_capture(&capture)).err().unwrap();
        assert!(matches!(err, DeviceError::Open { .. }));
    }

    #[test]
    fn test_idle_chunk() {
        assert!(RawChunk::idle().is_empty());
        assert_eq!(RawChunk::new(&b"abc"[..]).len(), 3);
    }

    #[test]
    fn test_describe_usb_adapter() {
        let port_type = SerialPortType::UsbPort(serialport::UsbPortInfo {
            vid: 0x0403,
            pid: 0x6001,
            serial_number: None,
            manufacturer: Some("FTDI".to_string()),
            product: Some("FT232R USB UART ".to_string()),
        });
        assert_eq!(describe(&port_type), "usb 0403:6001 FTDI FT232R USB UART");
        assert_eq!(describe(&SerialPortType::PciPort), "pci");
    }
}
