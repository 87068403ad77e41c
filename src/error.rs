//! Error taxonomy for a capture session
//!
//! Configuration and device failures are fatal; capture-file failures are
//! contained inside the sink writer and never abort the session.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration, detected before any device or file is opened
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no serial device specified")]
    MissingDevice,

    #[error("unsupported baud rate: {0}")]
    InvalidBaudRate(u32),

    #[error("{name} must be a positive number of seconds, got {value}")]
    InvalidSeconds { name: &'static str, value: f64 },

    #[error("unknown timestamp mode '{0}' (expected elapsed, elapsed_with_delta, wall_clock or none)")]
    InvalidTimestampMode(String),

    #[error("invalid {name} '{value}'")]
    InvalidFraming { name: &'static str, value: String },

    #[error("invalid wall clock format '{0}'")]
    InvalidTimeFormat(String),

    #[error("capture file path is empty")]
    EmptyCapturePath,

    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Device open failure or mid-session disconnect
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("serial port {path} read failed: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("serial port {path} disconnected")]
    Disconnected { path: String },
}

/// Capture file failure, recoverable
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open capture file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write capture file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fatal errors that end a capture session
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("failed to write to standard output: {0}")]
    Output(#[source] io::Error),
}

impl CaptureError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            CaptureError::Config(_) => 2,
            CaptureError::Device(_) => 3,
            CaptureError::Output(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let config = CaptureError::from(ConfigError::MissingDevice);
        let device = CaptureError::from(DeviceError::Disconnected {
            path: "/dev/ttyUSB0".to_string(),
        });
        assert_eq!(config.exit_code(), 2);
        assert_eq!(device.exit_code(), 3);
        assert_ne!(config.exit_code(), device.exit_code());
    }

    #[test]
    fn test_messages() {
        let err = ConfigError::InvalidBaudRate(12345);
        assert_eq!(err.to_string(), "unsupported baud rate: 12345");

        let err = DeviceError::Disconnected {
            path: "/dev/ttyACM0".to_string(),
        };
        assert!(err.to_string().contains("/dev/ttyACM0"));
    }
}
