//! Capture configuration
//!
//! Options arrive from two layers, an optional TOML file and the command
//! line. Both deserialize into [`CaptureOptions`]; command-line values win.
//! [`CaptureConfig::from_options`] resolves defaults and validates everything
//! before any device is touched.

use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Baud rates accepted by the serial transport
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400, 460800, 500000, 576000, 921600, 1000000, 1152000, 1500000, 2000000, 2500000,
    3000000, 3500000, 4000000,
];

/// Default serial console speed for most embedded Linux boards
pub const DEFAULT_BAUD_RATE: u32 = 115200;

pub const DEFAULT_BYTE_TIMEOUT_SECS: f64 = 0.1;

pub const DEFAULT_WALL_CLOCK_FORMAT: &str = "%H:%M:%S%.6f";

/// How each captured line is stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Seconds since capture started
    #[default]
    Elapsed,
    /// Seconds since capture started plus the gap to the previous line
    ElapsedWithDelta,
    /// Local wall-clock time (cosmetic, may jump with clock adjustments)
    WallClock,
    /// No prefix
    None,
}

impl FromStr for TimestampMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "elapsed" => Ok(TimestampMode::Elapsed),
            "elapsed_with_delta" | "delta" => Ok(TimestampMode::ElapsedWithDelta),
            "wall_clock" | "wall" => Ok(TimestampMode::WallClock),
            "none" => Ok(TimestampMode::None),
            _ => Err(ConfigError::InvalidTimestampMode(s.to_string())),
        }
    }
}

impl fmt::Display for TimestampMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampMode::Elapsed => write!(f, "elapsed"),
            TimestampMode::ElapsedWithDelta => write!(f, "elapsed_with_delta"),
            TimestampMode::WallClock => write!(f, "wall_clock"),
            TimestampMode::None => write!(f, "none"),
        }
    }
}

/// Unvalidated options, one layer of configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureOptions {
    pub device: Option<String>,
    pub baud_rate: Option<u32>,
    pub byte_timeout_seconds: Option<f64>,
    pub duration_limit_seconds: Option<f64>,
    pub quiet_timeout_seconds: Option<f64>,
    pub timestamp_mode: Option<String>,
    pub wall_clock_format: Option<String>,
    pub capture_file_path: Option<PathBuf>,
    pub append: Option<bool>,
    pub quit_pattern: Option<String>,
    pub strip_cr: Option<bool>,
    pub data_bits: Option<u8>,
    pub parity: Option<String>,
    pub stop_bits: Option<u8>,
    pub flow_control: Option<String>,
}

impl CaptureOptions {
    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Layer `overrides` on top of `self`; any value set in `overrides` wins
    pub fn merge(self, overrides: CaptureOptions) -> CaptureOptions {
        CaptureOptions {
            device: overrides.device.or(self.device),
            baud_rate: overrides.baud_rate.or(self.baud_rate),
            byte_timeout_seconds: overrides.byte_timeout_seconds.or(self.byte_timeout_seconds),
            duration_limit_seconds: overrides
                .duration_limit_seconds
                .or(self.duration_limit_seconds),
            quiet_timeout_seconds: overrides.quiet_timeout_seconds.or(self.quiet_timeout_seconds),
            timestamp_mode: overrides.timestamp_mode.or(self.timestamp_mode),
            wall_clock_format: overrides.wall_clock_format.or(self.wall_clock_format),
            capture_file_path: overrides.capture_file_path.or(self.capture_file_path),
            append: overrides.append.or(self.append),
            quit_pattern: overrides.quit_pattern.or(self.quit_pattern),
            strip_cr: overrides.strip_cr.or(self.strip_cr),
            data_bits: overrides.data_bits.or(self.data_bits),
            parity: overrides.parity.or(self.parity),
            stop_bits: overrides.stop_bits.or(self.stop_bits),
            flow_control: overrides.flow_control.or(self.flow_control),
        }
    }
}

/// Serial line framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// Resolved, immutable configuration for one capture session
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Serial device path (e.g., /dev/ttyUSB0)
    pub device: String,
    pub baud_rate: u32,
    pub framing: Framing,
    /// Upper bound on a single blocking read
    pub byte_timeout: Duration,
    /// Overall capture limit; `None` means unbounded
    pub duration_limit: Option<Duration>,
    /// End the session after this long without data; `None` disables
    pub quiet_timeout: Option<Duration>,
    pub timestamp_mode: TimestampMode,
    /// strftime format used in wall-clock mode
    pub wall_clock_format: String,
    /// Optional mirror of the output
    pub capture_file: Option<PathBuf>,
    /// Append to the capture file instead of truncating it
    pub append: bool,
    /// Finish the session once a line containing this text is emitted
    pub quit_pattern: Option<String>,
    /// Strip a carriage return preceding the line feed
    pub strip_cr: bool,
}

impl CaptureConfig {
    /// Create a configuration with defaults for the given device
    #[cfg(test)]
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            framing: Framing::default(),
            byte_timeout: Duration::from_secs_f64(DEFAULT_BYTE_TIMEOUT_SECS),
            duration_limit: None,
            quiet_timeout: None,
            timestamp_mode: TimestampMode::default(),
            wall_clock_format: DEFAULT_WALL_CLOCK_FORMAT.to_string(),
            capture_file: None,
            append: false,
            quit_pattern: None,
            strip_cr: true,
        }
    }

    /// Resolve defaults and validate a merged option set
    pub fn from_options(opts: CaptureOptions) -> Result<Self, ConfigError> {
        let device = opts
            .device
            .filter(|d| !d.trim().is_empty())
            .ok_or(ConfigError::MissingDevice)?;

        let baud_rate = opts.baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
        if !STANDARD_BAUD_RATES.contains(&baud_rate) {
            return Err(ConfigError::InvalidBaudRate(baud_rate));
        }

        let byte_timeout = seconds(
            "byte_timeout_seconds",
            opts.byte_timeout_seconds.unwrap_or(DEFAULT_BYTE_TIMEOUT_SECS),
        )?;
        let duration_limit = opts
            .duration_limit_seconds
            .map(|v| seconds("duration_limit_seconds", v))
            .transpose()?;
        let quiet_timeout = opts
            .quiet_timeout_seconds
            .map(|v| seconds("quiet_timeout_seconds", v))
            .transpose()?;

        let timestamp_mode = match opts.timestamp_mode {
            Some(mode) => mode.parse()?,
            None => TimestampMode::default(),
        };

        let wall_clock_format = opts
            .wall_clock_format
            .unwrap_or_else(|| DEFAULT_WALL_CLOCK_FORMAT.to_string());
        if StrftimeItems::new(&wall_clock_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidTimeFormat(wall_clock_format));
        }

        if let Some(ref path) = opts.capture_file_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyCapturePath);
            }
        }

        let framing = Framing {
            data_bits: parse_data_bits(opts.data_bits)?,
            parity: parse_parity(opts.parity.as_deref())?,
            stop_bits: parse_stop_bits(opts.stop_bits)?,
            flow_control: parse_flow_control(opts.flow_control.as_deref())?,
        };

        Ok(Self {
            device,
            baud_rate,
            framing,
            byte_timeout,
            duration_limit,
            quiet_timeout,
            timestamp_mode,
            wall_clock_format,
            capture_file: opts.capture_file_path,
            append: opts.append.unwrap_or(false),
            quit_pattern: opts.quit_pattern.filter(|p| !p.is_empty()),
            strip_cr: opts.strip_cr.unwrap_or(true),
        })
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::InvalidSeconds { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds { name, value })
}

fn parse_data_bits(value: Option<u8>) -> Result<DataBits, ConfigError> {
    match value.unwrap_or(8) {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(ConfigError::InvalidFraming {
            name: "data bits",
            value: other.to_string(),
        }),
    }
}

fn parse_parity(value: Option<&str>) -> Result<Parity, ConfigError> {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("none") | Some("n") => Ok(Parity::None),
        Some("even") | Some("e") => Ok(Parity::Even),
        Some("odd") | Some("o") => Ok(Parity::Odd),
        Some(other) => Err(ConfigError::InvalidFraming {
            name: "parity",
            value: other.to_string(),
        }),
    }
}

fn parse_stop_bits(value: Option<u8>) -> Result<StopBits, ConfigError> {
    match value.unwrap_or(1) {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(ConfigError::InvalidFraming {
            name: "stop bits",
            value: other.to_string(),
        }),
    }
}

fn parse_flow_control(value: Option<&str>) -> Result<FlowControl, ConfigError> {
    match value.map(str::to_lowercase).as_deref() {
        None | Some("none") => Ok(FlowControl::None),
        Some("software") | Some("xonxoff") => Ok(FlowControl::Software),
        Some("hardware") | Some("rtscts") => Ok(FlowControl::Hardware),
        Some(other) => Err(ConfigError::InvalidFraming {
            name: "flow control",
            value: other.to_string(),
        }),
    }
}
