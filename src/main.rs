//! grabserial
//!
//! Reads a serial port and writes every line to standard output with a
//! timestamp. The main purpose is collecting console messages from a target
//! board booting Linux and saving them on the host, e.g. for boot time
//! analysis.
//!
//! # Usage
//!
//! ```bash
//! # List available serial ports
//! grabserial list
//!
//! # Capture with elapsed-time stamps, stop after 60s or 5s of silence
//! grabserial capture -d /dev/ttyUSB0 -e 60 --quiet-timeout 5
//!
//! # Show the gap between lines and mirror everything to a file
//! grabserial capture -d /dev/ttyUSB0 -t elapsed_with_delta -o boot.log
//!
//! # Stop as soon as the login prompt appears
//! grabserial capture -d /dev/ttyUSB0 -q "login:"
//!
//! # Load defaults from a TOML file, overriding the baud rate
//! grabserial capture -c board.toml -b 1500000
//! ```

mod capture;
mod config;
mod error;
mod serial;
mod signal;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use capture::{FinishReason, SessionController, SessionOutcome, SinkWriter, SystemClock};
use config::{CaptureConfig, CaptureOptions};
use error::CaptureError;
use serial::{PortConfig, PortReader};

/// Serial dump and timing program
#[derive(Parser)]
#[command(name = "grabserial")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Capture serial console output with per-line timestamps")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture serial output until a stop condition is met
    Capture(CaptureArgs),

    /// List available serial ports
    List,
}

#[derive(clap::Args)]
struct CaptureArgs {
    /// TOML file with capture options (command line wins)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port path (e.g., /dev/ttyUSB0)
    #[arg(short, long)]
    device: Option<String>,

    /// Baud rate [default: 115200]
    #[arg(short, long)]
    baud: Option<u32>,

    /// Longest single read wait, in seconds [default: 0.1]
    #[arg(long, value_name = "SECS")]
    byte_timeout: Option<f64>,

    /// Stop after this many seconds
    #[arg(short = 'e', long, value_name = "SECS")]
    duration: Option<f64>,

    /// Stop after this many seconds without data
    #[arg(long, value_name = "SECS")]
    quiet_timeout: Option<f64>,

    /// Timestamp mode: elapsed, elapsed_with_delta, wall_clock or none
    #[arg(short, long, value_name = "MODE")]
    timestamps: Option<String>,

    /// strftime format for wall_clock timestamps [default: %H:%M:%S%.6f]
    #[arg(long, value_name = "FORMAT")]
    time_format: Option<String>,

    /// Mirror output to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append to the output file instead of truncating it
    #[arg(short, long)]
    append: bool,

    /// Stop once this text is captured, including an unterminated prompt
    #[arg(short, long = "quit", value_name = "PATTERN")]
    quit_pattern: Option<String>,

    /// Keep carriage returns at line ends
    #[arg(long)]
    keep_cr: bool,

    /// Data bits (5-8) [default: 8]
    #[arg(long)]
    data_bits: Option<u8>,

    /// Parity: none, even or odd [default: none]
    #[arg(long)]
    parity: Option<String>,

    /// Stop bits (1 or 2) [default: 1]
    #[arg(long)]
    stop_bits: Option<u8>,

    /// Flow control: none, software or hardware [default: none]
    #[arg(long)]
    flow_control: Option<String>,

    /// Suppress status banners and the summary on stderr
    #[arg(short = 'Q', long)]
    quiet: bool,
}

impl CaptureArgs {
    fn options(&self) -> CaptureOptions {
        CaptureOptions {
            device: self.device.clone(),
            baud_rate: self.baud,
            byte_timeout_seconds: self.byte_timeout,
            duration_limit_seconds: self.duration,
            quiet_timeout_seconds: self.quiet_timeout,
            timestamp_mode: self.timestamps.clone(),
            wall_clock_format: self.time_format.clone(),
            capture_file_path: self.output.clone(),
            append: self.append.then_some(true),
            quit_pattern: self.quit_pattern.clone(),
            strip_cr: self.keep_cr.then_some(false),
            data_bits: self.data_bits,
            parity: self.parity.clone(),
            stop_bits: self.stop_bits,
            flow_control: self.flow_control.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Capture(args) => handle_capture(args),
        Commands::List => serial::port::print_ports(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "[ERROR]".red().bold(), err);
            let code = err
                .downcast_ref::<CaptureError>()
                .map(CaptureError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn handle_capture(args: CaptureArgs) -> Result<()> {
    let config = resolve_config(&args).map_err(CaptureError::from)?;

    let cancel = signal::install()?;

    if !args.quiet {
        eprintln!(
            "{} Capturing {} at {} baud (timestamps: {})",
            "[*]".cyan().bold(),
            config.device.white().bold(),
            config.baud_rate,
            config.timestamp_mode
        );
        if let Some(ref path) = config.capture_file {
            eprintln!("{} Logging to: {}", "[LOG]".cyan().bold(), path.display());
        }
        eprintln!("{}", "Press Ctrl+C to stop".yellow());
    }

    // The controller attaches the capture file once the port is open
    let sink = SinkWriter::new(io::stdout().lock(), &config.wall_clock_format).quiet(args.quiet);

    let port_config = PortConfig::from_capture(&config);
    let mut controller = SessionController::new(config.clone(), SystemClock::new(), cancel);
    let SessionOutcome { summary, output } =
        controller.run(|| PortReader::open(port_config), sink)?;
    // Release the stdout lock before the summary goes to stderr
    drop(output);

    if !args.quiet {
        summary.print(&config);
    }

    match summary.device_error {
        Some(err) if summary.reason == FinishReason::DeviceError => {
            Err(CaptureError::Device(err).into())
        }
        _ => Ok(()),
    }
}

fn resolve_config(args: &CaptureArgs) -> Result<CaptureConfig, error::ConfigError> {
    let base = match args.config {
        Some(ref path) => CaptureOptions::from_file(path)?,
        None => CaptureOptions::default(),
    };
    CaptureConfig::from_options(base.merge(args.options()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_capture_args_override_defaults() {
        let cli = Cli::parse_from([
            "grabserial",
            "capture",
            "-d",
            "/dev/ttyUSB0",
            "-b",
            "9600",
            "-e",
            "30",
            "-t",
            "none",
            "-q",
            "login:",
            "--keep-cr",
        ]);
        let Commands::Capture(args) = cli.command else {
            panic!("expected capture command");
        };

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.duration_limit, Some(std::time::Duration::from_secs(30)));
        assert_eq!(config.timestamp_mode, config::TimestampMode::None);
        assert_eq!(config.quit_pattern.as_deref(), Some("login:"));
        assert!(!config.strip_cr);
        assert!(!config.append);
    }

    #[test]
    fn test_config_error_exit_code() {
        let cli = Cli::parse_from(["grabserial", "capture", "-d", "/dev/ttyUSB0", "-b", "12"]);
        let Commands::Capture(args) = cli.command else {
            panic!("expected capture command");
        };

        let err: anyhow::Error = resolve_config(&args).map_err(CaptureError::from).unwrap_err().into();
        let code = err.downcast_ref::<CaptureError>().map(CaptureError::exit_code);
        assert_eq!(code, Some(2));
    }
}
