//! Session Controller
//!
//! Drives one capture: Port Reader -> Line Assembler -> Timestamp Annotator
//! -> Sink Writer, on a single loop. Every read is bounded by the byte
//! timeout, so termination conditions are re-evaluated at least once per
//! timeout interval, in this order:
//!
//! 1. external cancellation
//! 2. overall duration limit
//! 3. quiet-period timeout
//! 4. fatal device error
//! 5. quit pattern seen in the last chunk, including its unterminated tail
//!
//! The trailing partial line is flushed on every finish except a device
//! error, where its integrity is unknown and it is discarded.

use crate::capture::assembler::{Line, LineAssembler};
use crate::capture::sink::SinkWriter;
use crate::capture::timestamp::{Clock, TimestampAnnotator};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, DeviceError};
use crate::serial::ChunkSource;
use colored::Colorize;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation flag checked at loop boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Cancelled,
    DurationExceeded,
    IdleTimeout,
    DeviceError,
    QuitPattern,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Cancelled => write!(f, "cancelled"),
            FinishReason::DurationExceeded => write!(f, "duration_exceeded"),
            FinishReason::IdleTimeout => write!(f, "idle_timeout"),
            FinishReason::DeviceError => write!(f, "device_error"),
            FinishReason::QuitPattern => write!(f, "quit_pattern"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Capturing,
    Finished(FinishReason),
}

/// Counters owned by the controller
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub bytes_read: u64,
    /// Bytes written out as lines, terminators included
    pub bytes_emitted: u64,
    pub lines_emitted: u64,
    /// Time spent in the capturing phase
    pub elapsed: Duration,
    /// Time since the last non-empty chunk
    pub since_last_byte: Duration,
}

/// Result of a finished session
#[derive(Debug)]
pub struct SessionSummary {
    pub reason: FinishReason,
    pub bytes_read: u64,
    pub lines_emitted: u64,
    pub capture_time: Duration,
    /// Partial-line bytes dropped on device error
    pub discarded_bytes: usize,
    pub sink_errors: usize,
    pub device_error: Option<DeviceError>,
}

impl SessionSummary {
    /// Print summary statistics to stderr
    pub fn print(&self, config: &CaptureConfig) {
        eprintln!("\n{}", "=".repeat(70).dimmed());
        eprintln!("{}", "--- Capture Summary ---".cyan().bold());
        eprintln!("Finished: {}", self.reason.to_string().white().bold());
        eprintln!("Lines: {}", self.lines_emitted);
        eprintln!("Bytes: {}", self.bytes_read);
        eprintln!("Capture time: {:.3}s", self.capture_time.as_secs_f64());
        if self.discarded_bytes > 0 {
            eprintln!(
                "Discarded partial line: {} bytes",
                self.discarded_bytes.to_string().yellow()
            );
        }
        if let Some(ref path) = config.capture_file {
            if self.sink_errors == 0 {
                eprintln!("Capture saved to: {}", path.display().to_string().white());
            } else {
                eprintln!(
                    "Capture file: {}",
                    "incomplete (write failed)".red().to_string()
                );
            }
        }
        eprintln!("{}", "=".repeat(70).dimmed());
    }
}

/// Summary plus the primary output handed back by the sink
#[derive(Debug)]
pub struct SessionOutcome<W> {
    pub summary: SessionSummary,
    pub output: W,
}

/// Owns session state and enforces termination policy
pub struct SessionController<C: Clock> {
    config: CaptureConfig,
    clock: C,
    cancel: CancelToken,
    phase: SessionPhase,
    state: SessionState,
}

impl<C: Clock> SessionController<C> {
    pub fn new(config: CaptureConfig, clock: C, cancel: CancelToken) -> Self {
        Self {
            config,
            clock,
            cancel,
            phase: SessionPhase::Starting,
            state: SessionState::default(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Open the source and capture until a termination condition fires
    ///
    /// The capture file is only opened once the source is acquired, so a
    /// failed open leaves a previous capture intact. The source is dropped
    /// (closing the device) after the final flush.
    pub fn run<S, W, F>(
        &mut self,
        open: F,
        mut sink: SinkWriter<W>,
    ) -> Result<SessionOutcome<W>, CaptureError>
    where
        S: ChunkSource,
        W: Write,
        F: FnOnce() -> Result<S, DeviceError>,
    {
        let mut source = match open() {
            Ok(source) => source,
            Err(err) => {
                self.phase = SessionPhase::Finished(FinishReason::DeviceError);
                return Err(err.into());
            }
        };

        if let Some(ref path) = self.config.capture_file {
            sink = sink.with_capture_file(path, self.config.append);
        }

        let start = self.clock.monotonic();
        self.phase = SessionPhase::Capturing;
        log::info!("capturing from {}", source.name());

        let mut assembler = LineAssembler::new(self.config.strip_cr);
        let mut annotator = TimestampAnnotator::new(self.config.timestamp_mode, start);
        let mut last_data = start;
        let mut device_error = None;

        let reason = loop {
            if self.cancel.is_cancelled() {
                break FinishReason::Cancelled;
            }

            let read = source.read_chunk();
            let now = self.clock.monotonic();
            let mut quit = false;

            match read {
                Ok(chunk) => {
                    if !chunk.is_empty() {
                        self.state.bytes_read += chunk.len() as u64;
                        last_data = now;
                    }
                    for line in assembler.push(&chunk) {
                        quit |= self.emit(line, now, &mut annotator, &mut sink)?;
                    }
                    if let Some(ref pattern) = self.config.quit_pattern {
                        quit |= assembler.pending_contains(pattern);
                    }
                }
                Err(err) => {
                    log::error!("{}", err);
                    device_error = Some(err);
                }
            }

            self.state.elapsed = now.saturating_sub(start);
            self.state.since_last_byte = now.saturating_sub(last_data);

            if let Some(reason) = self.check_termination(device_error.is_some(), quit) {
                break reason;
            }
        };

        let mut discarded_bytes = 0;
        if reason == FinishReason::DeviceError {
            discarded_bytes = assembler.discard();
            if discarded_bytes > 0 {
                log::warn!(
                    "dropping {} bytes of unterminated output after device error",
                    discarded_bytes
                );
            }
        } else if let Some(line) = assembler.finish() {
            let now = self.clock.monotonic();
            self.emit(line, now, &mut annotator, &mut sink)?;
        }

        debug_assert_eq!(
            self.state.bytes_emitted + discarded_bytes as u64,
            self.state.bytes_read
        );

        drop(source);
        self.phase = SessionPhase::Finished(reason);
        log::info!("capture finished: {}", reason);

        let sink_errors = sink.sink_errors();
        let output = sink.close().map_err(CaptureError::Output)?;

        Ok(SessionOutcome {
            summary: SessionSummary {
                reason,
                bytes_read: self.state.bytes_read,
                lines_emitted: self.state.lines_emitted,
                capture_time: self.state.elapsed,
                discarded_bytes,
                sink_errors,
                device_error,
            },
            output,
        })
    }

    /// Stamp and write one line; returns whether it matched the quit pattern
    fn emit<W: Write>(
        &mut self,
        line: Line,
        now: Duration,
        annotator: &mut TimestampAnnotator,
        sink: &mut SinkWriter<W>,
    ) -> Result<bool, CaptureError> {
        let quit = self
            .config
            .quit_pattern
            .as_deref()
            .is_some_and(|pattern| line.text().contains(pattern));

        let raw_len = line.raw_len();
        let stamped = annotator.annotate(line, now, self.clock.wall());
        sink.write_line(&stamped).map_err(CaptureError::Output)?;
        self.state.lines_emitted += 1;
        self.state.bytes_emitted += raw_len as u64;

        Ok(quit)
    }

    fn check_termination(&self, device_failed: bool, quit: bool) -> Option<FinishReason> {
        if self.cancel.is_cancelled() {
            return Some(FinishReason::Cancelled);
        }
        if let Some(limit) = self.config.duration_limit {
            if self.state.elapsed >= limit {
                return Some(FinishReason::DurationExceeded);
            }
        }
        if let Some(quiet) = self.config.quiet_timeout {
            if self.state.since_last_byte >= quiet {
                return Some(FinishReason::IdleTimeout);
            }
        }
        if device_failed {
            return Some(FinishReason::DeviceError);
        }
        if quit {
            return Some(FinishReason::QuitPattern);
        }
        None
    }
}
