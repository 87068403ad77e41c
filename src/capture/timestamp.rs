//! Timestamp Annotator
//!
//! Stamps each assembled line with the moment assembly completed. Elapsed
//! modes use the monotonic clock and never go backwards. Wall-clock mode is
//! cosmetic and follows system clock adjustments.

use crate::capture::assembler::Line;
use crate::config::TimestampMode;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Time source for a session
pub trait Clock {
    /// Monotonic time since an arbitrary fixed origin
    fn monotonic(&self) -> Duration;

    /// Local wall-clock time
    fn wall(&self) -> DateTime<Local>;
}

/// Clock backed by [`Instant`] and the system time
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Timestamp attached to a line
#[derive(Debug, Clone, PartialEq)]
pub enum Stamp {
    None,
    Elapsed(Duration),
    ElapsedWithDelta { elapsed: Duration, delta: Duration },
    WallClock(DateTime<Local>),
}

impl Stamp {
    /// Elapsed time since session start, for the monotonic modes
    #[cfg(test)]
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            Stamp::Elapsed(elapsed) | Stamp::ElapsedWithDelta { elapsed, .. } => Some(*elapsed),
            Stamp::None | Stamp::WallClock(_) => None,
        }
    }

    /// Render the text inside the brackets; `None` when no prefix is printed
    pub fn render(&self, wall_clock_format: &str) -> Option<String> {
        match self {
            Stamp::None => None,
            Stamp::Elapsed(elapsed) => Some(format!("{:.6}", elapsed.as_secs_f64())),
            Stamp::ElapsedWithDelta { elapsed, delta } => Some(format!(
                "{:.6} +{:.6}",
                elapsed.as_secs_f64(),
                delta.as_secs_f64()
            )),
            Stamp::WallClock(time) => Some(time.format(wall_clock_format).to_string()),
        }
    }
}

/// A line with its timestamp, immutable once built
#[derive(Debug, Clone)]
pub struct StampedLine {
    pub line: Line,
    pub stamp: Stamp,
}

impl StampedLine {
    /// One newline-terminated output record: `[<timestamp>] <content>`
    pub fn record(&self, wall_clock_format: &str) -> String {
        match self.stamp.render(wall_clock_format) {
            Some(stamp) => format!("[{}] {}\n", stamp, self.line.text()),
            None => format!("{}\n", self.line.text()),
        }
    }
}

/// Attaches timestamps to lines in arrival order
#[derive(Debug)]
pub struct TimestampAnnotator {
    mode: TimestampMode,
    start: Duration,
    last: Duration,
}

impl TimestampAnnotator {
    /// `start` is the monotonic time the session began capturing
    pub fn new(mode: TimestampMode, start: Duration) -> Self {
        Self {
            mode,
            start,
            last: Duration::ZERO,
        }
    }

    /// Stamp a line completed at `now` (monotonic) / `wall`
    pub fn annotate(&mut self, line: Line, now: Duration, wall: DateTime<Local>) -> StampedLine {
        // Clamp so a line never appears earlier than the one before it
        let elapsed = now.saturating_sub(self.start).max(self.last);
        let delta = elapsed - self.last;
        self.last = elapsed;

        let stamp = match self.mode {
            TimestampMode::None => Stamp::None,
            TimestampMode::Elapsed => Stamp::Elapsed(elapsed),
            TimestampMode::ElapsedWithDelta => Stamp::ElapsedWithDelta { elapsed, delta },
            TimestampMode::WallClock => Stamp::WallClock(wall),
        };

        StampedLine { line, stamp }
    }
}
