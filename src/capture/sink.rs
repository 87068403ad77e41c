//! Sink Writer
//!
//! Writes each record to the primary output and, optionally, mirrors it to a
//! capture file. Both are flushed after every record. A capture file failure
//! is reported once and disables the mirror; the primary output carries on.

use crate::capture::timestamp::StampedLine;
use crate::error::SinkError;
use colored::Colorize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

struct Mirror {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Ordered writer for stamped lines
pub struct SinkWriter<W: Write> {
    primary: W,
    mirror: Option<Mirror>,
    wall_clock_format: String,
    sink_errors: usize,
    quiet: bool,
}

impl<W: Write> SinkWriter<W> {
    /// Writer with no capture file
    pub fn new(primary: W, wall_clock_format: &str) -> Self {
        Self {
            primary,
            mirror: None,
            wall_clock_format: wall_clock_format.to_string(),
            sink_errors: 0,
            quiet: false,
        }
    }

    /// Suppress the stderr banner on capture file failure
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Mirror records to `path`; an open failure is reported, not returned
    pub fn with_capture_file(mut self, path: &Path, append: bool) -> Self {
        let opened = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path);

        match opened {
            Ok(file) => {
                log::info!("mirroring capture to {}", path.display());
                self.mirror = Some(Mirror {
                    path: path.to_path_buf(),
                    writer: BufWriter::new(file),
                });
            }
            Err(source) => self.report(SinkError::Open {
                path: path.to_path_buf(),
                source,
            }),
        }
        self
    }

    /// Write one record to every active sink
    ///
    /// Only a primary output failure is returned.
    pub fn write_line(&mut self, line: &StampedLine) -> io::Result<()> {
        let record = line.record(&self.wall_clock_format);

        self.primary.write_all(record.as_bytes())?;
        self.primary.flush()?;

        if let Some(ref mut mirror) = self.mirror {
            let written = mirror
                .writer
                .write_all(record.as_bytes())
                .and_then(|()| mirror.writer.flush());
            if let Err(source) = written {
                let path = mirror.path.clone();
                self.mirror = None;
                self.report(SinkError::Write { path, source });
            }
        }

        Ok(())
    }

    /// Number of capture file failures reported (at most one)
    pub fn sink_errors(&self) -> usize {
        self.sink_errors
    }

    /// Whether records are still being mirrored
    #[cfg(test)]
    pub fn is_mirroring(&self) -> bool {
        self.mirror.is_some()
    }

    /// Flush and close every sink, handing back the primary output
    pub fn close(mut self) -> io::Result<W> {
        if let Some(mut mirror) = self.mirror.take() {
            if let Err(source) = mirror.writer.flush() {
                self.report(SinkError::Write {
                    path: mirror.path,
                    source,
                });
            }
        }
        self.primary.flush()?;
        Ok(self.primary)
    }

    fn report(&mut self, err: SinkError) {
        self.sink_errors += 1;
        log::warn!("{}; continuing without capture file", err);
        if !self.quiet {
            eprintln!("{} {}", "[WARNING]".yellow().bold(), err);
        }
    }
}
