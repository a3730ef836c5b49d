//! # Logger Module
//!
//! Auxiliary data logging: lines printed by an Arduino board (readings of
//! the reference flow meters) are validated, timestamped, extended with the
//! current MFC flows and appended to a daily CSV.
//!
//! ```text
//! Arduino ──lines──▶ validate_record ──ok──▶ logs/{date}_{name}.csv
//!                          │
//!                          └──malformed──▶ errorlogs/{date}_data_errorlog.csv
//! ```
//!
//! MFC flows come from a [`FlowProbe`]: either the pair itself (logger-only
//! mode) or a [`ChannelProbe`] fed by the sequencer, so one thread owns the
//! MFC handles at any time.

mod error;
mod files;
mod source;


use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

pub use error::LoggerError;
pub use files::{DailyFiles, LOGGER_TIMESTAMP_FORMAT};
pub use source::{
    find_arduino, open_serial, ChannelProbe, FlowProbe, LineRead, LineReader, LineSource,
    SerialLineSource,
};

use crate::sequencer::{CancellationToken, Clock};

/// Baud rate of the Arduino logger board
pub const ARDUINO_BAUD_RATE: u32 = 9600;

/// Parse a logger line into its numeric fields
///
/// Returns `None` unless the line has exactly `expected_fields`
/// comma-separated fields and every field parses as a number.
pub fn validate_record(line: &str, expected_fields: usize) -> Option<Vec<f64>> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != expected_fields {
        return None;
    }
    fields.iter().map(|f| f.trim().parse::<f64>().ok()).collect()
}

/// Logger settings
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Wait after each stored record
    pub interval: Duration,
    /// Log name used in the daily file name
    pub name: String,
    /// Header row of the daily CSV
    pub header: Vec<String>,
    /// Number of fields in a valid Arduino line
    pub expected_fields: usize,
    /// Directory holding `logs/` and `errorlogs/`
    pub base_dir: PathBuf,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            name: "flow".to_string(),
            header: [
                "Date",
                "Brooks 100SCCM [mLn/min]",
                "Brooks 2.5SLM [mLn/min]",
                "Bronkhorst 100SCCM [mLn/min]",
                "Bronkhorst 2.5SLM [mLn/min]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            expected_fields: 2,
            base_dir: PathBuf::from("."),
        }
    }
}

/// Counters reported when the logger stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggerStats {
    /// Records written to the daily CSV
    pub records: usize,
    /// Lines sent to the error log
    pub rejected: usize,
    /// Day changes that started a new file
    pub rollovers: usize,
}

/// What one poll did
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A valid line was stored
    Stored(Vec<f64>),
    /// A malformed line was sent to the error log
    Rejected(String),
    /// No line before the read timeout
    Idle,
    /// The line source closed
    Closed,
}

/// Polling loop of the data logger
pub struct Logger<C: Clock> {
    config: LoggerConfig,
    files: DailyFiles,
    source: Box<dyn LineSource + Send>,
    probe: Option<Box<dyn FlowProbe + Send>>,
    clock: C,
    stats: LoggerStats,
}

impl<C: Clock> Logger<C> {
    /// Create a logger reading lines from `source`
    pub fn new(
        config: LoggerConfig,
        source: Box<dyn LineSource + Send>,
        clock: C,
    ) -> Result<Self, LoggerError> {
        if config.interval.is_zero() {
            return Err(LoggerError::InvalidInterval);
        }
        let files = DailyFiles::new(&config.base_dir, &config.name, config.header.clone());
        Ok(Self {
            config,
            files,
            source,
            probe: None,
            clock,
            stats: LoggerStats::default(),
        })
    }

    /// Append MFC flows from `probe` to every record
    pub fn with_probe(mut self, probe: Box<dyn FlowProbe + Send>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Log files in use
    pub fn files(&self) -> &DailyFiles {
        &self.files
    }

    /// Counters so far
    pub fn stats(&self) -> LoggerStats {
        self.stats
    }

    /// Read and handle one line
    ///
    /// MFC flows are read before the line, so they are at least as recent as
    /// the Arduino reading they are stored with.
    pub fn poll_once(&mut self) -> Result<PollOutcome, LoggerError> {
        let flows = match self.probe.as_mut() {
            Some(probe) => Some(probe.flows()?),
            None => None,
        };

        let line = match self.source.read_line()? {
            LineRead::Line(line) => line,
            LineRead::Idle => return Ok(PollOutcome::Idle),
            LineRead::Closed => return Ok(PollOutcome::Closed),
        };
        let now = self.clock.now();

        let Some(values) = validate_record(&line, self.config.expected_fields) else {
            debug!("Rejected logger line: {:?}", line);
            self.files.append_error(now, &line)?;
            self.stats.rejected += 1;
            return Ok(PollOutcome::Rejected(line));
        };

        let mut fields: Vec<String> = line.split(',').map(str::to_string).collect();
        match flows {
            Some(Some([span, dilution])) => {
                fields.push(span.to_string());
                fields.push(dilution.to_string());
            }
            Some(None) => {
                fields.push(String::new());
                fields.push(String::new());
            }
            None => {}
        }

        if self.files.append_record(now, &fields)? {
            self.stats.rollovers += 1;
        }
        self.stats.records += 1;
        Ok(PollOutcome::Stored(values))
    }

    /// Poll until cancelled or the source closes
    ///
    /// Sleeps for the configured interval after each stored record; malformed
    /// lines are followed by an immediate re-read.
    pub fn run(&mut self, token: &CancellationToken) -> Result<LoggerStats, LoggerError> {
        info!(
            "Data logging started, storing every {:?} in {}",
            self.config.interval,
            self.config.base_dir.display()
        );
        while !token.is_cancelled() {
            match self.poll_once()? {
                PollOutcome::Stored(_) => self.clock.sleep(self.config.interval),
                PollOutcome::Rejected(_) | PollOutcome::Idle => {}
                PollOutcome::Closed => {
                    warn!("Logger line source closed");
                    break;
                }
            }
        }
        info!(
            "Data logging stopped: {} record(s), {} rejected",
            self.stats.records, self.stats.rejected
        );
        Ok(self.stats)
    }
}

/// Logger running on a named background thread
///
/// Dropping the handle cancels the logger and waits for the thread.
pub struct LoggerHandle {
    token: CancellationToken,
    handle: Option<JoinHandle<Result<LoggerStats, String>>>,
    first_error: Arc<Mutex<Option<String>>>,
}

impl LoggerHandle {
    /// Start `logger` on a thread named `mfc-logger`
    pub fn spawn<C>(mut logger: Logger<C>, token: CancellationToken) -> Result<Self, LoggerError>
    where
        C: Clock + Send + 'static,
    {
        let first_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let first_error_clone = Arc::clone(&first_error);
        let thread_token = token.clone();

        let handle = thread::Builder::new()
            .name("mfc-logger".to_string())
            .spawn(move || {
                logger.run(&thread_token).map_err(|e| {
                    let err_str = e.to_string();
                    warn!("Data logger stopped: {}", err_str);
                    *first_error_clone
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err_str.clone());
                    err_str
                })
            })
            .map_err(|e| LoggerError::BackgroundError(format!("Failed to spawn logger thread: {}", e)))?;

        Ok(Self {
            token,
            handle: Some(handle),
            first_error,
        })
    }

    /// Error that stopped the logger thread, if any
    pub fn check_error(&self) -> Result<(), LoggerError> {
        let guard = self
            .first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            Some(err) => Err(LoggerError::BackgroundError(err.clone())),
            None => Ok(()),
        }
    }

    /// True while the logger thread is running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the logger and wait for it to finish
    pub fn stop(mut self) -> Result<LoggerStats, LoggerError> {
        self.token.cancel();
        self.join_inner()
    }

    /// Wait for the logger to finish on its own (source closed or token cancelled)
    pub fn join(mut self) -> Result<LoggerStats, LoggerError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<LoggerStats, LoggerError> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| LoggerError::BackgroundError("logger already joined".to_string()))?;
        match handle.join() {
            Ok(Ok(stats)) => Ok(stats),
            Ok(Err(err_str)) => Err(LoggerError::BackgroundError(err_str)),
            Err(_panic) => Err(LoggerError::ThreadPanicked),
        }
    }
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.token.cancel();
            let _ = handle.join();
        }
    }
}
