use crate::instrument::InstrumentError;
use crate::mfc::MfcError;

/// Errors that stop the data logger
///
/// Malformed Arduino lines are not errors; they go to the daily error log.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// I/O error on a log file or the line source
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error writing a CSV record
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error finding or opening the Arduino port
    #[error("Instrument error: {0}")]
    InstrumentError(#[from] InstrumentError),

    /// Error reading MFC flows
    #[error("MFC error: {0}")]
    MfcError(#[from] MfcError),

    /// Poll interval must be positive
    #[error("Logger interval must be positive")]
    InvalidInterval,

    /// Background logger thread failed
    #[error("Background logger error: {0}")]
    BackgroundError(String),

    /// Background logger thread panicked
    #[error("Background logger thread panicked")]
    ThreadPanicked,
}
