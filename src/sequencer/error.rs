use crate::mfc::MfcError;
use crate::record::RecordError;

/// Errors that can end a run early
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// Writing setpoints or reading flows failed
    #[error("MFC error: {0}")]
    MfcError(#[from] MfcError),

    /// Saving the run records failed
    #[error("Record error: {0}")]
    RecordError(#[from] RecordError),

    /// Poll interval must be positive
    #[error("Poll interval must be positive")]
    InvalidPollInterval,
}
