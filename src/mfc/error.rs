use crate::instrument::InstrumentError;

/// Errors that can occur while handling MFCs
#[derive(Debug, thiserror::Error)]
pub enum MfcError {
    /// Communication with the instrument failed
    #[error("Instrument error: {0}")]
    InstrumentError(#[from] InstrumentError),

    /// Blending needs exactly one span and one dilution MFC
    #[error("Incompatible number of MFCs connected ({0}). Only 2 MFCs (span + dilution) are supported.")]
    WrongCount(usize),

    /// The instrument reported an unusable capacity
    #[error("Invalid capacity {capacity} reported by {location}")]
    InvalidCapacity {
        /// Where the instrument is attached
        location: String,
        /// Reported capacity
        capacity: f64,
    },

    /// Idle fraction outside 0..=1
    #[error("Idle fraction must be within 0..=1, got {0}")]
    InvalidIdleFraction(f64),
}
