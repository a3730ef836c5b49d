/// Errors that can occur while talking to an instrument
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// I/O error on the underlying transport
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error opening or configuring a serial port
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    /// No matching serial ports were found
    #[error("No connected {0} found. Please check connections.")]
    NoPorts(String),

    /// DDE number is not in the parameter table
    #[error("Unknown DDE parameter: {0}")]
    UnknownParameter(u16),

    /// Value does not match the parameter's wire type
    #[error("Type mismatch for DDE {dde}: expected {expected}")]
    TypeMismatch {
        /// Parameter that was accessed
        dde: u16,
        /// Expected wire type
        expected: &'static str,
    },

    /// Malformed frame received from the instrument
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Instrument answered with a non-zero status code
    #[error("Instrument status error {status:#04x} at byte {index}")]
    Status {
        /// Propar status code
        status: u8,
        /// Index of the offending byte in the request
        index: u8,
    },

    /// Instrument did not answer in time
    #[error("Timed out waiting for a reply from {0}")]
    Timeout(String),
}
