/// Errors that can occur while persisting run records
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error writing the flow log CSV
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error writing the run summary
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error rendering the flow plot
    #[error("Plot error: {0}")]
    PlotError(String),
}
