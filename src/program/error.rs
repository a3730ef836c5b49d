/// Errors that can occur while reading programme workbooks
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    /// I/O error while opening the workbook
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The workbook is not a readable ZIP container
    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Error parsing one of the workbook's XML parts
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// UTF-8 encoding error in an XML attribute
    #[error("UTF-8 encoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// A required workbook part is missing
    #[error("Workbook is missing part: {0}")]
    MissingPart(String),

    /// The workbook structure is not understood
    #[error("Invalid workbook: {0}")]
    InvalidWorkbook(String),

    /// A named column is not present in the header row
    #[error("Column {0:?} not found in header row")]
    MissingColumn(String),

    /// No integer-numbered rows follow the header
    #[error("No data rows found below the header row")]
    NoDataRegion,

    /// A selected cell does not hold a number
    #[error("Row {row}, column {column:?}: expected a number, found {found:?}")]
    InvalidValue {
        /// 1-based sheet row
        row: usize,
        /// Column header
        column: String,
        /// Cell content as text
        found: String,
    },

    /// The zero programme needs a row at 90 % dilution
    #[error("No row with {0:?} equal to 90 found")]
    NoNinetyPercentRow(String),

    /// Unknown species name
    #[error("Unknown species {0:?} (expected SO2 or NOx)")]
    UnknownSpecies(String),

    /// The programme name is not one of the sheet's options
    #[error("Unknown programme {name:?}; available: {available}")]
    UnknownProgramme {
        /// Requested name
        name: String,
        /// Comma-separated list of options
        available: String,
    },

    /// Minutes per step must be positive
    #[error("Step duration must be positive, got {0} minutes")]
    InvalidStepDuration(f64),
}
