use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use log::info;

use super::LoggerError;

/// Timestamp format of logger rows and error lines
pub const LOGGER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Daily data CSV and error log under a base directory
///
/// ```text
/// {base}/logs/{%Y-%m-%d}_{name}.csv
/// {base}/errorlogs/{%Y-%m-%d}_data_errorlog.csv
/// ```
///
/// The data file is kept open for the current day and replaced when a record
/// arrives with a later date. The header row is written whenever a data file
/// is opened empty.
pub struct DailyFiles {
    base: PathBuf,
    name: String,
    header: Vec<String>,
    current: Option<(NaiveDate, csv::Writer<File>)>,
}

impl DailyFiles {
    /// Files for log `name` under `base`
    pub fn new(base: impl Into<PathBuf>, name: impl Into<String>, header: Vec<String>) -> Self {
        Self {
            base: base.into(),
            name: name.into(),
            header,
            current: None,
        }
    }

    /// Data CSV for a given day
    pub fn log_path(&self, date: NaiveDate) -> PathBuf {
        self.base
            .join("logs")
            .join(format!("{}_{}.csv", date.format("%Y-%m-%d"), self.name))
    }

    /// Error log for a given day
    pub fn error_path(&self, date: NaiveDate) -> PathBuf {
        self.base
            .join("errorlogs")
            .join(format!("{}_data_errorlog.csv", date.format("%Y-%m-%d")))
    }

    /// Day of the open data file, if any
    pub fn current_date(&self) -> Option<NaiveDate> {
        self.current.as_ref().map(|(date, _)| *date)
    }

    /// Append one data row; returns true when a new day's file was started
    pub fn append_record(
        &mut self,
        at: DateTime<Local>,
        fields: &[String],
    ) -> Result<bool, LoggerError> {
        let date = at.date_naive();
        let mut rolled = false;
        if self.current_date() != Some(date) {
            if let Some(open) = self.current_date() {
                info!("Data collection for {} complete! New file created.", open);
                rolled = true;
            }
            let writer = self.open_day(date)?;
            self.current = Some((date, writer));
        }

        if let Some((_, writer)) = self.current.as_mut() {
            let stamp = at.format(LOGGER_TIMESTAMP_FORMAT).to_string();
            let row = std::iter::once(stamp.as_str()).chain(fields.iter().map(String::as_str));
            writer.write_record(row)?;
            writer.flush()?;
        }
        Ok(rolled)
    }

    /// Append `{ts}, Error: Data corrupted ({line}).` to the day's error log
    pub fn append_error(&self, at: DateTime<Local>, line: &str) -> Result<(), LoggerError> {
        let path = self.error_path(at.date_naive());
        ensure_parent(&path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(
            file,
            "{}, Error: Data corrupted ({}).",
            at.format(LOGGER_TIMESTAMP_FORMAT),
            line
        )?;
        Ok(())
    }

    fn open_day(&self, date: NaiveDate) -> Result<csv::Writer<File>, LoggerError> {
        let path = self.log_path(date);
        ensure_parent(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        if empty && !self.header.is_empty() {
            writer.write_record(&self.header)?;
            writer.flush()?;
        }
        info!("Data logging for {} started in {}", date, path.display());
        Ok(writer)
    }
}

fn ensure_parent(path: &Path) -> Result<(), LoggerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
