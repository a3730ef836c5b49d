use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::RecordError;
use crate::program::ProgramStep;

/// Name of the per-run comment file
pub const COMMENT_FILE_NAME: &str = "comments_description.txt";

/// Operator notes and run information for one run
///
/// Every write opens, appends and closes the file, so notes survive a crash
/// and the file can be written from the console thread.
#[derive(Debug, Clone)]
pub struct CommentFile {
    path: PathBuf,
}

impl CommentFile {
    /// Open (creating if needed) a comment file and append the title line
    pub fn create<P: AsRef<Path>>(path: P, title: &str) -> Result<Self, RecordError> {
        let file = Self {
            path: path.as_ref().to_path_buf(),
        };
        file.append_line(title)?;
        Ok(file)
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line of text
    pub fn append_line(&self, text: &str) -> Result<(), RecordError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", text)?;
        Ok(())
    }

    /// Append an operator note stamped `%d/%m-%Y %H:%M:%S`
    pub fn append_note(&self, at: DateTime<Local>, text: &str) -> Result<(), RecordError> {
        self.append_line(&format!("{} {}", at.format("%d/%m-%Y %H:%M:%S"), text))
    }

    /// Current contents of the file
    pub fn contents(&self) -> Result<String, RecordError> {
        Ok(fs::read_to_string(&self.path)?)
    }
}

/// Fixed-width table of the setpoints written during a run
#[derive(Debug, Clone)]
pub struct SettingsTable {
    lines: Vec<String>,
}

impl Default for SettingsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsTable {
    /// Table with only the header line
    pub fn new() -> Self {
        let header = format!(
            "{:<16}{:<16}{:<20}{:<12}{:<18}{:<20}",
            "Tidspunkt",
            "Fortynding [%]",
            "Fortynding [L/min]",
            "Span [%]",
            "Span [mL/min]",
            "Koncentration [ppb]"
        );
        Self {
            lines: vec![header],
        }
    }

    /// Add the setpoints of a step written at `at`
    ///
    /// `dilution_flow` and `span_flow` are the absolute flows actually written.
    pub fn push(&mut self, at: DateTime<Local>, step: &ProgramStep, dilution_flow: f64, span_flow: f64) {
        self.lines.push(format!(
            "{:<16}{:<16}{:<20.2}{:<12}{:<18.2}{:<20.2}",
            at.format("%d/%m %H:%M").to_string(),
            step.dilution_pct,
            dilution_flow,
            step.span_pct,
            span_flow,
            step.concentration_ppb
        ));
    }

    /// Number of step rows (the header is not counted)
    pub fn len(&self) -> usize {
        self.lines.len() - 1
    }

    /// True when no step has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The table as newline-separated text
    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}
