//! # Record Module
//!
//! Everything a run leaves behind on disk. One folder per run, named after
//! the plan's save name:
//!
//! ```text
//! 2024_03_05_09_30_SO2_liniaritet/
//! ├── comments_description.txt   operator notes + settings table
//! ├── flow_plot_05_03_09_30.csv  one row per flow sample
//! ├── flow_plot_05_03_09_30.svg  span/dilution flow against time
//! └── run.json                   run summary
//! ```

mod comments;
mod error;
mod plot;


use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use comments::{CommentFile, SettingsTable, COMMENT_FILE_NAME};
pub use error::RecordError;
pub use plot::{render_svg, PlotAxes};

use crate::program::{Order, RunPlan};
use crate::sequencer::RunOutcome;

/// Timestamp format of flow log rows
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One flow reading of both channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// When the reading was taken
    pub timestamp: DateTime<Local>,
    /// Span flow in mL/min
    pub span_ml_min: f64,
    /// Dilution flow in L/min
    pub dilution_l_min: f64,
}

/// Flow samples of one run, in acquisition order
#[derive(Debug, Clone)]
pub struct RunLog {
    span_label: String,
    dilution_label: String,
    samples: Vec<Sample>,
}

impl RunLog {
    /// Empty log with the CSV column labels of both channels
    pub fn new(span_label: impl Into<String>, dilution_label: impl Into<String>) -> Self {
        Self {
            span_label: span_label.into(),
            dilution_label: dilution_label.into(),
            samples: Vec::new(),
        }
    }

    /// Append a sample
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// All samples so far
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before the first sample
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// CSV header row
    pub fn header(&self) -> [&str; 3] {
        ["Datetime", self.span_label.as_str(), self.dilution_label.as_str()]
    }

    /// Write the samples as CSV, replacing any existing file
    pub fn write_csv(&self, path: &Path) -> Result<(), RecordError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.header())?;
        for sample in &self.samples {
            writer.write_record([
                sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                sample.span_ml_min.to_string(),
                sample.dilution_l_min.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Output folder of one run
#[derive(Debug, Clone)]
pub struct RunFolder {
    root: PathBuf,
    stem: String,
}

impl RunFolder {
    /// Create `base/{save_name}` for a plan
    pub fn create(base: &Path, plan: &RunPlan) -> Result<Self, RecordError> {
        let root = base.join(plan.save_name());
        fs::create_dir_all(&root)?;
        info!("Run output folder: {}", root.display());
        Ok(Self {
            root,
            stem: format!("flow_plot_{}", plan.start.format("%d_%m_%H_%M")),
        })
    }

    /// Folder path
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Flow log CSV
    pub fn csv_path(&self) -> PathBuf {
        self.root.join(format!("{}.csv", self.stem))
    }

    /// Flow plot SVG
    pub fn plot_path(&self) -> PathBuf {
        self.root.join(format!("{}.svg", self.stem))
    }

    /// Operator comment file
    pub fn comment_path(&self) -> PathBuf {
        self.root.join(COMMENT_FILE_NAME)
    }

    /// Run summary JSON
    pub fn summary_path(&self) -> PathBuf {
        self.root.join("run.json")
    }

    /// Write the flow log and its plot
    pub fn persist(&self, log: &RunLog, axes: &PlotAxes) -> Result<(), RecordError> {
        log.write_csv(&self.csv_path())?;
        render_svg(&self.plot_path(), log, axes)?;
        info!(
            "Saved {} samples to {}",
            log.len(),
            self.csv_path().display()
        );
        Ok(())
    }
}

/// Machine-readable summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run id
    pub run_id: Uuid,
    /// Programme display name
    pub programme: String,
    /// Gas species
    pub species: String,
    /// Step ordering
    pub order: Order,
    /// Scheduled start
    pub scheduled_start: DateTime<Local>,
    /// When the run ended
    pub finished: DateTime<Local>,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Planned steps, bracketing steps included
    pub steps_planned: usize,
    /// Flow samples recorded
    pub samples: usize,
    /// Name and version of the software that ran the programme
    pub software: String,
}

impl RunSummary {
    /// Summary for a plan that ended with `outcome`
    pub fn new(
        plan: &RunPlan,
        outcome: RunOutcome,
        samples: usize,
        finished: DateTime<Local>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            programme: plan.programme.display_name(),
            species: plan.species.to_string(),
            order: plan.order,
            scheduled_start: plan.start,
            finished,
            outcome,
            steps_planned: plan.len(),
            samples,
            software: format!("mfcblend v{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Write the summary as pretty-printed JSON
    pub fn write(&self, path: &Path) -> Result<(), RecordError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
