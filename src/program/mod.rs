//! # Program Module
//!
//! Calibration programmes are kept in an Excel workbook. Each row of the
//! first sheet is one blending step; the programme columns on the right mark
//! the rows that belong to a programme by filling the cell with a colour.
//!
//! ## Pipeline
//!
//! 1. [`xlsx`] reads the first worksheet (values and fill colours).
//! 2. [`ProgramSheet`] finds the header, the data region and the colored rows,
//!    and turns them into [`ProgramStep`]s using a species' [`SpeciesColumns`].
//! 3. [`RunPlan`] orders the steps (optionally shuffled), adds the bracketing
//!    steps and derives the save name and expected finish time.

mod error;
mod loader;
mod plan;
pub mod xlsx;

#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::ProgramError;
pub use loader::{LoadedProgramme, LoaderConfig, ProgramSheet, SHIFT_COLUMN};
pub use plan::{bracketing_step, Order, PlanOptions, PlannedStep, RunPlan, StepKind};

/// One blending step as read from a spreadsheet row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgramStep {
    /// Dilution setpoint in % of the dilution MFC's capacity
    pub dilution_pct: f64,
    /// Dilution flow listed in the sheet (L/min)
    pub dilution_flow: f64,
    /// Span setpoint in % of the span MFC's capacity
    pub span_pct: f64,
    /// Span flow listed in the sheet (mL/min)
    pub span_flow: f64,
    /// Resulting concentration (ppb)
    pub concentration_ppb: f64,
}

impl ProgramStep {
    /// Step with both channels closed
    pub const ZERO: ProgramStep = ProgramStep {
        dilution_pct: 0.0,
        dilution_flow: 0.0,
        span_pct: 0.0,
        span_flow: 0.0,
        concentration_ppb: 0.0,
    };

    /// 90 % dilution, no span gas
    pub fn flush(dilution_flow: f64) -> Self {
        Self {
            dilution_pct: 90.0,
            dilution_flow,
            ..Self::ZERO
        }
    }
}

/// Calibration gas species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    /// Sulphur dioxide
    #[serde(rename = "SO2")]
    So2,
    /// Nitrogen oxides
    #[serde(rename = "NOx")]
    Nox,
}

impl Species {
    /// Short name used in file names and titles
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::So2 => "SO2",
            Species::Nox => "NOx",
        }
    }

    /// Sheet columns holding this species' setpoints
    pub fn default_columns(&self) -> SpeciesColumns {
        match self {
            Species::So2 => SpeciesColumns::new("Fd %", "ml/min", "Fso2", "ml/min ", "SO2 ppb"),
            Species::Nox => SpeciesColumns::new("Fd %", "ml/min", "Fno", "ml/min ", "Nox PPB"),
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Species {
    type Err = ProgramError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "so2" => Ok(Species::So2),
            "nox" => Ok(Species::Nox),
            _ => Err(ProgramError::UnknownSpecies(s.to_string())),
        }
    }
}

/// Header names of the setpoint columns for one species
///
/// Names must match the header cells exactly, including trailing spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesColumns {
    /// Dilution setpoint (%)
    pub dilution_pct: String,
    /// Dilution flow
    pub dilution_flow: String,
    /// Span setpoint (%)
    pub span_pct: String,
    /// Span flow
    pub span_flow: String,
    /// Concentration
    pub concentration: String,
}

impl SpeciesColumns {
    /// Column names in sheet order
    pub fn new(
        dilution_pct: &str,
        dilution_flow: &str,
        span_pct: &str,
        span_flow: &str,
        concentration: &str,
    ) -> Self {
        Self {
            dilution_pct: dilution_pct.to_string(),
            dilution_flow: dilution_flow.to_string(),
            span_pct: span_pct.to_string(),
            span_flow: span_flow.to_string(),
            concentration: concentration.to_string(),
        }
    }
}

/// A selectable programme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Programme {
    /// `Nul`: a single 90 % dilution step without span gas
    Zero,
    /// `Nulstilling`: close both channels immediately
    Reset,
    /// `Afslutning`: nothing to run
    End,
    /// Rows marked in the named sheet column
    Column(String),
}

impl Programme {
    /// Interpret an operator-selected programme name
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "Nul" => Programme::Zero,
            "Nulstilling" => Programme::Reset,
            "Afslutning" => Programme::End,
            other => Programme::Column(other.to_string()),
        }
    }

    /// Name as it appears in the sheet or option list
    pub fn name(&self) -> &str {
        match self {
            Programme::Zero => "Nul",
            Programme::Reset => "Nulstilling",
            Programme::End => "Afslutning",
            Programme::Column(name) => name,
        }
    }

    /// True for programmes that read the reference-gas shift column
    pub fn is_shift(&self) -> bool {
        self.name().contains("Skift")
    }

    /// Name shown to the operator
    pub fn display_name(&self) -> String {
        if self.name().to_lowercase().contains("skift") {
            "Reference Gas Skift".to_string()
        } else {
            self.name().to_string()
        }
    }

    /// Display name in snake case, used in folder names
    pub fn clean_name(&self) -> String {
        self.display_name().replace(' ', "_").to_lowercase()
    }

    /// Clean name with each word capitalized, used in comment file titles
    pub fn title(&self) -> String {
        self.clean_name()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Programme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
