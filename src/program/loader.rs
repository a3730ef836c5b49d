use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::xlsx::{self, Cell, Sheet};
use super::{ProgramError, ProgramStep, Programme, SpeciesColumns};

/// Column marking the rows of reference-gas shift programmes
pub const SHIFT_COLUMN: &str = "Inds v skift af ref";

/// Settings for interpreting a programme sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Fill codes that do not mark a row (white / no fill in the template)
    pub color_allowlist: Vec<String>,
    /// Column used by programmes whose name contains "Skift"
    pub shift_column: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            color_allowlist: vec!["00000000".to_string(), "0".to_string(), "43".to_string()],
            shift_column: SHIFT_COLUMN.to_string(),
        }
    }
}

/// Steps selected for one programme
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProgramme {
    /// The programme the steps belong to
    pub programme: Programme,
    /// Steps in sheet order
    pub steps: Vec<ProgramStep>,
    /// Steps are applied without the timed hold
    pub immediate: bool,
}

/// The first worksheet of a programme workbook, with its header and data region
#[derive(Debug, Clone)]
pub struct ProgramSheet {
    sheet: Sheet,
    header: Vec<String>,
    data_rows: usize,
    config: LoaderConfig,
}

impl ProgramSheet {
    /// Read a programme workbook from disk
    pub fn open<P: AsRef<Path>>(path: P, config: LoaderConfig) -> Result<Self, ProgramError> {
        let sheet = xlsx::read_first_sheet(path)?;
        Self::from_sheet(sheet, config)
    }

    /// Interpret an already loaded sheet
    ///
    /// Row 1 is the header. Data rows follow until the first row whose first
    /// cell is not an integer.
    pub fn from_sheet(sheet: Sheet, config: LoaderConfig) -> Result<Self, ProgramError> {
        let header: Vec<String> = sheet
            .rows()
            .first()
            .ok_or(ProgramError::NoDataRegion)?
            .iter()
            .map(|cell| cell.value.to_string())
            .collect();

        let data_rows = (1..sheet.row_count())
            .take_while(|row| sheet.value(*row, 0).as_integer().is_some())
            .count();
        if data_rows == 0 {
            return Err(ProgramError::NoDataRegion);
        }
        debug!(
            "Programme sheet {:?}: {} columns, {} data rows",
            sheet.name(),
            header.len(),
            data_rows
        );

        Ok(Self {
            sheet,
            header,
            data_rows,
            config,
        })
    }

    /// Header names in column order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of rows in the data region
    pub fn data_rows(&self) -> usize {
        self.data_rows
    }

    /// Selectable programmes: the last three header columns plus `Nul`
    pub fn options(&self) -> Vec<String> {
        let used = self
            .header
            .iter()
            .rposition(|name| !name.trim().is_empty())
            .map(|last| &self.header[..=last])
            .unwrap_or(&[]);
        let mut options: Vec<String> = used[used.len().saturating_sub(3)..].to_vec();
        options.push(Programme::Zero.name().to_string());
        options
    }

    /// Index of the column with exactly this header
    pub fn column(&self, name: &str) -> Result<usize, ProgramError> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ProgramError::MissingColumn(name.to_string()))
    }

    /// True when the cell's fill is outside the allowlist
    pub fn is_colored(&self, cell: &Cell) -> bool {
        !self.config.color_allowlist.iter().any(|code| *code == cell.fill)
    }

    /// Sheet rows (0-based, header is row 0) whose cell in `column` is colored
    pub fn colored_rows(&self, column: &str) -> Result<Vec<usize>, ProgramError> {
        let col = self.column(column)?;
        Ok((1..=self.data_rows)
            .filter(|row| {
                self.sheet
                    .cell(*row, col)
                    .map(|cell| self.is_colored(cell))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Select the steps of a programme
    pub fn load(
        &self,
        programme: &Programme,
        columns: &SpeciesColumns,
    ) -> Result<LoadedProgramme, ProgramError> {
        let (steps, immediate) = match programme {
            Programme::Zero => (vec![self.zero_step(columns)?], false),
            Programme::Reset => (vec![ProgramStep::ZERO], true),
            Programme::End => (Vec::new(), true),
            Programme::Column(name) => {
                let options = self.options();
                if !options.iter().any(|o| o == name) {
                    return Err(ProgramError::UnknownProgramme {
                        name: name.clone(),
                        available: options.join(", "),
                    });
                }
                let marker = if programme.is_shift() {
                    self.config.shift_column.as_str()
                } else {
                    name.as_str()
                };
                let steps = self
                    .colored_rows(marker)?
                    .into_iter()
                    .map(|row| self.step_at(row, columns))
                    .collect::<Result<Vec<_>, _>>()?;
                (steps, false)
            }
        };

        info!(
            "Programme {} selected with {} step(s)",
            programme.display_name(),
            steps.len()
        );
        Ok(LoadedProgramme {
            programme: programme.clone(),
            steps,
            immediate,
        })
    }

    fn number(&self, row: usize, column: &str) -> Result<f64, ProgramError> {
        let col = self.column(column)?;
        let value = self.sheet.value(row, col);
        value.as_f64().ok_or_else(|| ProgramError::InvalidValue {
            row: row + 1,
            column: column.to_string(),
            found: value.to_string(),
        })
    }

    fn step_at(&self, row: usize, columns: &SpeciesColumns) -> Result<ProgramStep, ProgramError> {
        Ok(ProgramStep {
            dilution_pct: self.number(row, &columns.dilution_pct)?,
            dilution_flow: self.number(row, &columns.dilution_flow)?,
            span_pct: self.number(row, &columns.span_pct)?,
            span_flow: self.number(row, &columns.span_flow)?,
            concentration_ppb: self.number(row, &columns.concentration)?,
        })
    }

    /// `Nul` step: 90 % dilution with the flow listed on the 90 % row
    fn zero_step(&self, columns: &SpeciesColumns) -> Result<ProgramStep, ProgramError> {
        let pct_col = self.column(&columns.dilution_pct)?;
        let row = (1..self.sheet.row_count())
            .find(|row| self.sheet.value(*row, pct_col).as_f64() == Some(90.0))
            .ok_or_else(|| ProgramError::NoNinetyPercentRow(columns.dilution_pct.clone()))?;
        Ok(ProgramStep::flush(self.number(row, &columns.dilution_flow)?))
    }
}
