use std::sync::{Arc, Mutex};

use super::dde::{self, FULL_SCALE_RAW};
use super::{FlowInstrument, InstrumentError, ParamValue};

/// Shared record of every parameter write made to a [`SimulatedMfc`]
#[derive(Debug, Clone, Default)]
pub struct WriteJournal {
    entries: Arc<Mutex<Vec<(u16, ParamValue)>>>,
}

impl WriteJournal {
    fn push(&self, dde: u16, value: ParamValue) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((dde, value));
    }

    /// All writes in the order they were made
    pub fn entries(&self) -> Vec<(u16, ParamValue)> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Values written to the flow setpoint (DDE 206), in order
    pub fn flow_setpoints(&self) -> Vec<f64> {
        self.entries()
            .into_iter()
            .filter(|(dde, _)| *dde == dde::FSETPOINT)
            .filter_map(|(_, value)| value.as_f64())
            .collect()
    }

    /// Most recent flow setpoint, if any was written
    pub fn last_flow_setpoint(&self) -> Option<f64> {
        self.flow_setpoints().last().copied()
    }
}

/// In-memory stand-in for a Bronkhorst MFC
///
/// The measured flow tracks the setpoint scaled by `response`, so a run
/// against simulated hardware produces plausible flow logs.
#[derive(Debug)]
pub struct SimulatedMfc {
    location: String,
    capacity: f32,
    unit: String,
    setpoint: f32,
    response: f32,
    reads: usize,
    fail_reads_after: Option<usize>,
    journal: WriteJournal,
}

impl SimulatedMfc {
    /// Create a simulated MFC with the given capacity and readout unit
    pub fn new(capacity: f32, unit: &str) -> Self {
        Self {
            location: format!("simulated {} {}", capacity, unit),
            capacity,
            unit: unit.to_string(),
            setpoint: 0.0,
            response: 1.0,
            reads: 0,
            fail_reads_after: None,
            journal: WriteJournal::default(),
        }
    }

    /// Scale measured flow relative to the setpoint (1.0 = perfect tracking)
    pub fn with_response(mut self, response: f32) -> Self {
        self.response = response;
        self
    }

    /// Fail every read after the given number of successful reads
    pub fn fail_reads_after(mut self, reads: usize) -> Self {
        self.fail_reads_after = Some(reads);
        self
    }

    /// Handle to the write journal, valid after the MFC is moved elsewhere
    pub fn journal(&self) -> WriteJournal {
        self.journal.clone()
    }

    fn measured(&self) -> f32 {
        self.setpoint * self.response
    }

    fn to_raw(&self, flow: f32) -> u16 {
        if self.capacity <= 0.0 {
            return 0;
        }
        let raw = (flow / self.capacity) * FULL_SCALE_RAW as f32;
        raw.clamp(0.0, u16::MAX as f32).round() as u16
    }
}

impl FlowInstrument for SimulatedMfc {
    fn read_parameter(&mut self, dde_number: u16) -> Result<ParamValue, InstrumentError> {
        if let Some(limit) = self.fail_reads_after {
            if self.reads >= limit {
                return Err(InstrumentError::Timeout(self.location.clone()));
            }
        }
        self.reads += 1;

        match dde_number {
            dde::MEASURE => Ok(ParamValue::Int(self.to_raw(self.measured()))),
            dde::SETPOINT => Ok(ParamValue::Int(self.to_raw(self.setpoint))),
            dde::CAPACITY => Ok(ParamValue::Float(self.capacity)),
            dde::CAPACITY_UNIT => Ok(ParamValue::Text(self.unit.clone())),
            dde::FMEASURE => Ok(ParamValue::Float(self.measured())),
            dde::FSETPOINT => Ok(ParamValue::Float(self.setpoint)),
            other => Err(InstrumentError::UnknownParameter(other)),
        }
    }

    fn write_parameter(&mut self, dde_number: u16, value: ParamValue) -> Result<(), InstrumentError> {
        match (dde_number, &value) {
            (dde::FSETPOINT, ParamValue::Float(flow)) => {
                self.setpoint = flow.clamp(0.0, self.capacity);
            }
            (dde::SETPOINT, ParamValue::Int(raw)) => {
                self.setpoint = (*raw as f32 / FULL_SCALE_RAW as f32) * self.capacity;
            }
            (dde::FSETPOINT, _) | (dde::SETPOINT, _) => {
                return Err(InstrumentError::TypeMismatch {
                    dde: dde_number,
                    expected: dde::lookup(dde_number)?.param_type.name(),
                });
            }
            (other, _) => {
                dde::lookup(other)?;
            }
        }
        self.journal.push(dde_number, value);
        Ok(())
    }

    fn location(&self) -> &str {
        &self.location
    }
}
