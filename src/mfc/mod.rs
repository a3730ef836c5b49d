//! # MFC Module
//!
//! Handles on individual mass-flow controllers and the span/dilution pair
//! used for blending.
//!
//! Setpoints are expressed as a percentage of each controller's capacity and
//! converted to absolute flow with [`pct_to_flow`] before being written to
//! the fSetpoint register.

mod error;


use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::instrument::{dde, FlowInstrument, ParamValue};

pub use error::MfcError;

/// Convert a percentage of capacity into an absolute flow
///
/// `pct_to_flow(max, 0.0) == 0.0`, `pct_to_flow(max, 100.0) == max`, linear in between.
pub fn pct_to_flow(max_flow: f64, pct: f64) -> f64 {
    (pct / 100.0) * max_flow
}

/// Readout unit of an MFC at capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowUnit {
    /// Normal millilitres per minute
    MlnPerMin,
    /// Normal litres per minute
    LnPerMin,
    /// Anything else the instrument reports; treated as ln/min for comparison
    Other(String),
}

impl FlowUnit {
    /// Interpret the capacity unit string reported by the instrument
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        if lower.contains("mln") || lower.starts_with("ml") || lower.contains("sccm") {
            FlowUnit::MlnPerMin
        } else if lower.contains("ln") || lower.starts_with("l/") || lower.contains("slm") {
            FlowUnit::LnPerMin
        } else {
            FlowUnit::Other(raw.trim().to_string())
        }
    }

    /// Factor converting a flow in this unit to ln/min
    pub fn to_ln_per_min(&self) -> f64 {
        match self {
            FlowUnit::MlnPerMin => 1e-3,
            FlowUnit::LnPerMin | FlowUnit::Other(_) => 1.0,
        }
    }

    /// Factor converting a flow in this unit to mln/min
    pub fn to_mln_per_min(&self) -> f64 {
        self.to_ln_per_min() * 1e3
    }

    /// Display form used on axes and in labels
    pub fn pretty(&self) -> &str {
        match self {
            FlowUnit::MlnPerMin => "mL/min",
            FlowUnit::LnPerMin => "L/min",
            FlowUnit::Other(raw) => raw,
        }
    }
}

impl fmt::Display for FlowUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}

/// One mass-flow controller with its cached capacity and unit
pub struct Mfc {
    instrument: Box<dyn FlowInstrument>,
    max_flow: f64,
    unit: FlowUnit,
}

impl fmt::Debug for Mfc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mfc")
            .field("location", &self.instrument.location())
            .field("max_flow", &self.max_flow)
            .field("unit", &self.unit)
            .finish()
    }
}

impl Mfc {
    /// Connect to an instrument, reading and caching its capacity and unit
    pub fn connect(mut instrument: Box<dyn FlowInstrument>) -> Result<Self, MfcError> {
        let capacity = instrument.read_parameter(dde::CAPACITY)?;
        let unit = instrument.read_parameter(dde::CAPACITY_UNIT)?.as_text();
        let max_flow = capacity.as_f64().unwrap_or(0.0);

        let mfc = Self::with_capacity(instrument, max_flow, FlowUnit::parse(&unit))?;
        info!(
            "MFC with capacity {:.1} {} found at {}",
            mfc.max_flow,
            mfc.unit,
            mfc.location()
        );
        Ok(mfc)
    }

    /// Wrap an instrument whose capacity is already known
    pub fn with_capacity(
        instrument: Box<dyn FlowInstrument>,
        max_flow: f64,
        unit: FlowUnit,
    ) -> Result<Self, MfcError> {
        if !max_flow.is_finite() || max_flow <= 0.0 {
            return Err(MfcError::InvalidCapacity {
                location: instrument.location().to_string(),
                capacity: max_flow,
            });
        }
        Ok(Self {
            instrument,
            max_flow,
            unit,
        })
    }

    /// Capacity in the instrument's own unit
    pub fn max_flow(&self) -> f64 {
        self.max_flow
    }

    /// Readout unit at capacity
    pub fn unit(&self) -> &FlowUnit {
        &self.unit
    }

    /// Where the instrument is attached
    pub fn location(&self) -> &str {
        self.instrument.location()
    }

    /// Capacity in ln/min, used to tell the span and dilution MFCs apart
    pub fn normalized_capacity(&self) -> f64 {
        self.max_flow * self.unit.to_ln_per_min()
    }

    /// Write an absolute flow setpoint in the capacity unit
    pub fn write_flow(&mut self, flow: f64) -> Result<(), MfcError> {
        debug!("{}: fSetpoint <- {:.4} {}", self.location(), flow, self.unit);
        self.instrument
            .write_parameter(dde::FSETPOINT, ParamValue::Float(flow as f32))?;
        Ok(())
    }

    /// Write a setpoint given as a percentage of capacity; returns the absolute flow
    pub fn write_pct(&mut self, pct: f64) -> Result<f64, MfcError> {
        let flow = pct_to_flow(self.max_flow, pct);
        self.write_flow(flow)?;
        Ok(flow)
    }

    /// Read the measured flow in the capacity unit
    pub fn read_flow(&mut self) -> Result<f64, MfcError> {
        let value = self.instrument.read_parameter(dde::FMEASURE)?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    /// Read the measured flow in mln/min regardless of the capacity unit
    pub fn read_flow_mln(&mut self) -> Result<f64, MfcError> {
        Ok(self.read_flow()? * self.unit.to_mln_per_min())
    }
}

/// Fraction of each MFC's capacity written when a run stops
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdleFractions {
    /// Fraction of the span MFC's capacity
    pub span: f64,
    /// Fraction of the dilution MFC's capacity
    pub dilution: f64,
}

impl Default for IdleFractions {
    fn default() -> Self {
        Self {
            span: 0.01,
            dilution: 0.6,
        }
    }
}

impl IdleFractions {
    /// Check both fractions are within 0..=1
    pub fn validate(&self) -> Result<(), MfcError> {
        for fraction in [self.span, self.dilution] {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(MfcError::InvalidIdleFraction(fraction));
            }
        }
        Ok(())
    }
}

/// Measured flows of both channels at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairReading {
    /// Span flow in mL/min
    pub span_ml_min: f64,
    /// Dilution flow in L/min
    pub dilution_l_min: f64,
}

/// Flows written for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrittenSetpoints {
    /// Absolute dilution flow in the dilution MFC's unit
    pub dilution_flow: f64,
    /// Absolute span flow in the span MFC's unit
    pub span_flow: f64,
}

/// The two MFCs of a binary blending setup
#[derive(Debug)]
pub struct MfcPair {
    /// Small-capacity controller delivering the concentrated gas
    pub span: Mfc,
    /// Large-capacity controller delivering the diluent
    pub dilution: Mfc,
}

impl MfcPair {
    /// Assign span and dilution roles by normalized capacity
    ///
    /// Exactly two MFCs are required; the smaller one becomes the span channel.
    pub fn assign(mut mfcs: Vec<Mfc>) -> Result<Self, MfcError> {
        if mfcs.len() != 2 {
            return Err(MfcError::WrongCount(mfcs.len()));
        }
        mfcs.sort_by(|a, b| a.normalized_capacity().total_cmp(&b.normalized_capacity()));

        let dilution = mfcs.pop().ok_or(MfcError::WrongCount(0))?;
        let span = mfcs.pop().ok_or(MfcError::WrongCount(1))?;
        info!(
            "Span MFC: {:.1} {} at {}; dilution MFC: {:.1} {} at {}",
            span.max_flow(),
            span.unit(),
            span.location(),
            dilution.max_flow(),
            dilution.unit(),
            dilution.location()
        );
        Ok(Self { span, dilution })
    }

    /// Write both setpoints for a step, dilution first
    pub fn write_pct(&mut self, dilution_pct: f64, span_pct: f64) -> Result<WrittenSetpoints, MfcError> {
        let dilution_flow = self.dilution.write_pct(dilution_pct)?;
        let span_flow = self.span.write_pct(span_pct)?;
        Ok(WrittenSetpoints {
            dilution_flow,
            span_flow,
        })
    }

    /// Drive both MFCs to their idle flow
    pub fn write_idle(&mut self, idle: &IdleFractions) -> Result<WrittenSetpoints, MfcError> {
        let span_flow = self.span.max_flow() * idle.span;
        let dilution_flow = self.dilution.max_flow() * idle.dilution;
        info!(
            "Writing idle setpoints: span {:.3} {}, dilution {:.3} {}",
            span_flow,
            self.span.unit(),
            dilution_flow,
            self.dilution.unit()
        );
        self.span.write_flow(span_flow)?;
        self.dilution.write_flow(dilution_flow)?;
        Ok(WrittenSetpoints {
            dilution_flow,
            span_flow,
        })
    }

    /// Read both measured flows (span in mL/min, dilution in L/min)
    pub fn read(&mut self) -> Result<PairReading, MfcError> {
        let span_ml_min = self.span.read_flow_mln()?;
        let dilution_l_min = self.dilution.read_flow_mln()? / 1000.0;
        Ok(PairReading {
            span_ml_min,
            dilution_l_min,
        })
    }

    /// CSV column labels for the span and dilution channels
    pub fn channel_labels(&self) -> (String, String) {
        (
            format!("Bronkhorst {:.1}SCCM [mL/min]", self.span.max_flow()),
            format!("Bronkhorst {:.1}SLM [L/min]", self.dilution.max_flow()),
        )
    }
}
