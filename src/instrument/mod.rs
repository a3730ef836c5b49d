//! # Instrument Module
//!
//! Parameter-level access to Bronkhorst flow instruments.
//!
//! ## Design Principles
//!
//! 1. **Parameter Addressing**: Every register is addressed by its vendor DDE
//!    number. The [`dde`] table maps the handful of numbers used here onto
//!    Propar process/parameter/type triples.
//!
//! 2. **Transport Independence**: [`FlowInstrument`] is the only seam the rest
//!    of the crate sees. [`ProparInstrument`] speaks the Propar ASCII protocol
//!    over a serial port; [`SimulatedMfc`] answers from memory for dry runs
//!    and tests.
//!
//! 3. **Discovery by Manufacturer**: MFC adapters are FTDI bridges and the
//!    auxiliary logger is an Arduino; [`discovery`] matches USB manufacturer
//!    strings reported by the OS.

pub mod dde;
pub mod discovery;
mod error;
mod propar;
mod simulated;


use std::fmt;

pub use error::InstrumentError;
pub use propar::{ProparFrame, ProparInstrument, DEFAULT_BAUD_RATE, DEFAULT_NODE};
pub use simulated::{SimulatedMfc, WriteJournal};

/// A value read from or written to an instrument parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Unsigned 8-bit value
    Char(u8),
    /// Unsigned 16-bit value (raw measure/setpoint, 0..=32000 == 0..=100 %)
    Int(u16),
    /// IEEE-754 single precision value
    Float(f32),
    /// Text value (units, names)
    Text(String),
}

impl ParamValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Char(v) => Some(*v as f64),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v as f64),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text view of the value
    pub fn as_text(&self) -> String {
        match self {
            ParamValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Char(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Read/write access to the numbered parameters of one flow instrument
pub trait FlowInstrument: Send {
    /// Read the parameter with the given DDE number
    fn read_parameter(&mut self, dde: u16) -> Result<ParamValue, InstrumentError>;

    /// Write a value to the parameter with the given DDE number
    fn write_parameter(&mut self, dde: u16, value: ParamValue) -> Result<(), InstrumentError>;

    /// Human-readable location of the instrument (port name, "simulated", ...)
    fn location(&self) -> &str;
}

impl<T: FlowInstrument + ?Sized> FlowInstrument for Box<T> {
    fn read_parameter(&mut self, dde: u16) -> Result<ParamValue, InstrumentError> {
        (**self).read_parameter(dde)
    }

    fn write_parameter(&mut self, dde: u16, value: ParamValue) -> Result<(), InstrumentError> {
        (**self).write_parameter(dde, value)
    }

    fn location(&self) -> &str {
        (**self).location()
    }
}
