//! DDE parameter numbers and their Propar addressing.
//!
//! | DDE | Name | Process | Parameter | Type |
//! |-----|------|---------|-----------|------|
//! | 8 | Measure (0..32000 = 0..100 %) | 1 | 0 | int |
//! | 9 | Setpoint (0..32000) | 1 | 1 | int |
//! | 21 | Capacity (100 % flow in capacity unit) | 1 | 13 | float |
//! | 129 | Capacity unit | 1 | 31 | string |
//! | 205 | fMeasure (flow in capacity unit) | 33 | 0 | float |
//! | 206 | fSetpoint (flow in capacity unit) | 33 | 3 | float |

use super::InstrumentError;

/// Raw measurement, 0..=32000
pub const MEASURE: u16 = 8;
/// Raw setpoint, 0..=32000
pub const SETPOINT: u16 = 9;
/// Flow at 100 % in the capacity unit
pub const CAPACITY: u16 = 21;
/// Readout unit at capacity, e.g. `mln/min`
pub const CAPACITY_UNIT: u16 = 129;
/// Measured flow in the capacity unit
pub const FMEASURE: u16 = 205;
/// Flow setpoint in the capacity unit
pub const FSETPOINT: u16 = 206;

/// Raw value corresponding to 100 % on the int-typed measure/setpoint registers
pub const FULL_SCALE_RAW: u16 = 32000;

/// Wire type of a Propar parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// 1 byte
    Char,
    /// 2 bytes, big endian
    Int,
    /// 4 bytes, IEEE-754 big endian
    Float,
    /// Length-prefixed text
    Text,
}

impl ParamType {
    /// Type bits carried in the top three bits of the parameter byte
    pub fn type_bits(self) -> u8 {
        match self {
            ParamType::Char => 0x00,
            ParamType::Int => 0x20,
            ParamType::Float => 0x40,
            ParamType::Text => 0x60,
        }
    }

    /// Inverse of [`ParamType::type_bits`]
    pub fn from_type_bits(byte: u8) -> Self {
        match byte & 0x60 {
            0x00 => ParamType::Char,
            0x20 => ParamType::Int,
            0x40 => ParamType::Float,
            _ => ParamType::Text,
        }
    }

    /// Name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            ParamType::Char => "char",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Text => "string",
        }
    }
}

/// Propar address of one DDE parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// DDE number
    pub dde: u16,
    /// Propar process number
    pub process: u8,
    /// Propar parameter number (0..=31)
    pub parameter: u8,
    /// Wire type
    pub param_type: ParamType,
}

impl ParamSpec {
    /// Parameter byte as sent on the wire (type bits | parameter number)
    pub fn parameter_byte(&self) -> u8 {
        self.param_type.type_bits() | (self.parameter & 0x1F)
    }
}

const TABLE: &[ParamSpec] = &[
    ParamSpec { dde: MEASURE, process: 1, parameter: 0, param_type: ParamType::Int },
    ParamSpec { dde: SETPOINT, process: 1, parameter: 1, param_type: ParamType::Int },
    ParamSpec { dde: CAPACITY, process: 1, parameter: 13, param_type: ParamType::Float },
    ParamSpec { dde: CAPACITY_UNIT, process: 1, parameter: 31, param_type: ParamType::Text },
    ParamSpec { dde: FMEASURE, process: 33, parameter: 0, param_type: ParamType::Float },
    ParamSpec { dde: FSETPOINT, process: 33, parameter: 3, param_type: ParamType::Float },
];

/// Look up the Propar address of a DDE parameter
pub fn lookup(dde: u16) -> Result<ParamSpec, InstrumentError> {
    TABLE
        .iter()
        .copied()
        .find(|spec| spec.dde == dde)
        .ok_or(InstrumentError::UnknownParameter(dde))
}

/// Human-readable name of a DDE parameter
pub fn name(dde: u16) -> &'static str {
    match dde {
        MEASURE => "Measure",
        SETPOINT => "Setpoint",
        CAPACITY => "Capacity",
        CAPACITY_UNIT => "Capacity Unit",
        FMEASURE => "fMeasure",
        FSETPOINT => "fSetpoint",
        _ => "Unknown",
    }
}
