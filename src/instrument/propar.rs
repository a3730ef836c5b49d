//! Propar ASCII framing and a serial-port backed [`FlowInstrument`].
//!
//! An ASCII frame is `:` followed by upper-case hex bytes and `\r\n`:
//!
//! ```text
//! :06 80 04 01 21 01 21
//!  │  │  │  └─────────── payload (process, parameter | type, ...)
//!  │  │  └────────────── command
//!  │  └───────────────── node address
//!  └──────────────────── number of bytes after the length byte
//! ```
//!
//! Only single-parameter messages are produced; chained messages are not used.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use log::{debug, trace};
use serialport::SerialPort;

use super::dde::{self, ParamSpec, ParamType};
use super::{FlowInstrument, InstrumentError, ParamValue};

/// Node address of the locally attached instrument
pub const DEFAULT_NODE: u8 = 0x80;
/// Baud rate of the Bronkhorst USB/RS232 interface
pub const DEFAULT_BAUD_RATE: u32 = 38_400;

const CMD_STATUS: u8 = 0x00;
const CMD_WRITE: u8 = 0x01;
const CMD_ANSWER: u8 = 0x02;
const CMD_REQUEST: u8 = 0x04;

/// One decoded Propar message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProparFrame {
    /// Node address
    pub node: u8,
    /// Command byte
    pub command: u8,
    /// Bytes following the command
    pub payload: Vec<u8>,
}

impl ProparFrame {
    /// Request the value of a parameter
    pub fn request(node: u8, spec: &ParamSpec) -> Self {
        let mut payload = vec![
            spec.process,
            spec.parameter_byte(),
            spec.process,
            spec.parameter_byte(),
        ];
        if spec.param_type == ParamType::Text {
            // zero = let the instrument send the full string
            payload.push(0x00);
        }
        Self {
            node,
            command: CMD_REQUEST,
            payload,
        }
    }

    /// Write a parameter and ask for a status reply
    pub fn write(node: u8, spec: &ParamSpec, value: &ParamValue) -> Result<Self, InstrumentError> {
        let mut payload = vec![spec.process, spec.parameter_byte()];
        payload.extend(encode_value(spec, value)?);
        Ok(Self {
            node,
            command: CMD_WRITE,
            payload,
        })
    }

    /// Render the frame as an ASCII line, including the trailing CRLF
    pub fn to_ascii(&self) -> String {
        let len = (self.payload.len() + 2) as u8;
        let mut out = String::with_capacity(2 * (self.payload.len() + 3) + 3);
        out.push(':');
        for byte in [len, self.node, self.command]
            .iter()
            .chain(self.payload.iter())
        {
            out.push_str(&format!("{:02X}", byte));
        }
        out.push_str("\r\n");
        out
    }

    /// Parse an ASCII line (with or without the CRLF terminator)
    pub fn from_ascii(line: &str) -> Result<Self, InstrumentError> {
        let body = line
            .trim_end_matches(['\r', '\n'])
            .strip_prefix(':')
            .ok_or_else(|| InstrumentError::InvalidFrame(format!("missing ':' in {:?}", line)))?;

        let digits = body.as_bytes();
        if digits.len() % 2 != 0 {
            return Err(InstrumentError::InvalidFrame(format!(
                "odd number of hex digits in {:?}",
                line
            )));
        }

        let bytes = digits
            .chunks_exact(2)
            .map(|pair| match (hex_value(pair[0]), hex_value(pair[1])) {
                (Some(high), Some(low)) => Ok(high << 4 | low),
                _ => Err(InstrumentError::InvalidFrame(format!(
                    "invalid hex digit in {:?}",
                    line
                ))),
            })
            .collect::<Result<Vec<u8>, _>>()?;

        if bytes.len() < 3 {
            return Err(InstrumentError::InvalidFrame(format!("frame too short: {:?}", line)));
        }

        let declared = bytes[0] as usize;
        if declared != bytes.len() - 1 {
            return Err(InstrumentError::InvalidFrame(format!(
                "length byte {} does not match {} data bytes",
                declared,
                bytes.len() - 1
            )));
        }

        Ok(Self {
            node: bytes[1],
            command: bytes[2],
            payload: bytes[3..].to_vec(),
        })
    }

    /// Interpret a status reply; `Ok(())` when the instrument accepted the request
    pub fn check_status(&self) -> Result<(), InstrumentError> {
        if self.command != CMD_STATUS {
            return Err(InstrumentError::InvalidFrame(format!(
                "expected status reply, got command {:#04x}",
                self.command
            )));
        }
        match self.payload.as_slice() {
            [0, ..] => Ok(()),
            [status, index, ..] => Err(InstrumentError::Status {
                status: *status,
                index: *index,
            }),
            [status] => Err(InstrumentError::Status {
                status: *status,
                index: 0,
            }),
            [] => Err(InstrumentError::InvalidFrame("empty status reply".to_string())),
        }
    }

    /// Decode the value carried by an answer to a request
    pub fn answer_value(&self, spec: &ParamSpec) -> Result<ParamValue, InstrumentError> {
        if self.command == CMD_STATUS {
            self.check_status()?;
            return Err(InstrumentError::InvalidFrame(
                "status reply where a value was expected".to_string(),
            ));
        }
        if self.command != CMD_ANSWER {
            return Err(InstrumentError::InvalidFrame(format!(
                "unexpected command {:#04x}",
                self.command
            )));
        }
        if self.payload.len() < 2 {
            return Err(InstrumentError::InvalidFrame("answer without parameter".to_string()));
        }
        if self.payload[0] & 0x7F != spec.process || self.payload[1] & 0x1F != spec.parameter {
            return Err(InstrumentError::InvalidFrame(format!(
                "answer for process {} parameter {}, expected DDE {}",
                self.payload[0] & 0x7F,
                self.payload[1] & 0x1F,
                spec.dde
            )));
        }
        decode_value(spec, &self.payload[2..])
    }
}

fn encode_value(spec: &ParamSpec, value: &ParamValue) -> Result<Vec<u8>, InstrumentError> {
    let mismatch = || InstrumentError::TypeMismatch {
        dde: spec.dde,
        expected: spec.param_type.name(),
    };
    match (spec.param_type, value) {
        (ParamType::Char, ParamValue::Char(v)) => Ok(vec![*v]),
        (ParamType::Int, ParamValue::Int(v)) => Ok(v.to_be_bytes().to_vec()),
        (ParamType::Float, ParamValue::Float(v)) => Ok(v.to_be_bytes().to_vec()),
        (ParamType::Text, ParamValue::Text(s)) => {
            let bytes = s.as_bytes();
            if bytes.len() > u8::MAX as usize {
                return Err(mismatch());
            }
            let mut out = Vec::with_capacity(bytes.len() + 1);
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
            Ok(out)
        }
        _ => Err(mismatch()),
    }
}

fn decode_value(spec: &ParamSpec, data: &[u8]) -> Result<ParamValue, InstrumentError> {
    let short = || {
        InstrumentError::InvalidFrame(format!(
            "{} bytes is too short for a {} value",
            data.len(),
            spec.param_type.name()
        ))
    };
    match spec.param_type {
        ParamType::Char => data.first().map(|b| ParamValue::Char(*b)).ok_or_else(short),
        ParamType::Int => {
            let bytes: [u8; 2] = data.get(..2).and_then(|s| s.try_into().ok()).ok_or_else(short)?;
            Ok(ParamValue::Int(u16::from_be_bytes(bytes)))
        }
        ParamType::Float => {
            let bytes: [u8; 4] = data.get(..4).and_then(|s| s.try_into().ok()).ok_or_else(short)?;
            Ok(ParamValue::Float(f32::from_be_bytes(bytes)))
        }
        ParamType::Text => {
            // Either a length prefix followed by that many characters, or a
            // zero-terminated run of characters.
            let text = match data.split_first() {
                Some((&len, rest)) if len as usize == rest.len() && len > 0 => rest,
                Some((&0, rest)) => rest,
                _ => data,
            };
            let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
            Ok(ParamValue::Text(String::from_utf8_lossy(&text[..end]).trim().to_string()))
        }
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    (digit as char).to_digit(16).map(|v| v as u8)
}

/// A Bronkhorst instrument reached over a byte stream speaking Propar ASCII
pub struct ProparInstrument<T> {
    io: T,
    node: u8,
    location: String,
    line: Vec<u8>,
}

impl ProparInstrument<Box<dyn SerialPort>> {
    /// Open a serial port with the Bronkhorst line settings (8N1)
    pub fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self, InstrumentError> {
        debug!("Opening Propar instrument on {} at {} baud", port, baud_rate);
        let io = serialport::new(port, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;
        Ok(Self::new(io, DEFAULT_NODE, port))
    }
}

impl<T: Read + Write + Send> ProparInstrument<T> {
    /// Wrap an already opened byte stream
    pub fn new(io: T, node: u8, location: impl Into<String>) -> Self {
        Self {
            io,
            node,
            location: location.into(),
            line: Vec::with_capacity(64),
        }
    }

    /// Consume the wrapper and return the byte stream
    pub fn into_inner(self) -> T {
        self.io
    }

    fn transact(&mut self, frame: &ProparFrame) -> Result<ProparFrame, InstrumentError> {
        let request = frame.to_ascii();
        trace!("{} <- {}", self.location, request.trim_end());
        self.io.write_all(request.as_bytes())?;
        self.io.flush()?;

        let reply = self.read_line()?;
        trace!("{} -> {}", self.location, reply);
        ProparFrame::from_ascii(&reply)
    }

    fn read_line(&mut self) -> Result<String, InstrumentError> {
        self.line.clear();
        let mut byte = [0u8; 1];
        loop {
            match self.io.read(&mut byte) {
                Ok(0) => {
                    return Err(InstrumentError::Timeout(self.location.clone()));
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        if self.line.is_empty() {
                            continue;
                        }
                        break;
                    }
                    // skip anything before the start-of-frame marker
                    if self.line.is_empty() && byte[0] != b':' {
                        continue;
                    }
                    self.line.push(byte[0]);
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(InstrumentError::Timeout(self.location.clone()));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(String::from_utf8_lossy(&self.line).trim_end().to_string())
    }
}

impl<T: Read + Write + Send> FlowInstrument for ProparInstrument<T> {
    fn read_parameter(&mut self, dde_number: u16) -> Result<ParamValue, InstrumentError> {
        let spec = dde::lookup(dde_number)?;
        let reply = self.transact(&ProparFrame::request(self.node, &spec))?;
        reply.answer_value(&spec)
    }

    fn write_parameter(&mut self, dde_number: u16, value: ParamValue) -> Result<(), InstrumentError> {
        let spec = dde::lookup(dde_number)?;
        let reply = self.transact(&ProparFrame::write(self.node, &spec, &value)?)?;
        reply.check_status()
    }

    fn location(&self) -> &str {
        &self.location
    }
}
