//! Serial port discovery by USB manufacturer string.

use std::time::Duration;

use log::{info, warn};
use serialport::{SerialPortInfo, SerialPortType};

use super::{dde, FlowInstrument, InstrumentError, ProparInstrument};

/// Manufacturer string reported by the USB bridges in Bronkhorst cables
pub const MFC_MANUFACTURER: &str = "FTDI";
/// Manufacturer string reported by Arduino boards
pub const ARDUINO_MANUFACTURER: &str = "Arduino";

/// A serial port as reported by the operating system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// Device path or COM name
    pub port_name: String,
    /// USB manufacturer string, when the port is a USB device
    pub manufacturer: Option<String>,
    /// USB product string, when the port is a USB device
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        let (manufacturer, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (usb.manufacturer, usb.product),
            _ => (None, None),
        };
        Self {
            port_name: info.port_name,
            manufacturer,
            product,
        }
    }
}

impl PortCandidate {
    /// True when the manufacturer string contains `needle` (case-insensitive)
    pub fn made_by(&self, needle: &str) -> bool {
        self.manufacturer
            .as_deref()
            .map(|m| m.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false)
    }
}

/// Enumerate all serial ports known to the operating system
pub fn list_ports() -> Result<Vec<PortCandidate>, InstrumentError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortCandidate::from)
        .collect())
}

/// Keep only ports whose manufacturer matches, preserving OS order
pub fn filter_by_manufacturer(ports: &[PortCandidate], needle: &str) -> Vec<PortCandidate> {
    ports.iter().filter(|p| p.made_by(needle)).cloned().collect()
}

/// Choose the Arduino port among the candidates
///
/// The first match is used; additional matches only produce a warning.
pub fn select_arduino_port(ports: &[PortCandidate], needle: &str) -> Result<String, InstrumentError> {
    let matches = filter_by_manufacturer(ports, needle);
    match matches.as_slice() {
        [] => Err(InstrumentError::NoPorts(needle.to_string())),
        [only] => Ok(only.port_name.clone()),
        [first, ..] => {
            warn!(
                "Multiple connected {} boards found, using first found at port: {}",
                needle, first.port_name
            );
            Ok(first.port_name.clone())
        }
    }
}

/// Find the Arduino logger port
pub fn find_arduino_port(needle: &str) -> Result<String, InstrumentError> {
    select_arduino_port(&list_ports()?, needle)
}

/// Find ports with a responding Bronkhorst instrument
///
/// Every port whose manufacturer matches is opened and asked for its
/// measurement (DDE 8); ports that do not answer are skipped.
pub fn find_mfc_ports(
    needle: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Vec<String>, InstrumentError> {
    let candidates = filter_by_manufacturer(&list_ports()?, needle);
    let mut found = Vec::new();

    for candidate in candidates {
        let probe = ProparInstrument::open(&candidate.port_name, baud_rate, timeout)
            .and_then(|mut instrument| instrument.read_parameter(dde::MEASURE));
        match probe {
            Ok(_) => {
                info!("MFC found at port {}", candidate.port_name);
                found.push(candidate.port_name);
            }
            Err(e) => {
                info!("MFC not found at port {} ({})", candidate.port_name, e);
            }
        }
    }

    if found.is_empty() {
        return Err(InstrumentError::NoPorts("Bronkhorst MFC".to_string()));
    }
    Ok(found)
}
