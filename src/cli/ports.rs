use anyhow::Result;
use std::path::PathBuf;

use mfcblend::instrument::discovery::{self, PortCandidate};

use super::config::{Config, SerialSettings};

/// List serial ports and, optionally, probe for Bronkhorst MFCs
pub fn run(probe: bool, config: Option<PathBuf>) -> Result<()> {
    let config = Config::load(config.as_deref())?;
    let serial = config.serial_settings();

    let ports = discovery::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Serial ports:");
    for port in &ports {
        println!("  {}", describe(port, &serial));
    }

    if probe {
        println!();
        match discovery::find_mfc_ports(&serial.mfc_manufacturer, serial.baud_rate, serial.timeout) {
            Ok(found) => {
                println!("Bronkhorst MFCs answering:");
                for port in found {
                    println!("  {}", port);
                }
            }
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

fn describe(port: &PortCandidate, serial: &SerialSettings) -> String {
    let role = if port.made_by(&serial.mfc_manufacturer) {
        " [MFC adapter]"
    } else if port.made_by(&serial.arduino_manufacturer) {
        " [Arduino]"
    } else {
        ""
    };
    format!(
        "{} ({}, {}){}",
        port.port_name,
        port.manufacturer.as_deref().unwrap_or("unknown manufacturer"),
        port.product.as_deref().unwrap_or("unknown product"),
        role
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_marks_roles() {
        let serial = Config::default().serial_settings();
        let ftdi = PortCandidate {
            port_name: "/dev/ttyUSB0".to_string(),
            manufacturer: Some("FTDI".to_string()),
            product: Some("FT232R USB UART".to_string()),
        };
        let arduino = PortCandidate {
            port_name: "COM5".to_string(),
            manufacturer: Some("Arduino LLC (www.arduino.cc)".to_string()),
            product: None,
        };
        assert_eq!(
            describe(&ftdi, &serial),
            "/dev/ttyUSB0 (FTDI, FT232R USB UART) [MFC adapter]"
        );
        assert_eq!(
            describe(&arduino, &serial),
            "COM5 (Arduino LLC (www.arduino.cc), unknown product) [Arduino]"
        );
    }
}
