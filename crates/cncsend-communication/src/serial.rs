//! Serial port transport
//!
//! Real `WireLink` over a USB or RS-232 serial port, plus port discovery
//! filtered to the device patterns CNC controllers actually enumerate as.

use std::io::{Read, Write};
use std::time::Duration;

use cncsend_core::{Error, Result};

use crate::wire::WireLink;

/// Information about an available serial port.
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port_name: String,
    /// User-facing description
    pub description: String,
    /// USB manufacturer if available
    pub manufacturer: Option<String>,
    /// USB vendor/product IDs if applicable
    pub usb_ids: Option<(u16, u16)>,
}

/// List serial ports that look like CNC controllers.
///
/// Patterns kept: COM* on Windows, /dev/ttyUSB* and /dev/ttyACM* on Linux,
/// /dev/cu.usbserial-* and /dev/cu.usbmodem* on macOS.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("failed to enumerate serial ports: {}", e);
        Error::other(format!("failed to enumerate ports: {e}"))
    })?;

    Ok(ports
        .iter()
        .filter(|p| is_controller_port(&p.port_name))
        .map(|p| {
            let mut info = SerialPortInfo {
                port_name: p.port_name.clone(),
                description: describe_port(p),
                manufacturer: None,
                usb_ids: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = &p.port_type {
                info.manufacturer = usb.manufacturer.clone();
                info.usb_ids = Some((usb.vid, usb.pid));
            }
            info
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }
    if port_name.starts_with("/dev/cu.usbserial-") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }
    false
}

fn describe_port(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// `WireLink` over a real serial port.
///
/// Reads use a short timeout so a poll never stalls the engine tick;
/// partial lines are carried between calls until a newline arrives.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
    port_name: String,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Open `port_name` at `baud_rate` with the 8N1 framing GRBL uses.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(10))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("failed to open serial port {}: {}", port_name, e);
                Error::other(format!("failed to open port {port_name}: {e}"))
            })?;

        tracing::info!(port = port_name, baud = baud_rate, "serial port opened");
        Ok(Self {
            port,
            port_name: port_name.to_string(),
            pending: Vec::new(),
        })
    }
}

impl WireLink for SerialLink {
    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| Error::ConnectionLost(format!("{}: {e}", self.port_name)))
    }

    fn receive_lines(&mut self) -> Result<Vec<String>> {
        let mut buf = [0u8; 512];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                // a hard read failure means the device went away
                Err(e) => {
                    return Err(Error::ConnectionLost(format!("{}: {e}", self.port_name)))
                }
            }
        }

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = text.trim_end_matches('\r').trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        Ok(lines)
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}
