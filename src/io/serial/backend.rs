// src/io/serial/backend.rs
//
// Seam between the reader and the native serial binding.
// NativeBackend talks to the serialport crate; tests swap in an in-memory port.

use serde::Serialize;
use std::io::{Read, Write};
use std::time::Duration;

use super::config::SerialConfig;
use super::utils::{to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits};

/// Read timeout used by the read loop. Short, so cancellation and transmit
/// requests are picked up promptly.
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// An open serial byte stream
pub trait SerialIo: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> SerialIo for T {}

/// Information about an available serial port
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// A port with only a name and type, as for non-USB devices
    pub fn basic(port_name: &str, port_type: &str) -> Self {
        Self {
            port_name: port_name.to_string(),
            port_type: port_type.to_string(),
            manufacturer: None,
            product: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }
}

/// Port enumeration and opening
pub trait SerialBackend: Send + Sync {
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>, String>;

    fn port_exists(&self, name: &str) -> bool {
        self.list_ports()
            .map(|ports| ports.iter().any(|p| p.port_name == name))
            .unwrap_or(false)
    }

    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialIo>, String>;
}

/// The platform serial driver, via the serialport crate
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeBackend;

impl SerialBackend for NativeBackend {
    /// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
    /// The tty devices block on open waiting for carrier detect.
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>, String> {
        let ports = serialport::available_ports()
            .map_err(|e| format!("Failed to enumerate ports: {}", e))?;

        Ok(ports
            .into_iter()
            .filter(|_p| {
                #[cfg(target_os = "macos")]
                {
                    !_p.port_name.starts_with("/dev/tty.")
                }
                #[cfg(not(target_os = "macos"))]
                {
                    true
                }
            })
            .map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(info) => SerialPortInfo {
                    port_name: p.port_name,
                    port_type: "USB".to_string(),
                    manufacturer: info.manufacturer,
                    product: info.product,
                    serial_number: info.serial_number,
                    vid: Some(info.vid),
                    pid: Some(info.pid),
                },
                serialport::SerialPortType::BluetoothPort => {
                    SerialPortInfo::basic(&p.port_name, "Bluetooth")
                }
                serialport::SerialPortType::PciPort => SerialPortInfo::basic(&p.port_name, "PCI"),
                serialport::SerialPortType::Unknown => {
                    SerialPortInfo::basic(&p.port_name, "Unknown")
                }
            })
            .collect())
    }

    /// Enumerated ports, plus device paths that exist but are not enumerated
    /// (pseudo-terminals, some virtual adapters).
    fn port_exists(&self, name: &str) -> bool {
        let listed = self
            .list_ports()
            .map(|ports| ports.iter().any(|p| p.port_name == name))
            .unwrap_or(false);
        listed || (cfg!(unix) && name.starts_with("/dev/") && std::path::Path::new(name).exists())
    }

    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialIo>, String> {
        let port_name = config
            .port()
            .ok_or_else(|| "No serial port selected".to_string())?;
        let data_bits = to_serialport_data_bits(config.data_bits())?;
        let stop_bits = to_serialport_stop_bits(config.stop_bits())?;
        let parity = to_serialport_parity(config.parity())?;

        let port = serialport::new(port_name, config.baud_rate())
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| format!("Failed to open {}: {}", port_name, e))?;

        Ok(Box::new(port))
    }
}

/// List available serial ports on this machine
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, String> {
    NativeBackend.list_ports()
}
