// src/io/serial/mod.rs
//
// Serial port driver: line configuration, the native binding seam and the
// reader that owns an open port.
//
// Features:
// - Raw byte streaming into the monitor buffer
// - Bidirectional communication (read + transmit)
// - Port ownership via the port tracker

pub mod backend;
pub mod config;
pub mod reader;
pub mod utils;

pub use backend::{list_serial_ports, NativeBackend, SerialBackend, SerialIo, SerialPortInfo};
pub use config::SerialConfig;
pub use reader::{SerialReader, DEFAULT_APP_NAME, DEFAULT_OPEN_TIMEOUT};
pub use utils::{Parity, StopBits, TextEncoding};
