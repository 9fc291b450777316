// src/sessions.rs
//
// Terminal session: one serial reader, its monitor buffer and the
// terminal options (echo, line ending, text encoding). Front ends drive
// everything through this type.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::io::serial::{
    NativeBackend, SerialBackend, SerialConfig, SerialReader, TextEncoding, DEFAULT_APP_NAME,
    DEFAULT_OPEN_TIMEOUT,
};
use crate::io::{IODevice, IOState, SerialEvent, TransmitResult};
use crate::monitor::MonitorBuffer;
use crate::port_tracker;
use crate::settings::Setup;

pub struct Session {
    reader: SerialReader,
    echo: bool,
    crlf: bool,
    encoding: TextEncoding,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Session over the platform serial driver with an unbounded monitor
    pub fn new() -> Self {
        Self::with_backend(Arc::new(NativeBackend), MonitorBuffer::new())
    }

    pub fn with_backend(backend: Arc<dyn SerialBackend>, monitor: MonitorBuffer) -> Self {
        Self {
            reader: SerialReader::with_backend(SerialConfig::default(), monitor, backend),
            echo: false,
            crlf: false,
            encoding: TextEncoding::default(),
        }
    }

    pub fn reader(&self) -> &SerialReader {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut SerialReader {
        &mut self.reader
    }

    pub fn config(&self) -> &SerialConfig {
        self.reader.config()
    }

    /// Line settings other than the port. Changes apply on the next connect.
    pub fn config_mut(&mut self) -> &mut SerialConfig {
        self.reader.config_mut()
    }

    pub fn monitor(&self) -> &MonitorBuffer {
        self.reader.monitor()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SerialEvent> {
        self.reader.subscribe()
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub fn crlf(&self) -> bool {
        self.crlf
    }

    pub fn set_crlf(&mut self, crlf: bool) {
        self.crlf = crlf;
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: TextEncoding) {
        self.encoding = encoding;
    }

    pub fn state(&self) -> IOState {
        self.reader.state()
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    // ------------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------------

    /// Names of the serial ports on this machine
    pub fn ports(&self) -> Result<Vec<String>, String> {
        let ports = self.reader.backend().list_ports()?;
        for p in &ports {
            dlog!("PORT_LIST", "{}: {}", p.port_type, p.port_name);
        }
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    /// A port is available when it exists and no open connection owns it.
    pub fn is_available(&self, port: &str) -> bool {
        self.reader.backend().port_exists(port) && !port_tracker::is_owned(port)
    }

    /// Choose the port. Only allowed while disconnected, and only for an
    /// available port.
    pub fn set_port(&mut self, port: &str) -> Result<(), String> {
        if self.is_connected() {
            return Err("Cannot change the port while connected".to_string());
        }
        if !self.is_available(port) {
            return Err(format!("Port {} is not available", port));
        }
        self.reader.config_mut().set_port_unchecked(port.to_string());
        dlog!("PORT_SELECTED", "{}", port);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub async fn connect(&mut self) -> Result<(), String> {
        self.reader
            .open(DEFAULT_APP_NAME, DEFAULT_OPEN_TIMEOUT)
            .await
            .map_err(|e| {
                format!(
                    "Unable to open serial port {}: {}",
                    self.reader.config().port().unwrap_or("none"),
                    e
                )
            })
    }

    pub async fn disconnect(&mut self) -> Result<(), String> {
        self.reader.close().await
    }

    /// Disconnect and return everything to defaults: line settings,
    /// terminal options and an empty monitor.
    pub async fn new_session(&mut self) -> Result<(), String> {
        self.reader.close().await?;
        *self.reader.config_mut() = SerialConfig::default();
        self.reader.monitor().clear();
        self.echo = false;
        self.crlf = false;
        self.encoding = TextEncoding::default();
        tlog!("[session] New session");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------------

    /// Line ending appended by `send_text`
    pub fn line_ending(&self) -> &'static str {
        if self.crlf {
            "\r\n"
        } else {
            "\n"
        }
    }

    /// Send one line of text. The line ending is appended; with echo on,
    /// the full line is also appended to the monitor.
    pub fn send_text(&self, line: &str) -> Result<TransmitResult, String> {
        if !self.is_connected() {
            return Err("Not connected".to_string());
        }
        let text = format!("{}{}", line, self.line_ending());
        let bytes = self.encoding.encode(&text)?;

        if self.echo {
            self.reader.monitor().append(&bytes);
        }
        self.reader.transmit(&bytes)
    }

    /// Write the monitor contents to a file
    pub fn save_output(&self, path: &Path) -> Result<usize, String> {
        self.reader.monitor().save_to_file(path, self.encoding)
    }

    // ------------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------------

    /// Current options as a flat setup record
    pub fn setup(&self) -> Setup {
        Setup::from_config(self.reader.config(), self.echo, self.crlf)
    }

    /// Apply an imported setup. Line settings are validated first and
    /// nothing changes if any are invalid. A port that is not available
    /// is skipped with a warning and the current port kept.
    pub fn apply_setup(&mut self, setup: &Setup) -> Result<(), String> {
        let mut next = setup.to_config()?;
        if self.is_connected() {
            return Err("Cannot apply a setup while connected".to_string());
        }

        let keep_current_port = match next.port() {
            Some(port) if !self.is_available(port) => {
                tlog!("[session] Port {} from setup is not available, keeping current port", port);
                true
            }
            Some(_) => false,
            None => true,
        };
        if keep_current_port {
            match self.reader.config().port() {
                Some(current) => next.set_port_unchecked(current.to_string()),
                None => next.clear_port(),
            }
        }

        *self.reader.config_mut() = next;
        self.echo = setup.echo;
        self.crlf = setup.crlf;
        Ok(())
    }

    /// Window/status title, e.g. `monicom - COM1 9600 8N1 [connected]`
    pub fn title(&self) -> String {
        format!(
            "monicom - {}{}",
            self.reader.config().configuration_string(),
            match self.state() {
                IOState::Running => " [connected]",
                IOState::Paused => " [paused]",
                IOState::Error(_) => " [error]",
                _ => "",
            }
        )
    }
}
