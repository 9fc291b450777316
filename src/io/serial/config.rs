// src/io/serial/config.rs
//
// Serial line configuration with validating setters.

use serde::Serialize;

use super::utils::{Parity, StopBits, DATA_BITS};

/// Serial port configuration.
///
/// Defaults: no port, 9600 baud, no parity, 8 data bits, 1 stop bit.
/// Setters reject invalid values and leave the previous value in place.
/// There is no `Deserialize`: stored settings come in through
/// `Setup::to_config`, which goes through the setters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SerialConfig {
    port: Option<String>,
    baud_rate: u32,
    parity: Parity,
    data_bits: u8,
    stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: StopBits::One,
        }
    }
}

impl SerialConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current port, if one has been chosen
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Store the port name without availability checks.
    /// The session checks connection state and availability before calling this.
    pub(crate) fn set_port_unchecked(&mut self, port: String) {
        self.port = Some(port);
    }

    pub(crate) fn clear_port(&mut self) {
        self.port = None;
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Any positive rate is accepted.
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), String> {
        if baud_rate == 0 {
            return Err("Baud rate must be greater than zero".to_string());
        }
        self.baud_rate = baud_rate;
        Ok(())
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    /// Parity as a single character: N, O, E, M or S
    pub fn parity_char(&self) -> char {
        self.parity.as_char()
    }

    pub fn set_parity(&mut self, parity: char) -> Result<(), String> {
        let p = Parity::from_char(parity)
            .ok_or_else(|| format!("Invalid parity '{}' (expected N, O, E, M or S)", parity))?;
        self.parity = p;
        Ok(())
    }

    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    pub fn set_data_bits(&mut self, bits: u8) -> Result<(), String> {
        if !DATA_BITS.contains(&bits) {
            return Err(format!("Invalid data bits {} (expected 5, 6, 7 or 8)", bits));
        }
        self.data_bits = bits;
        Ok(())
    }

    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    /// Stop bits as a number: 1.0, 1.5 or 2.0
    pub fn stop_bits_value(&self) -> f32 {
        self.stop_bits.as_f32()
    }

    pub fn set_stop_bits(&mut self, bits: f32) -> Result<(), String> {
        let sb = StopBits::from_f32(bits)
            .ok_or_else(|| format!("Invalid stop bits {} (expected 1, 1.5 or 2)", bits))?;
        self.stop_bits = sb;
        Ok(())
    }

    /// Frame shape in the usual shorthand, e.g. `8N1`, `7E2`, `8N1.5`.
    pub fn frame_summary(&self) -> String {
        format!(
            "{}{}{}",
            self.data_bits,
            self.parity.as_char(),
            self.stop_bits.label()
        )
    }

    /// Display string such as `COM1 9600 8N1`. An unset port shows as `none`.
    pub fn configuration_string(&self) -> String {
        format!(
            "{} {} {}",
            self.port.as_deref().unwrap_or("none"),
            self.baud_rate,
            self.frame_summary()
        )
    }
}
