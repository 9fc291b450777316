// src/io/serial/utils.rs
//
// Line parameter types and their conversions to the serialport crate.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits as SpStopBits};

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl Parity {
    /// Parse the single-character form (`N`, `O`, `E`, `M`, `S`), case-insensitive.
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Parity::None),
            'O' => Some(Parity::Odd),
            'E' => Some(Parity::Even),
            'M' => Some(Parity::Mark),
            'S' => Some(Parity::Space),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }

    /// Parse either the letter or the full name ("none", "odd", ...).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Parity::from_char(c);
        }
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Parity::None),
            "odd" => Some(Parity::Odd),
            "even" => Some(Parity::Even),
            "mark" => Some(Parity::Mark),
            "space" => Some(Parity::Space),
            _ => None,
        }
    }
}

/// Number of stop bits terminating each frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    /// Accepts exactly 1, 1.5 or 2.
    pub fn from_f32(bits: f32) -> Option<Self> {
        if bits == 1.0 {
            Some(StopBits::One)
        } else if bits == 1.5 {
            Some(StopBits::OnePointFive)
        } else if bits == 2.0 {
            Some(StopBits::Two)
        } else {
            None
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            StopBits::One => 1.0,
            StopBits::OnePointFive => 1.5,
            StopBits::Two => 2.0,
        }
    }

    /// Short display form: "1", "1.5", "2"
    pub fn label(self) -> &'static str {
        match self {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        }
    }
}

/// Valid data bit widths
pub const DATA_BITS: [u8; 4] = [5, 6, 7, 8];

/// Common baud rates offered by the front ends. Any positive rate is accepted.
pub const COMMON_BAUD_RATES: [u32; 11] = [
    75, 110, 300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
];

/// Character encoding used when sending text and rendering the monitor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// One byte per char, U+0000..=U+00FF
    Latin1,
    Ascii,
}

impl TextEncoding {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Some(TextEncoding::Latin1),
            "ascii" | "us-ascii" => Some(TextEncoding::Ascii),
            _ => None,
        }
    }

    /// Encode text for the wire. Characters outside the encoding are an error.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, String> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 | TextEncoding::Ascii => {
                let max = if self == TextEncoding::Latin1 { 0xFF } else { 0x7F };
                text.chars()
                    .map(|c| {
                        let code = c as u32;
                        if code <= max {
                            Ok(code as u8)
                        } else {
                            Err(format!("Character {:?} cannot be encoded as {:?}", c, self))
                        }
                    })
                    .collect()
            }
        }
    }

    /// Decode received bytes for display. Never fails.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
            TextEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type.
/// The native binding has no mark/space parity.
pub fn to_serialport_parity(p: Parity) -> Result<SpParity, String> {
    match p {
        Parity::None => Ok(SpParity::None),
        Parity::Odd => Ok(SpParity::Odd),
        Parity::Even => Ok(SpParity::Even),
        Parity::Mark | Parity::Space => Err(format!(
            "{:?} parity is not supported by the serial driver",
            p
        )),
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(format!("Invalid data bits: {}", other)),
    }
}

/// Convert stop bits to serialport crate's StopBits type.
/// The native binding has no 1.5 stop bit setting.
pub fn to_serialport_stop_bits(bits: StopBits) -> Result<SpStopBits, String> {
    match bits {
        StopBits::One => Ok(SpStopBits::One),
        StopBits::Two => Ok(SpStopBits::Two),
        StopBits::OnePointFive => {
            Err("1.5 stop bits are not supported by the serial driver".to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
