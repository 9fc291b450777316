// src/io/mod.rs
//
// Shared IO types: device lifecycle state, the IODevice trait, transmit
// results and the events a running reader sends to its front end.

pub mod serial;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use types::{SerialEvent, StreamEndReason, TransmitRequest, TransmitSender};

/// Get current timestamp in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Result of a transmit operation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransmitResult {
    /// Whether the transmission was successful
    pub success: bool,
    /// Timestamp when the bytes were written (microseconds since UNIX epoch)
    pub timestamp_us: u64,
    /// Number of bytes written
    pub bytes_written: usize,
    /// Error message if transmission failed
    pub error: Option<String>,
}

impl TransmitResult {
    /// Create a successful transmit result with current timestamp
    pub fn success(bytes_written: usize) -> Self {
        Self {
            success: true,
            timestamp_us: now_us(),
            bytes_written,
            error: None,
        }
    }

    /// Create a failed transmit result with an error message
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            timestamp_us: now_us(),
            bytes_written: 0,
            error: Some(message),
        }
    }
}

// ============================================================================
// IO Device Trait
// ============================================================================

/// Lifecycle state of an IO device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IOState {
    Stopped,
    Starting,
    Running,
    Paused,
    Error(String),
}

impl IOState {
    /// Running or paused: the port is open either way.
    pub fn is_open(&self) -> bool {
        matches!(self, IOState::Running | IOState::Paused)
    }
}

/// A live byte-stream device.
#[async_trait]
pub trait IODevice: Send + Sync {
    /// Open the device and start streaming
    async fn start(&mut self) -> Result<(), String>;

    /// Stop streaming and release the device
    async fn stop(&mut self) -> Result<(), String>;

    /// Keep the device open but discard incoming data
    async fn pause(&mut self) -> Result<(), String>;

    /// Resume delivering incoming data
    async fn resume(&mut self) -> Result<(), String>;

    /// Current lifecycle state
    fn state(&self) -> IOState;

    /// Write raw bytes to the device
    fn transmit(&self, bytes: &[u8]) -> Result<TransmitResult, String>;
}
