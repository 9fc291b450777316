// src/io/types.rs
//
// Channel message types shared between a reader's blocking loop and its owner.

use serde::Serialize;
use std::fmt;
use std::sync::mpsc as std_mpsc;

// ============================================================================
// Reader Events
// ============================================================================

/// Why a stream ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamEndReason {
    /// Closed on request
    Stopped,
    /// The port returned end-of-file (device unplugged)
    Disconnected,
    /// A read error ended the stream
    Error,
    /// The configured byte limit was reached
    Complete,
}

impl fmt::Display for StreamEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamEndReason::Stopped => "stopped",
            StreamEndReason::Disconnected => "disconnected",
            StreamEndReason::Error => "error",
            StreamEndReason::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Message from the read loop to whoever is displaying the monitor
#[derive(Clone, Debug, PartialEq)]
pub enum SerialEvent {
    /// This many bytes were appended to the monitor
    Bytes(usize),
    /// The read loop exited
    Ended {
        reason: StreamEndReason,
        error: Option<String>,
    },
}

// ============================================================================
// Transmit Types
// ============================================================================

/// Transmit request sent through the channel
pub struct TransmitRequest {
    /// Bytes to write, already encoded
    pub data: Vec<u8>,
    /// Sync oneshot channel to send the result back
    pub result_tx: std_mpsc::SyncSender<Result<(), String>>,
}

/// Sender type for transmit requests (sync-safe)
pub type TransmitSender = std_mpsc::SyncSender<TransmitRequest>;
