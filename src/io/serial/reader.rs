// src/io/serial/reader.rs
//
// Serial port reader: connect/disconnect lifecycle around a native serial
// handle, plus the background loop that streams incoming bytes into the
// monitor buffer and services transmit requests.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::mpsc as std_mpsc;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::backend::{NativeBackend, SerialBackend, SerialIo};
use super::config::SerialConfig;
use super::utils::TextEncoding;
use crate::io::types::{SerialEvent, StreamEndReason, TransmitRequest, TransmitSender};
use crate::io::{IODevice, IOState, TransmitResult};
use crate::monitor::MonitorBuffer;
use crate::port_tracker::{self, ClaimToken};

/// Application name used to claim ports when none is given
pub const DEFAULT_APP_NAME: &str = "monicom";

/// How long `open` waits for another owner to release a contended port
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Received bytes are handed to the monitor at most this often
const FLUSH_INTERVAL: Duration = Duration::from_millis(25);

/// How long a transmit waits for the read loop to report the write result
const TRANSMIT_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// Serial Reader
// ============================================================================

/// A serial connection: configuration, open port and listener thread.
pub struct SerialReader {
    config: SerialConfig,
    backend: Arc<dyn SerialBackend>,
    monitor: MonitorBuffer,
    events: Option<mpsc::UnboundedSender<SerialEvent>>,
    state: IOState,
    /// Application name the port is claimed under
    app_name: String,
    open_timeout: Duration,
    /// Stop after this many bytes (None = no limit)
    limit: Option<u64>,
    cancel_flag: Arc<AtomicBool>,
    pause_flag: Arc<AtomicBool>,
    /// Cleared by the read loop when it exits on its own
    alive_flag: Arc<AtomicBool>,
    /// Set by the read loop when a read error ended the stream
    last_error: Arc<Mutex<Option<String>>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    /// Channel sender for transmit requests
    transmit_tx: Arc<Mutex<Option<TransmitSender>>>,
    /// Port held in the port tracker while open
    claimed_port: Option<(String, ClaimToken)>,
}

impl SerialReader {
    /// Reader over the platform serial driver
    pub fn new(config: SerialConfig, monitor: MonitorBuffer) -> Self {
        Self::with_backend(config, monitor, Arc::new(NativeBackend))
    }

    pub fn with_backend(
        config: SerialConfig,
        monitor: MonitorBuffer,
        backend: Arc<dyn SerialBackend>,
    ) -> Self {
        Self {
            config,
            backend,
            monitor,
            events: None,
            state: IOState::Stopped,
            app_name: DEFAULT_APP_NAME.to_string(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            limit: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            pause_flag: Arc::new(AtomicBool::new(false)),
            alive_flag: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
            task_handle: None,
            transmit_tx: Arc::new(Mutex::new(None)),
            claimed_port: None,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Mutable configuration. Changes apply on the next open.
    pub fn config_mut(&mut self) -> &mut SerialConfig {
        &mut self.config
    }

    pub fn backend(&self) -> &Arc<dyn SerialBackend> {
        &self.backend
    }

    pub fn monitor(&self) -> &MonitorBuffer {
        &self.monitor
    }

    /// Stop reading after `limit` bytes. Takes effect on the next open.
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
    }

    /// Receive stream events from the next open onwards.
    /// Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SerialEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Open the configured port on behalf of `app_name`, waiting up to
    /// `timeout` for another owner to release it.
    pub async fn open(&mut self, app_name: &str, timeout: Duration) -> Result<(), String> {
        self.app_name = app_name.to_string();
        self.open_timeout = timeout;
        self.start().await
    }

    /// Close the port. Closing a closed reader is a no-op.
    pub async fn close(&mut self) -> Result<(), String> {
        self.stop().await
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Encode and send a string.
    pub fn send_string(&self, text: &str, encoding: TextEncoding) -> Result<TransmitResult, String> {
        let bytes = encoding.encode(text)?;
        self.transmit(&bytes)
    }

    fn release_claim(&mut self) {
        if let Some((port, token)) = self.claimed_port.take() {
            port_tracker::release(&port, token);
        }
    }

    fn take_last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|mut e| e.take())
    }
}

#[async_trait]
impl IODevice for SerialReader {
    async fn start(&mut self) -> Result<(), String> {
        if self.state().is_open() {
            return Err("Reader is already running".to_string());
        }
        // A loop that ended on its own may still hold a finished handle
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }

        let port_name = self
            .config
            .port()
            .ok_or_else(|| "No serial port selected".to_string())?
            .to_string();

        self.state = IOState::Starting;

        // Claiming may wait on a contended port and opening talks to the
        // driver, so both run off the async thread.
        let backend = self.backend.clone();
        let config = self.config.clone();
        let app_name = self.app_name.clone();
        let timeout = self.open_timeout;
        let claim_port = port_name.clone();
        let opened = tokio::task::spawn_blocking(
            move || -> Result<(Box<dyn SerialIo>, ClaimToken), String> {
                let token = port_tracker::claim_with_timeout(&claim_port, &app_name, timeout)?;
                match backend.open(&config) {
                    Ok(port) => Ok((port, token)),
                    Err(e) => {
                        port_tracker::release(&claim_port, token);
                        Err(e)
                    }
                }
            },
        )
        .await
        .map_err(|e| format!("Open task failed: {}", e))
        .and_then(|r| r);

        let (port, token) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                dlog!("OPEN_ERROR", "{}", e);
                self.state = IOState::Stopped;
                return Err(e);
            }
        };
        self.claimed_port = Some((port_name.clone(), token));
        self.take_last_error();

        self.cancel_flag.store(false, Ordering::Relaxed);
        self.pause_flag.store(false, Ordering::Relaxed);
        self.alive_flag.store(true, Ordering::Relaxed);

        let (transmit_tx, transmit_rx) = std_mpsc::sync_channel::<TransmitRequest>(32);
        {
            let mut guard = self
                .transmit_tx
                .lock()
                .map_err(|e| format!("Failed to lock transmit_tx: {}", e))?;
            *guard = Some(transmit_tx);
        }

        tlog!(
            "[Serial] Opened {} [transmit: enabled, limit: {:?}]",
            self.config.configuration_string(),
            self.limit
        );
        dlog!("CONNECT", "Connected to {} and everything is setup.", port_name);

        let ctx = StreamContext {
            port_name,
            token,
            monitor: self.monitor.clone(),
            events: self.events.clone(),
            cancel_flag: self.cancel_flag.clone(),
            pause_flag: self.pause_flag.clone(),
            alive_flag: self.alive_flag.clone(),
            last_error: self.last_error.clone(),
            transmit_rx,
            limit: self.limit,
        };
        self.task_handle = Some(spawn_serial_stream(port, ctx));
        self.state = IOState::Running;

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), String> {
        self.cancel_flag.store(true, Ordering::Relaxed);

        if let Ok(mut guard) = self.transmit_tx.lock() {
            *guard = None;
        }

        let was_open = self.task_handle.is_some();
        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }

        self.release_claim();
        self.take_last_error();
        if was_open {
            dlog!("DISCONNECT", "Port closed.");
        }
        self.state = IOState::Stopped;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), String> {
        if self.state() != IOState::Running {
            return Err("Reader is not running".to_string());
        }
        self.pause_flag.store(true, Ordering::Relaxed);
        self.state = IOState::Paused;
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), String> {
        if self.state() != IOState::Paused {
            return Err("Reader is not paused".to_string());
        }
        self.pause_flag.store(false, Ordering::Relaxed);
        self.state = IOState::Running;
        Ok(())
    }

    /// Once the read loop has exited on its own this reports `Error` if a
    /// read error ended it, otherwise `Stopped`, until the next stop or start.
    fn state(&self) -> IOState {
        if self.state.is_open() && !self.alive_flag.load(Ordering::Relaxed) {
            let error = self.last_error.lock().ok().and_then(|e| e.clone());
            return match error {
                Some(e) => IOState::Error(e),
                None => IOState::Stopped,
            };
        }
        self.state.clone()
    }

    fn transmit(&self, bytes: &[u8]) -> Result<TransmitResult, String> {
        if bytes.is_empty() {
            return Ok(TransmitResult::error("No bytes to transmit".to_string()));
        }
        if !self.state().is_open() {
            return Err("Not connected".to_string());
        }

        let tx = {
            let guard = self
                .transmit_tx
                .lock()
                .map_err(|e| format!("Failed to lock transmit channel: {}", e))?;
            guard.clone().ok_or("Not connected (no transmit channel)")?
        };

        let (result_tx, result_rx) = std_mpsc::sync_channel(1);

        tx.try_send(TransmitRequest {
            data: bytes.to_vec(),
            result_tx,
        })
        .map_err(|e| format!("Failed to queue transmit request: {}", e))?;

        let result = result_rx
            .recv_timeout(TRANSMIT_TIMEOUT)
            .map_err(|e| format!("Transmit timeout or channel closed: {}", e))?;

        result?;

        Ok(TransmitResult::success(bytes.len()))
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
        self.release_claim();
    }
}

// ============================================================================
// Read Loop
// ============================================================================

/// Everything the read loop needs besides the port itself
struct StreamContext {
    port_name: String,
    token: ClaimToken,
    monitor: MonitorBuffer,
    events: Option<mpsc::UnboundedSender<SerialEvent>>,
    cancel_flag: Arc<AtomicBool>,
    pause_flag: Arc<AtomicBool>,
    alive_flag: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    transmit_rx: std_mpsc::Receiver<TransmitRequest>,
    limit: Option<u64>,
}

impl StreamContext {
    fn emit(&self, event: SerialEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    fn flush(&self, pending: &mut Vec<u8>) {
        if pending.is_empty() {
            return;
        }
        self.monitor.append(pending);
        self.emit(SerialEvent::Bytes(pending.len()));
        pending.clear();
    }
}

/// Run the blocking read loop on the blocking thread pool
fn spawn_serial_stream(port: Box<dyn SerialIo>, ctx: StreamContext) -> tokio::task::JoinHandle<()> {
    let alive_flag = ctx.alive_flag.clone();
    let events = ctx.events.clone();
    let port_name = ctx.port_name.clone();
    let token = ctx.token;
    let last_error = ctx.last_error.clone();

    // Started here rather than inside the watcher task so the loop is
    // running before the caller's first transmit
    let blocking = tokio::task::spawn_blocking(move || run_serial_stream_blocking(port, ctx));

    tokio::spawn(async move {
        if let Err(e) = blocking.await {
            tlog!("[Serial] Task panicked: {:?}", e);
            port_tracker::release(&port_name, token);
            if let Ok(mut slot) = last_error.lock() {
                *slot = Some("Serial task panicked".to_string());
            }
            alive_flag.store(false, Ordering::Relaxed);
            if let Some(tx) = events {
                let _ = tx.send(SerialEvent::Ended {
                    reason: StreamEndReason::Error,
                    error: Some("Serial task panicked".to_string()),
                });
            }
        }
    })
}

/// Blocking read loop. Returns why the stream ended.
fn run_serial_stream_blocking(mut port: Box<dyn SerialIo>, ctx: StreamContext) -> StreamEndReason {
    let mut buf = [0u8; 256];
    let mut pending: Vec<u8> = Vec::with_capacity(256);
    let mut last_flush = Instant::now();
    let mut total_bytes_read: u64 = 0;
    let mut error: Option<String> = None;

    let reason = loop {
        if ctx.cancel_flag.load(Ordering::Relaxed) {
            break StreamEndReason::Stopped;
        }

        if let Some(limit) = ctx.limit {
            if total_bytes_read >= limit {
                tlog!("[Serial:{}] Reached limit of {} bytes, stopping", ctx.port_name, limit);
                break StreamEndReason::Complete;
            }
        }

        // Writes happen here so the port has a single owner
        while let Ok(req) = ctx.transmit_rx.try_recv() {
            let result = port
                .write_all(&req.data)
                .and_then(|_| port.flush())
                .map_err(|e| format!("Serial write error: {}", e));
            let _ = req.result_tx.try_send(result);
        }

        // While paused the port is still drained so the driver buffer does
        // not fill, but the data is dropped. Bytes read before the pause
        // are kept.
        let paused = ctx.pause_flag.load(Ordering::Relaxed);
        if paused {
            ctx.flush(&mut pending);
        }

        match port.read(&mut buf) {
            Ok(0) => {
                break StreamEndReason::Disconnected;
            }
            Ok(_) if paused => {}
            Ok(n) => {
                let take = match ctx.limit {
                    Some(limit) => n.min((limit - total_bytes_read) as usize),
                    None => n,
                };
                pending.extend_from_slice(&buf[..take]);
                total_bytes_read += take as u64;
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                error = Some(format!("Read error: {}", e));
                break StreamEndReason::Error;
            }
        }

        if last_flush.elapsed() >= FLUSH_INTERVAL {
            ctx.flush(&mut pending);
            last_flush = Instant::now();
        }
    };

    ctx.flush(&mut pending);
    drop(port);
    port_tracker::release(&ctx.port_name, ctx.token);
    if let Some(ref e) = error {
        if let Ok(mut slot) = ctx.last_error.lock() {
            *slot = Some(e.clone());
        }
    }
    ctx.alive_flag.store(false, Ordering::Relaxed);

    match &error {
        Some(e) => tlog!("[Serial:{}] Stream ended ({}): {}", ctx.port_name, reason, e),
        None => tlog!(
            "[Serial:{}] Stream ended ({}) after {} bytes",
            ctx.port_name,
            reason,
            total_bytes_read
        ),
    }
    ctx.emit(SerialEvent::Ended { reason, error });

    reason
}

// ============================================================================
// Tests
// ============================================================================
