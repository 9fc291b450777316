use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Whether `tlog!` echoes to stderr. Muted while the full-screen terminal owns the screen.
pub(crate) static STDERR_ENABLED: AtomicBool = AtomicBool::new(true);

/// Whether `dlog!` messages are emitted at all.
pub(crate) static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialise file logging to the given directory.
/// Creates a timestamped log file and a `monicom.log` symlink (Unix only).
pub(crate) fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-monicom.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join("monicom.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create monicom.log symlink: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // tlog! would lock LOG_FILE again, so write directly
    eprintln!(
        "{} [logging] File logging started: {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        log_path.display()
    );

    Ok(())
}

/// Stop file logging and close the log file.
pub(crate) fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            if STDERR_ENABLED.load(Ordering::Relaxed) {
                eprintln!(
                    "{} [logging] File logging stopped",
                    chrono::Local::now().format("%H:%M:%S%.3f")
                );
            }
        }
    }
}

/// Mute or restore the stderr half of `tlog!`.
pub(crate) fn set_stderr_enabled(enabled: bool) {
    STDERR_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Turn tagged debug output on or off.
pub(crate) fn set_debug(enabled: bool) {
    DEBUG_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Read `MONICOM_DEBUG` from the environment. Any value other than
/// empty, `0` or `false` enables debug output.
pub(crate) fn debug_from_env() -> bool {
    match std::env::var("MONICOM_DEBUG") {
        Ok(v) => {
            let v = v.trim().to_ascii_lowercase();
            !(v.is_empty() || v == "0" || v == "false")
        }
        Err(_) => false,
    }
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        if $crate::logging::STDERR_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            eprintln!("{}", msg);
        }
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

/// Tagged debug event, e.g. `dlog!("CONNECT", "Connected to {}", port)`.
/// Emitted through `tlog!` as `[CONNECT] ...` only when debug output is on.
macro_rules! dlog {
    ($tag:expr, $($arg:tt)*) => {{
        if $crate::logging::DEBUG_ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            tlog!("[{}] {}", $tag, format_args!($($arg)*));
        }
    }};
}
