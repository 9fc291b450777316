// src/cli.rs
//
// Command-line front end: argument parsing and the non-interactive commands.
// The full-screen terminal lives in tui.rs.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::io::serial::{list_serial_ports, Parity, TextEncoding};
use crate::io::{SerialEvent, StreamEndReason};
use crate::monitor::{MonitorBuffer, ReadCursor};
use crate::sessions::Session;
use crate::settings::{default_setup_path, Setup};

/// Bytes kept in the monitor by the headless `listen` command
const LISTEN_MONITOR_CAPACITY: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(name = "monicom", version, about = "Serial port terminal")]
pub struct Cli {
    /// Print tagged debug events ([CONNECT], [PORT_LIST], ...)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also write the log to a timestamped file, in DIR if given as
    /// --log-dir=DIR (default: <local data dir>/monicom/logs)
    #[arg(long, global = true, value_name = "DIR", num_args = 0..=1, require_equals = true)]
    pub log_dir: Option<Option<PathBuf>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open the full-screen terminal
    Connect {
        #[command(flatten)]
        line: LineArgs,
        /// File written by Ctrl-S (default: monicom-<timestamp>.txt)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Stream received bytes to stdout and send stdin lines
    Listen {
        #[command(flatten)]
        line: LineArgs,
        /// Stop after this many bytes
        #[arg(long)]
        limit: Option<u64>,
        /// Do not forward stdin to the port
        #[arg(long)]
        no_stdin: bool,
    },
    /// Write the line settings to a setup file
    ExportSetup {
        /// Destination (default: <config dir>/monicom/setup.toml)
        path: Option<PathBuf>,
        #[command(flatten)]
        line: LineArgs,
    },
    /// Print a setup file
    ShowSetup {
        /// Setup file (default: <config dir>/monicom/setup.toml)
        path: Option<PathBuf>,
    },
}

/// Line settings and terminal options shared by the commands.
/// A setup file is applied first; flags override it.
#[derive(Args, Debug, Clone, Default)]
pub struct LineArgs {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Parity: N, O, E, M, S (or none, odd, even, mark, space)
    #[arg(long)]
    pub parity: Option<String>,

    /// Data bits: 5, 6, 7 or 8
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Stop bits: 1, 1.5 or 2
    #[arg(long)]
    pub stop_bits: Option<f32>,

    /// Echo sent text into the monitor
    #[arg(long)]
    pub echo: bool,

    /// End sent lines with CR LF instead of LF
    #[arg(long)]
    pub crlf: bool,

    /// Text encoding: utf-8, latin-1 or ascii
    #[arg(long)]
    pub encoding: Option<String>,

    /// Import this setup file before applying the flags
    #[arg(long, value_name = "FILE")]
    pub setup: Option<PathBuf>,
}

impl LineArgs {
    /// Setup file (if any) with the flags layered on top, validated.
    pub fn to_setup(&self) -> Result<Setup, String> {
        let mut setup = match self.setup {
            Some(ref path) => Setup::import(path)?,
            None => Setup::default(),
        };

        if let Some(ref port) = self.port {
            setup.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            setup.baud_rate = baud;
        }
        if let Some(ref parity) = self.parity {
            let p = Parity::parse(parity).ok_or_else(|| {
                format!("Invalid parity '{}' (expected N, O, E, M or S)", parity)
            })?;
            setup.parity = p.as_char().to_string();
        }
        if let Some(bits) = self.data_bits {
            setup.data_bits = bits;
        }
        if let Some(bits) = self.stop_bits {
            setup.stop_bits = bits;
        }
        if self.echo {
            setup.echo = true;
        }
        if self.crlf {
            setup.crlf = true;
        }

        setup.to_config()?;
        Ok(setup)
    }

    pub fn encoding(&self) -> Result<TextEncoding, String> {
        match self.encoding {
            Some(ref name) => TextEncoding::parse(name)
                .ok_or_else(|| format!("Unknown encoding '{}'", name)),
            None => Ok(TextEncoding::default()),
        }
    }

    /// Configure a session from these arguments. An explicit `--port`
    /// must be available; a port from a setup file is skipped if not.
    pub fn apply_to(&self, session: &mut Session) -> Result<(), String> {
        let setup = self.to_setup()?;
        session.apply_setup(&setup)?;
        session.set_encoding(self.encoding()?);
        if let Some(ref port) = self.port {
            session.set_port(port)?;
        }
        Ok(())
    }
}

// ============================================================================
// Commands
// ============================================================================

pub async fn run_command(command: Command) -> Result<(), String> {
    match command {
        Command::Ports { json } => print_ports(json),
        Command::Connect { line, output } => {
            let mut session = Session::new();
            line.apply_to(&mut session)?;
            crate::tui::run(session, output).await
        }
        Command::Listen {
            line,
            limit,
            no_stdin,
        } => {
            let mut session = Session::with_backend(
                std::sync::Arc::new(crate::io::serial::NativeBackend),
                MonitorBuffer::with_capacity(Some(LISTEN_MONITOR_CAPACITY)),
            );
            line.apply_to(&mut session)?;
            run_listen(session, limit, !no_stdin).await
        }
        Command::ExportSetup { path, line } => {
            let path = resolve_setup_path(path)?;
            let setup = line.to_setup()?;
            setup.export(&path)?;
            println!("Setup written to {}", path.display());
            Ok(())
        }
        Command::ShowSetup { path } => {
            let path = resolve_setup_path(path)?;
            show_setup(&path)
        }
    }
}

fn resolve_setup_path(path: Option<PathBuf>) -> Result<PathBuf, String> {
    match path {
        Some(p) => Ok(p),
        None => default_setup_path(),
    }
}

fn print_ports(json: bool) -> Result<(), String> {
    let ports = list_serial_ports()?;

    if json {
        let out = serde_json::to_string_pretty(&ports)
            .map_err(|e| format!("Failed to serialize port list: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for p in ports {
        let usb = match (p.vid, p.pid) {
            (Some(vid), Some(pid)) => format!(" {:04x}:{:04x}", vid, pid),
            _ => String::new(),
        };
        let product = p.product.map(|s| format!(" {}", s)).unwrap_or_default();
        println!("{:<24} {}{}{}", p.port_name, p.port_type, usb, product);
    }
    Ok(())
}

fn show_setup(path: &Path) -> Result<(), String> {
    let setup = Setup::import(path)?;
    let config = setup.to_config()?;
    println!("{}", path.display());
    println!("  line:  {}", config.configuration_string());
    println!("  echo:  {}", setup.echo);
    println!("  crlf:  {}", setup.crlf);
    Ok(())
}

/// Headless terminal: received bytes go to stdout as they arrive, stdin
/// lines are sent with the session's line ending.
async fn run_listen(mut session: Session, limit: Option<u64>, forward_stdin: bool) -> Result<(), String> {
    session.reader_mut().set_limit(limit);
    let mut events = session.subscribe();
    session.connect().await?;
    tlog!("[listen] {}", session.title());

    let monitor = session.monitor().clone();
    let mut cursor = ReadCursor::default();
    let mut stdout = tokio::io::stdout();
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = forward_stdin;
    let mut failure: Option<String> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let (bytes, next) = monitor.read_since(cursor);
                cursor = next;
                if !bytes.is_empty() {
                    stdout
                        .write_all(&bytes)
                        .await
                        .map_err(|e| format!("Failed to write to stdout: {}", e))?;
                    stdout
                        .flush()
                        .await
                        .map_err(|e| format!("Failed to flush stdout: {}", e))?;
                }
                match event {
                    Some(SerialEvent::Bytes(_)) => {}
                    Some(SerialEvent::Ended { reason, error }) => {
                        if reason == StreamEndReason::Error || reason == StreamEndReason::Disconnected {
                            failure = Some(error.unwrap_or_else(|| format!("Port {}", reason)));
                        }
                        break;
                    }
                    None => break,
                }
            }
            line = stdin_lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(text)) => {
                        if let Err(e) = session.send_text(&text) {
                            tlog!("[listen] Send failed: {}", e);
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tlog!("[listen] stdin closed: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tlog!("[listen] Interrupted");
                break;
            }
        }
    }

    session.disconnect().await?;
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::StopBits;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_connect_flags() {
        let cli = parse(&[
            "monicom", "--debug", "connect", "-p", "/dev/ttyUSB0", "-b", "115200", "--parity",
            "even", "--data-bits", "7", "--stop-bits", "2", "--crlf",
        ]);
        assert!(cli.debug);
        match cli.command {
            Command::Connect { line, output } => {
                assert_eq!(line.port.as_deref(), Some("/dev/ttyUSB0"));
                assert!(output.is_none());
                let setup = line.to_setup().unwrap();
                assert_eq!(setup.baud_rate, 115200);
                assert_eq!(setup.parity, "E");
                assert_eq!(setup.data_bits, 7);
                assert_eq!(setup.stop_bits, 2.0);
                assert!(setup.crlf);
                assert!(!setup.echo);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flags_override_setup_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.toml");
        Setup {
            echo: true,
            baud_rate: 4800,
            stop_bits: 1.5,
            ..Setup::default()
        }
        .export(&path)
        .unwrap();

        let line = LineArgs {
            baud: Some(38400),
            setup: Some(path),
            ..LineArgs::default()
        };
        let setup = line.to_setup().unwrap();
        assert!(setup.echo);
        assert_eq!(setup.baud_rate, 38400);
        assert_eq!(setup.to_config().unwrap().stop_bits(), StopBits::OnePointFive);
    }

    #[test]
    fn test_invalid_flags_are_rejected() {
        let line = LineArgs {
            parity: Some("Z".to_string()),
            ..LineArgs::default()
        };
        assert!(line.to_setup().is_err());

        let line = LineArgs {
            data_bits: Some(12),
            ..LineArgs::default()
        };
        assert!(line.to_setup().unwrap_err().starts_with("data_bits:"));

        let line = LineArgs {
            encoding: Some("klingon".to_string()),
            ..LineArgs::default()
        };
        assert!(line.encoding().is_err());
    }

    #[test]
    fn test_parse_log_dir() {
        let cli = parse(&["monicom", "--log-dir", "ports"]);
        assert_eq!(cli.log_dir, Some(None));
        assert!(matches!(cli.command, Command::Ports { json: false }));

        let cli = parse(&["monicom", "ports", "--log-dir=/tmp/mc"]);
        assert_eq!(cli.log_dir, Some(Some(PathBuf::from("/tmp/mc"))));

        let cli = parse(&["monicom", "ports"]);
        assert_eq!(cli.log_dir, None);
    }

    #[test]
    fn test_parse_listen_and_export() {
        let cli = parse(&["monicom", "listen", "--port", "COM3", "--limit", "64", "--no-stdin"]);
        match cli.command {
            Command::Listen { line, limit, no_stdin } => {
                assert_eq!(line.port.as_deref(), Some("COM3"));
                assert_eq!(limit, Some(64));
                assert!(no_stdin);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = parse(&["monicom", "export-setup", "out.toml", "--baud", "57600"]);
        match cli.command {
            Command::ExportSetup { path, line } => {
                assert_eq!(path, Some(PathBuf::from("out.toml")));
                assert_eq!(line.baud, Some(57600));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_export_setup_command_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exported.toml");
        let line = LineArgs {
            port: Some("COM9".to_string()),
            parity: Some("O".to_string()),
            ..LineArgs::default()
        };
        run_command(Command::ExportSetup {
            path: Some(path.clone()),
            line,
        })
        .await
        .unwrap();

        let setup = Setup::import(&path).unwrap();
        assert_eq!(setup.port.as_deref(), Some("COM9"));
        assert_eq!(setup.parity, "O");
    }
}
