#[macro_use]
mod logging;

pub mod cli;
pub mod io;
pub mod monitor;
pub mod port_tracker;
pub mod sessions;
pub mod settings;
pub mod tui;

pub use io::serial::{Parity, SerialConfig, SerialReader, StopBits, TextEncoding};
pub use monitor::{MonitorBuffer, ReadCursor};
pub use sessions::Session;
pub use settings::Setup;

use clap::Parser;

/// Parse the command line, set up logging and run the chosen command.
/// Returns the process exit code.
pub fn run() -> i32 {
    let cli = cli::Cli::parse();

    logging::set_debug(cli.debug || logging::debug_from_env());

    if let Some(ref dir) = cli.log_dir {
        let dir = dir.clone().unwrap_or_else(settings::default_log_dir);
        if let Err(e) = logging::init_file_logging(&dir) {
            eprintln!("[setup] Failed to start file logging: {}", e);
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("[setup] Failed to start async runtime: {}", e);
            return 1;
        }
    };

    let result = runtime.block_on(cli::run_command(cli.command));
    logging::stop_file_logging();

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("monicom: {}", e);
            1
        }
    }
}
