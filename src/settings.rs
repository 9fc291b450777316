// src/settings.rs
//
// Setup export/import. A setup is a flat key-value record of the terminal
// options and line settings, stored as TOML with scalar keys only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::io::serial::{Parity, SerialConfig};

/// Header comment written at the top of exported setups
const SETUP_HEADER: &str = "# monicom setup";

/// Flat setup record. Missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Setup {
    /// Echo sent text into the monitor
    pub echo: bool,
    /// Terminate sent lines with CR LF instead of LF
    pub crlf: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Single letter: N, O, E, M or S
    pub parity: String,
    pub data_bits: u8,
    pub stop_bits: f32,
}

impl Default for Setup {
    fn default() -> Self {
        Setup::from_config(&SerialConfig::default(), false, false)
    }
}

impl Setup {
    pub fn from_config(config: &SerialConfig, echo: bool, crlf: bool) -> Self {
        Self {
            echo,
            crlf,
            port: config.port().map(str::to_string),
            baud_rate: config.baud_rate(),
            parity: config.parity_char().to_string(),
            data_bits: config.data_bits(),
            stop_bits: config.stop_bits_value(),
        }
    }

    /// Build a line configuration from the setup's values, naming the key
    /// of the first invalid value. The port is copied as-is; availability
    /// is the session's concern.
    pub fn to_config(&self) -> Result<SerialConfig, String> {
        let mut config = SerialConfig::default();
        config
            .set_baud_rate(self.baud_rate)
            .map_err(|e| format!("baud_rate: {}", e))?;

        let parity = Parity::parse(&self.parity)
            .ok_or_else(|| format!("parity: Invalid parity '{}'", self.parity))?;
        config
            .set_parity(parity.as_char())
            .map_err(|e| format!("parity: {}", e))?;

        config
            .set_data_bits(self.data_bits)
            .map_err(|e| format!("data_bits: {}", e))?;
        config
            .set_stop_bits(self.stop_bits)
            .map_err(|e| format!("stop_bits: {}", e))?;

        if let Some(ref port) = self.port {
            if !port.trim().is_empty() {
                config.set_port_unchecked(port.trim().to_string());
            }
        }
        Ok(config)
    }

    /// Parse setup text. Values are validated.
    pub fn parse(content: &str) -> Result<Self, String> {
        let setup: Setup =
            toml::from_str(content).map_err(|e| format!("Failed to parse setup: {}", e))?;
        setup.to_config()?;
        Ok(setup)
    }

    /// Render as setup file text, header included.
    pub fn render(&self) -> Result<String, String> {
        let body =
            toml::to_string(self).map_err(|e| format!("Failed to serialize setup: {}", e))?;
        Ok(format!(
            "{}\n# {}\n{}",
            SETUP_HEADER,
            chrono::Local::now().format("%a %b %d %H:%M:%S %Z %Y"),
            body
        ))
    }

    /// Write this setup to `path`, creating parent directories.
    pub fn export(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create setup directory: {}", e))?;
            }
        }
        let content = self.render()?;
        std::fs::write(path, content)
            .map_err(|e| format!("Unable to write to {}: {}", path.display(), e))?;
        dlog!("SAVE_SETUP", "{}", path.display());
        Ok(())
    }

    /// Read a setup from `path`.
    pub fn import(path: &Path) -> Result<Self, String> {
        dlog!("OPEN_SETUP", "{}", path.display());
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read {}: {}", path.display(), e))?;
        Setup::parse(&content)
    }
}

/// `<config dir>/monicom/setup.toml`
pub fn default_setup_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("monicom").join("setup.toml"))
        .ok_or_else(|| "Failed to locate the user config directory".to_string())
}

/// `<local data dir>/monicom/logs`, the default log directory
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("monicom")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::StopBits;

    #[test]
    fn test_default_setup_matches_default_config() {
        let setup = Setup::default();
        assert!(!setup.echo);
        assert!(!setup.crlf);
        assert_eq!(setup.port, None);
        assert_eq!(setup.baud_rate, 9600);
        assert_eq!(setup.parity, "N");
        assert_eq!(setup.data_bits, 8);
        assert_eq!(setup.stop_bits, 1.0);
    }

    #[test]
    fn test_export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bench.toml");

        let setup = Setup {
            echo: true,
            crlf: true,
            port: Some("/dev/ttyUSB0".to_string()),
            baud_rate: 115200,
            parity: "E".to_string(),
            data_bits: 7,
            stop_bits: 1.5,
        };
        setup.export(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# monicom setup\n"));
        assert!(content.contains("baud_rate = 115200"));

        let loaded = Setup::import(&path).unwrap();
        assert_eq!(loaded, setup);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let setup = Setup::parse("baud_rate = 57600\nstop_bits = 2\n").unwrap();
        assert_eq!(setup.baud_rate, 57600);
        assert_eq!(setup.stop_bits, 2.0);
        assert_eq!(setup.parity, "N");
        assert_eq!(setup.data_bits, 8);
        assert!(!setup.echo);
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let err = Setup::parse("data_bits = 9\n").unwrap_err();
        assert!(err.starts_with("data_bits:"), "{}", err);

        let err = Setup::parse("parity = \"X\"\n").unwrap_err();
        assert!(err.starts_with("parity:"), "{}", err);

        let err = Setup::parse("baud_rate = 0\n").unwrap_err();
        assert!(err.starts_with("baud_rate:"), "{}", err);

        let err = Setup::parse("stop_bits = 3\n").unwrap_err();
        assert!(err.starts_with("stop_bits:"), "{}", err);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = Setup::parse("this is not a setup").unwrap_err();
        assert!(err.starts_with("Failed to parse setup"));
    }

    #[test]
    fn test_to_config_accepts_parity_names() {
        let setup = Setup {
            parity: "odd".to_string(),
            stop_bits: 1.5,
            port: Some("COM4".to_string()),
            ..Setup::default()
        };
        let config = setup.to_config().unwrap();
        assert_eq!(config.parity(), Parity::Odd);
        assert_eq!(config.stop_bits(), StopBits::OnePointFive);
        assert_eq!(config.port(), Some("COM4"));
    }

    #[test]
    fn test_import_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Setup::import(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.starts_with("Unable to read"));
    }
}
