//! Settings that usually stay the same between runs: which cable, how fast, and where the part
//! files live.  Read from a TOML file; command line flags override it.
//!
//! ```toml
//! cable = "usb-blaster"
//! clock_hz = 1000000
//! database = "/usr/local/share/urjtag"
//! pause = true
//! ```
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::cable::CableKind;
use crate::database::DEFAULT_DATABASE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkConfig {
    pub cable: CableKind,
    pub clock_hz: u32,
    pub database: PathBuf,
    /// Wait for the operator at every checkpoint
    pub pause: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            cable: CableKind::UsbBlaster,
            clock_hz: 1 << 20,
            database: PathBuf::from(DEFAULT_DATABASE),
            pause: true,
        }
    }
}

impl WalkConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}
