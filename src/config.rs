//! Capture configuration, read from TOML.
//!
//! Every field is optional in the file; whatever is left out falls back to
//! the bench defaults below (an MXO on USB with channel 1 AC coupled and an
//! auto edge trigger at 0 V).
//!
//! ```toml
//! resource = "TCPIP0::192.168.2.2::INSTR"
//! timeout_ms = 10000
//!
//! [acquisition]
//! acquisition_time_s = 1.2e-3
//!
//! [acquisition.channel]
//! range_v = 0.6
//! coupling = "DCL"
//!
//! [output]
//! csv_path = "waveform_data.csv"
//! plot_path = "waveform.svg"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::devices::mxo::{AcquisitionSetup, DEFAULT_SINGLE_TIMEOUT_MS};
use crate::error::Result;
use crate::rpc::port_mapping::PMAP_PORT;
use crate::visa::SessionOptions;

pub const DEFAULT_RESOURCE: &str = "USB0::0x0AAD::0x01D6::111986::INSTR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// VISA resource address of the oscilloscope
    pub resource: String,
    /// I/O timeout for ordinary commands and queries
    pub timeout_ms: u64,
    /// Port of the RPC portmapper used to find the VXI-11 core channel
    pub portmapper_port: u16,
    /// Verify with `*IDN?` that the instrument is an MXO before touching it
    pub id_query: bool,
    /// Send `*RST` before configuring
    pub reset: bool,
    /// Drain `SYST:ERR?` after every command
    pub status_checking: bool,
    /// How long the single acquisition may take
    pub single_timeout_ms: u64,
    pub acquisition: AcquisitionSetup,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    /// No plot is rendered when unset
    pub plot_path: Option<PathBuf>,
    pub plot_width: u32,
    pub plot_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            resource: DEFAULT_RESOURCE.to_owned(),
            timeout_ms: 10_000,
            portmapper_port: PMAP_PORT,
            id_query: true,
            reset: true,
            status_checking: false,
            single_timeout_ms: DEFAULT_SINGLE_TIMEOUT_MS,
            acquisition: AcquisitionSetup::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            csv_path: PathBuf::from("waveform_data.csv"),
            plot_path: Some(PathBuf::from("waveform.svg")),
            plot_width: 1600,
            plot_height: 800,
        }
    }
}

impl CaptureConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            portmapper_port: self.portmapper_port,
        }
    }
}
