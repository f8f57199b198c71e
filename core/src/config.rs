//! Node configuration read from `<datadir>/chainee.conf`.
//!
//! The file is INI-style `key=value` lines in an implicit default
//! section. Keys are case-insensitive, blank lines and `#`/`;` comments
//! are skipped. Two keys are understood:
//!
//! * `genesisbenficiary`: address credited by the genesis block. The
//!   key keeps its historical misspelling; existing deployments write it
//!   this way.
//! * `genesistimestamp`: genesis block timestamp in seconds.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "chainee.conf";

/// Operator configuration for chain startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address credited by the genesis block.
    pub genesis_beneficiary: String,
    /// Genesis block timestamp in seconds.
    pub genesis_timestamp: u32,
}

impl Config {
    /// Reads and parses `chainee.conf` from the data directory.
    pub fn load(datadir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(datadir.join(CONFIG_FILE))?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Result<Self> {
        let mut genesis_beneficiary = None;
        let mut genesis_timestamp = None;
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(Error::Malformed("config line missing '='"))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "genesisbenficiary" => {
                    genesis_beneficiary = Some(value.trim().to_string());
                }
                "genesistimestamp" => {
                    let timestamp = value
                        .trim()
                        .parse()
                        .map_err(|_| Error::Malformed("genesistimestamp must be an integer"))?;
                    genesis_timestamp = Some(timestamp);
                }
                _ => {}
            }
        }
        Ok(Self {
            genesis_beneficiary: genesis_beneficiary
                .ok_or(Error::Malformed("genesisbenficiary missing"))?,
            genesis_timestamp: genesis_timestamp
                .ok_or(Error::Malformed("genesistimestamp missing"))?,
        })
    }
}
