use std::path::PathBuf;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    memory_profiler::default_file_prefix,
};

/// Attributes at or below this many bytes are left out of detailed snapshots.
pub const DEFAULT_MIN_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Threshold, in bytes, for an attribute to appear in detailed snapshots
    pub min_size: usize,
    /// Directory the report is written to
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Also export the size series as a Firefox Profiler document
    pub firefox_profile: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_SIZE,
            output_dir: PathBuf::from("."),
            file_prefix: default_file_prefix(),
            firefox_profile: false,
        }
    }
}

impl ProfilerConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(Error::Config)
    }
}
