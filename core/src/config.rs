use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cpu::CpuModel;
use crate::error::{JitError, Result};

/// Translation engine settings.
///
/// Every field has a default, so a TOML document only needs the keys
/// it changes:
///
/// ```toml
/// cpu_model = "m68000"
/// max_block_insns = 32
/// lazy_flags = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JitConfig {
    pub cpu_model: CpuModel,
    /// Maximum guest instructions translated into one block.
    pub max_block_insns: u32,
    /// Translation unit storage capacity.
    pub max_units: usize,
    /// Number of hash buckets, a power of two.
    pub hash_buckets: usize,
    pub hot_set_size: usize,
    pub code_buffer_size: usize,
    /// Skip computing condition codes nobody reads.
    pub lazy_flags: bool,
    /// Inline backward branches whose target is inside the block.
    pub fold_branches: bool,
    /// Record register bindings at every instruction boundary.
    pub record_boundaries: bool,
    /// Interrupt poller sample interval in microseconds.
    pub poll_interval_us: u64,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            cpu_model: CpuModel::M68020,
            max_block_insns: 64,
            max_units: 4096,
            hash_buckets: 1024,
            hot_set_size: 8,
            code_buffer_size: 16 * 1024 * 1024,
            lazy_flags: true,
            fold_branches: true,
            record_boundaries: false,
            poll_interval_us: 100,
        }
    }
}

/// Smallest code buffer that still leaves room for a few blocks.
const MIN_CODE_BUFFER: usize = 64 * 1024;

impl JitConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: JitConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_block_insns == 0 || self.max_block_insns > 1024 {
            return Err(JitError::InvalidConfig(format!(
                "max_block_insns must be in 1..=1024, got {}",
                self.max_block_insns
            )));
        }
        if self.max_units == 0 {
            return Err(JitError::InvalidConfig("max_units must be non-zero".into()));
        }
        if !self.hash_buckets.is_power_of_two() {
            return Err(JitError::InvalidConfig(format!(
                "hash_buckets must be a power of two, got {}",
                self.hash_buckets
            )));
        }
        if self.hot_set_size == 0 {
            return Err(JitError::InvalidConfig("hot_set_size must be non-zero".into()));
        }
        if self.poll_interval_us == 0 || self.poll_interval_us > 1_000_000 {
            return Err(JitError::InvalidConfig(format!(
                "poll_interval_us must be in 1..=1000000, got {}",
                self.poll_interval_us
            )));
        }
        if self.code_buffer_size < MIN_CODE_BUFFER {
            return Err(JitError::InvalidConfig(format!(
                "code_buffer_size must be at least {MIN_CODE_BUFFER} bytes"
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}
