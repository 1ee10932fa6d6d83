//! Sieve configuration: segment size and worker count.
//!
//! Both values come from outside the engine (CLI flags, environment, or an
//! optional TOML file) and are validated before any session is built. Invalid
//! values are rejected, never clamped.
//!
//! ```toml
//! sieve_size = 262144   # bytes per segment, power of two
//! threads = 8           # 0 = all available cores
//! ```

use crate::error::SieveError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest accepted segment size in bytes (7680 numbers).
pub const MIN_SIEVE_SIZE: usize = 256;

/// Largest accepted segment size in bytes. Bucket records store the
/// in-segment byte index in 23 bits, so this must stay below 2^23.
pub const MAX_SIEVE_SIZE: usize = 4 << 20;

/// Default segment size: 256 KiB, sized for a typical L2 cache.
pub const DEFAULT_SIEVE_SIZE: usize = 256 << 10;

/// Upper bound on the worker count accepted from callers.
pub const MAX_THREADS: usize = 4096;

/// Runtime configuration shared by every sieve entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SieveConfig {
    /// Segment size in bytes. Each byte covers 30 numbers.
    pub sieve_size: usize,
    /// Worker count for partitioned operations; 0 means all available.
    pub threads: usize,
}

impl Default for SieveConfig {
    fn default() -> Self {
        SieveConfig {
            sieve_size: DEFAULT_SIEVE_SIZE,
            threads: 0,
        }
    }
}

impl SieveConfig {
    pub fn new(sieve_size: usize, threads: usize) -> Result<Self, SieveError> {
        let config = SieveConfig {
            sieve_size,
            threads,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build a config from a segment size given in KiB (the CLI unit).
    pub fn with_sieve_size_kib(mut self, kib: usize) -> Result<Self, SieveError> {
        self.sieve_size = kib
            .checked_mul(1024)
            .ok_or(SieveError::InvalidSieveSize { bytes: usize::MAX })?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), SieveError> {
        validate_sieve_size(self.sieve_size)?;
        if self.threads > MAX_THREADS {
            return Err(SieveError::InvalidThreads {
                threads: self.threads,
            });
        }
        Ok(())
    }

    /// Number of workers a partitioned operation will request.
    pub fn num_threads(&self) -> usize {
        if self.threads == 0 {
            rayon::current_num_threads().max(1)
        } else {
            self.threads
        }
    }

    /// Parse and validate a TOML config document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SieveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML config file. The file is never written back.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }
}

/// Segment sizes must be a power of two so bucket slots can be derived by
/// shift and mask.
pub fn validate_sieve_size(bytes: usize) -> Result<(), SieveError> {
    if !bytes.is_power_of_two() || !(MIN_SIEVE_SIZE..=MAX_SIEVE_SIZE).contains(&bytes) {
        return Err(SieveError::InvalidSieveSize { bytes });
    }
    Ok(())
}
