//! Construction-time configuration for queue memory layout.
//!
//! The tuning knobs are per-instance rather than process-wide so that a
//! single process (and a single test binary) can exercise several layouts at
//! once. [`Config::from_env`] is provided for deployments that want to drive
//! the knobs through the environment.

use std::env;

use thiserror::Error;

/// Cache line size assumed when none is configured.
pub const DEFAULT_CACHE_LINE_SIZE: usize = 64;

/// Largest accepted cache line size. No shipping hardware exceeds this; the
/// bound keeps padding arithmetic trivially overflow-free.
pub const MAX_CACHE_LINE_SIZE: usize = 1 << 16;

/// Smallest queue capacity; requested capacities round up to at least this.
pub const MIN_CAPACITY: usize = 2;

/// Memory-layout options for a queue instance.
///
/// Both fields trade memory for less false sharing inside the element array.
/// The defaults suit 64-byte-cache-line hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Spaces successive logical slots `1 << sparse_shift` physical slots
    /// apart, so neighbouring elements stop sharing a cache line. Costs a
    /// `2^sparse_shift` multiplier on buffer memory. Default 0.
    pub sparse_shift: u32,

    /// Byte size of a cache line, used to compute the padding that isolates
    /// the element array from its heap neighbours. Must be a power of two no
    /// larger than [`MAX_CACHE_LINE_SIZE`]. Default 64.
    pub cache_line_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sparse_shift: 0,
            cache_line_size: DEFAULT_CACHE_LINE_SIZE,
        }
    }
}

impl Config {
    /// Reads `RHEA_SPARSE_SHIFT` and `RHEA_CACHE_LINE_SIZE` from the
    /// environment, keeping the defaults for unset or unparseable values.
    ///
    /// Validation still happens at queue construction, so a bogus value in
    /// the environment surfaces as a [`ConfigError`] there.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sparse_shift: env::var("RHEA_SPARSE_SHIFT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sparse_shift),
            cache_line_size: env::var("RHEA_CACHE_LINE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cache_line_size),
        }
    }

    /// Checks the option values themselves (capacity-dependent checks happen
    /// when the buffer geometry is computed).
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.cache_line_size.is_power_of_two() || self.cache_line_size > MAX_CACHE_LINE_SIZE {
            return Err(ConfigError::CacheLineSize {
                size: self.cache_line_size,
            });
        }
        Ok(())
    }
}

/// Errors rejected at queue construction.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A queue must be able to hold at least one element.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    /// The configured cache line size cannot describe real hardware.
    #[error("cache line size must be a power of two at most {MAX_CACHE_LINE_SIZE}, got {size}")]
    CacheLineSize {
        /// The rejected value.
        size: usize,
    },

    /// The padded, sparse buffer would not fit in the slot index range.
    #[error("capacity {capacity} with sparse shift {sparse_shift} overflows the slot index range")]
    SlotRange {
        /// Requested capacity before rounding.
        capacity: usize,
        /// Configured sparse shift.
        sparse_shift: u32,
    },
}

/// Rounds a requested capacity up to the next power of two, clamped below by
/// [`MIN_CAPACITY`]. `None` if the next power of two overflows `usize`.
pub(crate) fn round_capacity(requested: usize) -> Option<usize> {
    requested.max(MIN_CAPACITY).checked_next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sparse_shift, 0);
        assert_eq!(config.cache_line_size, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(round_capacity(1), Some(2));
        assert_eq!(round_capacity(2), Some(2));
        assert_eq!(round_capacity(5), Some(8));
        assert_eq!(round_capacity(1024), Some(1024));
        assert_eq!(round_capacity(1025), Some(2048));
        assert_eq!(round_capacity(usize::MAX), None);
    }

    #[test]
    fn test_rejects_bad_cache_line_size() {
        for size in [0, 3, 48, 65, MAX_CACHE_LINE_SIZE * 2] {
            let config = Config {
                cache_line_size: size,
                ..Config::default()
            };
            assert_eq!(
                config.validate(),
                Err(ConfigError::CacheLineSize { size }),
                "size {size} should be rejected"
            );
        }
    }

    #[test]
    fn test_accepts_power_of_two_cache_lines() {
        for size in [16, 32, 64, 128, 256] {
            let config = Config {
                cache_line_size: size,
                ..Config::default()
            };
            assert!(config.validate().is_ok(), "size {size} should be accepted");
        }
    }
}
