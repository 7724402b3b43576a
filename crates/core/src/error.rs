//! Error types for the ocean simulation core
//!
//! Configuration errors are reported at construction time and never
//! silently corrected. Resource errors are fatal for the pipeline that hit them.

use std::fmt;

/// Errors produced while configuring or running the ocean pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum OceanError {
    /// Grid resolution rejected (not a power of two, too large, or not tile aligned)
    InvalidMapSize {
        /// Requested map size in texels
        map_size: u32,
        /// Why the size was rejected
        reason: &'static str,
    },
    /// A configuration value is outside its domain
    InvalidParameter {
        /// Parameter name as it appears in `OceanConfig`
        name: &'static str,
        /// Human readable description of the problem
        message: String,
    },
    /// Two sized resources that must agree do not
    SizeMismatch {
        /// Size the receiver was built for
        expected: usize,
        /// Size that was handed in
        actual: usize,
    },
    /// A GPU buffer or texture could not be allocated
    ResourceAllocation(String),
    /// The GPU backend was requested explicitly but is not usable
    GpuUnavailable(String),
    /// The simulation is disabled and holds no resources
    Disabled,
}

impl fmt::Display for OceanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMapSize { map_size, reason } => {
                write!(f, "invalid map size {map_size}: {reason}")
            }
            Self::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected}, got {actual}")
            }
            Self::ResourceAllocation(msg) => write!(f, "GPU resource allocation failed: {msg}"),
            Self::GpuUnavailable(msg) => write!(f, "GPU backend unavailable: {msg}"),
            Self::Disabled => write!(f, "ocean simulation is disabled"),
        }
    }
}

impl std::error::Error for OceanError {}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, OceanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = OceanError::InvalidMapSize {
            map_size: 100,
            reason: "must be a power of two",
        };
        assert_eq!(err.to_string(), "invalid map size 100: must be a power of two");

        let err = OceanError::SizeMismatch {
            expected: 64,
            actual: 128,
        };
        assert!(err.to_string().contains("expected 64"));
    }
}
