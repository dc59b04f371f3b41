//! Error types for the Galaxy3D spatial partition
//!
//! Queries and mutations never fail: stale handles and empty inputs are
//! silent no-ops. Errors only come out of configuration validation and the
//! constructors that run it.

use std::fmt;

/// Result type for Galaxy3D partition operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D partition errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A configuration value is out of its valid range
    InvalidConfig(String),

    /// A bound is unusable (NaN or infinite corners)
    InvalidBound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidBound(msg) => write!(f, "Invalid bound: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Build an [`Error`] and log it at ERROR severity in one step.
///
/// # Example
///
/// ```ignore
/// return Err(partition_err!("galaxy3d::Octree", InvalidConfig, "max_members must be >= 1"));
/// ```
#[macro_export]
macro_rules! partition_err {
    ($source:expr, $variant:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::partition_error!($source, "{}", message);
        $crate::galaxy3d::Error::$variant(message)
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
