//! # Error — Sieve Error Taxonomy
//!
//! Every fallible operation in the library returns [`SieveError`]. The variants
//! fall into three groups:
//!
//! - **Configuration**: invalid sieve size, invalid worker count, or a number
//!   that does not fit in 64 bits. Detected eagerly when a session or
//!   partitioner is constructed, never in the middle of sieving.
//! - **Resource exhaustion**: a segment buffer, bucket pool or worker pool
//!   could not be allocated. Fatal for the operation; no retry happens here.
//! - **Range**: an nth-prime query whose answer lies outside `[2, 2^64 − 1]`.
//!
//! Empty ranges (`start > stop`, `stop < 2`) and a `PrimeStream` stepping past
//! either end of the domain are not errors: they produce zero results.

use std::fmt;

/// Errors from sieve construction and execution.
#[derive(Debug)]
pub enum SieveError {
    /// Segment size is not a power of two within the supported range.
    InvalidSieveSize { bytes: usize },
    /// Requested worker count exceeds the supported maximum.
    InvalidThreads { threads: usize },
    /// A range bound does not fit in an unsigned 64-bit integer.
    StopOutOfRange { value: String },
    /// An allocation needed by the sieve failed.
    ResourceExhausted {
        resource: &'static str,
        detail: String,
    },
    /// The requested nth prime is below 2 or above 2^64 − 1.
    NthPrimeOutOfRange { n: i64, start: u64 },
    /// Writing printed primes failed.
    Io(std::io::Error),
}

impl SieveError {
    /// True for errors caused by invalid caller-supplied configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SieveError::InvalidSieveSize { .. }
                | SieveError::InvalidThreads { .. }
                | SieveError::StopOutOfRange { .. }
        )
    }

    pub(crate) fn exhausted(resource: &'static str, err: impl fmt::Display) -> Self {
        SieveError::ResourceExhausted {
            resource,
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for SieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SieveError::InvalidSieveSize { bytes } => write!(
                f,
                "invalid sieve size {} bytes (must be a power of two in [{}, {}])",
                bytes,
                crate::config::MIN_SIEVE_SIZE,
                crate::config::MAX_SIEVE_SIZE
            ),
            SieveError::InvalidThreads { threads } => write!(
                f,
                "invalid thread count {} (maximum is {})",
                threads,
                crate::config::MAX_THREADS
            ),
            SieveError::StopOutOfRange { value } => {
                write!(f, "{} exceeds the maximum 2^64 - 1", value)
            }
            SieveError::ResourceExhausted { resource, detail } => {
                write!(f, "failed to allocate {}: {}", resource, detail)
            }
            SieveError::NthPrimeOutOfRange { n, start } => {
                write!(f, "nth prime (n = {}, start = {}) is outside [2, 2^64 - 1]", n, start)
            }
            SieveError::Io(e) => write!(f, "output error: {}", e),
        }
    }
}

impl std::error::Error for SieveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SieveError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SieveError {
    fn from(e: std::io::Error) -> Self {
        SieveError::Io(e)
    }
}
