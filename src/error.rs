//! The five error kinds shared across planning, partitioning, counting, and
//! the debloom/oracle phases, plus a cooperative-cancellation signal.
//!
//! `GraphError` deliberately stays flat: components report one of these five
//! domains rather than inventing a new public error type each, so callers
//! joining worker threads only ever need to match on one enum (see
//! `progress::Dispatcher`).

use std::io;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// Invalid k, m >= k, abund_min > abund_max, unwritable storage path.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unreadable or malformed sequence source. N-only reads are not errors;
    /// they simply yield zero k-mers.
    #[error("input error: {0}")]
    Input(String),

    /// Memory/disk/FD caps cannot be satisfied during planning.
    #[error("resource error: {0}")]
    Resource(String),

    /// Read/write/open failure on a partition file or storage collection.
    #[error("I/O error{}: {source}", partition.map(|p| format!(" on partition {p}")).unwrap_or_default())]
    Io {
        partition: Option<u32>,
        #[source]
        source: io::Error,
    },

    /// An internal cross-check failed (e.g. a count mismatch in C4). Always
    /// a bug, never caused by bad input.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The run was cancelled cooperatively; not itself a fault.
    #[error("run cancelled")]
    Cancelled,
}

impl GraphError {
    pub fn io(source: io::Error) -> Self {
        Self::Io {
            partition: None,
            source,
        }
    }

    pub fn io_on_partition(partition: u32, source: io::Error) -> Self {
        Self::Io {
            partition: Some(partition),
            source,
        }
    }

    pub fn unwritable_path(path: &Path) -> Self {
        Self::Configuration(format!("storage path not writable: {}", path.display()))
    }

    /// Exit code for the `dbgh5` front-end: 0 success (not representable
    /// here), 1 I/O or resource failure, 2 configuration error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Io { .. } | Self::Resource(_) | Self::Input(_) | Self::Invariant(_) | Self::Cancelled => 1,
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(source: io::Error) -> Self {
        Self::io(source)
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(source: serde_json::Error) -> Self {
        Self::Io {
            partition: None,
            source: io::Error::new(io::ErrorKind::InvalidData, source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_dbgh5_contract() {
        assert_eq!(GraphError::Configuration("bad k".into()).exit_code(), 2);
        assert_eq!(GraphError::Resource("no fds".into()).exit_code(), 1);
        assert_eq!(
            GraphError::io(io::Error::new(io::ErrorKind::Other, "boom")).exit_code(),
            1
        );
        assert_eq!(GraphError::Cancelled.exit_code(), 1);
    }

    #[test]
    fn io_error_reports_partition_id() {
        let err = GraphError::io_on_partition(7, io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(err.to_string().contains("partition 7"));
    }

    #[test]
    fn io_error_without_partition_omits_it() {
        let err = GraphError::io(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(!err.to_string().contains("partition"));
    }
}
