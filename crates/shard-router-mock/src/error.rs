//! Error types for the mock connection.

use thiserror::Error;

/// Error type for the mock connection.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection was configured to fail when stopped.
    #[error("Stop failed for connection: {0}")]
    StopFailed(String),
}
