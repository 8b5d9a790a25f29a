//! Error types shared across capability ports.

use thiserror::Error;

/// Failure raised by a capability-port implementation.
///
/// Ports are external collaborators (completion backend, actor resolver,
/// similarity index, timer effects); the engine surfaces their failures
/// with the underlying reason and never retries them on its own.
#[derive(Debug, Error)]
#[error("{port} port failed: {message}")]
pub struct PortError {
    /// Name of the port that failed.
    pub port: &'static str,
    /// Underlying reason, already rendered for logs.
    pub message: String,
}

impl PortError {
    /// Creates a new port error.
    #[must_use]
    pub fn new(port: &'static str, message: impl Into<String>) -> Self {
        Self {
            port,
            message: message.into(),
        }
    }
}
