//! Error types used across the vboxvol crates.

use thiserror::Error;

/// Result type for vboxvol operations.
pub type VolumeResult<T> = Result<T, VolumeError>;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Fault reported by the hypervisor API itself.
    #[error("hypervisor error: {0}")]
    Hypervisor(String),

    /// The hypervisor endpoint could not be reached or answered garbage.
    #[error("hypervisor transport error: {0}")]
    Transport(String),

    #[error("unable to find machine")]
    MachineNotFound,

    #[error("machine resolution failed: {0}")]
    ResolutionTransport(String),

    #[error("network interface error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VolumeError {
    /// Message reported to plugin clients in the `Err` field.
    ///
    /// Hypervisor and transport failures are passed through verbatim so the
    /// container engine sees the hypervisor's own wording.
    pub fn message(&self) -> String {
        match self {
            VolumeError::Hypervisor(msg) | VolumeError::Transport(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for VolumeError {
    fn from(err: std::io::Error) -> Self {
        VolumeError::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for VolumeError {
    fn from(err: serde_json::Error) -> Self {
        VolumeError::InvalidRequest(format!("JSON error: {}", err))
    }
}

impl From<String> for VolumeError {
    fn from(err: String) -> Self {
        VolumeError::Internal(err)
    }
}

impl From<&str> for VolumeError {
    fn from(err: &str) -> Self {
        VolumeError::Internal(err.to_string())
    }
}
