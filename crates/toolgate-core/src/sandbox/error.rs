//! Error types for the sandbox capability.

/// Failures reported by a [`super::SandboxCapability`] implementation.
///
/// `Transport` carries the backend's raw message; the session driver
/// inspects it for session-fault markers, so implementations should pass
/// the upstream text through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxIoError {
    #[error("sandbox transport error: {0}")]
    Transport(String),

    #[error("sandbox '{sandbox_id}' is unavailable: {reason}")]
    Unavailable { sandbox_id: String, reason: String },

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("file I/O failed for {path}: {message}")]
    Io { path: String, message: String },
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxIoError>;
