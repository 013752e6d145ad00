//! Shared error taxonomy for the Colloquy client crates.
//!
//! Every fallible operation in the workspace returns [`ColloquyError`].
//! The variants split along the lines that matter to callers: bad input
//! (never retried), a failed delivery attempt (retried internally while
//! attempts remain), a response that arrived but reported failure
//! (terminal), unparseable response bytes, and caller-initiated
//! cancellation (always surfaced as itself, never wrapped).

/// Unified error type for all Colloquy subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ColloquyError {
    /// Malformed caller input: empty message, unknown role, zero capacity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single delivery attempt failed at the network level
    /// (connection, DNS, timeout). `retryable` marks the transient class
    /// the transport is allowed to recover from.
    #[error("transport failure talking to {backend}: {message}")]
    Transport {
        backend: String,
        message: String,
        retryable: bool,
    },

    /// The backend answered with a non-success status. Terminal; the raw
    /// error body is kept for diagnostics.
    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    /// Every allowed attempt failed at the transport level. Wraps the
    /// last underlying cause.
    #[error("retries exhausted for {backend} after {attempts} attempts: {cause}")]
    RetriesExhausted {
        backend: String,
        attempts: usize,
        cause: String,
    },

    /// Response bytes could not be interpreted as the backend's schema.
    #[error("failed to parse {backend} response: {message}")]
    Parse { backend: String, message: String },

    /// The caller aborted the request mid-flight or mid-backoff.
    #[error("request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ColloquyError {
    /// Returns `true` if the error is transient and the operation may
    /// succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ColloquyError::Transport { retryable: true, .. })
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ColloquyError::InvalidArgument(_)
                | ColloquyError::Status { .. }
                | ColloquyError::RetriesExhausted { .. }
                | ColloquyError::Parse { .. }
                | ColloquyError::Cancelled
        )
    }
}

/// A convenience alias for `Result<T, ColloquyError>`.
pub type Result<T> = std::result::Result<T, ColloquyError>;
