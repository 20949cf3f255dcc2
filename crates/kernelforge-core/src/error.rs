//! Error types for KernelForge host-side operations.

use thiserror::Error;

/// Result type for layout, marshalling and resource operations.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Errors raised by the layout engine, the marshalling routines and the
/// GPU resource objects built on top of them.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// The type has no entry in the layout table.
    #[error("Unsupported type: {0} has no GPU layout")]
    UnsupportedType(String),

    /// A source or destination region is too small for the requested copy.
    #[error("Buffer overflow: required {required} bytes, available {available}")]
    BufferOverflow {
        /// Bytes the operation needs.
        required: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// A pitch or stride is smaller than the logical width it must hold.
    #[error("Invalid pitch: {pitch} bytes cannot hold a {width}-byte row")]
    InvalidPitch {
        /// Logical (unpadded) width in bytes.
        width: usize,
        /// Physical (padded) pitch in bytes.
        pitch: usize,
    },

    /// A host span does not match the element count of the resource.
    #[error("Length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch {
        /// Element count of the resource.
        expected: usize,
        /// Element count of the host span.
        actual: usize,
    },

    /// The operation is not valid for this resource kind.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// No usable GPU backend.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The GPU backend reported an error.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// A host/device transfer failed.
    #[error("Transfer error: {0}")]
    TransferError(String),

    /// A kernel parameter was not bound before dispatch.
    #[error("Missing kernel argument: {0}")]
    MissingArgument(String),

    /// A bound argument does not match the kernel parameter it targets.
    #[error("Argument mismatch for `{name}`: {reason}")]
    ArgumentMismatch {
        /// Kernel parameter name.
        name: String,
        /// What did not match.
        reason: String,
    },
}
