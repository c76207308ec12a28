use lumen_display::QueueError;
use lumen_parcel::ParcelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Failure taxonomy for the display service.
///
/// Only `NotFound`, `Unsupported`, `PermissionDenied` and `OperationFailed`
/// are guest-visible status codes; the rest abort the transaction path
/// outright. Backpressure (no free slot) is never an error: it surfaces as a
/// pending transaction instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("malformed parcel: {0}")]
    Protocol(#[from] ParcelError),

    #[error("unrecognized transaction code {0}")]
    UnknownTransaction(u32),

    #[error("unknown display, layer or buffer reference")]
    NotFound,

    #[error("structurally valid request outside the supported subset")]
    Unsupported,

    #[error("caller may not obtain the requested display service")]
    PermissionDenied,

    /// A trusted in-process caller drove a slot through an impossible
    /// lifecycle edge; unrecoverable for the transaction.
    #[error("slot lifecycle violation: {0}")]
    InvalidState(QueueError),

    #[error("operation failed")]
    OperationFailed,
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::SlotOutOfRange { .. } | QueueError::NoDescriptor { .. } => Self::NotFound,
            QueueError::InvalidState { .. } => Self::InvalidState(err),
            QueueError::UnsupportedQuery(_) => Self::Unsupported,
        }
    }
}
