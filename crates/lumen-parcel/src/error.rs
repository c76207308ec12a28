use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParcelError>;

/// Wire-level protocol violations. All variants are fatal to the transaction
/// that hit them; none is retried or surfaced to the guest as a status code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParcelError {
    #[error("read of {wanted} bytes at offset {at} exceeds parcel length {len}")]
    Truncated { at: usize, wanted: usize, len: usize },

    #[error("parcel of {len} bytes is shorter than its 16-byte header")]
    MissingHeader { len: usize },
}
