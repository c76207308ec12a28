//! Binary parcel protocol for the guest graphics-buffer handoff service.
//!
//! A transaction's payload travels as a *parcel*: a 16-byte header framing a
//! little-endian, 4-byte-aligned data region. This crate provides the codec
//! ([`Parcel`]), the closed set of typed request/response payloads
//! ([`payloads`]), and the fixed-layout structures both sides share
//! ([`wire`]).
#![forbid(unsafe_code)]

mod error;
mod parcel;
pub mod payloads;
pub mod wire;

pub use error::{ParcelError, Result};
pub use parcel::{
    IncomingPayload, OutgoingPayload, Parcel, ParcelHeader, ParcelStruct, HEADER_LEN,
};
pub use wire::{BufferDescriptor, CropRect, FenceBundle, FencePoint, TransformFlags};
