//! Guest-facing graphics handoff service: access gate, display-service
//! operations, and the parcel transaction router over the buffer queues in
//! `lumen-display`.
#![forbid(unsafe_code)]

pub mod display;
pub mod error;
pub mod gate;
pub mod router;

pub use display::{
    convert_scaling_mode, ConvertedScalingMode, DisplayInfo, DisplayService, GuestScalingMode,
};
pub use error::{Result, ServiceError};
pub use gate::{check_service_access, Permission, Policy};
pub use router::{Transacted, TransactionCode, TransactionRouter, WaitTicket};
