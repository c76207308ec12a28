//! Display, layer and buffer-queue bookkeeping for the guest graphics
//! handoff service.
//!
//! [`DisplayRegistry`] exclusively owns every [`Display`], layer and
//! [`BufferQueue`] and hands out integer handles; [`BufferQueue`] implements
//! the producer/consumer slot state machine the transaction router drives.
#![forbid(unsafe_code)]

pub mod buffer_queue;
pub mod event;
pub mod registry;

pub use buffer_queue::{
    BufferQueue, PresentRequest, QueryKind, QueueError, QueueStatus, SlotState, DEFAULT_HEIGHT,
    DEFAULT_PIXEL_FORMAT, DEFAULT_WIDTH,
};
pub use event::{EventAllocator, EventHandle, Signal};
pub use registry::{Display, DisplayRegistry, DEFAULT_DISPLAY_NAME, LAYER_QUEUE_CAPACITY};
