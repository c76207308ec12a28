//! Typed request/response payloads, one pair per transaction code.
//!
//! Requests implement both directions so that guest-side callers (and the
//! test suites) can produce the exact byte streams the router consumes.

use crate::error::Result;
use crate::parcel::{IncomingPayload, OutgoingPayload, Parcel, ParcelStruct};
use crate::wire::{BufferDescriptor, CropRect, FenceBundle, TransformFlags};

/// Interface token this crate writes into outgoing requests. The router never
/// validates the token text, so any value interoperates.
pub const PRODUCER_TOKEN: &str = "lumen.display.IBufferProducer";

fn write_interface_token(parcel: &mut Parcel, token: &str) {
    parcel.write_u32(0); // unused
    let units: Vec<u16> = token.encode_utf16().collect();
    parcel.write_u32(units.len() as u32);
    for unit in &units {
        parcel.write_u16_unaligned(*unit);
    }
    parcel.write_u16_unaligned(0);
    // Re-align once after the code-unit run, mirroring the decode side.
    parcel.align_write();
}

/// Connect (code 10) request: `{unknown, api, producer_controlled_by_app}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectRequest {
    pub unknown: u32,
    pub api: u32,
    pub producer_controlled_by_app: u32,
}

impl IncomingPayload for ConnectRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        Ok(Self {
            unknown: parcel.read_u32()?,
            api: parcel.read_u32()?,
            producer_controlled_by_app: parcel.read_u32()?,
        })
    }
}

impl OutgoingPayload for ConnectRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.unknown);
        parcel.write_u32(self.api);
        parcel.write_u32(self.producer_controlled_by_app);
    }
}

/// Shared response shape for Connect and QueueBuffer: the queue's view of the
/// surface after the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStatusResponse {
    pub width: u32,
    pub height: u32,
    pub transform_hint: u32,
    pub pending_buffers: u32,
    pub status: u32,
}

impl OutgoingPayload for QueueStatusResponse {
    fn encode(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.width);
        parcel.write_u32(self.height);
        parcel.write_u32(self.transform_hint);
        parcel.write_u32(self.pending_buffers);
        parcel.write_u32(self.status);
    }
}

impl IncomingPayload for QueueStatusResponse {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        Ok(Self {
            width: parcel.read_u32()?,
            height: parcel.read_u32()?,
            transform_hint: parcel.read_u32()?,
            pending_buffers: parcel.read_u32()?,
            status: parcel.read_u32()?,
        })
    }
}

/// DequeueBuffer (code 3) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DequeueRequest {
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub get_frame_timestamps: u32,
    pub usage: u32,
}

impl IncomingPayload for DequeueRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        Ok(Self {
            pixel_format: parcel.read_u32()?,
            width: parcel.read_u32()?,
            height: parcel.read_u32()?,
            get_frame_timestamps: parcel.read_u32()?,
            usage: parcel.read_u32()?,
        })
    }
}

impl OutgoingPayload for DequeueRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.pixel_format);
        parcel.write_u32(self.width);
        parcel.write_u32(self.height);
        parcel.write_u32(self.get_frame_timestamps);
        parcel.write_u32(self.usage);
    }
}

/// DequeueBuffer response: the granted slot plus its wait fence, framed as an
/// embedded object, followed by a zero trailer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueResponse {
    pub slot: u32,
    pub fence: FenceBundle,
}

impl OutgoingPayload for DequeueResponse {
    fn encode(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.slot);
        parcel.write_u32(1); // fence object follows
        parcel.write_object(&self.fence);
        parcel.write_u32(0);
    }
}

impl IncomingPayload for DequeueResponse {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let slot = parcel.read_u32()?;
        let _present = parcel.read_u32()?;
        let _object_len = parcel.read_u32()?;
        let _descriptor_count = parcel.read_u32()?;
        let fence = FenceBundle::take(parcel)?;
        let _trailer = parcel.read_u32()?;
        Ok(Self { slot, fence })
    }
}

/// RequestBuffer (code 1) request: a single slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBufferRequest {
    pub slot: u32,
}

impl IncomingPayload for RequestBufferRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        Ok(Self {
            slot: parcel.read_u32()?,
        })
    }
}

impl OutgoingPayload for RequestBufferRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.slot);
    }
}

/// RequestBuffer response: the descriptor bound to the requested slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBufferResponse {
    pub descriptor: BufferDescriptor,
}

impl OutgoingPayload for RequestBufferResponse {
    fn encode(&self, parcel: &mut Parcel) {
        parcel.write_u32(1); // descriptor object follows
        parcel.write_object(&self.descriptor);
        parcel.write_u32(0);
    }
}

impl IncomingPayload for RequestBufferResponse {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _present = parcel.read_u32()?;
        let _object_len = parcel.read_u32()?;
        let _descriptor_count = parcel.read_u32()?;
        let descriptor = BufferDescriptor::take(parcel)?;
        let _trailer = parcel.read_u32()?;
        Ok(Self { descriptor })
    }
}

/// QueueBuffer (code 7) request. The data region is a 96-byte fixed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueRequest {
    pub slot: u32,
    pub timestamp: u32,
    pub is_auto_timestamp: i32,
    pub crop: CropRect,
    pub scaling_mode: i32,
    pub transform: TransformFlags,
    pub sticky_transform: u32,
    pub swap_interval: u32,
    pub fence: FenceBundle,
}

impl IncomingPayload for QueueRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        let slot = parcel.read_u32()?;
        for _ in 0..3 {
            parcel.read_u32()?;
        }
        let timestamp = parcel.read_u32()?;
        let is_auto_timestamp = parcel.read_i32()?;
        let crop = CropRect {
            top: parcel.read_i32()?,
            left: parcel.read_i32()?,
            right: parcel.read_i32()?,
            bottom: parcel.read_i32()?,
        };
        let scaling_mode = parcel.read_i32()?;
        let transform = TransformFlags::from_bits_retain(parcel.read_u32()?);
        let sticky_transform = parcel.read_u32()?;
        parcel.read_u32()?;
        let swap_interval = parcel.read_u32()?;
        let fence = FenceBundle::take(parcel)?;
        Ok(Self {
            slot,
            timestamp,
            is_auto_timestamp,
            crop,
            scaling_mode,
            transform,
            sticky_transform,
            swap_interval,
            fence,
        })
    }
}

impl OutgoingPayload for QueueRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.slot);
        for _ in 0..3 {
            parcel.write_u32(0);
        }
        parcel.write_u32(self.timestamp);
        parcel.write_i32(self.is_auto_timestamp);
        parcel.write_i32(self.crop.top);
        parcel.write_i32(self.crop.left);
        parcel.write_i32(self.crop.right);
        parcel.write_i32(self.crop.bottom);
        parcel.write_i32(self.scaling_mode);
        parcel.write_u32(self.transform.bits());
        parcel.write_u32(self.sticky_transform);
        parcel.write_u32(0);
        parcel.write_u32(self.swap_interval);
        self.fence.put(parcel);
    }
}

/// Query (code 9) request: a raw query selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRequest {
    pub kind: u32,
}

impl IncomingPayload for QueryRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        Ok(Self {
            kind: parcel.read_u32()?,
        })
    }
}

impl OutgoingPayload for QueryRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.kind);
    }
}

/// Query response: one value word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResponse {
    pub value: u32,
}

impl OutgoingPayload for QueryResponse {
    fn encode(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.value);
    }
}

impl IncomingPayload for QueryResponse {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        Ok(Self {
            value: parcel.read_u32()?,
        })
    }
}

/// SetPreallocatedBuffer (code 14) request: a slot, the descriptor blob
/// length, then the descriptor itself inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetPreallocatedRequest {
    pub slot: u32,
    pub graphic_buffer_length: u32,
    pub descriptor: BufferDescriptor,
}

impl IncomingPayload for SetPreallocatedRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        let slot = parcel.read_u32()?;
        parcel.read_u32()?;
        let graphic_buffer_length = parcel.read_u32()?;
        parcel.read_u32()?;
        let descriptor = BufferDescriptor::take(parcel)?;
        Ok(Self {
            slot,
            graphic_buffer_length,
            descriptor,
        })
    }
}

impl OutgoingPayload for SetPreallocatedRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.slot);
        parcel.write_u32(0);
        parcel.write_u32(self.graphic_buffer_length);
        parcel.write_u32(0);
        self.descriptor.put(parcel);
    }
}

/// CancelBuffer (code 8) request: the slot being returned and its fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRequest {
    pub slot: u32,
    pub fence: FenceBundle,
}

impl IncomingPayload for CancelRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        let slot = parcel.read_u32()?;
        let fence = FenceBundle::take(parcel)?;
        Ok(Self { slot, fence })
    }
}

impl OutgoingPayload for CancelRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.slot);
        self.fence.put(parcel);
    }
}

/// DetachBuffer (code 4) request: a single slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachRequest {
    pub slot: u32,
}

impl IncomingPayload for DetachRequest {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _token = parcel.read_interface_token()?;
        Ok(Self {
            slot: parcel.read_u32()?,
        })
    }
}

impl OutgoingPayload for DetachRequest {
    fn encode(&self, parcel: &mut Parcel) {
        write_interface_token(parcel, PRODUCER_TOKEN);
        parcel.write_u32(self.slot);
    }
}

/// Acknowledgement-only response: a single zero word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmptyResponse;

impl OutgoingPayload for EmptyResponse {
    fn encode(&self, parcel: &mut Parcel) {
        parcel.write_u32(0);
    }
}

impl IncomingPayload for EmptyResponse {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _status = parcel.read_u32()?;
        Ok(Self)
    }
}

/// Native-window parcel handed out when a layer is opened: identifies the
/// buffer queue the guest should address transactions to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeWindow {
    pub queue_id: u32,
}

impl NativeWindow {
    const MAGIC: u32 = 2;
    const PROCESS_ID: u32 = 1;
    const DRIVER_TAG: [u8; 8] = *b"dispdrv\0";
}

impl OutgoingPayload for NativeWindow {
    fn encode(&self, parcel: &mut Parcel) {
        parcel.write_u32(Self::MAGIC);
        parcel.write_u32(Self::PROCESS_ID);
        parcel.write_u32(self.queue_id);
        for _ in 0..3 {
            parcel.write_u32(0);
        }
        parcel.write_block(&Self::DRIVER_TAG);
        for _ in 0..2 {
            parcel.write_u32(0);
        }
    }
}

impl IncomingPayload for NativeWindow {
    fn decode(parcel: &mut Parcel) -> Result<Self> {
        let _magic = parcel.read_u32()?;
        let _process_id = parcel.read_u32()?;
        let queue_id = parcel.read_u32()?;
        for _ in 0..3 {
            parcel.read_u32()?;
        }
        parcel.read_block(8)?;
        for _ in 0..2 {
            parcel.read_u32()?;
        }
        Ok(Self { queue_id })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parcel::HEADER_LEN;

    fn roundtrip<P>(payload: &P) -> P
    where
        P: OutgoingPayload + IncomingPayload,
    {
        Parcel::deserialize(Parcel::serialize(payload)).unwrap()
    }

    #[test]
    fn connect_request_roundtrip() {
        let req = ConnectRequest {
            unknown: 0,
            api: 2,
            producer_controlled_by_app: 1,
        };
        assert_eq!(roundtrip(&req), req);
    }

    #[test]
    fn queue_status_roundtrip() {
        let resp = QueueStatusResponse {
            width: 1280,
            height: 720,
            transform_hint: 0,
            pending_buffers: 3,
            status: 0,
        };
        assert_eq!(roundtrip(&resp), resp);
    }

    #[test]
    fn dequeue_pair_roundtrip() {
        let req = DequeueRequest {
            pixel_format: 1,
            width: 1280,
            height: 720,
            get_frame_timestamps: 0,
            usage: 0xb00,
        };
        assert_eq!(roundtrip(&req), req);

        let resp = DequeueResponse {
            slot: 2,
            fence: FenceBundle::single(4, 17),
        };
        assert_eq!(roundtrip(&resp), resp);
    }

    #[test]
    fn queue_request_has_96_byte_data_region() {
        // Data region = interface token + the fixed 96-byte block.
        let req = QueueRequest {
            slot: 1,
            timestamp: 0x100,
            is_auto_timestamp: 1,
            crop: CropRect {
                top: 0,
                left: 0,
                right: 1280,
                bottom: 720,
            },
            scaling_mode: 2,
            transform: TransformFlags::ROTATE_90,
            sticky_transform: 0,
            swap_interval: 1,
            fence: FenceBundle::single(1, 2),
        };
        let bytes = Parcel::serialize(&req);
        let header = Parcel::peek_header(&bytes).unwrap();

        let token_units = PRODUCER_TOKEN.encode_utf16().count() as u32 + 1;
        let token_len = 8 + (2 * token_units).div_ceil(4) * 4;
        assert_eq!(header.data_size, token_len + 96);
        assert_eq!(header.data_offset as usize, HEADER_LEN);

        assert_eq!(roundtrip(&req), req);
    }

    #[test]
    fn request_buffer_pair_roundtrip() {
        let req = RequestBufferRequest { slot: 0 };
        assert_eq!(roundtrip(&req), req);

        let resp = RequestBufferResponse {
            descriptor: BufferDescriptor::with_dimensions(1920, 1080),
        };
        assert_eq!(roundtrip(&resp), resp);
    }

    #[test]
    fn preallocate_cancel_detach_roundtrip() {
        let pre = SetPreallocatedRequest {
            slot: 3,
            graphic_buffer_length: BufferDescriptor::WIRE_LEN as u32,
            descriptor: BufferDescriptor::with_dimensions(1280, 720),
        };
        assert_eq!(roundtrip(&pre), pre);

        let cancel = CancelRequest {
            slot: 3,
            fence: FenceBundle::empty(),
        };
        assert_eq!(roundtrip(&cancel), cancel);

        let detach = DetachRequest { slot: 3 };
        assert_eq!(roundtrip(&detach), detach);
    }

    #[test]
    fn query_and_ack_roundtrip() {
        let req = QueryRequest { kind: 2 };
        assert_eq!(roundtrip(&req), req);
        let resp = QueryResponse { value: 1 };
        assert_eq!(roundtrip(&resp), resp);
        assert_eq!(roundtrip(&EmptyResponse), EmptyResponse);
    }

    #[test]
    fn native_window_layout() {
        let window = NativeWindow { queue_id: 41 };
        let bytes = Parcel::serialize(&window);
        let header = Parcel::peek_header(&bytes).unwrap();
        assert_eq!(header.data_size, 0x28);
        assert_eq!(roundtrip(&window), window);
    }
}
