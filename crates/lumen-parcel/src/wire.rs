//! Fixed-layout structures shared between transaction payloads and the
//! buffer-queue bookkeeping.

use bitflags::bitflags;

use crate::error::Result;
use crate::parcel::{Parcel, ParcelStruct};

bitflags! {
    /// Presentation transform requested when a buffer is queued.
    ///
    /// `ROTATE_180` is `FLIP_HORIZONTAL | FLIP_VERTICAL`; `ROTATE_270` is
    /// `ROTATE_90 | ROTATE_180`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TransformFlags: u32 {
        const FLIP_HORIZONTAL = 1 << 0;
        const FLIP_VERTICAL = 1 << 1;
        const ROTATE_90 = 1 << 2;
    }
}

/// Crop rectangle carried in a QueueBuffer request, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub top: i32,
    pub left: i32,
    pub right: i32,
    pub bottom: i32,
}

/// One synchronization point: a fence object id and the value it must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FencePoint {
    pub id: u32,
    pub value: u32,
}

/// Opaque synchronization token attached to a slot at dequeue and queue time.
///
/// Wire layout: a count word followed by four fixed `FencePoint` entries
/// (36 bytes); entries past `count` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FenceBundle {
    pub count: u32,
    pub points: [FencePoint; 4],
}

impl FenceBundle {
    /// A bundle with no synchronization points; safe to use immediately.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(id: u32, value: u32) -> Self {
        let mut bundle = Self::default();
        bundle.count = 1;
        bundle.points[0] = FencePoint { id, value };
        bundle
    }
}

impl ParcelStruct for FenceBundle {
    const WIRE_LEN: usize = 36;

    fn put(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.count);
        for point in &self.points {
            parcel.write_u32(point.id);
            parcel.write_u32(point.value);
        }
    }

    fn take(parcel: &mut Parcel) -> Result<Self> {
        let count = parcel.read_u32()?;
        let mut points = [FencePoint::default(); 4];
        for point in &mut points {
            point.id = parcel.read_u32()?;
            point.value = parcel.read_u32()?;
        }
        Ok(Self { count, points })
    }
}

/// Descriptor for one externally-allocated graphics buffer.
///
/// The wire form is a 0x16C-byte fixed layout; the reserved regions are
/// zero-filled on encode and skipped on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferDescriptor {
    pub magic: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: u32,
    pub usage: u32,
    pub index: u32,
    pub gpu_buffer_id: u32,
    pub map_handle: u32,
    pub offset: u32,
}

impl BufferDescriptor {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width,
            format: 1,
            ..Self::default()
        }
    }
}

fn put_zero_words(parcel: &mut Parcel, count: usize) {
    for _ in 0..count {
        parcel.write_u32(0);
    }
}

fn skip_words(parcel: &mut Parcel, count: usize) -> Result<()> {
    for _ in 0..count {
        parcel.read_u32()?;
    }
    Ok(())
}

impl ParcelStruct for BufferDescriptor {
    // magic..usage (6 words), reserved (1), index (1), reserved (3),
    // gpu_buffer_id (1), reserved (17), map_handle (1), offset (1),
    // reserved (60) = 91 words.
    const WIRE_LEN: usize = 0x16c;

    fn put(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.magic);
        parcel.write_u32(self.width);
        parcel.write_u32(self.height);
        parcel.write_u32(self.stride);
        parcel.write_u32(self.format);
        parcel.write_u32(self.usage);
        put_zero_words(parcel, 1);
        parcel.write_u32(self.index);
        put_zero_words(parcel, 3);
        parcel.write_u32(self.gpu_buffer_id);
        put_zero_words(parcel, 17);
        parcel.write_u32(self.map_handle);
        parcel.write_u32(self.offset);
        put_zero_words(parcel, 60);
    }

    fn take(parcel: &mut Parcel) -> Result<Self> {
        let magic = parcel.read_u32()?;
        let width = parcel.read_u32()?;
        let height = parcel.read_u32()?;
        let stride = parcel.read_u32()?;
        let format = parcel.read_u32()?;
        let usage = parcel.read_u32()?;
        skip_words(parcel, 1)?;
        let index = parcel.read_u32()?;
        skip_words(parcel, 3)?;
        let gpu_buffer_id = parcel.read_u32()?;
        skip_words(parcel, 17)?;
        let map_handle = parcel.read_u32()?;
        let offset = parcel.read_u32()?;
        skip_words(parcel, 60)?;
        Ok(Self {
            magic,
            width,
            height,
            stride,
            format,
            usage,
            index,
            gpu_buffer_id,
            map_handle,
            offset,
        })
    }
}
