//! Length-prefixed parcel codec.
//!
//! A parcel is a 16-byte header followed by a 4-byte-aligned data region.
//! The cursor is rounded up to the next multiple of 4 after every primitive
//! read or write; the only unaligned accesses are the UTF-16 code-unit scans
//! inside [`Parcel::read_interface_token`], which re-align once afterwards.

use crate::error::{ParcelError, Result};

/// Size of the on-wire parcel header.
pub const HEADER_LEN: usize = 16;

/// Extra room added whenever the backing buffer must grow.
const GROW_SLACK: usize = 0x40;

/// Wire header: `{data_size, data_offset, objects_size, objects_offset}`,
/// all little-endian u32. For every parcel this crate produces,
/// `data_offset == 16`, `objects_size == 4` and
/// `objects_offset == 16 + data_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParcelHeader {
    pub data_size: u32,
    pub data_offset: u32,
    pub objects_size: u32,
    pub objects_offset: u32,
}

impl ParcelHeader {
    fn to_bytes(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.data_size.to_le_bytes());
        out[4..8].copy_from_slice(&self.data_offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.objects_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.objects_offset.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
        };
        Self {
            data_size: word(0),
            data_offset: word(4),
            objects_size: word(8),
            objects_offset: word(12),
        }
    }
}

/// A payload this service encodes into an outgoing parcel.
///
/// Encoding cannot fail: the parcel grows on demand.
pub trait OutgoingPayload {
    fn encode(&self, parcel: &mut Parcel);
}

/// A payload decoded from an incoming parcel's data region.
pub trait IncomingPayload: Sized {
    fn decode(parcel: &mut Parcel) -> Result<Self>;
}

/// Fixed-layout structure embedded inline in a parcel's data region.
pub trait ParcelStruct: Sized {
    /// Encoded size in bytes. Always a multiple of 4.
    const WIRE_LEN: usize;

    fn put(&self, parcel: &mut Parcel);
    fn take(parcel: &mut Parcel) -> Result<Self>;
}

fn align4(v: usize) -> usize {
    (v + 3) & !3
}

/// Owned byte buffer with independent read and write cursors.
pub struct Parcel {
    buffer: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
}

impl Parcel {
    pub fn new() -> Self {
        Self {
            buffer: vec![0; GROW_SLACK],
            read_pos: 0,
            write_pos: 0,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            buffer: data,
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Bytes left between the read cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.read_pos)
    }

    fn take_raw(&mut self, len: usize) -> Result<&[u8]> {
        if self.read_pos + len > self.buffer.len() {
            return Err(ParcelError::Truncated {
                at: self.read_pos,
                wanted: len,
                len: self.buffer.len(),
            });
        }
        let start = self.read_pos;
        self.read_pos += len;
        Ok(&self.buffer[start..start + len])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take_raw(4)?;
        let v = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
        self.read_pos = align4(self.read_pos);
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take_raw(8)?;
        let v = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        self.read_pos = align4(self.read_pos);
        Ok(v)
    }

    /// Reads one UTF-16 code unit without re-aligning the cursor. Callers are
    /// expected to re-align once after the run of code units they scan.
    pub fn read_u16_unaligned(&mut self) -> Result<u16> {
        let b = self.take_raw(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Copies `len` raw bytes, then re-aligns the read cursor.
    pub fn read_block(&mut self, len: usize) -> Result<Vec<u8>> {
        let data = self.take_raw(len)?.to_vec();
        self.read_pos = align4(self.read_pos);
        Ok(data)
    }

    /// Reads the leading interface token: an unused word, a length word, then
    /// `length + 1` UTF-16 code units. The decoded text is returned as-is and
    /// deliberately not validated against any expected interface name.
    pub fn read_interface_token(&mut self) -> Result<String> {
        let _unknown = self.read_u32()?;
        let length = self.read_u32()?;

        // The length word is untrusted; cap the reservation by what the
        // buffer can actually hold so a hostile value cannot force a huge
        // allocation before the bounds check trips.
        let reserve = ((length as usize).saturating_add(1)).min(self.remaining() / 2);
        let mut units = Vec::with_capacity(reserve);
        for _ in 0..=length {
            units.push(self.read_u16_unaligned()?);
        }
        self.read_pos = align4(self.read_pos);

        Ok(String::from_utf16_lossy(&units))
    }

    fn reserve_for(&mut self, len: usize) {
        if self.buffer.len() < self.write_pos + len {
            let grown = self.buffer.len() + len + GROW_SLACK;
            self.buffer.resize(grown, 0);
        }
    }

    fn put_raw(&mut self, bytes: &[u8]) {
        self.reserve_for(bytes.len());
        self.buffer[self.write_pos..self.write_pos + bytes.len()].copy_from_slice(bytes);
        self.write_pos += bytes.len();
    }

    /// Writes one UTF-16 code unit without re-aligning the cursor; the
    /// counterpart of [`Parcel::read_u16_unaligned`].
    pub fn write_u16_unaligned(&mut self, v: u16) {
        self.put_raw(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.put_raw(&v.to_le_bytes());
        self.write_pos = align4(self.write_pos);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.put_raw(&v.to_le_bytes());
        self.write_pos = align4(self.write_pos);
    }

    /// Rounds the write cursor up to the next multiple of 4. Padding bytes
    /// are zero-filled. Only needed after a run of unaligned writes.
    pub fn align_write(&mut self) {
        let aligned = align4(self.write_pos);
        self.reserve_for(aligned - self.write_pos);
        self.write_pos = aligned;
    }

    /// Appends raw bytes, then re-aligns the write cursor. Alignment padding
    /// is zero-filled.
    pub fn write_block(&mut self, bytes: &[u8]) {
        self.put_raw(bytes);
        self.align_write();
    }

    /// Writes an embedded object: a size word, a descriptor-count word, then
    /// the object itself. Attaching OS descriptors is unsupported, so the
    /// count is always zero.
    pub fn write_object<T: ParcelStruct>(&mut self, value: &T) {
        self.write_u32(T::WIRE_LEN as u32);
        self.write_u32(0);
        value.put(self);
    }

    /// Frames `payload` with the 16-byte header and returns the full buffer.
    pub fn serialize<P: OutgoingPayload>(payload: &P) -> Vec<u8> {
        let mut parcel = Parcel::new();
        parcel.write_pos = HEADER_LEN;
        payload.encode(&mut parcel);

        let header = ParcelHeader {
            data_size: (parcel.write_pos - HEADER_LEN) as u32,
            data_offset: HEADER_LEN as u32,
            objects_size: 4,
            objects_offset: parcel.write_pos as u32,
        };
        parcel.buffer[..HEADER_LEN].copy_from_slice(&header.to_bytes());
        parcel.buffer.truncate(parcel.write_pos);
        parcel.buffer
    }

    /// Reads the header, positions the read cursor at `data_offset` and
    /// decodes `P` from the data region.
    pub fn deserialize<P: IncomingPayload>(data: Vec<u8>) -> Result<P> {
        if data.len() <= HEADER_LEN {
            return Err(ParcelError::MissingHeader { len: data.len() });
        }
        let header = ParcelHeader::from_bytes(&data[..HEADER_LEN]);
        let mut parcel = Parcel::from_bytes(data);
        parcel.read_pos = header.data_offset as usize;
        P::decode(&mut parcel)
    }

    /// Parses the header of an already-serialized parcel. Used by tests and
    /// by callers that only need the framing. Unlike
    /// [`deserialize`](Self::deserialize), a header-only parcel (an empty
    /// data region) is acceptable here.
    pub fn peek_header(data: &[u8]) -> Result<ParcelHeader> {
        if data.len() < HEADER_LEN {
            return Err(ParcelError::MissingHeader { len: data.len() });
        }
        Ok(ParcelHeader::from_bytes(&data[..HEADER_LEN]))
    }
}

impl Default for Parcel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Words(Vec<u32>);

    impl OutgoingPayload for Words {
        fn encode(&self, parcel: &mut Parcel) {
            for w in &self.0 {
                parcel.write_u32(*w);
            }
        }
    }

    #[test]
    fn header_invariants_hold_for_produced_parcels() {
        for n in [0usize, 1, 5, 40] {
            let bytes = Parcel::serialize(&Words((0..n as u32).collect()));
            let header = Parcel::peek_header(&bytes).unwrap();
            assert_eq!(header.data_size as usize, 4 * n);
            assert_eq!(header.data_offset, 16);
            assert_eq!(header.objects_size, 4);
            assert_eq!(header.objects_offset, 16 + header.data_size);
        }
    }

    #[test]
    fn cursors_stay_aligned() {
        let mut p = Parcel::new();
        p.write_block(&[1, 2, 3]);
        assert_eq!(p.write_pos % 4, 0);
        p.write_u64(7);
        assert_eq!(p.write_pos % 4, 0);
        p.write_u32(9);
        assert_eq!(p.write_pos % 4, 0);

        let mut r = Parcel::from_bytes(p.buffer);
        assert_eq!(r.read_block(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(r.read_pos % 4, 0);
        assert_eq!(r.read_u64().unwrap(), 7);
        assert_eq!(r.read_pos % 4, 0);
        assert_eq!(r.read_u32().unwrap(), 9);
        assert_eq!(r.read_pos % 4, 0);
    }

    #[test]
    fn read_past_end_is_rejected() {
        let mut p = Parcel::from_bytes(vec![0; 6]);
        assert_eq!(p.read_u32().unwrap(), 0);
        assert!(matches!(
            p.read_u32(),
            Err(ParcelError::Truncated { at: 4, wanted: 4, len: 6 })
        ));
    }

    #[test]
    fn deserialize_requires_a_full_header() {
        for len in [0usize, 15] {
            let err = Parcel::peek_header(&vec![0u8; len]).unwrap_err();
            assert_eq!(err, ParcelError::MissingHeader { len });
        }
        // A header-only parcel peeks fine but carries no data to decode.
        assert!(Parcel::peek_header(&[0u8; 16]).is_ok());
        let err = Parcel::deserialize::<crate::payloads::EmptyResponse>(vec![0u8; 16]).unwrap_err();
        assert_eq!(err, ParcelError::MissingHeader { len: 16 });
    }

    #[test]
    fn interface_token_scan_realigns_once() {
        let mut p = Parcel::new();
        p.write_u32(0); // unused word
        p.write_u32(2); // length
        // Three UTF-16 code units (length + 1), packed without padding.
        p.write_block(&[b'h', 0, b'i', 0, b'!', 0]);
        p.write_u32(0xdead_beef);

        let mut r = Parcel::from_bytes(p.buffer);
        assert_eq!(r.read_interface_token().unwrap(), "hi!");
        assert_eq!(r.read_pos % 4, 0);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
    }

    #[test]
    fn hostile_token_length_fails_without_allocating() {
        let mut p = Parcel::new();
        p.write_u32(0);
        p.write_u32(u32::MAX); // claimed code-unit count
        p.write_block(&[0u8; 8]);

        let mut r = Parcel::from_bytes(p.buffer);
        assert!(matches!(
            r.read_interface_token(),
            Err(ParcelError::Truncated { .. })
        ));
    }

    #[test]
    fn writes_grow_the_backing_buffer() {
        let mut p = Parcel::new();
        for i in 0..64u32 {
            p.write_u32(i);
        }
        assert!(p.buffer.len() >= 256);
        let mut r = Parcel::from_bytes(p.buffer);
        for i in 0..64u32 {
            assert_eq!(r.read_u32().unwrap(), i);
        }
    }
}
