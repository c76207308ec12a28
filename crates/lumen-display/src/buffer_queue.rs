//! Per-layer slot table implementing producer/consumer buffer exchange.
//!
//! Slot lifecycle: `FREE -> DEQUEUED -> QUEUED -> ACQUIRED -> FREE`. The
//! producer side drives the first two transitions through transactions; the
//! compositor side drives acquire/release. A slot's bound descriptor is
//! independent of its lifecycle state: it is set once by
//! [`BufferQueue::set_preallocated_buffer`] and never implicitly cleared.

use lumen_parcel::{BufferDescriptor, CropRect, FenceBundle, TransformFlags};
use thiserror::Error;

use crate::event::{EventAllocator, EventHandle, Signal};

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("slot {slot} out of range for capacity {capacity}")]
    SlotOutOfRange { slot: u32, capacity: usize },

    #[error("slot {slot} has no bound buffer descriptor")]
    NoDescriptor { slot: u32 },

    #[error("slot {slot} is {actual:?}, expected {expected:?}")]
    InvalidState {
        slot: u32,
        expected: SlotState,
        actual: SlotState,
    },

    #[error("unrecognized query selector {0}")]
    UnsupportedQuery(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Dequeued,
    Queued,
    Acquired,
}

/// Presentation metadata recorded while a slot is QUEUED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentRequest {
    pub crop: CropRect,
    pub transform: TransformFlags,
    pub timestamp: u32,
    pub swap_interval: u32,
}

/// Queue-side view returned to the producer after QueueBuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub width: u32,
    pub height: u32,
    pub transform_hint: u32,
    pub pending_buffers: u32,
}

/// Read-only metadata selectors accepted by Query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    DefaultWidth,
    DefaultHeight,
    PixelFormat,
    MinUndequeuedBuffers,
}

impl QueryKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::DefaultWidth,
            1 => Self::DefaultHeight,
            2 => Self::PixelFormat,
            3 => Self::MinUndequeuedBuffers,
            _ => return None,
        })
    }
}

#[derive(Debug)]
struct BufferSlot {
    state: SlotState,
    descriptor: Option<BufferDescriptor>,
    fence: Option<FenceBundle>,
    present: Option<PresentRequest>,
}

impl BufferSlot {
    fn new() -> Self {
        Self {
            state: SlotState::Free,
            descriptor: None,
            fence: None,
            present: None,
        }
    }
}

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_PIXEL_FORMAT: u32 = 1;

/// Fixed-capacity slot table plus the two signal lines waiters observe.
#[derive(Debug)]
pub struct BufferQueue {
    slots: Vec<BufferSlot>,
    width: u32,
    height: u32,
    pixel_format: u32,
    transform_hint: u32,
    slot_freed: Signal,
    queue_changed: Signal,
}

impl BufferQueue {
    pub fn new(capacity: usize, events: &mut EventAllocator) -> Self {
        Self {
            slots: (0..capacity).map(|_| BufferSlot::new()).collect(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            pixel_format: DEFAULT_PIXEL_FORMAT,
            transform_hint: 0,
            slot_freed: Signal::new(events.allocate()),
            queue_changed: Signal::new(events.allocate()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn default_width(&self) -> u32 {
        self.width
    }

    pub fn default_height(&self) -> u32 {
        self.height
    }

    pub fn transform_hint(&self) -> u32 {
        self.transform_hint
    }

    /// Number of QUEUED slots awaiting the compositor.
    pub fn pending_count(&self) -> u32 {
        self.count_in(SlotState::Queued)
    }

    fn count_in(&self, state: SlotState) -> u32 {
        self.slots.iter().filter(|s| s.state == state).count() as u32
    }

    /// DEQUEUED + QUEUED + ACQUIRED slots; never exceeds capacity.
    pub fn occupied_count(&self) -> u32 {
        self.slots.len() as u32 - self.count_in(SlotState::Free)
    }

    pub fn slot_state(&self, slot: u32) -> Result<SlotState> {
        Ok(self.slot(slot)?.state)
    }

    fn slot(&self, slot: u32) -> Result<&BufferSlot> {
        self.slots
            .get(slot as usize)
            .ok_or(QueueError::SlotOutOfRange {
                slot,
                capacity: self.slots.len(),
            })
    }

    fn slot_mut(&mut self, slot: u32) -> Result<&mut BufferSlot> {
        let capacity = self.slots.len();
        self.slots
            .get_mut(slot as usize)
            .ok_or(QueueError::SlotOutOfRange { slot, capacity })
    }

    fn transition(&mut self, slot: u32, next: SlotState) {
        self.slots[slot as usize].state = next;
        self.queue_changed.fire();
        if next == SlotState::Free {
            self.slot_freed.fire();
        }
    }

    fn expect_state(&self, slot: u32, expected: SlotState) -> Result<()> {
        let actual = self.slot(slot)?.state;
        if actual != expected {
            return Err(QueueError::InvalidState {
                slot,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Binds `descriptor` to `slot` unconditionally, regardless of the slot's
    /// current lifecycle state. Used to register externally-allocated
    /// graphics memory into a slot, typically once before first use.
    pub fn set_preallocated_buffer(
        &mut self,
        slot: u32,
        descriptor: BufferDescriptor,
    ) -> Result<()> {
        self.slot_mut(slot)?.descriptor = Some(descriptor);
        Ok(())
    }

    /// Scans slots in index order for the first FREE slot whose bound
    /// descriptor satisfies the requested dimensions (a zero dimension is
    /// unconstrained). `None` is not an error: it means the caller must wait
    /// for [`slot_freed`](Self::slot_freed_handle).
    pub fn dequeue_buffer(&mut self, width: u32, height: u32) -> Option<(u32, FenceBundle)> {
        let matches = |slot: &BufferSlot| {
            let Some(descriptor) = &slot.descriptor else {
                return false;
            };
            slot.state == SlotState::Free
                && (width == 0 || descriptor.width == width)
                && (height == 0 || descriptor.height == height)
        };

        let index = self.slots.iter().position(matches)? as u32;
        self.transition(index, SlotState::Dequeued);
        let fence = self.slots[index as usize].fence.unwrap_or_default();
        Some((index, fence))
    }

    /// Returns the descriptor bound to `slot`.
    pub fn request_buffer(&self, slot: u32) -> Result<&BufferDescriptor> {
        self.slot(slot)?
            .descriptor
            .as_ref()
            .ok_or(QueueError::NoDescriptor { slot })
    }

    /// Records presentation metadata and moves `slot` from DEQUEUED to
    /// QUEUED, returning the queue's updated view of the surface.
    pub fn queue_buffer(
        &mut self,
        slot: u32,
        present: PresentRequest,
        fence: FenceBundle,
    ) -> Result<QueueStatus> {
        self.expect_state(slot, SlotState::Dequeued)?;
        {
            let entry = self.slot_mut(slot)?;
            entry.present = Some(present);
            entry.fence = Some(fence);
        }
        self.transition(slot, SlotState::Queued);
        Ok(self.status())
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            width: self.width,
            height: self.height,
            transform_hint: self.transform_hint,
            pending_buffers: self.pending_count(),
        }
    }

    /// Returns a slot to FREE without presenting it. A DEQUEUED slot is the
    /// common case; a QUEUED slot may also be pulled back as long as the
    /// compositor has not acquired it yet.
    pub fn cancel_buffer(&mut self, slot: u32, fence: FenceBundle) -> Result<()> {
        let actual = self.slot(slot)?.state;
        if actual != SlotState::Dequeued && actual != SlotState::Queued {
            return Err(QueueError::InvalidState {
                slot,
                expected: SlotState::Dequeued,
                actual,
            });
        }
        {
            let entry = self.slot_mut(slot)?;
            entry.fence = Some(fence);
            entry.present = None;
        }
        self.transition(slot, SlotState::Free);
        Ok(())
    }

    /// Like cancel, but leaves the slot's bound descriptor in place so the
    /// slot stays immediately reusable.
    pub fn detach_buffer(&mut self, slot: u32) -> Result<()> {
        self.expect_state(slot, SlotState::Dequeued)?;
        self.transition(slot, SlotState::Free);
        Ok(())
    }

    /// Compositor side: claims the first QUEUED slot (index order) together
    /// with its presentation metadata.
    pub fn acquire_buffer(&mut self) -> Option<(u32, PresentRequest)> {
        let index = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Queued)? as u32;
        let present = self.slots[index as usize].present.take().unwrap_or_default();
        self.transition(index, SlotState::Acquired);
        Some((index, present))
    }

    /// Compositor side: returns an ACQUIRED slot to FREE.
    pub fn release_buffer(&mut self, slot: u32) -> Result<()> {
        self.expect_state(slot, SlotState::Acquired)?;
        self.transition(slot, SlotState::Free);
        Ok(())
    }

    /// Read-only metadata fetch; never mutates queue state.
    pub fn query(&self, kind: QueryKind) -> u32 {
        match kind {
            QueryKind::DefaultWidth => self.width,
            QueryKind::DefaultHeight => self.height,
            QueryKind::PixelFormat => self.pixel_format,
            QueryKind::MinUndequeuedBuffers => 0,
        }
    }

    pub fn query_raw(&self, raw: u32) -> Result<u32> {
        let kind = QueryKind::from_raw(raw).ok_or(QueueError::UnsupportedQuery(raw))?;
        Ok(self.query(kind))
    }

    /// Handle for the "a slot became FREE" signal; this is the wait handle a
    /// blocked DequeueBuffer parks on.
    pub fn slot_freed_handle(&self) -> EventHandle {
        self.slot_freed.handle()
    }

    pub fn queue_changed_handle(&self) -> EventHandle {
        self.queue_changed.handle()
    }

    /// Consumes the "slot freed" latch.
    pub fn take_slot_freed(&mut self) -> bool {
        self.slot_freed.take()
    }

    /// Consumes the "queue changed" latch.
    pub fn take_queue_changed(&mut self) -> bool {
        self.queue_changed.take()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn queue_with(capacity: usize, dims: &[(u32, u32)]) -> BufferQueue {
        let mut events = EventAllocator::default();
        let mut queue = BufferQueue::new(capacity, &mut events);
        for (slot, (w, h)) in dims.iter().enumerate() {
            queue
                .set_preallocated_buffer(slot as u32, BufferDescriptor::with_dimensions(*w, *h))
                .unwrap();
        }
        queue
    }

    #[test]
    fn full_lifecycle_roundtrip() {
        let mut queue = queue_with(2, &[(1280, 720), (1280, 720)]);

        let (slot, _fence) = queue.dequeue_buffer(1280, 720).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(queue.slot_state(0).unwrap(), SlotState::Dequeued);

        let status = queue
            .queue_buffer(slot, PresentRequest::default(), FenceBundle::empty())
            .unwrap();
        assert_eq!(queue.slot_state(0).unwrap(), SlotState::Queued);
        assert_eq!(status.pending_buffers, 1);

        let (acquired, _present) = queue.acquire_buffer().unwrap();
        assert_eq!(acquired, slot);
        assert_eq!(queue.slot_state(0).unwrap(), SlotState::Acquired);

        queue.release_buffer(slot).unwrap();
        assert_eq!(queue.slot_state(0).unwrap(), SlotState::Free);
    }

    #[test]
    fn occupied_never_exceeds_capacity() {
        let mut queue = queue_with(3, &[(64, 64), (64, 64), (64, 64)]);
        let mut dequeued = Vec::new();
        while let Some((slot, _)) = queue.dequeue_buffer(64, 64) {
            dequeued.push(slot);
            assert!(queue.occupied_count() <= queue.capacity() as u32);
        }
        assert_eq!(dequeued, vec![0, 1, 2]);
        assert_eq!(queue.occupied_count(), 3);

        queue
            .queue_buffer(1, PresentRequest::default(), FenceBundle::empty())
            .unwrap();
        queue.cancel_buffer(0, FenceBundle::empty()).unwrap();
        assert_eq!(queue.occupied_count(), 2);
    }

    #[test]
    fn dequeue_honors_requested_dimensions() {
        let mut queue = queue_with(2, &[(640, 480), (1280, 720)]);
        let (slot, _) = queue.dequeue_buffer(1280, 720).unwrap();
        assert_eq!(slot, 1);
        // Unconstrained request takes the first free slot with a descriptor.
        let (slot, _) = queue.dequeue_buffer(0, 0).unwrap();
        assert_eq!(slot, 0);
    }

    #[test]
    fn dequeue_skips_slots_without_descriptors() {
        let mut events = EventAllocator::default();
        let mut queue = BufferQueue::new(2, &mut events);
        assert_eq!(queue.dequeue_buffer(0, 0), None);
        queue
            .set_preallocated_buffer(1, BufferDescriptor::with_dimensions(32, 32))
            .unwrap();
        assert_eq!(queue.dequeue_buffer(0, 0).map(|(s, _)| s), Some(1));
    }

    #[test]
    fn queue_buffer_requires_dequeued_state() {
        let mut queue = queue_with(1, &[(32, 32)]);
        let err = queue
            .queue_buffer(0, PresentRequest::default(), FenceBundle::empty())
            .unwrap_err();
        assert_eq!(
            err,
            QueueError::InvalidState {
                slot: 0,
                expected: SlotState::Dequeued,
                actual: SlotState::Free,
            }
        );
    }

    #[test]
    fn detach_leaves_descriptor_bound() {
        let mut queue = queue_with(1, &[(32, 32)]);
        let (slot, _) = queue.dequeue_buffer(32, 32).unwrap();
        queue.detach_buffer(slot).unwrap();
        assert_eq!(queue.slot_state(slot).unwrap(), SlotState::Free);
        assert!(queue.request_buffer(slot).is_ok());
        // The slot is immediately reusable.
        assert_eq!(queue.dequeue_buffer(32, 32).map(|(s, _)| s), Some(slot));
    }

    #[test]
    fn freeing_a_slot_raises_the_slot_freed_signal() {
        let mut queue = queue_with(1, &[(32, 32)]);
        assert!(!queue.take_slot_freed());

        let (slot, _) = queue.dequeue_buffer(32, 32).unwrap();
        assert!(!queue.take_slot_freed());
        assert!(queue.take_queue_changed());

        queue.cancel_buffer(slot, FenceBundle::empty()).unwrap();
        assert!(queue.take_slot_freed());
        assert!(queue.take_queue_changed());
    }

    #[test]
    fn cancel_pulls_back_an_unacquired_queued_slot() {
        let mut queue = queue_with(1, &[(32, 32)]);
        let (slot, _) = queue.dequeue_buffer(32, 32).unwrap();
        queue
            .queue_buffer(slot, PresentRequest::default(), FenceBundle::empty())
            .unwrap();
        queue.cancel_buffer(slot, FenceBundle::empty()).unwrap();
        assert_eq!(queue.slot_state(slot).unwrap(), SlotState::Free);
        assert_eq!(queue.pending_count(), 0);

        // Once acquired, the compositor owns it and cancel is invalid.
        let (slot, _) = queue.dequeue_buffer(32, 32).unwrap();
        queue
            .queue_buffer(slot, PresentRequest::default(), FenceBundle::empty())
            .unwrap();
        queue.acquire_buffer().unwrap();
        assert!(matches!(
            queue.cancel_buffer(slot, FenceBundle::empty()),
            Err(QueueError::InvalidState { .. })
        ));
    }

    #[test]
    fn request_buffer_without_descriptor_is_not_found() {
        let mut events = EventAllocator::default();
        let queue = BufferQueue::new(1, &mut events);
        assert_eq!(
            queue.request_buffer(0).unwrap_err(),
            QueueError::NoDescriptor { slot: 0 }
        );
        assert_eq!(
            queue.request_buffer(9).unwrap_err(),
            QueueError::SlotOutOfRange {
                slot: 9,
                capacity: 1
            }
        );
    }

    #[test]
    fn queries_are_read_only() {
        let queue = queue_with(2, &[(16, 16)]);
        assert_eq!(queue.query_raw(0).unwrap(), DEFAULT_WIDTH);
        assert_eq!(queue.query_raw(1).unwrap(), DEFAULT_HEIGHT);
        assert_eq!(queue.query_raw(2).unwrap(), DEFAULT_PIXEL_FORMAT);
        assert_eq!(queue.query_raw(3).unwrap(), 0);
        assert_eq!(
            queue.query_raw(17).unwrap_err(),
            QueueError::UnsupportedQuery(17)
        );
    }

    #[test]
    fn queued_fence_is_returned_on_next_dequeue() {
        let mut queue = queue_with(1, &[(32, 32)]);
        let (slot, initial) = queue.dequeue_buffer(32, 32).unwrap();
        assert_eq!(initial, FenceBundle::empty());

        let fence = FenceBundle::single(7, 99);
        queue
            .queue_buffer(slot, PresentRequest::default(), fence)
            .unwrap();
        let (_, present) = queue.acquire_buffer().unwrap();
        let _ = present;
        queue.release_buffer(slot).unwrap();

        let (again, returned) = queue.dequeue_buffer(32, 32).unwrap();
        assert_eq!(again, slot);
        assert_eq!(returned, fence);
    }
}
