//! Latched signal lines and the handles the transport waits on.
//!
//! The surrounding transport owns the actual suspend/resume primitive; this
//! subsystem only hands out stable [`EventHandle`] values and latches signal
//! state until a consumer takes it.

/// Opaque handle identifying one signal source to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u32);

impl EventHandle {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Hands out unique [`EventHandle`] values. One allocator per registry.
#[derive(Debug, Default)]
pub struct EventAllocator {
    next: u32,
}

impl EventAllocator {
    pub fn allocate(&mut self) -> EventHandle {
        let handle = EventHandle(self.next);
        self.next += 1;
        handle
    }
}

/// A signal line that stays raised until consumed.
#[derive(Debug)]
pub struct Signal {
    handle: EventHandle,
    raised: bool,
}

impl Signal {
    pub fn new(handle: EventHandle) -> Self {
        Self {
            handle,
            raised: false,
        }
    }

    pub fn handle(&self) -> EventHandle {
        self.handle
    }

    pub fn fire(&mut self) {
        self.raised = true;
    }

    /// Consumes the latch, returning whether it was raised.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.raised)
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }
}
