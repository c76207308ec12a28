//! Authoritative owner of displays, layers and buffer queues.
//!
//! Every other component holds only the integer handles this registry hands
//! out and re-resolves them at call time; nothing aliases a queue across a
//! suspension point.

use crate::buffer_queue::BufferQueue;
use crate::event::{EventAllocator, EventHandle, Signal};

/// The only display name the service currently recognizes.
pub const DEFAULT_DISPLAY_NAME: &str = "Default";

/// Slot count used for queues backing layers created through the registry.
pub const LAYER_QUEUE_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct Display {
    id: u64,
    name: String,
    vsync: Signal,
}

impl Display {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Per-display periodic signal handle the transport pulses once per
    /// refresh interval.
    pub fn vsync_handle(&self) -> EventHandle {
        self.vsync.handle()
    }
}

#[derive(Debug)]
struct Layer {
    id: u64,
    display_id: u64,
    queue_id: u32,
}

#[derive(Debug, Default)]
pub struct DisplayRegistry {
    displays: Vec<Display>,
    layers: Vec<Layer>,
    queues: Vec<(u32, BufferQueue)>,
    events: EventAllocator,
    next_display_id: u64,
    next_layer_id: u64,
    next_queue_id: u32,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the display called `name`, creating it on first use. Repeated
    /// calls with the same name return the same id. Only
    /// [`DEFAULT_DISPLAY_NAME`] is recognized.
    pub fn open_display(&mut self, name: &str) -> Option<u64> {
        if name != DEFAULT_DISPLAY_NAME {
            return None;
        }
        if let Some(display) = self.displays.iter().find(|d| d.name == name) {
            return Some(display.id);
        }

        let id = self.next_display_id;
        self.next_display_id += 1;
        self.displays.push(Display {
            id,
            name: name.to_owned(),
            vsync: Signal::new(self.events.allocate()),
        });
        Some(id)
    }

    /// Allocates a layer on `display_id` together with its backing buffer
    /// queue. `None` if the display is unknown.
    pub fn create_layer(&mut self, display_id: u64) -> Option<u64> {
        self.find_display(display_id)?;

        let queue_id = self.next_queue_id;
        self.next_queue_id += 1;
        self.queues
            .push((queue_id, BufferQueue::new(LAYER_QUEUE_CAPACITY, &mut self.events)));

        let layer_id = self.next_layer_id;
        self.next_layer_id += 1;
        self.layers.push(Layer {
            id: layer_id,
            display_id,
            queue_id,
        });
        Some(layer_id)
    }

    fn find_display(&self, display_id: u64) -> Option<&Display> {
        self.displays.iter().find(|d| d.id == display_id)
    }

    /// Direct queue lookup.
    ///
    /// # Panics
    ///
    /// Panics if `queue_id` is unknown: queue ids are pre-validated upstream,
    /// so a miss here is an internal defect rather than a guest-visible
    /// error.
    pub fn find_buffer_queue(&self, queue_id: u32) -> &BufferQueue {
        match self.queues.iter().find(|(id, _)| *id == queue_id) {
            Some((_, queue)) => queue,
            None => panic!("buffer queue {queue_id} vanished after validation"),
        }
    }

    /// Mutable variant of [`find_buffer_queue`](Self::find_buffer_queue);
    /// same panic contract.
    pub fn find_buffer_queue_mut(&mut self, queue_id: u32) -> &mut BufferQueue {
        match self.queues.iter_mut().find(|(id, _)| *id == queue_id) {
            Some((_, queue)) => queue,
            None => panic!("buffer queue {queue_id} vanished after validation"),
        }
    }

    pub fn queue_exists(&self, queue_id: u32) -> bool {
        self.queues.iter().any(|(id, _)| *id == queue_id)
    }

    /// Compound lookup from a (display, layer) pair to the layer's queue id.
    pub fn find_buffer_queue_id(&self, display_id: u64, layer_id: u64) -> Option<u32> {
        self.layers
            .iter()
            .find(|l| l.display_id == display_id && l.id == layer_id)
            .map(|l| l.queue_id)
    }

    /// Handle of the display's periodic vsync signal.
    pub fn find_vsync_event(&self, display_id: u64) -> Option<EventHandle> {
        Some(self.find_display(display_id)?.vsync_handle())
    }

    /// Fires the display's vsync signal; driven by the transport's timer.
    pub fn pulse_vsync(&mut self, display_id: u64) -> Option<()> {
        let display = self.displays.iter_mut().find(|d| d.id == display_id)?;
        display.vsync.fire();
        Some(())
    }

    pub fn displays(&self) -> impl Iterator<Item = &Display> {
        self.displays.iter()
    }
}
