//! Transaction dispatch: decode a parcel, run the queue operation, encode
//! the response.
//!
//! Every transaction runs to completion on the calling context except
//! DequeueBuffer, which on a miss parks a continuation (the captured request
//! plus a [`WaitTicket`]) on the target queue and reports
//! [`Transacted::Pending`]. Whenever a later transaction frees a slot on that
//! queue, every parked continuation re-runs the identical dequeue against the
//! queue's *current* state; winners are resumed exactly once through
//! [`TransactionRouter::take_completions`], losers re-park. No fairness
//! ordering is guaranteed among racing waiters, only eventual liveness.

use lumen_display::{DisplayRegistry, EventHandle, PresentRequest};
use lumen_parcel::payloads::{
    CancelRequest, ConnectRequest, DequeueRequest, DequeueResponse, DetachRequest, EmptyResponse,
    QueryRequest, QueryResponse, QueueRequest, QueueStatusResponse, RequestBufferRequest,
    RequestBufferResponse, SetPreallocatedRequest,
};
use lumen_parcel::Parcel;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};

/// Transaction codes understood by the router. The numbering is part of the
/// wire protocol and has gaps; codes marked unsupported are recognized but
/// rejected with an explicit status rather than silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionCode {
    RequestBuffer = 1,
    SetBufferCount = 2,
    DequeueBuffer = 3,
    DetachBuffer = 4,
    DetachNextBuffer = 5,
    AttachBuffer = 6,
    QueueBuffer = 7,
    CancelBuffer = 8,
    Query = 9,
    Connect = 10,
    Disconnect = 11,
    AllocateBuffers = 13,
    SetPreallocatedBuffer = 14,
}

impl TransactionCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::RequestBuffer,
            2 => Self::SetBufferCount,
            3 => Self::DequeueBuffer,
            4 => Self::DetachBuffer,
            5 => Self::DetachNextBuffer,
            6 => Self::AttachBuffer,
            7 => Self::QueueBuffer,
            8 => Self::CancelBuffer,
            9 => Self::Query,
            10 => Self::Connect,
            11 => Self::Disconnect,
            13 => Self::AllocateBuffers,
            14 => Self::SetPreallocatedBuffer,
            _ => return None,
        })
    }

    pub fn raw(self) -> u32 {
        self as u32
    }
}

/// Key the transport uses to resume a suspended DequeueBuffer caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitTicket(u64);

/// Outcome of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transacted {
    /// The encoded response parcel.
    Complete(Vec<u8>),
    /// The caller must suspend until the ticket completes; the response
    /// arrives later via [`TransactionRouter::take_completions`].
    Pending(WaitTicket),
}

#[derive(Debug)]
struct ParkedDequeue {
    ticket: WaitTicket,
    queue_id: u32,
    request: DequeueRequest,
}

/// Decodes incoming transactions, drives the buffer queues and registry, and
/// tracks suspended dequeue continuations.
#[derive(Debug, Default)]
pub struct TransactionRouter {
    registry: DisplayRegistry,
    parked: Vec<ParkedDequeue>,
    completions: Vec<(WaitTicket, Vec<u8>)>,
    next_ticket: u64,
}

impl TransactionRouter {
    pub fn new(registry: DisplayRegistry) -> Self {
        Self {
            registry,
            parked: Vec::new(),
            completions: Vec::new(),
            next_ticket: 0,
        }
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DisplayRegistry {
        &mut self.registry
    }

    /// Runs one transaction against the queue identified by `queue_id`.
    ///
    /// `queue_id` is pre-validated upstream (it came out of a native-window
    /// parcel this service produced); an unknown id panics in the registry
    /// rather than surfacing a guest-visible error.
    pub fn transact(
        &mut self,
        queue_id: u32,
        raw_code: u32,
        flags: u32,
        payload: &[u8],
    ) -> Result<Transacted> {
        let code = TransactionCode::from_raw(raw_code)
            .ok_or(ServiceError::UnknownTransaction(raw_code))?;
        debug!(queue_id, ?code, flags, "transact");

        let response = match code {
            TransactionCode::Connect => {
                let _request: ConnectRequest = Parcel::deserialize(payload.to_vec())?;
                let status = self.registry.find_buffer_queue(queue_id).status();
                Parcel::serialize(&QueueStatusResponse {
                    width: status.width,
                    height: status.height,
                    transform_hint: status.transform_hint,
                    pending_buffers: status.pending_buffers,
                    status: 0,
                })
            }
            TransactionCode::SetPreallocatedBuffer => {
                let request: SetPreallocatedRequest = Parcel::deserialize(payload.to_vec())?;
                self.registry
                    .find_buffer_queue_mut(queue_id)
                    .set_preallocated_buffer(request.slot, request.descriptor)?;
                Parcel::serialize(&EmptyResponse)
            }
            TransactionCode::DequeueBuffer => {
                let request: DequeueRequest = Parcel::deserialize(payload.to_vec())?;
                let attempt = self
                    .registry
                    .find_buffer_queue_mut(queue_id)
                    .dequeue_buffer(request.width, request.height);
                match attempt {
                    Some((slot, fence)) => Parcel::serialize(&DequeueResponse { slot, fence }),
                    None => {
                        // Backpressure: park the continuation on this queue's
                        // slot-freed signal and suspend the caller.
                        let ticket = WaitTicket(self.next_ticket);
                        self.next_ticket += 1;
                        self.parked.push(ParkedDequeue {
                            ticket,
                            queue_id,
                            request,
                        });
                        debug!(queue_id, ?ticket, "dequeue miss, caller parked");
                        return Ok(Transacted::Pending(ticket));
                    }
                }
            }
            TransactionCode::RequestBuffer => {
                let request: RequestBufferRequest = Parcel::deserialize(payload.to_vec())?;
                let descriptor = *self
                    .registry
                    .find_buffer_queue(queue_id)
                    .request_buffer(request.slot)?;
                Parcel::serialize(&RequestBufferResponse { descriptor })
            }
            TransactionCode::QueueBuffer => {
                let request: QueueRequest = Parcel::deserialize(payload.to_vec())?;
                let present = PresentRequest {
                    crop: request.crop,
                    transform: request.transform,
                    timestamp: request.timestamp,
                    swap_interval: request.swap_interval,
                };
                let status = self.registry.find_buffer_queue_mut(queue_id).queue_buffer(
                    request.slot,
                    present,
                    request.fence,
                )?;
                Parcel::serialize(&QueueStatusResponse {
                    width: status.width,
                    height: status.height,
                    transform_hint: status.transform_hint,
                    pending_buffers: status.pending_buffers,
                    status: 0,
                })
            }
            TransactionCode::CancelBuffer => {
                let request: CancelRequest = Parcel::deserialize(payload.to_vec())?;
                self.registry
                    .find_buffer_queue_mut(queue_id)
                    .cancel_buffer(request.slot, request.fence)?;
                Parcel::serialize(&EmptyResponse)
            }
            TransactionCode::DetachBuffer => {
                let request: DetachRequest = Parcel::deserialize(payload.to_vec())?;
                self.registry
                    .find_buffer_queue_mut(queue_id)
                    .detach_buffer(request.slot)?;
                Parcel::serialize(&EmptyResponse)
            }
            TransactionCode::Query => {
                let request: QueryRequest = Parcel::deserialize(payload.to_vec())?;
                let value = self
                    .registry
                    .find_buffer_queue(queue_id)
                    .query_raw(request.kind)?;
                Parcel::serialize(&QueryResponse { value })
            }
            TransactionCode::DetachNextBuffer | TransactionCode::Disconnect => {
                // The request payload is opaque here; acknowledge only.
                warn!(queue_id, ?code, "acknowledged without effect");
                Parcel::serialize(&EmptyResponse)
            }
            TransactionCode::SetBufferCount
            | TransactionCode::AttachBuffer
            | TransactionCode::AllocateBuffers => {
                warn!(queue_id, ?code, "unsupported transaction");
                return Err(ServiceError::Unsupported);
            }
        };

        self.pump_waiters(queue_id);
        Ok(Transacted::Complete(response))
    }

    /// Reference-count adjustment on a queue handle. The service keeps no
    /// per-handle refcount, so this only validates and acknowledges.
    pub fn adjust_refcount(&mut self, queue_id: u32, addval: i32, kind: u32) -> Result<()> {
        if !self.registry.queue_exists(queue_id) {
            return Err(ServiceError::NotFound);
        }
        warn!(queue_id, addval, kind, "refcount adjustment acknowledged");
        Ok(())
    }

    /// Wait handle for a queue: the "slot freed" signal a blocked producer
    /// parks on.
    pub fn get_native_handle(&self, queue_id: u32) -> Result<EventHandle> {
        if !self.registry.queue_exists(queue_id) {
            return Err(ServiceError::NotFound);
        }
        Ok(self.registry.find_buffer_queue(queue_id).slot_freed_handle())
    }

    /// Responses for continuations that completed since the last call, each
    /// paired with the ticket the caller suspended on. Every ticket appears
    /// at most once, ever.
    pub fn take_completions(&mut self) -> Vec<(WaitTicket, Vec<u8>)> {
        std::mem::take(&mut self.completions)
    }

    /// Number of callers currently suspended on a dequeue.
    pub fn parked_count(&self) -> usize {
        self.parked.len()
    }

    /// Wakes parked waiters after a slot was freed outside the transaction
    /// path. Transactions pump automatically on completion; the consumer side
    /// (acquire/release through the registry) must call this afterwards.
    pub fn pump(&mut self, queue_id: u32) {
        self.pump_waiters(queue_id);
    }

    /// Re-runs parked dequeues against `queue_id` if one of its slots was
    /// freed. Each waiter independently re-attempts; whichever wins the slot
    /// proceeds, the rest re-park.
    fn pump_waiters(&mut self, queue_id: u32) {
        if !self
            .registry
            .find_buffer_queue_mut(queue_id)
            .take_slot_freed()
        {
            return;
        }

        let parked = std::mem::take(&mut self.parked);
        let mut still_parked = Vec::with_capacity(parked.len());
        for waiter in parked {
            if waiter.queue_id != queue_id {
                still_parked.push(waiter);
                continue;
            }
            let attempt = self
                .registry
                .find_buffer_queue_mut(queue_id)
                .dequeue_buffer(waiter.request.width, waiter.request.height);
            match attempt {
                Some((slot, fence)) => {
                    debug!(queue_id, ticket = ?waiter.ticket, slot, "parked dequeue resumed");
                    let response = Parcel::serialize(&DequeueResponse { slot, fence });
                    self.completions.push((waiter.ticket, response));
                }
                None => still_parked.push(waiter),
            }
        }
        self.parked = still_parked;
    }
}
