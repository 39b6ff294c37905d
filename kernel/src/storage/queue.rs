//! Request queue
//!
//! Host side of the request path: submitters push requests, the driver's
//! request function drains them in FIFO order and completes each one.
//! No merging, no reordering.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use spin::Mutex;

use super::block::{BlockDeviceOps, KERNEL_SECTOR_SIZE};
use super::request::{BlkStatus, Completion, Request};
use crate::util::{KError, KResult};

/// Queue ID
pub type QueueId = u32;

/// Completions nunca coletadas além deste limite são descartadas, as mais antigas primeiro.
pub const MAX_COMPLETIONS: usize = 1024;

/// Driver entry point bound to a queue at creation (blk_init_queue).
pub type RequestFn = fn(&RequestQueue, &dyn BlockDeviceOps);

/// Queue statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub completed_ok: u64,
    pub completed_err: u64,
    /// Completions descartadas sem ninguém buscar
    pub dropped: u64,
}

pub struct RequestQueue {
    id: QueueId,
    request_fn: RequestFn,
    ops: Arc<dyn BlockDeviceOps>,
    logical_block_size: AtomicU32,
    pending: Mutex<VecDeque<Request>>,
    completed: Mutex<VecDeque<Completion>>,
    next_tag: AtomicU64,
    dead: AtomicBool,
    stats: Mutex<QueueStats>,
}

impl RequestQueue {
    pub fn new(id: QueueId, request_fn: RequestFn, ops: Arc<dyn BlockDeviceOps>) -> Self {
        Self {
            id,
            request_fn,
            ops,
            logical_block_size: AtomicU32::new(KERNEL_SECTOR_SIZE),
            pending: Mutex::new(VecDeque::new()),
            completed: Mutex::new(VecDeque::new()),
            next_tag: AtomicU64::new(1),
            dead: AtomicBool::new(false),
            stats: Mutex::new(QueueStats::default()),
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    /// blk_queue_logical_block_size
    pub fn set_logical_block_size(&self, size: u32) {
        self.logical_block_size.store(size, Ordering::Relaxed);
    }

    pub fn logical_block_size(&self) -> u32 {
        self.logical_block_size.load(Ordering::Relaxed)
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Enfileira um request e devolve a tag atribuída.
    pub fn submit(&self, mut req: Request) -> KResult<u64> {
        if self.is_dead() {
            return Err(KError::NoDevice);
        }
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        req.tag = tag;
        self.pending.lock().push_back(req);
        self.stats.lock().submitted += 1;
        Ok(tag)
    }

    /// Dispatch: hand the queue to the bound request function.
    pub fn run(&self) {
        if self.is_dead() {
            return;
        }
        (self.request_fn)(self, &*self.ops);
    }

    /// blk_fetch_request: claim the oldest pending request.
    pub fn fetch_request(&self) -> Option<Request> {
        if self.is_dead() {
            return None;
        }
        self.pending.lock().pop_front()
    }

    /// __blk_end_request_all
    pub fn end_request(&self, req: Request, status: BlkStatus) {
        let mut stats = self.stats.lock();
        match status {
            BlkStatus::Ok => stats.completed_ok += 1,
            BlkStatus::IoErr => stats.completed_err += 1,
        }

        let mut done = self.completed.lock();
        done.push_back(Completion {
            tag: req.tag,
            status,
            request: req,
        });
        while done.len() > MAX_COMPLETIONS {
            done.pop_front();
            stats.dropped += 1;
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn take_completion(&self, tag: u64) -> Option<Completion> {
        let mut done = self.completed.lock();
        let idx = done.iter().position(|c| c.tag == tag)?;
        done.remove(idx)
    }

    /// All completions so far, in completion order.
    pub fn take_completions(&self) -> Vec<Completion> {
        self.completed.lock().drain(..).collect()
    }

    pub fn stats(&self) -> QueueStats {
        *self.stats.lock()
    }

    /// blk_cleanup_queue: mark dead and fail whatever is still pending.
    pub fn cleanup(&self) {
        self.dead.store(true, Ordering::Release);
        let leftovers: Vec<Request> = self.pending.lock().drain(..).collect();
        for req in leftovers {
            self.end_request(req, BlkStatus::IoErr);
        }
    }
}
