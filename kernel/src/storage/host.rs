//! Serviços do block layer do host que um driver de bloco consome.
//!
//! O driver nunca acessa estado global do host: tudo passa por este trait,
//! na mesma ordem em que um driver Linux chamaria vmalloc, blk_init_queue,
//! register_blkdev, alloc_disk e add_disk.

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::block::BlockDeviceOps;
use super::genhd::GenDisk;
use super::queue::{RequestFn, RequestQueue};
use crate::util::KResult;

/// Maior major aceito por register_blkdev.
pub const BLKDEV_MAJOR_MAX: u32 = 511;

pub trait BlockLayer {
    /// Zeroed, virtually contiguous allocation.
    fn vmalloc(&mut self, size: usize) -> KResult<Vec<u8>>;

    fn vfree(&mut self, buf: Vec<u8>);

    /// Create a request queue whose dispatch calls `request_fn` with `ops`.
    fn blk_init_queue(
        &mut self,
        request_fn: RequestFn,
        ops: Arc<dyn BlockDeviceOps>,
    ) -> KResult<Arc<RequestQueue>>;

    fn blk_cleanup_queue(&mut self, queue: Arc<RequestQueue>);

    /// Register `name` under `major`; `major == 0` asks for a dynamic one.
    /// Returns the major actually assigned.
    fn register_blkdev(&mut self, major: u32, name: &str) -> KResult<u32>;

    fn unregister_blkdev(&mut self, major: u32, name: &str);

    fn alloc_disk(&mut self, minors: u32) -> KResult<GenDisk>;

    /// Publish the disk; its node becomes visible.
    fn add_disk(&mut self, disk: Arc<GenDisk>) -> KResult<()>;

    /// Unpublish the disk; its node disappears.
    fn del_gendisk(&mut self, disk: &Arc<GenDisk>);

    /// Drop the driver's reference to a disk obtained from `alloc_disk`.
    fn put_disk(&mut self, disk: Arc<GenDisk>);
}
