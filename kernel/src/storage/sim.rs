//! Block layer simulado.
//!
//! Implementa `BlockLayer` em memória para rodar drivers fora de um kernel:
//! registro de majors, filas de requests, discos publicados (os nós em
//! /dev) e I/O em bytes sobre esses nós. Cada chamada bem-sucedida fica
//! registrada em um journal de eventos e qualquer etapa pode ser forçada a
//! falhar (`FaultPoint`).

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::block::{BlockDeviceOps, HdGeometry, KERNEL_SECTOR_SIZE};
use super::genhd::{GenDisk, DISK_NAME_LEN};
use super::host::{BlockLayer, BLKDEV_MAJOR_MAX};
use super::queue::{QueueId, RequestFn, RequestQueue};
use super::request::{Completion, Request};
use crate::util::{KError, KResult};

/// Majors dinâmicos são procurados de cima para baixo a partir daqui.
pub const DYNAMIC_MAJOR_TOP: u32 = 254;

/// Host call that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Vmalloc,
    InitQueue,
    RegisterBlkdev,
    AllocDisk,
    AddDisk,
}

impl FaultPoint {
    pub const ALL: [FaultPoint; 5] = [
        FaultPoint::Vmalloc,
        FaultPoint::InitQueue,
        FaultPoint::RegisterBlkdev,
        FaultPoint::AllocDisk,
        FaultPoint::AddDisk,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vmalloc" => Some(FaultPoint::Vmalloc),
            "queue" | "init_queue" => Some(FaultPoint::InitQueue),
            "register" | "register_blkdev" => Some(FaultPoint::RegisterBlkdev),
            "alloc_disk" => Some(FaultPoint::AllocDisk),
            "add_disk" => Some(FaultPoint::AddDisk),
            _ => None,
        }
    }
}

/// Journal entry for every successful host call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Vmalloc(usize),
    Vfree(usize),
    InitQueue(QueueId),
    CleanupQueue(QueueId),
    RegisterBlkdev(u32, String),
    UnregisterBlkdev(u32, String),
    AllocDisk(u32),
    AddDisk(String),
    DelGendisk(String),
    PutDisk(String),
}

pub struct SimBlockLayer {
    fault: Option<FaultPoint>,
    mem_limit: usize,
    mem_in_use: usize,
    next_queue: QueueId,
    queues: BTreeMap<QueueId, Arc<RequestQueue>>,
    majors: BTreeMap<u32, String>,
    disks_allocated: usize,
    nodes: BTreeMap<String, Arc<GenDisk>>,
    events: Vec<HostEvent>,
}

impl SimBlockLayer {
    pub fn new() -> Self {
        Self {
            fault: None,
            mem_limit: usize::MAX,
            mem_in_use: 0,
            next_queue: 1,
            queues: BTreeMap::new(),
            majors: BTreeMap::new(),
            disks_allocated: 0,
            nodes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Limite de memória para vmalloc, em bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.mem_limit = bytes;
        self
    }

    /// Make the next call at `point` fail (one-shot).
    pub fn inject_fault(&mut self, point: FaultPoint) {
        self.fault = Some(point);
    }

    fn take_fault(&mut self, point: FaultPoint) -> bool {
        if self.fault == Some(point) {
            self.fault = None;
            true
        } else {
            false
        }
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn mem_in_use(&self) -> usize {
        self.mem_in_use
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn disks_allocated(&self) -> usize {
        self.disks_allocated
    }

    pub fn major_owner(&self, major: u32) -> Option<&str> {
        self.majors.get(&major).map(|s| s.as_str())
    }

    /// Nomes dos nós publicados, em ordem.
    pub fn nodes(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn disk(&self, name: &str) -> KResult<&Arc<GenDisk>> {
        self.nodes.get(name).ok_or(KError::NotFound)
    }

    fn node_queue(&self, name: &str) -> KResult<&Arc<RequestQueue>> {
        self.disk(name)?.queue.as_ref().ok_or(KError::NoDevice)
    }

    /// Node capacity in bytes.
    pub fn capacity_bytes(&self, name: &str) -> KResult<u64> {
        Ok(self.disk(name)?.get_capacity() * KERNEL_SECTOR_SIZE as u64)
    }

    /// Submit a raw request to the node's queue and dispatch it.
    pub fn submit(&self, name: &str, req: Request) -> KResult<Completion> {
        let q = self.node_queue(name)?;
        let tag = q.submit(req)?;
        q.run();
        q.take_completion(tag).ok_or(KError::IO)
    }

    /// Submit a batch, dispatch once, return completions in completion order.
    pub fn submit_batch(&self, name: &str, reqs: Vec<Request>) -> KResult<Vec<Completion>> {
        let q = self.node_queue(name)?;
        let mut tags = Vec::with_capacity(reqs.len());
        for req in reqs {
            tags.push(q.submit(req)?);
        }
        q.run();
        let mut out = Vec::with_capacity(tags.len());
        for tag in tags {
            out.push(q.take_completion(tag).ok_or(KError::IO)?);
        }
        Ok(out)
    }

    fn sector_span(&self, name: &str, offset: u64, len: usize) -> KResult<(u64, u32, u32)> {
        let cap = self.capacity_bytes(name)?;
        let end = offset.checked_add(len as u64).ok_or(KError::OutOfRange)?;
        if end > cap {
            return Err(KError::OutOfRange);
        }
        let bs = self.node_queue(name)?.logical_block_size();
        let first = offset / bs as u64;
        let last = end.div_ceil(bs as u64);
        let count = u32::try_from(last - first).map_err(|_| KError::OutOfRange)?;
        Ok((first, count, bs))
    }

    fn read_sectors(&self, name: &str, sector: u64, count: u32, bs: u32) -> KResult<Vec<u8>> {
        let done = self.submit(name, Request::read(sector, count, bs))?;
        if !done.status.is_ok() {
            return Err(KError::IO);
        }
        Ok(done.request.buffer)
    }

    /// Lê `buf.len()` bytes do nó a partir de `offset`.
    pub fn read_at(&self, name: &str, offset: u64, buf: &mut [u8]) -> KResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let (first, count, bs) = self.sector_span(name, offset, buf.len())?;
        let data = self.read_sectors(name, first, count, bs)?;
        let skip = (offset - first * bs as u64) as usize;
        buf.copy_from_slice(&data[skip..skip + buf.len()]);
        Ok(())
    }

    /// Escreve `data` no nó a partir de `offset` (read-modify-write nas bordas).
    pub fn write_at(&self, name: &str, offset: u64, data: &[u8]) -> KResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let (first, count, bs) = self.sector_span(name, offset, data.len())?;
        let skip = (offset - first * bs as u64) as usize;
        let span = count as usize * bs as usize;

        let block = if skip == 0 && data.len() == span {
            data.to_vec()
        } else {
            let mut block = self.read_sectors(name, first, count, bs)?;
            block[skip..skip + data.len()].copy_from_slice(data);
            block
        };

        let done = self.submit(name, Request::write(first, count, block))?;
        if !done.status.is_ok() {
            return Err(KError::IO);
        }
        Ok(())
    }

    /// HDIO_GETGEO
    pub fn ioctl_getgeo(&self, name: &str) -> KResult<HdGeometry> {
        let fops = self.disk(name)?.fops.as_ref().ok_or(KError::NotSupported)?;
        fops.getgeo()
    }
}

impl Default for SimBlockLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockLayer for SimBlockLayer {
    fn vmalloc(&mut self, size: usize) -> KResult<Vec<u8>> {
        if self.take_fault(FaultPoint::Vmalloc) {
            return Err(KError::NoMemory);
        }
        if size > self.mem_limit.saturating_sub(self.mem_in_use) {
            return Err(KError::NoMemory);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|_| KError::NoMemory)?;
        buf.resize(size, 0);
        self.mem_in_use += size;
        self.events.push(HostEvent::Vmalloc(size));
        Ok(buf)
    }

    fn vfree(&mut self, buf: Vec<u8>) {
        let size = buf.len();
        self.mem_in_use = self.mem_in_use.saturating_sub(size);
        self.events.push(HostEvent::Vfree(size));
    }

    fn blk_init_queue(
        &mut self,
        request_fn: RequestFn,
        ops: Arc<dyn BlockDeviceOps>,
    ) -> KResult<Arc<RequestQueue>> {
        if self.take_fault(FaultPoint::InitQueue) {
            return Err(KError::NoMemory);
        }
        let id = self.next_queue;
        self.next_queue += 1;
        let q = Arc::new(RequestQueue::new(id, request_fn, ops));
        self.queues.insert(id, Arc::clone(&q));
        self.events.push(HostEvent::InitQueue(id));
        Ok(q)
    }

    fn blk_cleanup_queue(&mut self, queue: Arc<RequestQueue>) {
        queue.cleanup();
        self.queues.remove(&queue.id());
        self.events.push(HostEvent::CleanupQueue(queue.id()));
    }

    fn register_blkdev(&mut self, major: u32, name: &str) -> KResult<u32> {
        if self.take_fault(FaultPoint::RegisterBlkdev) {
            return Err(KError::Busy);
        }
        if major > BLKDEV_MAJOR_MAX {
            return Err(KError::Invalid);
        }
        let major = if major == 0 {
            (1..=DYNAMIC_MAJOR_TOP)
                .rev()
                .find(|m| !self.majors.contains_key(m))
                .ok_or(KError::Busy)?
        } else if self.majors.contains_key(&major) {
            return Err(KError::Busy);
        } else {
            major
        };
        self.majors.insert(major, name.to_string());
        self.events.push(HostEvent::RegisterBlkdev(major, name.to_string()));
        Ok(major)
    }

    fn unregister_blkdev(&mut self, major: u32, name: &str) {
        match self.majors.get(&major) {
            Some(owner) if owner == name => {
                self.majors.remove(&major);
                self.events.push(HostEvent::UnregisterBlkdev(major, name.to_string()));
            }
            _ => {
                crate::pr_warn!("blk: unregister_blkdev({}, {}) for unknown device", major, name);
            }
        }
    }

    fn alloc_disk(&mut self, minors: u32) -> KResult<GenDisk> {
        if self.take_fault(FaultPoint::AllocDisk) {
            return Err(KError::NoMemory);
        }
        self.disks_allocated += 1;
        self.events.push(HostEvent::AllocDisk(minors));
        Ok(GenDisk::new(minors))
    }

    fn add_disk(&mut self, disk: Arc<GenDisk>) -> KResult<()> {
        if self.take_fault(FaultPoint::AddDisk) {
            return Err(KError::NoMemory);
        }
        if disk.disk_name.is_empty() || disk.disk_name.len() > DISK_NAME_LEN {
            return Err(KError::Invalid);
        }
        if self.nodes.contains_key(&disk.disk_name) {
            return Err(KError::AlreadyExists);
        }
        self.events.push(HostEvent::AddDisk(disk.disk_name.clone()));
        self.nodes.insert(disk.disk_name.clone(), disk);
        Ok(())
    }

    fn del_gendisk(&mut self, disk: &Arc<GenDisk>) {
        if self.nodes.remove(&disk.disk_name).is_some() {
            self.events.push(HostEvent::DelGendisk(disk.disk_name.clone()));
        }
    }

    fn put_disk(&mut self, disk: Arc<GenDisk>) {
        self.disks_allocated = self.disks_allocated.saturating_sub(1);
        self.events.push(HostEvent::PutDisk(disk.disk_name.clone()));
    }
}
