//! Block I/O requests as seen by a driver's request function.

use alloc::vec;
use alloc::vec::Vec;

/// Request operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReqOp {
    /// Read sectors into the request buffer
    Read,
    /// Write sectors from the request buffer
    Write,
    /// Flush volatile caches
    Flush,
    /// Discard/TRIM a sector range
    Discard,
    /// Driver-private command, data in
    DrvIn,
    /// Driver-private command, data out
    DrvOut,
}

impl ReqOp {
    /// Plain filesystem read/write.
    pub fn is_fs(self) -> bool {
        matches!(self, ReqOp::Read | ReqOp::Write)
    }

    /// Data direction for filesystem requests, `None` for everything else.
    pub fn data_dir(self) -> Option<DataDir> {
        match self {
            ReqOp::Read => Some(DataDir::Read),
            ReqOp::Write => Some(DataDir::Write),
            _ => None,
        }
    }
}

/// rq_data_dir
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDir {
    Read,
    Write,
}

/// Completion status handed back to the block layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlkStatus {
    Ok,
    IoErr,
}

impl BlkStatus {
    pub fn is_ok(self) -> bool {
        self == BlkStatus::Ok
    }

    pub fn to_errno(self) -> i32 {
        match self {
            BlkStatus::Ok => 0,
            BlkStatus::IoErr => -5,
        }
    }
}

/// I/O request
#[derive(Debug, Clone)]
pub struct Request {
    /// Tag assigned by the queue at submission
    pub tag: u64,
    pub op: ReqOp,
    /// Starting sector, in units of the device's logical block size
    pub sector: u64,
    pub nr_sectors: u32,
    /// Transfer buffer: filled on read, consumed on write
    pub buffer: Vec<u8>,
}

impl Request {
    pub fn new(op: ReqOp, sector: u64, nr_sectors: u32, buffer: Vec<u8>) -> Self {
        Self {
            tag: 0,
            op,
            sector,
            nr_sectors,
            buffer,
        }
    }

    /// Read request with a zeroed buffer sized for `nr_sectors` of `block_size`.
    pub fn read(sector: u64, nr_sectors: u32, block_size: u32) -> Self {
        let len = nr_sectors as usize * block_size as usize;
        Self::new(ReqOp::Read, sector, nr_sectors, vec![0u8; len])
    }

    pub fn write(sector: u64, nr_sectors: u32, data: Vec<u8>) -> Self {
        Self::new(ReqOp::Write, sector, nr_sectors, data)
    }

    /// blk_rq_pos
    pub fn pos(&self) -> u64 {
        self.sector
    }

    /// blk_rq_sectors
    pub fn sectors(&self) -> u32 {
        self.nr_sectors
    }

    /// End sector (exclusive)
    pub fn end_sector(&self) -> u64 {
        self.sector + self.nr_sectors as u64
    }
}

/// A finished request, returned to whoever submitted it.
#[derive(Debug, Clone)]
pub struct Completion {
    pub tag: u64,
    pub status: BlkStatus,
    pub request: Request,
}
