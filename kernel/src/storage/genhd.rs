use alloc::string::String;
use alloc::sync::Arc;

use super::block::BlockDeviceOps;
use super::queue::RequestQueue;

/// Tamanho máximo do nome do disco (sem o terminador).
pub const DISK_NAME_LEN: usize = 31;

/// Descrição de um disco publicado pelo block layer (gendisk).
pub struct GenDisk {
    pub major: u32,
    pub first_minor: u32,
    pub minors: u32,
    pub disk_name: String,
    /// Capacidade em setores de 512 bytes.
    capacity: u64,
    pub fops: Option<Arc<dyn BlockDeviceOps>>,
    pub queue: Option<Arc<RequestQueue>>,
}

impl GenDisk {
    pub fn new(minors: u32) -> Self {
        Self {
            major: 0,
            first_minor: 0,
            minors,
            disk_name: String::new(),
            capacity: 0,
            fops: None,
            queue: None,
        }
    }

    pub fn set_capacity(&mut self, sectors: u64) {
        self.capacity = sectors;
    }

    pub fn get_capacity(&self) -> u64 {
        self.capacity
    }

    /// (major, minor) of the whole-disk node.
    pub fn devt(&self) -> (u32, u32) {
        (self.major, self.first_minor)
    }
}

impl core::fmt::Debug for GenDisk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GenDisk")
            .field("major", &self.major)
            .field("first_minor", &self.first_minor)
            .field("minors", &self.minors)
            .field("disk_name", &self.disk_name)
            .field("capacity", &self.capacity)
            .field("queue", &self.queue.as_ref().map(|q| q.id()))
            .finish()
    }
}
