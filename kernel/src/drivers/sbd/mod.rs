//! sbd - simple block device.
//!
//! Um disco em RAM exposto pelo block layer. O ciclo de vida segue a ordem
//! clássica de um driver de bloco:
//!
//! 1. valida parâmetros
//! 2. vmalloc do buffer de dados
//! 3. cria a fila de requests ligada a `sbd_request`
//! 4. registra o major (dinâmico se `major_num == 0`)
//! 5. aloca, preenche e publica o gendisk (`sbd0`)
//!
//! Cada recurso adquirido entra numa pilha de unwind; qualquer falha, ou o
//! unload, libera a pilha na ordem inversa.

pub mod device;
pub mod geometry;
pub mod params;
pub mod request;

#[cfg(test)]
mod tests;

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::module::{KernelModule, ModuleInfo, ParamList};
use crate::storage::block::BlockDeviceOps;
use crate::storage::genhd::GenDisk;
use crate::storage::host::BlockLayer;
use crate::storage::queue::RequestQueue;
use crate::util::KResult;

pub use device::SbdDevice;
pub use params::SbdParams;

pub const SBD_NAME: &str = "sbd";
pub const SBD_MINORS: u32 = 16;

pub const SBD_INFO: ModuleInfo = ModuleInfo {
    name: SBD_NAME,
    license: "GPL",
    description: "A simple demo of how to write a block device driver",
    version: "1.4.0",
};

/// Estado compartilhado com o block layer: o dispositivo e a configuração.
pub struct Sbd {
    params: SbdParams,
    device: SbdDevice,
}

impl Sbd {
    pub fn new(params: SbdParams, data: Vec<u8>) -> Self {
        Self {
            device: SbdDevice::new(params.logical_block_size, data),
            params,
        }
    }

    pub fn params(&self) -> &SbdParams {
        &self.params
    }

    pub fn device(&self) -> &SbdDevice {
        &self.device
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unloaded,
    Configuring,
    StateAllocated,
    QueueAllocated,
    Registered,
    DiskExposed,
    Running,
    Unregistering,
    QueueReleasing,
    StateReleasing,
}

impl LifecycleState {
    /// Legal transitions. Any init state may drop into the teardown path.
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unloaded, Configuring)
                | (Configuring, StateAllocated)
                | (StateAllocated, QueueAllocated)
                | (QueueAllocated, Registered)
                | (Registered, DiskExposed)
                | (DiskExposed, Running)
                | (Configuring, Unloaded)
                | (StateAllocated | QueueAllocated | Registered | DiskExposed | Running, Unregistering)
                | (StateAllocated | QueueAllocated | Unregistering, QueueReleasing)
                | (StateAllocated | QueueReleasing, StateReleasing)
                | (StateReleasing, Unloaded)
        )
    }
}

bitflags! {
    /// Recursos do host atualmente em posse do módulo.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Resources: u8 {
        const BACKING_STORE = 1 << 0;
        const QUEUE         = 1 << 1;
        const MAJOR         = 1 << 2;
        const DISK          = 1 << 3;
    }
}

/// One acquired host resource and what it takes to give it back.
enum Acquired {
    BackingStore,
    Queue(Arc<RequestQueue>),
    Major(u32),
    Disk(Arc<GenDisk>),
}

impl Acquired {
    fn flag(&self) -> Resources {
        match self {
            Acquired::BackingStore => Resources::BACKING_STORE,
            Acquired::Queue(_) => Resources::QUEUE,
            Acquired::Major(_) => Resources::MAJOR,
            Acquired::Disk(_) => Resources::DISK,
        }
    }
}

/// Pilha de unwind: push logo após cada aquisição, pop em ordem inversa.
struct UnwindStack {
    stack: Vec<Acquired>,
}

impl UnwindStack {
    fn new() -> Self {
        Self { stack: Vec::new() }
    }

    fn push(&mut self, r: Acquired) {
        self.stack.push(r);
    }

    fn held(&self) -> Resources {
        self.stack
            .iter()
            .fold(Resources::empty(), |acc, r| acc | r.flag())
    }

    fn unwind(&mut self, lc: &mut Lifecycle, sbd: &Sbd, host: &mut dyn BlockLayer) {
        while let Some(r) = self.stack.pop() {
            match r {
                Acquired::Disk(disk) => {
                    lc.advance(LifecycleState::Unregistering);
                    host.del_gendisk(&disk);
                    host.put_disk(disk);
                }
                Acquired::Major(major) => {
                    lc.advance(LifecycleState::Unregistering);
                    host.unregister_blkdev(major, SBD_NAME);
                }
                Acquired::Queue(q) => {
                    lc.advance(LifecycleState::QueueReleasing);
                    host.blk_cleanup_queue(q);
                }
                Acquired::BackingStore => {
                    lc.advance(LifecycleState::StateReleasing);
                    host.vfree(sbd.device.release_store());
                }
            }
        }
        lc.advance(LifecycleState::Unloaded);
    }
}

struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    fn advance(&mut self, next: LifecycleState) {
        if self.state == next {
            return;
        }
        // O estado segue o que de fato aconteceu com os recursos, mesmo fora da tabela.
        if self.state.can_advance_to(next) {
            crate::pr_debug!("sbd: {:?} -> {:?}", self.state, next);
        } else {
            crate::pr_err!("sbd: illegal transition {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }
}

/// The loaded module: owns every host resource acquired at init.
pub struct SbdModule {
    sbd: Arc<Sbd>,
    queue: Arc<RequestQueue>,
    disk: Arc<GenDisk>,
    major: u32,
    unwind: UnwindStack,
    lifecycle: Lifecycle,
}

impl SbdModule {
    pub fn init(params: SbdParams, host: &mut dyn BlockLayer) -> KResult<Self> {
        let mut lc = Lifecycle { state: LifecycleState::Unloaded };
        let mut unwind = UnwindStack::new();

        lc.advance(LifecycleState::Configuring);
        let size = match params.validate().and_then(|_| params.capacity_bytes()) {
            Ok(size) => size,
            Err(e) => {
                lc.advance(LifecycleState::Unloaded);
                return Err(e);
            }
        };

        // Aloca o buffer de dados.
        let data = match host.vmalloc(size) {
            Ok(data) => data,
            Err(e) => {
                crate::pr_warn!("sbd: unable to allocate {} bytes", size);
                lc.advance(LifecycleState::Unloaded);
                return Err(e);
            }
        };
        let sbd = Arc::new(Sbd::new(params, data));
        unwind.push(Acquired::BackingStore);
        lc.advance(LifecycleState::StateAllocated);

        match Self::acquire_rest(&sbd, &mut unwind, &mut lc, host) {
            Ok((queue, major, disk)) => {
                lc.advance(LifecycleState::Running);
                Ok(Self {
                    sbd,
                    queue,
                    disk,
                    major,
                    unwind,
                    lifecycle: lc,
                })
            }
            Err(e) => {
                unwind.unwind(&mut lc, &sbd, host);
                Err(e)
            }
        }
    }

    fn acquire_rest(
        sbd: &Arc<Sbd>,
        unwind: &mut UnwindStack,
        lc: &mut Lifecycle,
        host: &mut dyn BlockLayer,
    ) -> KResult<(Arc<RequestQueue>, u32, Arc<GenDisk>)> {
        let params = sbd.params;

        // Fila de requests.
        let ops: Arc<dyn BlockDeviceOps> = sbd.clone();
        let queue = host.blk_init_queue(request::sbd_request, ops.clone())?;
        queue.set_logical_block_size(params.logical_block_size);
        unwind.push(Acquired::Queue(Arc::clone(&queue)));
        lc.advance(LifecycleState::QueueAllocated);

        // Registro do major.
        let major = match host.register_blkdev(params.major_num, SBD_NAME) {
            Ok(major) => major,
            Err(e) => {
                crate::pr_warn!("sbd: unable to get major number");
                return Err(e);
            }
        };
        crate::pr_warn!("sbd: major number is {}", major);
        unwind.push(Acquired::Major(major));
        lc.advance(LifecycleState::Registered);

        // E o gendisk.
        let mut disk = host.alloc_disk(SBD_MINORS)?;
        disk.major = major;
        disk.first_minor = 0;
        disk.disk_name = format!("{}{}", SBD_NAME, 0);
        disk.fops = Some(ops);
        disk.set_capacity(sbd.device.kernel_sectors());
        disk.queue = Some(Arc::clone(&queue));
        let disk = Arc::new(disk);
        if let Err(e) = host.add_disk(Arc::clone(&disk)) {
            // Alocado mas nunca publicado: só put_disk.
            host.put_disk(disk);
            return Err(e);
        }
        unwind.push(Acquired::Disk(Arc::clone(&disk)));
        lc.advance(LifecycleState::DiskExposed);

        Ok((queue, major, disk))
    }

    /// Teardown completo, na ordem inversa da aquisição.
    pub fn exit(mut self, host: &mut dyn BlockLayer) {
        self.unwind.unwind(&mut self.lifecycle, &self.sbd, host);
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state
    }

    pub fn resources(&self) -> Resources {
        self.unwind.held()
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn disk_name(&self) -> &str {
        &self.disk.disk_name
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub fn sbd(&self) -> &Arc<Sbd> {
        &self.sbd
    }
}

impl KernelModule for SbdModule {
    const INFO: ModuleInfo = SBD_INFO;

    type Params = SbdParams;

    fn parse_params(args: &ParamList) -> KResult<SbdParams> {
        SbdParams::from_params(args)
    }

    fn init(params: SbdParams, host: &mut dyn BlockLayer) -> KResult<Self> {
        SbdModule::init(params, host)
    }

    fn exit(self, host: &mut dyn BlockLayer) {
        SbdModule::exit(self, host)
    }
}
