//! Camada de storage: block layer visto pelo driver.
//!
//! - `block`: trait de operações do dispositivo, geometria, constantes de setor
//! - `request`/`queue`: requests de I/O e a fila FIFO que o driver drena
//! - `genhd`: disco publicado (nó em /dev)
//! - `host`: serviços do block layer que o driver consome
//! - `sim`: implementação em memória desses serviços

pub mod block;
pub mod genhd;
pub mod host;
pub mod queue;
pub mod request;
pub mod sim;

pub use block::{BlockDeviceOps, HdGeometry, KERNEL_SECTOR_SIZE};
pub use genhd::GenDisk;
pub use host::BlockLayer;
pub use queue::{RequestFn, RequestQueue};
pub use request::{BlkStatus, Completion, DataDir, ReqOp, Request};
pub use sim::{FaultPoint, HostEvent, SimBlockLayer};
