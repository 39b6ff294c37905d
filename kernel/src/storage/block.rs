use crate::util::{KError, KResult};

use super::request::{BlkStatus, Request};

/// O kernel sempre fala com a gente em setores pequenos, de 512 bytes,
/// independente do tamanho de bloco lógico do dispositivo.
pub const KERNEL_SECTOR_SIZE: u32 = 512;
pub const SECTOR_SHIFT: u32 = 9;

/// Geometria CHS legada (HDIO_GETGEO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HdGeometry {
    pub heads: u8,
    pub sectors: u8,
    pub cylinders: u32,
    pub start: u64,
}

/// Interface que um driver entrega ao block layer: tratar um request e
/// responder à consulta de geometria.
pub trait BlockDeviceOps: Send + Sync {
    /// Executa um único request até o fim e devolve o status de conclusão.
    fn handle_request(&self, req: &mut Request) -> BlkStatus;

    fn getgeo(&self) -> KResult<HdGeometry>;
}

/// `buf_len` deve ser exatamente `count * block_size`.
pub fn check_io_args(block_size: u32, count: u32, buf_len: usize) -> KResult<()> {
    let expected = (block_size as usize)
        .checked_mul(count as usize)
        .ok_or(KError::Invalid)?;
    if expected != buf_len {
        return Err(KError::Invalid);
    }
    Ok(())
}

/// Converte bytes em setores do kernel (512 bytes).
pub const fn bytes_to_kernel_sectors(bytes: u64) -> u64 {
    bytes >> SECTOR_SHIFT
}
