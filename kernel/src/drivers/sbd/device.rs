use alloc::vec::Vec;
use core::ops::Range;

use spin::Mutex;

use crate::storage::block::{bytes_to_kernel_sectors, check_io_args};
use crate::storage::request::DataDir;
use crate::util::{KError, KResult};

/// Representação interna do dispositivo: um buffer em RAM do tamanho do disco.
///
/// Todo acesso ao buffer passa pelo lock.
pub struct SbdDevice {
    size: usize,
    block_size: u32,
    data: Mutex<Vec<u8>>,
}

impl SbdDevice {
    /// `data` vem do vmalloc do host; o tamanho dele é a capacidade.
    pub fn new(block_size: u32, data: Vec<u8>) -> Self {
        Self {
            size: data.len(),
            block_size,
            data: Mutex::new(data),
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.size
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Capacity in 512-byte kernel sectors.
    pub fn kernel_sectors(&self) -> u64 {
        bytes_to_kernel_sectors(self.size as u64)
    }

    fn range(&self, sector: u64, nsect: u32) -> KResult<Range<usize>> {
        let offset = (sector as u128) * (self.block_size as u128);
        let nbytes = (nsect as u128) * (self.block_size as u128);

        if offset + nbytes > self.size as u128 {
            crate::pr_notice!("sbd: beyond-end transfer (offset {} len {})", offset, nbytes);
            return Err(KError::OutOfRange);
        }
        Ok(offset as usize..(offset + nbytes) as usize)
    }

    /// Copia `nsect` setores a partir de `sector` entre o disco e `buffer`.
    /// Request fora do disco é recusado inteiro; nada é copiado.
    pub fn transfer(&self, sector: u64, nsect: u32, buffer: &mut [u8], dir: DataDir) -> KResult<()> {
        check_io_args(self.block_size, nsect, buffer.len())?;
        let r = self.range(sector, nsect)?;
        let mut g = self.data.lock();
        // Buffer já devolvido no teardown.
        if g.len() != self.size {
            return Err(KError::NoDevice);
        }
        match dir {
            DataDir::Write => g[r].copy_from_slice(buffer),
            DataDir::Read => buffer.copy_from_slice(&g[r]),
        }
        Ok(())
    }

    /// Hands the backing buffer back for vfree at teardown.
    pub(crate) fn release_store(&self) -> Vec<u8> {
        core::mem::take(&mut *self.data.lock())
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}
