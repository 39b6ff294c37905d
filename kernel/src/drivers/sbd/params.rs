use crate::module::{parse_bool, parse_u32, parse_u64, ParamList};
use crate::storage::block::KERNEL_SECTOR_SIZE;
use crate::storage::host::BLKDEV_MAJOR_MAX;
use crate::util::{KError, KResult};

/// Maior tamanho de bloco lógico aceito (uma página).
pub const MAX_LOGICAL_BLOCK_SIZE: u32 = 4096;

/// Load-time configuration. Immutable once the module is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SbdParams {
    /// 0 pede um major dinâmico.
    pub major_num: u32,
    pub logical_block_size: u32,
    /// Tamanho do disco em setores de `logical_block_size` bytes.
    pub nsectors: u64,
    /// Log every request.
    pub debug: bool,
    /// When false, every request is claimed and failed without touching the store.
    pub dowork: bool,
}

impl Default for SbdParams {
    fn default() -> Self {
        Self {
            major_num: 0,
            logical_block_size: 512,
            nsectors: 65536,
            debug: false,
            dowork: true,
        }
    }
}

impl SbdParams {
    pub fn from_params(list: &ParamList) -> KResult<Self> {
        let mut p = SbdParams::default();
        for (name, value) in list.iter() {
            match name {
                "major_num" | "major_number" => p.major_num = parse_u32(name, value)?,
                "logical_block_size" | "sector_size" => {
                    p.logical_block_size = parse_u32(name, value)?
                }
                "nsectors" | "sector_count" => p.nsectors = parse_u64(name, value)?,
                "debug" => p.debug = parse_bool(name, value)?,
                "dowork" => p.dowork = parse_bool(name, value)?,
                _ => {
                    crate::pr_warn!("sbd: unknown parameter '{}'", name);
                    return Err(KError::Invalid);
                }
            }
        }
        Ok(p)
    }

    pub fn validate(&self) -> KResult<()> {
        let lbs = self.logical_block_size;
        if !lbs.is_power_of_two() || !(KERNEL_SECTOR_SIZE..=MAX_LOGICAL_BLOCK_SIZE).contains(&lbs) {
            crate::pr_warn!("sbd: bad logical_block_size {}", lbs);
            return Err(KError::Invalid);
        }
        if self.nsectors == 0 {
            crate::pr_warn!("sbd: nsectors must be positive");
            return Err(KError::Invalid);
        }
        if self.major_num > BLKDEV_MAJOR_MAX {
            crate::pr_warn!("sbd: major_num {} above {}", self.major_num, BLKDEV_MAJOR_MAX);
            return Err(KError::Invalid);
        }
        self.capacity_bytes().map(|_| ())
    }

    /// nsectors * logical_block_size, in bytes.
    pub fn capacity_bytes(&self) -> KResult<usize> {
        let bytes = self
            .nsectors
            .checked_mul(self.logical_block_size as u64)
            .ok_or(KError::OutOfRange)?;
        usize::try_from(bytes).map_err(|_| KError::OutOfRange)
    }
}
