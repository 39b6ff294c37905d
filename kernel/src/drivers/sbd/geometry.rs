use crate::storage::block::HdGeometry;

use super::device::SbdDevice;

pub const SBD_HEADS: u8 = 4;
pub const SBD_SECTORS_PER_TRACK: u8 = 16;

/// Não temos geometria real, então inventamos uma: 4 cabeças x 16 setores,
/// ou seja 64 setores por cilindro. Ferramentas como fdisk precisam disso.
pub fn sbd_getgeo(dev: &SbdDevice) -> HdGeometry {
    HdGeometry {
        cylinders: cylinders(dev.kernel_sectors()),
        heads: SBD_HEADS,
        sectors: SBD_SECTORS_PER_TRACK,
        start: 0,
    }
}

/// Cilindros para `sectors` setores de 512 bytes; satura em `u32::MAX` (discos de 128 TiB ou mais).
pub fn cylinders(sectors: u64) -> u32 {
    u32::try_from((sectors & !0x3f) >> 6).unwrap_or(u32::MAX)
}
