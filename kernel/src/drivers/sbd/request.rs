//! Caminho de request do sbd.
//!
//! `sbd_request` é a função que o block layer chama quando há requests na
//! fila: pega o próximo, executa até o fim, completa, pede o próximo, até a
//! fila ficar vazia. Um request nunca é interrompido no meio.

use crate::storage::block::{BlockDeviceOps, HdGeometry};
use crate::storage::queue::RequestQueue;
use crate::storage::request::{BlkStatus, DataDir, Request};
use crate::util::KResult;

use super::geometry::sbd_getgeo;
use super::Sbd;

/// Request function bound to the queue at init.
pub fn sbd_request(q: &RequestQueue, ops: &dyn BlockDeviceOps) {
    while let Some(mut req) = q.fetch_request() {
        let status = ops.handle_request(&mut req);
        q.end_request(req, status);
    }
}

impl BlockDeviceOps for Sbd {
    fn handle_request(&self, req: &mut Request) -> BlkStatus {
        let dir = match req.op.data_dir() {
            Some(dir) if req.op.is_fs() => dir,
            _ => {
                // Um dispositivo real trataria esses também.
                crate::pr_notice!("sbd: skip non-fs request ({:?}, tag {})", req.op, req.tag);
                return BlkStatus::IoErr;
            }
        };

        if self.params.debug {
            crate::pr_debug!(
                "sbd: sectors is {}, pos is {}, buffer is {} bytes, rq_data_dir is {}",
                req.sectors(),
                req.pos(),
                req.buffer.len(),
                (dir == DataDir::Write) as u8
            );
        }

        if !self.params.dowork {
            return BlkStatus::IoErr;
        }

        match self.device.transfer(req.sector, req.nr_sectors, &mut req.buffer, dir) {
            Ok(()) => BlkStatus::Ok,
            Err(_) => BlkStatus::IoErr,
        }
    }

    fn getgeo(&self) -> KResult<HdGeometry> {
        Ok(sbd_getgeo(&self.device))
    }
}
