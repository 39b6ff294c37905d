//! sbd - simple block device: um disco em RAM atrás de um block layer.
//!
//! - `storage`: block layer (requests, fila, gendisk, serviços do host)
//! - `drivers::sbd`: o driver propriamente dito
//! - `module`: parâmetros e carga/descarga de módulos
//! - `console` + `util`: printk, dmesg, erros

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

#[macro_use]
pub mod util;

pub mod console;
pub mod drivers;
pub mod module;
pub mod storage;

pub use drivers::sbd::{SbdModule, SbdParams};
pub use util::{KError, KResult};
