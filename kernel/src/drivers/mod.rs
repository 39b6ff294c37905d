//! Drivers de dispositivo.

pub mod sbd;
