use core::fmt;

use crate::console::LogLevel;

pub fn banner() {
    kprintln!("");
    kprintln!("============================================================");
    kprintln!("  sbd - simple block device");
    kprintln!("  build: {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    kprintln!("============================================================");
    kprintln!("");
}

#[doc(hidden)]
pub fn _print(level: LogLevel, args: fmt::Arguments) {
    crate::console::print(level, args);
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => ({
        $crate::util::_print($crate::console::LogLevel::Info, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! kprintln {
    () => ($crate::kprint!("\n"));
    ($fmt:expr) => ($crate::kprint!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::kprint!(concat!($fmt, "\n"), $($arg)*));
}

/// printk com nível explícito.
#[macro_export]
macro_rules! printk {
    ($level:expr, $fmt:expr) => ($crate::util::_print($level, format_args!(concat!($fmt, "\n"))));
    ($level:expr, $fmt:expr, $($arg:tt)*) => (
        $crate::util::_print($level, format_args!(concat!($fmt, "\n"), $($arg)*))
    );
}

#[macro_export]
macro_rules! pr_err {
    ($($arg:tt)*) => ($crate::printk!($crate::console::LogLevel::Err, $($arg)*));
}

#[macro_export]
macro_rules! pr_warn {
    ($($arg:tt)*) => ($crate::printk!($crate::console::LogLevel::Warning, $($arg)*));
}

#[macro_export]
macro_rules! pr_notice {
    ($($arg:tt)*) => ($crate::printk!($crate::console::LogLevel::Notice, $($arg)*));
}

#[macro_export]
macro_rules! pr_info {
    ($($arg:tt)*) => ($crate::printk!($crate::console::LogLevel::Info, $($arg)*));
}

#[macro_export]
macro_rules! pr_debug {
    ($($arg:tt)*) => ($crate::printk!($crate::console::LogLevel::Debug, $($arg)*));
}

pub use crate::kprintln;

/// Erros "kernel-level" genéricos para subsistemas (storage, módulos, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KError {
    NotFound,
    AlreadyExists,
    Invalid,
    NoMemory,
    Busy,
    NotSupported,
    IO,
    OutOfRange,
    NoDevice,
}

impl KError {
    /// Negative errno as reported back to the module loader.
    pub const fn errno(self) -> i32 {
        match self {
            KError::NotFound => -2,       // ENOENT
            KError::IO => -5,             // EIO
            KError::NoMemory => -12,      // ENOMEM
            KError::Busy => -16,          // EBUSY
            KError::AlreadyExists => -17, // EEXIST
            KError::NoDevice => -19,      // ENODEV
            KError::Invalid => -22,       // EINVAL
            KError::OutOfRange => -34,    // ERANGE
            KError::NotSupported => -95,  // EOPNOTSUPP
        }
    }
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KError::NotFound => "not found",
            KError::AlreadyExists => "already exists",
            KError::Invalid => "invalid argument",
            KError::NoMemory => "out of memory",
            KError::Busy => "device or resource busy",
            KError::NotSupported => "operation not supported",
            KError::IO => "I/O error",
            KError::OutOfRange => "out of range",
            KError::NoDevice => "no such device",
        };
        write!(f, "{} ({})", s, self.errno())
    }
}

impl core::error::Error for KError {}

pub type KResult<T> = core::result::Result<T, KError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_errno_is_negative() {
        for e in [
            KError::NotFound,
            KError::AlreadyExists,
            KError::Invalid,
            KError::NoMemory,
            KError::Busy,
            KError::NotSupported,
            KError::IO,
            KError::OutOfRange,
            KError::NoDevice,
        ] {
            assert!(e.errno() < 0, "{:?}", e);
        }
        assert_eq!(KError::IO.errno(), -5);
        assert_eq!(KError::NoMemory.errno(), -12);
    }

    #[test]
    fn test_display_carries_errno() {
        assert_eq!(KError::Busy.to_string(), "device or resource busy (-16)");
    }
}
