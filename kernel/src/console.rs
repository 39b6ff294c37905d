//! Console do kernel - níveis estilo printk, ring buffer (dmesg) e writer.
//!
//! Toda linha emitida pelas macros `kprint!`/`pr_*!` vai para o ring buffer.
//! Linhas com nível mais urgente que `console_loglevel` também são entregues
//! ao writer registrado pelo host (stderr no `sbdctl`, nada nos testes).

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::{Mutex, Once};

/// Capacidade do ring buffer, em registros.
pub const LOG_BUF_LEN: usize = 1024;

/// Default console level: everything except debug reaches the writer.
pub const DEFAULT_CONSOLE_LOGLEVEL: u8 = 7;

/// printk levels (lower is more urgent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    pub fn tag(self) -> &'static str {
        match self {
            LogLevel::Err => "err",
            LogLevel::Warning => "warn",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub seq: u64,
    pub level: LogLevel,
    pub text: String,
}

struct LogBuffer {
    records: VecDeque<LogRecord>,
    next_seq: u64,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            records: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn push(&mut self, level: LogLevel, text: String, capacity: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.records.len() == capacity {
            self.records.pop_front();
        }
        self.records.push_back(LogRecord { seq, level, text });
    }
}

static LOG_BUF: Mutex<LogBuffer> = Mutex::new(LogBuffer::new());

/// Sink de saída do console.
pub type ConsoleWriter = fn(LogLevel, &str);

static WRITER: Once<ConsoleWriter> = Once::new();
static CONSOLE_LOGLEVEL: AtomicU8 = AtomicU8::new(DEFAULT_CONSOLE_LOGLEVEL);

/// Registra o writer do console. Só o primeiro registro vale.
pub fn set_writer(writer: ConsoleWriter) {
    WRITER.call_once(|| writer);
}

pub fn set_console_loglevel(level: u8) {
    CONSOLE_LOGLEVEL.store(level, Ordering::Relaxed);
}

pub fn console_loglevel() -> u8 {
    CONSOLE_LOGLEVEL.load(Ordering::Relaxed)
}

/// Mensagens mais urgentes que o loglevel do console vão para o writer.
pub fn reaches_console(level: LogLevel) -> bool {
    (level as u8) < console_loglevel()
}

pub fn print(level: LogLevel, args: fmt::Arguments) {
    let mut text = alloc::fmt::format(args);
    while text.ends_with('\n') {
        text.pop();
    }

    LOG_BUF.lock().push(level, text.clone(), LOG_BUF_LEN);

    if reaches_console(level) {
        if let Some(writer) = WRITER.get() {
            writer(level, &text);
        }
    }
}

/// Snapshot of the kernel log ring, oldest first.
pub fn dmesg() -> Vec<LogRecord> {
    LOG_BUF.lock().records.iter().cloned().collect()
}

/// True if some record at `level` contains `needle`.
pub fn dmesg_contains(level: LogLevel, needle: &str) -> bool {
    LOG_BUF
        .lock()
        .records
        .iter()
        .any(|r| r.level == level && r.text.contains(needle))
}
