//! Kernel console and the `log` backend on top of it.
//!
//! Output goes through a single sink registered at boot: a serial port or a
//! framebuffer terminal on bare metal, stderr when hosted.

use conquer_once::spin::OnceCell;
use core::fmt;
use log::{Level, LevelFilter, Log, Metadata, Record};

pub type Sink = fn(fmt::Arguments);

static SINK: OnceCell<Sink> = OnceCell::uninit();
static LOGGER: KernelLogger = KernelLogger;

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        _print(format_args!("[{}] {}\n", tag, record.args()));
    }

    fn flush(&self) {}
}

/// Installs `sink` as the console and the kernel logger on top of it.
/// Only the first call has any effect.
pub fn init(sink: Sink, level: LevelFilter) {
    if SINK.try_init_once(|| sink).is_err() {
        return;
    }
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[cfg(feature = "hosted")]
pub fn init_hosted(level: LevelFilter) {
    fn stderr(args: fmt::Arguments) {
        use std::io::Write;
        let _ = std::io::stderr().write_fmt(args);
    }
    init(stderr, level);
}

#[inline]
pub fn _print(args: fmt::Arguments) {
    if let Ok(sink) = SINK.try_get() {
        sink(args);
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => (
        $crate::console::_print(
            format_args!($($arg)*)
        )
    )
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)))
}
