//! File logger for rewind.
//!
//! Bisect and rebase sessions span several invocations, so every process
//! appends to the same `~/.rewind/rewind.log`. INFO and above are written by
//! default; `--debug` or `REWIND_DEBUG=1` adds DEBUG. Nothing is written until
//! [`init_with_debug`] has run.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

static SINK: OnceLock<Sink> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

struct Sink {
    path: PathBuf,
    max_level: LogLevel,
}

impl Sink {
    fn accepts(&self, level: LogLevel) -> bool {
        level <= self.max_level
    }

    fn append(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if !self.accepts(level) {
            return;
        }
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{}", format_line(level, args));
        }
    }
}

fn format_line(level: LogLevel, args: fmt::Arguments<'_>) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!("[{}] [{}] {}", timestamp, level.label(), args)
}

fn env_requests_debug(value: Option<&str>) -> bool {
    value.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Start logging to `~/.rewind/rewind.log`. Returns whether debug output is on.
pub fn init_with_debug(debug: bool) -> bool {
    let debug = debug || env_requests_debug(std::env::var("REWIND_DEBUG").ok().as_deref());
    if let Some(dir) = dirs::home_dir().map(|h| h.join(".rewind")) {
        let _ = std::fs::create_dir_all(&dir);
        let max_level = if debug { LogLevel::Debug } else { LogLevel::Info };
        SINK.set(Sink {
            path: dir.join("rewind.log"),
            max_level,
        })
        .ok();
    }
    debug
}

#[doc(hidden)]
pub fn write(level: LogLevel, args: fmt::Arguments<'_>) {
    if let Some(sink) = SINK.get() {
        sink.append(level, args);
    }
}

#[macro_export]
macro_rules! rlog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

/// Only written in debug mode.
#[macro_export]
macro_rules! rlog_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! rlog_trace {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}
