//! A [`log`] backend that writes every record into a [`fmt::Write`] sink,
//! for example the UART of the kernel.

use core::fmt::{self, Write};
use spin::Mutex;

/// Formats log records into the wrapped writer.
pub struct Logger<W> {
    sink: Mutex<W>,
}

impl<W> Logger<W> {
    /// Create a logger that writes into `sink`.
    pub const fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    /// Run `f` with exclusive access to the sink.
    pub fn with<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut guard = self.sink.lock();
        f(&mut *guard)
    }

    /// Return the sink, consuming the logger.
    pub fn into_inner(self) -> W {
        self.sink.into_inner()
    }
}

impl<W: Write + Send> log::Log for Logger<W> {
    #[allow(unused_variables)]
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        #[cfg(any(debug_assertions, feature = "logging"))]
        return true;
        #[cfg(all(not(debug_assertions), not(feature = "logging")))]
        return metadata.level() <= log::Level::Info;
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mod_path = record
            .module_path_static()
            .or_else(|| record.module_path())
            .unwrap_or("<n/a>");

        // a broken sink has nowhere to report to
        let _ = writeln!(
            self.sink.lock(),
            "[ {:>5} ] [{}] {}",
            record.level(),
            mod_path,
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Install `logger` as the global logger and enable every level.
pub fn init<W>(logger: &'static Logger<W>) -> Result<(), log::SetLoggerError>
where
    W: Write + Send + 'static,
{
    log::set_logger(logger)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}
