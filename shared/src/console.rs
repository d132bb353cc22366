//! Kernel console.
//!
//! The boot code installs a sink once it has a device to write to. Until then
//! (and in hosted builds) output falls back to the host's standard streams, or
//! is dropped on bare metal.

use alloc::boxed::Box;
use core::fmt::{self, Write};
use once_cell::race::OnceBox;

pub trait ConsoleSink: Send + Sync {
    fn write_str(&self, s: &str);

    /// Error output. Sinks without a separate error channel share one stream.
    fn write_err_str(&self, s: &str) {
        self.write_str(s);
    }
}

static SINK: OnceBox<Box<dyn ConsoleSink>> = OnceBox::new();

/// Route all console output to `sink`. Returns `false` if a sink was already
/// installed; the first one stays.
pub fn set_sink(sink: Box<dyn ConsoleSink>) -> bool {
    SINK.set(Box::new(sink)).is_ok()
}

struct ConsoleWriter {
    error: bool,
}

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match SINK.get() {
            Some(sink) if self.error => sink.write_err_str(s),
            Some(sink) => sink.write_str(s),
            None => fallback(s, self.error),
        }
        Ok(())
    }
}

#[cfg(not(target_os = "none"))]
fn fallback(s: &str, error: bool) {
    if error {
        std::eprint!("{s}");
    } else {
        std::print!("{s}");
    }
}

#[cfg(target_os = "none")]
fn fallback(_s: &str, _error: bool) {}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // ConsoleWriter never fails.
    let _ = ConsoleWriter { error: false }.write_fmt(args);
}

#[doc(hidden)]
pub fn _eprint(args: fmt::Arguments) {
    let _ = ConsoleWriter { error: true }.write_fmt(args);
}
