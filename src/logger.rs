//! A minimal `log::Log` implementation matching the fixed-width timestamp
//! and ANSI-colored warnings irczt expects, since `env_logger`'s formatter
//! hooks can't produce that exact shape.

use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

struct Logger {
    start: Instant,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ts = timestamp(self.start);
        match record.level() {
            Level::Warn | Level::Error => {
                eprintln!("[{}] \x1b[31m{}\x1b[0m", ts, record.args());
            }
            _ => {
                println!("[{}] {}", ts, record.args());
            }
        }
    }

    fn flush(&self) {}
}

/// `[<seconds>.<millis>]`, where the bracketed field (including both
/// brackets) is exactly 23 bytes wide: seconds right-aligned in 17 columns,
/// a dot, and zero-padded milliseconds in 3 columns.
fn timestamp(start: Instant) -> String {
    let elapsed = start.elapsed();
    format!("{:>17}.{:03}", elapsed.as_secs(), elapsed.subsec_millis())
}

/// Installs the logger as the global `log` backend. Call once at startup.
pub fn init() {
    let logger = Box::new(Logger { start: Instant::now() });
    log::set_boxed_logger(logger).expect("logger already initialized");
    log::set_max_level(LevelFilter::Info);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_field_is_23_bytes_wide() {
        let start = Instant::now();
        let ts = format!("[{}]", timestamp(start));
        assert_eq!(ts.len(), 23, "got {:?}", ts);
    }
}
