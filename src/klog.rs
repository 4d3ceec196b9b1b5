//! Structured kernel log backend.
//!
//! Subsystems log through the [`log`] facade; this module supplies the
//! backend. Every record is rendered to the serial line and also captured in
//! a fixed-size, heap-free circular buffer of structured entries so recent
//! history can be inspected after the fact. Once full the buffer wraps and
//! silently overwrites the oldest entries.

use core::fmt::{self, Write};

use log::{LevelFilter, Metadata, Record};
use spin::Mutex;

/// Maximum number of entries the circular buffer can hold.
const LOG_BUFFER_CAPACITY: usize = 128;

/// Maximum length (in bytes) of a rendered message in a [`LogEntry`].
const LOG_MESSAGE_MAX_LEN: usize = 96;

/// Maximum length (in bytes) of the target tag in a [`LogEntry`].
const LOG_TARGET_MAX_LEN: usize = 16;

/// A single captured log entry.
///
/// All fields are inline fixed-size arrays so the entry can live in a static
/// circular buffer without allocation.
#[derive(Clone, Copy)]
pub struct LogEntry {
    pub level: log::Level,
    target_buf: [u8; LOG_TARGET_MAX_LEN],
    target_len: u8,
    message_buf: [u8; LOG_MESSAGE_MAX_LEN],
    message_len: u8,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            level: log::Level::Trace,
            target_buf: [0; LOG_TARGET_MAX_LEN],
            target_len: 0,
            message_buf: [0; LOG_MESSAGE_MAX_LEN],
            message_len: 0,
        }
    }

    /// The subsystem tag, truncated to [`LOG_TARGET_MAX_LEN`] bytes.
    pub fn target(&self) -> &str {
        core::str::from_utf8(&self.target_buf[..self.target_len as usize]).unwrap_or("")
    }

    /// The rendered message, truncated to [`LOG_MESSAGE_MAX_LEN`] bytes.
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.message_buf[..self.message_len as usize]).unwrap_or("")
    }
}

/// Writes into a fixed byte buffer, dropping anything past the end.
struct FixedWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Write for FixedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len().saturating_sub(self.len);
        let take = room.min(s.len());
        // Truncation must land on a char boundary to keep the buffer UTF-8.
        let mut take = take;
        while take > 0 && !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Circular buffer of recent log entries.
pub struct LogRing {
    entries: [LogEntry; LOG_BUFFER_CAPACITY],
    next: usize,
    total: usize,
}

impl LogRing {
    pub const fn new() -> Self {
        Self {
            entries: [LogEntry::empty(); LOG_BUFFER_CAPACITY],
            next: 0,
            total: 0,
        }
    }

    /// Record one entry, overwriting the oldest once the ring is full.
    pub fn record(&mut self, level: log::Level, target: &str, args: fmt::Arguments) {
        let entry = &mut self.entries[self.next];
        entry.level = level;

        let tlen = target.len().min(LOG_TARGET_MAX_LEN);
        entry.target_buf[..tlen].copy_from_slice(&target.as_bytes()[..tlen]);
        entry.target_len = tlen as u8;

        let mut w = FixedWriter {
            buf: &mut entry.message_buf,
            len: 0,
        };
        // FixedWriter::write_str never fails; it truncates instead.
        let _ = w.write_fmt(args);
        entry.message_len = w.len as u8;

        self.next = (self.next + 1) % LOG_BUFFER_CAPACITY;
        self.total += 1;
    }

    /// Total number of entries ever recorded (including overwritten ones).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Visit retained entries, oldest first.
    pub fn for_each(&self, mut f: impl FnMut(&LogEntry)) {
        let retained = self.total.min(LOG_BUFFER_CAPACITY);
        let start = if self.total > LOG_BUFFER_CAPACITY {
            self.next
        } else {
            0
        };
        for i in 0..retained {
            f(&self.entries[(start + i) % LOG_BUFFER_CAPACITY]);
        }
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

static LOG_RING: Mutex<LogRing> = Mutex::new(LogRing::new());

struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::arch::interrupts::without(|| {
            serial_println!("[{:5} {}] {}", record.level(), record.target(), record.args());
            LOG_RING
                .lock()
                .record(record.level(), record.target(), *record.args());
        });
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger behind the `log` facade.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Number of log records captured so far.
pub fn recorded() -> usize {
    crate::arch::interrupts::without(|| LOG_RING.lock().total())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_records_and_reads_back() {
        let mut ring = LogRing::new();
        ring.record(log::Level::Info, "sched", format_args!("tick {}", 7));
        assert_eq!(ring.total(), 1);

        let mut seen = Vec::new();
        ring.for_each(|e| seen.push((e.level, e.target().to_string(), e.message().to_string())));
        assert_eq!(seen, vec![(log::Level::Info, "sched".into(), "tick 7".into())]);
    }

    #[test]
    fn ring_wraps_and_keeps_newest() {
        let mut ring = LogRing::new();
        for i in 0..LOG_BUFFER_CAPACITY + 5 {
            ring.record(log::Level::Debug, "fs", format_args!("entry {}", i));
        }
        assert_eq!(ring.total(), LOG_BUFFER_CAPACITY + 5);

        let mut first = None;
        let mut count = 0;
        ring.for_each(|e| {
            if first.is_none() {
                first = Some(e.message().to_string());
            }
            count += 1;
        });
        assert_eq!(count, LOG_BUFFER_CAPACITY);
        // Oldest retained entry is the sixth one recorded.
        assert_eq!(first.as_deref(), Some("entry 5"));
    }

    #[test]
    fn long_messages_truncate_cleanly() {
        let mut ring = LogRing::new();
        let long = "x".repeat(3 * LOG_MESSAGE_MAX_LEN);
        ring.record(log::Level::Warn, "terminal", format_args!("{}", long));
        ring.for_each(|e| assert_eq!(e.message().len(), LOG_MESSAGE_MAX_LEN));
    }
}
