//! I/O wrappers for tracking data transfer.
//!
//! This module provides [`ProgressReader`] and [`ProgressWriter`], which wrap any implementation
//! of [`std::io::Read`] or [`std::io::Write`].
//!
//! Every byte read or written is added to the wrapped [`ProgressHandle`]; for
//! buffered readers, bytes count once they are consumed. The overhead is a single
//! atomic addition per call. Pair them with [`Settings::unit`](crate::Settings::unit)
//! `"B"` and metric abbreviations for a `12.5MB/s` style rate.

use std::io::{self, BufRead, Read, Write};

use crate::ProgressHandle;

/// A wrapper around [`Read`] that counts bytes read.
#[derive(Debug)]
pub struct ProgressReader<R> {
    inner: R,
    progress: ProgressHandle,
}

impl<R> ProgressReader<R> {
    /// Creates a new `ProgressReader` wrapping `inner` with the given `progress` tracker.
    pub const fn new(inner: R, progress: ProgressHandle) -> Self {
        Self { inner, progress }
    }

    /// Unwraps the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.inc(n as u64);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for ProgressReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amount: usize) {
        self.inner.consume(amount);
        self.progress.inc(amount as u64);
    }
}

/// A wrapper around [`Write`] that counts bytes written.
#[derive(Debug)]
pub struct ProgressWriter<W> {
    inner: W,
    progress: ProgressHandle,
}

impl<W> ProgressWriter<W> {
    /// Creates a new `ProgressWriter` wrapping `inner` with the given `progress` tracker.
    pub const fn new(inner: W, progress: ProgressHandle) -> Self {
        Self { inner, progress }
    }

    /// Unwraps the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.progress.inc(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, BufRead as _, Cursor, Read as _, Write as _},
        time::Duration,
    };

    use crate::{
        Progress, ProgressBuilder,
        io::{ProgressReader, ProgressWriter},
        scheduler::{Scheduler, SchedulerConfig},
        terminal::MemoryTerminal,
    };

    fn progress(total: u64) -> Progress {
        let sched = Scheduler::with_config(
            MemoryTerminal::new(100, 30),
            SchedulerConfig {
                tick: Duration::from_millis(5),
                interrupt_handler: false,
                ..SchedulerConfig::default()
            },
        );
        ProgressBuilder::new(total).scheduler(&sched).unit("B").start().unwrap()
    }

    /// Reader Tracking
    /// Verifies bytes read are counted.
    #[test]
    fn test_io_reader() {
        let data = vec![0u8; 100];
        let p = progress(100);
        let mut reader = ProgressReader::new(Cursor::new(&data), p.handle());

        let mut buf = [0u8; 10];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(p.get_pos(), 10);

        io::copy(&mut reader, &mut io::sink()).unwrap();
        assert_eq!(p.get_pos(), 100);
    }

    /// Buffered reads count what is consumed, not what is buffered
    #[test]
    fn test_io_buf_reader() {
        let p = progress(12);
        let mut reader = ProgressReader::new(Cursor::new(b"one\ntwo\nsix\n".to_vec()), p.handle());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "one\n");
        assert_eq!(p.get_pos(), 4);
    }

    /// Writer Tracking
    /// Verifies bytes written are counted.
    #[test]
    fn test_io_writer() {
        let p = progress(50);
        let mut writer = ProgressWriter::new(Vec::new(), p.handle());

        writer.write_all(&[1, 2, 3, 4, 5]).unwrap();

        assert_eq!(p.get_pos(), 5);
        assert_eq!(writer.into_inner(), vec![1, 2, 3, 4, 5]);
    }
}
