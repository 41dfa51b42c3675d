//! The terminal capability provider.
//!
//! The scheduler never touches stdout directly: everything goes through the
//! [`Terminal`] trait. [`CrosstermTerminal`] is the real implementation;
//! [`MemoryTerminal`] records output in memory and is what the test-suite (and any
//! embedder that wants to capture frames) uses.

use std::{
    env,
    fmt,
    io::{self, Stdout, Write},
    sync::Arc,
};

use crossterm::{
    QueueableCommand,
    cursor::{self, Hide, MoveTo, Show},
    terminal,
    tty::IsTty,
};
use parking_lot::Mutex;

/// Primitive operations and capability queries the scheduler needs.
///
/// Rows and columns are zero-based. Scroll regions use the one-based, inclusive
/// convention of the `DECSTBM` control sequence.
pub trait Terminal: Send {
    /// `true` when the output is a file or pipe rather than an interactive terminal.
    fn is_redirected(&self) -> bool;

    /// `true` when the platform is expected to understand ANSI/VT sequences.
    fn supports_escape_sequences(&self) -> bool;

    /// Performs any one-time activation escape sequences need.
    ///
    /// Returns `false` when activation failed and the legacy path must be used.
    fn activate_escape_sequences(&mut self) -> bool {
        self.supports_escape_sequences()
    }

    /// `true` when box-drawing and braille glyphs can be displayed.
    fn supports_unicode(&self) -> bool;

    /// Viewport `(width, height)` in cells.
    fn size(&self) -> (u16, u16);

    /// Writes text (possibly containing escape sequences) verbatim.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write error.
    fn write_raw(&mut self, text: &str) -> io::Result<()>;

    /// Moves the cursor to an absolute position.
    ///
    /// # Errors
    ///
    /// Propagates the underlying console error.
    fn move_cursor_to(&mut self, row: u16, col: u16) -> io::Result<()>;

    /// Current cursor position as `(row, col)`.
    ///
    /// # Errors
    ///
    /// Propagates the underlying console error.
    fn cursor_position(&mut self) -> io::Result<(u16, u16)>;

    /// Shows or hides the cursor.
    ///
    /// # Errors
    ///
    /// Propagates the underlying console error.
    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()>;

    /// Restricts scrolling to rows `top..=bottom` (one-based).
    ///
    /// # Errors
    ///
    /// Propagates the underlying write error.
    fn set_scrollable_region(&mut self, top: u16, bottom: u16) -> io::Result<()>;

    /// Removes any scroll region restriction.
    ///
    /// # Errors
    ///
    /// Propagates the underlying write error.
    fn reset_scrollable_region(&mut self) -> io::Result<()>;

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Propagates the underlying flush error.
    fn flush(&mut self) -> io::Result<()>;
}

/// [`Terminal`] over the process stdout, driven by `crossterm`.
pub struct CrosstermTerminal {
    stdout: Stdout,
}

impl fmt::Debug for CrosstermTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrosstermTerminal").finish_non_exhaustive()
    }
}

impl Default for CrosstermTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermTerminal {
    /// Wraps the process stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl Terminal for CrosstermTerminal {
    fn is_redirected(&self) -> bool {
        !self.stdout.is_tty()
    }

    fn supports_escape_sequences(&self) -> bool {
        // Windows consoles may still refuse at activation time.
        true
    }

    #[cfg(windows)]
    fn activate_escape_sequences(&mut self) -> bool {
        crossterm::ansi_support::supports_ansi()
    }

    fn supports_unicode(&self) -> bool {
        if cfg!(windows) {
            return true;
        }
        ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .find_map(|key| env::var(key).ok().filter(|v| !v.is_empty()))
            .is_some_and(|locale| {
                let locale = locale.to_ascii_lowercase();
                locale.contains("utf-8") || locale.contains("utf8")
            })
    }

    fn size(&self) -> (u16, u16) {
        terminal::size().unwrap_or((80, 24))
    }

    fn write_raw(&mut self, text: &str) -> io::Result<()> {
        self.stdout.write_all(text.as_bytes())
    }

    fn move_cursor_to(&mut self, row: u16, col: u16) -> io::Result<()> {
        self.stdout.queue(MoveTo(col, row))?;
        Ok(())
    }

    fn cursor_position(&mut self) -> io::Result<(u16, u16)> {
        self.stdout.flush()?;
        let (col, row) = cursor::position()?;
        Ok((row, col))
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        if visible {
            self.stdout.queue(Show)?;
        } else {
            self.stdout.queue(Hide)?;
        }
        Ok(())
    }

    fn set_scrollable_region(&mut self, top: u16, bottom: u16) -> io::Result<()> {
        write!(self.stdout, "\x1b[{top};{bottom}r")
    }

    fn reset_scrollable_region(&mut self) -> io::Result<()> {
        self.stdout.write_all(b"\x1b[r")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

/// Everything a [`MemoryTerminal`] has been asked to do.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Recording {
    /// Concatenation of everything written with [`Terminal::write_raw`].
    pub output: String,
    /// Number of [`Terminal::flush`] calls.
    pub flushes: usize,
    /// Simulated cursor position `(row, col)`.
    pub cursor: (u16, u16),
    /// Simulated cursor visibility.
    pub cursor_visible: bool,
    /// Active scroll region, if any.
    pub scroll_region: Option<(u16, u16)>,
    /// Every [`Terminal::move_cursor_to`] target, in call order.
    pub moves: Vec<(u16, u16)>,
}

/// In-memory [`Terminal`] with configurable capabilities.
///
/// Clones share the same [`Recording`], so a test can hand one clone to a
/// [`Scheduler`](crate::Scheduler) and inspect the other.
#[derive(Clone, Debug)]
pub struct MemoryTerminal {
    recording: Arc<Mutex<Recording>>,
    size: (u16, u16),
    escape: bool,
    activation_fails: bool,
    redirected: bool,
}

impl Default for MemoryTerminal {
    fn default() -> Self {
        Self::new(100, 30)
    }
}

impl MemoryTerminal {
    /// An interactive, escape-capable terminal of the given size.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            recording: Arc::new(Mutex::new(Recording {
                cursor_visible: true,
                ..Recording::default()
            })),
            size: (width, height),
            escape: true,
            activation_fails: false,
            redirected: false,
        }
    }

    /// Simulates a console without escape sequence support.
    #[must_use]
    pub const fn legacy(mut self) -> Self {
        self.escape = false;
        self
    }

    /// Simulates a console whose escape sequence activation fails at setup.
    #[must_use]
    pub const fn failing_activation(mut self) -> Self {
        self.activation_fails = true;
        self
    }

    /// Simulates output redirected to a file or pipe.
    #[must_use]
    pub const fn redirected(mut self) -> Self {
        self.redirected = true;
        self
    }

    /// A copy of everything recorded so far.
    #[must_use]
    pub fn recording(&self) -> Recording {
        self.recording.lock().clone()
    }

    /// Everything written so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.recording.lock().output.clone()
    }

    /// Discards recorded output, keeping cursor and region state.
    pub fn clear_output(&self) {
        self.recording.lock().output.clear();
    }
}

impl Terminal for MemoryTerminal {
    fn is_redirected(&self) -> bool {
        self.redirected
    }

    fn supports_escape_sequences(&self) -> bool {
        self.escape
    }

    fn activate_escape_sequences(&mut self) -> bool {
        self.escape && !self.activation_fails
    }

    fn supports_unicode(&self) -> bool {
        true
    }

    fn size(&self) -> (u16, u16) {
        self.size
    }

    fn write_raw(&mut self, text: &str) -> io::Result<()> {
        let mut rec = self.recording.lock();
        rec.output.push_str(text);
        let newlines = text.matches('\n').count() as u16;
        if newlines > 0 {
            rec.cursor = (rec.cursor.0.saturating_add(newlines), 0);
        }
        Ok(())
    }

    fn move_cursor_to(&mut self, row: u16, col: u16) -> io::Result<()> {
        let mut rec = self.recording.lock();
        rec.cursor = (row, col);
        rec.moves.push((row, col));
        Ok(())
    }

    fn cursor_position(&mut self) -> io::Result<(u16, u16)> {
        Ok(self.recording.lock().cursor)
    }

    fn set_cursor_visible(&mut self, visible: bool) -> io::Result<()> {
        self.recording.lock().cursor_visible = visible;
        Ok(())
    }

    fn set_scrollable_region(&mut self, top: u16, bottom: u16) -> io::Result<()> {
        self.recording.lock().scroll_region = Some((top, bottom));
        Ok(())
    }

    fn reset_scrollable_region(&mut self) -> io::Result<()> {
        self.recording.lock().scroll_region = None;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.recording.lock().flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryTerminal, Terminal};

    /// Shared Recording
    /// Clones observe each other's output and cursor movement.
    #[test]
    fn test_memory_terminal_shares_recording() {
        let probe = MemoryTerminal::new(40, 10);
        let mut term = probe.clone();

        term.write_raw("hello\nworld").unwrap();
        term.move_cursor_to(3, 7).unwrap();
        term.set_scrollable_region(1, 9).unwrap();
        term.flush().unwrap();

        let rec = probe.recording();
        assert_eq!(rec.output, "hello\nworld");
        assert_eq!(rec.cursor, (3, 7));
        assert_eq!(rec.scroll_region, Some((1, 9)));
        assert_eq!(rec.flushes, 1);
    }

    #[test]
    fn test_capability_toggles() {
        let mut legacy = MemoryTerminal::default().legacy();
        assert!(!legacy.supports_escape_sequences());
        assert!(!legacy.activate_escape_sequences());

        let mut failing = MemoryTerminal::default().failing_activation();
        assert!(failing.supports_escape_sequences());
        assert!(!failing.activate_escape_sequences());

        assert!(MemoryTerminal::default().redirected().is_redirected());
    }
}
