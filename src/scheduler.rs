//! The registry of live indicators and the thread that repaints them.
//!
//! A [`Scheduler`] owns one terminal. Indicators register with it when they start
//! and deregister when they are disposed. While at least one indicator is live on an
//! interactive terminal, a background thread wakes every
//! [`tick`](SchedulerConfig::tick), asks each indicator whether it is dirty and
//! repaints the dirty ones in a single batched write.
//!
//! # Synchronization Strategy
//!
//! Two locks, always taken in this order:
//!
//! * **Lifecycle lock:** guards the repaint thread's join handle. Registration and
//!   deregistration hold it for their whole duration, so starting and stopping the
//!   thread never interleave.
//! * **Console lock:** guards the terminal, the slot map and the screen counters.
//!   Every byte written to the terminal, including passthrough text, is written
//!   under it. The repaint thread takes only this lock, once per tick.
//!
//! Deregistering the last indicator joins the repaint thread *after* releasing the
//! console lock but while still holding the lifecycle lock.
//!
//! Indicator updates take neither lock; see [`ProgressHandle`](crate::ProgressHandle).

use std::{
    cell::Cell,
    collections::BTreeMap,
    fmt,
    io,
    ops::{Deref, DerefMut},
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossterm::{
    Command as _,
    terminal::{Clear, ClearType},
};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};
use tracing_subscriber::fmt::MakeWriter;

use crate::{
    backend::{AnsiBackend, Backend, LegacyBackend, PlainBackend, Screen},
    error::{Error, Result},
    interrupt::{self, Restore},
    progress::Shared,
    settings::{Layout, Settings},
    terminal::{CrosstermTerminal, Terminal},
};

/// How long the interrupt handler waits for a busy console before giving up.
const INTERRUPT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

thread_local! {
    /// Set while this thread holds a console lock.
    static HOLDING: Cell<bool> = const { Cell::new(false) };
}

/// Timing and process-level behavior of a [`Scheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerConfig {
    /// Interval between two dirty checks of the repaint thread.
    pub tick: Duration,
    /// An idle indicator is still repainted this often, to keep its clock moving.
    pub refresh: Duration,
    /// Replaces `refresh` for jobs that run, or are predicted to run, an hour or more.
    pub long_refresh: Duration,
    /// Restore the terminal and exit with status 130 on Ctrl-C.
    pub interrupt_handler: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            refresh: Duration::from_secs(1),
            long_refresh: Duration::from_secs(60),
            interrupt_handler: true,
        }
    }
}

/// What the scheduler found out about its terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Output goes to a file or pipe.
    pub redirected: bool,
    /// Escape sequences are used. Cleared for good if activation fails.
    pub escape: bool,
    /// Box-drawing and braille glyphs can be displayed.
    pub unicode: bool,
}

/// Everything guarded by the console lock.
struct Console {
    terminal: Box<dyn Terminal>,
    caps: Capabilities,
    backend: Option<Box<dyn Backend>>,
    slots: BTreeMap<usize, Arc<Shared>>,
    screen: Screen,
    scroll_region: bool,
    buf: String,
    dirty: Vec<Arc<Shared>>,
}

/// Console lock guard that marks the owning thread.
///
/// Log lines emitted while it is held must not come back through the
/// passthrough; [`SchedulerWriter`] checks the mark and writes to stderr instead.
struct ConsoleGuard<'a>(MutexGuard<'a, Console>);

impl<'a> ConsoleGuard<'a> {
    fn new(guard: MutexGuard<'a, Console>) -> Self {
        HOLDING.set(true);
        Self(guard)
    }
}

impl Drop for ConsoleGuard<'_> {
    fn drop(&mut self) {
        HOLDING.set(false);
    }
}

impl Deref for ConsoleGuard<'_> {
    type Target = Console;

    fn deref(&self) -> &Console {
        &self.0
    }
}

impl DerefMut for ConsoleGuard<'_> {
    fn deref_mut(&mut self) -> &mut Console {
        &mut self.0
    }
}

impl Console {
    /// Picks the backend the first time an indicator shows up.
    fn setup(&mut self) {
        if self.backend.is_some() {
            return;
        }
        let backend: Box<dyn Backend> = if self.caps.redirected {
            debug!("output is redirected, painting final lines only");
            Box::new(PlainBackend)
        } else if self.caps.escape && self.terminal.activate_escape_sequences() {
            Box::new(AnsiBackend)
        } else {
            if self.caps.escape {
                warn!("escape sequences could not be activated, using legacy console calls");
            }
            self.caps.escape = false;
            Box::new(LegacyBackend)
        };
        self.backend = Some(backend);
    }

    fn is_occupied(&self, slot: usize) -> Result<()> {
        if self.slots.contains_key(&slot) {
            return Err(Error::SlotOccupied(slot));
        }
        Ok(())
    }

    /// Finds the slot for a new indicator and prepares the screen around it.
    fn assign_slot(&mut self, settings: &Settings) -> Result<usize> {
        let (_, height) = self.terminal.size();
        match settings.layout {
            Layout::FlowAndSnapToTop => {
                let slot = match settings.vertical_position {
                    Some(slot) => {
                        self.is_occupied(slot)?;
                        slot
                    }
                    // One of the first len+1 slots is always free.
                    None => (0..=self.slots.len())
                        .find(|slot| !self.slots.contains_key(slot))
                        .unwrap_or(self.slots.len()),
                };
                if slot >= self.screen.reserved_rows {
                    if !self.caps.redirected {
                        let blank = "\n".repeat(slot + 1 - self.screen.reserved_rows);
                        self.terminal.write_raw(&blank)?;
                    }
                    self.screen.reserved_rows = slot + 1;
                }
                Ok(slot)
            }
            Layout::ClearAndAlignToTop => {
                self.is_occupied(0)?;
                self.set_region(1, height)?;
                Ok(0)
            }
            Layout::FixToBottom => {
                let slot = usize::from(height.saturating_sub(1));
                self.is_occupied(slot)?;
                self.set_region(1, height.saturating_sub(1))?;
                Ok(slot)
            }
        }
    }

    fn set_region(&mut self, top: u16, bottom: u16) -> Result<()> {
        if self.caps.escape && !self.caps.redirected {
            self.terminal.set_scrollable_region(top, bottom)?;
            self.scroll_region = true;
        }
        Ok(())
    }

    /// Shrinks the reserved area after the topmost flowing indicator left.
    fn lower_high_water(&mut self, removed: usize) {
        if removed + 1 != self.screen.reserved_rows {
            return;
        }
        self.screen.reserved_rows = self
            .slots
            .iter()
            .filter(|(_, s)| s.settings.layout == Layout::FlowAndSnapToTop)
            .map(|(slot, _)| slot + 1)
            .max()
            .unwrap_or(0);
    }

    fn paint(&mut self, indicators: &[Arc<Shared>]) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(err) = backend.paint(self.terminal.as_mut(), self.screen, indicators, &mut self.buf) {
            debug!(%err, "repaint failed");
        }
    }

    fn retire(&mut self, indicator: &Arc<Shared>) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(err) = backend.retire(self.terminal.as_mut(), self.screen, indicator, &mut self.buf) {
            debug!(%err, slot = indicator.slot(), "final repaint failed");
        }
    }

    /// One pass of the repaint loop.
    fn tick(&mut self, config: &SchedulerConfig) {
        let mut dirty = std::mem::take(&mut self.dirty);
        dirty.clear();
        dirty.extend(
            self.slots
                .values()
                .filter(|s| s.is_dirty(config.refresh, config.long_refresh))
                .cloned(),
        );
        if !dirty.is_empty() {
            trace!(count = dirty.len(), "repainting");
            self.paint(&dirty);
        }
        dirty.clear();
        self.dirty = dirty;
    }

    /// Puts the scroll region and cursor back.
    fn restore(&mut self, interrupted: bool) -> io::Result<()> {
        if interrupted && self.caps.escape {
            let mut line = String::from("\r");
            Clear(ClearType::CurrentLine).write_ansi(&mut line).map_err(io::Error::other)?;
            self.terminal.write_raw(&line)?;
        }
        if self.scroll_region {
            self.terminal.reset_scrollable_region()?;
            self.scroll_region = false;
        }
        if !self.caps.redirected {
            self.terminal.set_cursor_visible(true)?;
        }
        self.terminal.flush()
    }
}

struct Inner {
    id: usize,
    config: SchedulerConfig,
    running: AtomicBool,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
    console: Mutex<Console>,
}

impl Inner {
    fn lock_console(&self) -> ConsoleGuard<'_> {
        ConsoleGuard::new(self.console.lock())
    }
}

impl Restore for Inner {
    fn restore(&self) {
        self.running.store(false, Ordering::Release);
        let Some(mut console) = self.console.try_lock_for(INTERRUPT_LOCK_TIMEOUT) else {
            return;
        };
        let _ = console.restore(true);
    }
}

fn repaint_loop(inner: &Inner) {
    debug!(tick = ?inner.config.tick, "repaint thread started");
    while inner.running.load(Ordering::Acquire) {
        inner.lock_console().tick(&inner.config);
        thread::park_timeout(inner.config.tick);
    }
    debug!("repaint thread stopped");
}

/// Schedules repaints of all indicators sharing one terminal.
///
/// Cloning is cheap and every clone drives the same terminal. Most programs use
/// [`Scheduler::global`]; tests and embedders construct their own over a
/// [`MemoryTerminal`](crate::MemoryTerminal) or another [`Terminal`].
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler over `terminal` with the default configuration.
    #[must_use]
    pub fn new(terminal: impl Terminal + 'static) -> Self {
        Self::with_config(terminal, SchedulerConfig::default())
    }

    /// Creates a scheduler over `terminal`.
    #[must_use]
    pub fn with_config(terminal: impl Terminal + 'static, config: SchedulerConfig) -> Self {
        let caps = Capabilities {
            redirected: terminal.is_redirected(),
            escape: terminal.supports_escape_sequences(),
            unicode: terminal.supports_unicode(),
        };
        Self {
            inner: Arc::new(Inner {
                id: interrupt::next_id(),
                config,
                running: AtomicBool::new(false),
                lifecycle: Mutex::new(None),
                console: Mutex::new(Console {
                    terminal: Box::new(terminal),
                    caps,
                    backend: None,
                    slots: BTreeMap::new(),
                    screen: Screen::default(),
                    scroll_region: false,
                    buf: String::new(),
                    dirty: Vec::new(),
                }),
            }),
        }
    }

    /// The process-wide scheduler over stdout, created on first use.
    #[must_use]
    pub fn global() -> Self {
        static GLOBAL: OnceLock<Scheduler> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Self::new(CrosstermTerminal::new()))
            .clone()
    }

    /// The configuration this scheduler was created with.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.inner.config
    }

    /// Terminal capabilities, as currently in effect.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.lock_console().caps
    }

    /// `true` while the repaint thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Slots held by live indicators, in ascending order.
    #[must_use]
    pub fn occupied_slots(&self) -> Vec<usize> {
        self.inner.lock_console().slots.keys().copied().collect()
    }

    /// Rows reserved for flowing indicators: one past the highest such slot.
    #[must_use]
    pub fn reserved_rows(&self) -> usize {
        self.inner.lock_console().screen.reserved_rows
    }

    /// Lines written through the passthrough below the indicators.
    #[must_use]
    pub fn lines_below(&self) -> usize {
        self.inner.lock_console().screen.lines_below
    }

    /// Viewport width and glyph support used to budget a new indicator's line.
    pub(crate) fn viewport(&self) -> (usize, bool) {
        let console = self.inner.lock_console();
        (usize::from(console.terminal.size().0), console.caps.unicode)
    }

    /// Places `shared` on screen, starting the repaint thread if needed.
    ///
    /// On error nothing is registered.
    pub(crate) fn register(&self, shared: &Arc<Shared>) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock();
        let mut console = self.inner.lock_console();

        console.setup();
        let slot = console.assign_slot(&shared.settings)?;
        shared.set_slot(slot);
        console.slots.insert(slot, Arc::clone(shared));
        debug!(slot, layout = ?shared.settings.layout, "indicator registered");

        console.paint(std::slice::from_ref(shared));
        if lifecycle.is_some() || !console.backend.as_ref().is_some_and(|b| b.is_live()) {
            return Ok(());
        }

        self.inner.running.store(true, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("slotbar-repaint".into())
            .spawn(move || repaint_loop(&inner));
        match spawned {
            Ok(handle) => *lifecycle = Some(handle),
            Err(err) => {
                self.inner.running.store(false, Ordering::Release);
                console.slots.remove(&slot);
                console.lower_high_water(slot);
                return Err(err.into());
            }
        }

        if self.inner.config.interrupt_handler {
            let target: Weak<dyn Restore> = Arc::downgrade(&self.inner) as Weak<dyn Restore>;
            interrupt::arm(self.inner.id, target);
        }
        Ok(())
    }

    /// Takes `shared` off screen; stops the repaint thread after the last one.
    pub(crate) fn deregister(&self, shared: &Arc<Shared>) {
        let mut lifecycle = self.inner.lifecycle.lock();

        let handle = {
            let mut console = self.inner.lock_console();
            console.retire(shared);

            let slot = shared.slot();
            if console.slots.get(&slot).is_some_and(|s| Arc::ptr_eq(s, shared)) {
                console.slots.remove(&slot);
                if shared.settings.layout == Layout::FlowAndSnapToTop {
                    console.lower_high_water(slot);
                }
            }
            shared.mark_disposed();
            debug!(slot, "indicator disposed");

            if !console.slots.is_empty() {
                return;
            }

            self.inner.running.store(false, Ordering::Release);
            interrupt::disarm(self.inner.id);
            console.screen.lines_below = 0;
            if let Err(err) = console.restore(false) {
                debug!(%err, "could not restore terminal state");
            }
            lifecycle.take()
        };

        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.join().is_err() {
                warn!("repaint thread panicked");
            }
        }
    }

    /// Writes `text` at the cursor, below the indicators.
    ///
    /// Newlines are counted so the legacy console path can find its rows again.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the terminal write fails.
    pub fn write(&self, text: &str) -> Result<()> {
        let mut console = self.inner.lock_console();
        console.terminal.write_raw(text)?;
        console.terminal.flush()?;
        if console.screen.reserved_rows > 0 {
            console.screen.lines_below += text.matches('\n').count();
        }
        Ok(())
    }

    /// Writes `text` followed by a newline.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the terminal write fails.
    pub fn write_line(&self, text: &str) -> Result<()> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write(&line)
    }

    /// Clears the whole screen. Does nothing without escape sequences.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] when the terminal write fails.
    pub fn clear_screen(&self) -> Result<()> {
        let mut console = self.inner.lock_console();
        if !console.caps.escape || console.caps.redirected {
            return Ok(());
        }
        let mut seq = String::new();
        Clear(ClearType::All).write_ansi(&mut seq).map_err(io::Error::other)?;
        console.terminal.write_raw(&seq)?;
        console.terminal.flush()?;
        Ok(())
    }

    /// An [`io::Write`] that goes through [`write`](Self::write).
    #[must_use]
    pub fn writer(&self) -> SchedulerWriter {
        SchedulerWriter {
            scheduler: self.clone(),
            pending: Vec::new(),
        }
    }

    /// A [`MakeWriter`] for `tracing_subscriber::fmt` that routes log lines through
    /// the passthrough, so they scroll below live indicators instead of over them.
    #[must_use]
    pub fn make_writer(&self) -> LogWriter {
        LogWriter {
            scheduler: self.clone(),
        }
    }
}

/// [`io::Write`] adapter over [`Scheduler::write`].
///
/// Writes made while the same thread holds the console lock, such as log lines
/// emitted from inside the scheduler, go to stderr.
///
/// A character split across two writes is held back until its last byte arrives.
#[derive(Clone, Debug)]
pub struct SchedulerWriter {
    scheduler: Scheduler,
    /// Leading bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
}

impl SchedulerWriter {
    fn emit(&self, bytes: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(bytes);
        self.scheduler.write(&text).map_err(|err| match err {
            Error::Io(err) => err,
            other => io::Error::other(other),
        })
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
///
/// Invalid sequences in the middle count as complete; they are replaced on output.
fn complete_prefix(bytes: &[u8]) -> usize {
    let mut start = 0;
    loop {
        match std::str::from_utf8(&bytes[start..]) {
            Ok(_) => return bytes.len(),
            Err(err) => match err.error_len() {
                Some(len) => start += err.valid_up_to() + len,
                None => return start + err.valid_up_to(),
            },
        }
    }
}

impl io::Write for SchedulerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if HOLDING.get() {
            return io::Write::write(&mut io::stderr(), buf);
        }
        self.pending.extend_from_slice(buf);
        let complete = complete_prefix(&self.pending);
        if complete > 0 {
            let head: Vec<u8> = self.pending.drain(..complete).collect();
            self.emit(&head)?;
        }
        Ok(buf.len())
    }

    /// Writes out a held-back partial character as a replacement character.
    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest)
    }
}

/// Log sink for `tracing_subscriber`, created by [`Scheduler::make_writer`].
#[derive(Clone, Debug)]
pub struct LogWriter {
    scheduler: Scheduler,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = SchedulerWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.scheduler.writer()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write as _,
        thread,
        time::{Duration, Instant},
    };

    use super::{Scheduler, SchedulerConfig};
    use crate::{
        Error, ProgressBuilder,
        settings::{Layout, Settings},
        terminal::MemoryTerminal,
    };

    fn scheduler(term: &MemoryTerminal) -> Scheduler {
        Scheduler::with_config(
            term.clone(),
            SchedulerConfig {
                tick: Duration::from_millis(5),
                interrupt_handler: false,
                ..SchedulerConfig::default()
            },
        )
    }

    fn bar(sched: &Scheduler, total: u64) -> ProgressBuilder {
        ProgressBuilder::new(total).scheduler(sched).leave(false)
    }

    fn wait_for(term: &MemoryTerminal, needle: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if term.output().contains(needle) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Slot Assignment
    /// Flowing indicators get distinct slots; removing the highest lowers the mark.
    #[test]
    fn test_distinct_slots_and_high_water() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);

        let a = bar(&sched, 10).start().unwrap();
        let b = bar(&sched, 10).start().unwrap();
        let c = bar(&sched, 10).start().unwrap();
        assert_eq!((a.slot(), b.slot(), c.slot()), (0, 1, 2));
        assert_eq!(sched.reserved_rows(), 3);

        c.dispose();
        assert_eq!(sched.reserved_rows(), 2);

        a.dispose();
        assert_eq!(sched.reserved_rows(), 2, "a lower slot keeps the mark");
        assert_eq!(sched.occupied_slots(), vec![1]);
        b.dispose();
        assert_eq!(sched.reserved_rows(), 0);
    }

    /// Gap Reuse
    #[test]
    fn test_freed_slot_is_reused() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);

        let first = bar(&sched, 10).start().unwrap();
        let second = bar(&sched, 10).start().unwrap();
        first.dispose();

        let third = bar(&sched, 10).start().unwrap();
        assert_eq!(third.slot(), 0);
        assert_eq!(second.slot(), 1);
    }

    /// Thread Lifecycle
    /// The last disposal stops the repaint thread; the next creation restarts it.
    #[test]
    fn test_thread_stops_and_restarts() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);
        assert!(!sched.is_running());

        let p = bar(&sched, 10).start().unwrap();
        assert!(sched.is_running());
        p.dispose();
        assert!(!sched.is_running());

        let p = bar(&sched, 10).start().unwrap();
        assert!(sched.is_running());
        drop(p);
        assert!(!sched.is_running());
    }

    /// End To End
    /// Half way the line shows 50%; finished, it shows 100% with elapsed equal to
    /// the predicted total.
    #[test]
    fn test_half_then_complete() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);
        let p = ProgressBuilder::new(10)
            .scheduler(&sched)
            .smoothing(0.0)
            .leave(true)
            .start()
            .unwrap();

        p.set_pos(5);
        assert!(wait_for(&term, " 50%|"));

        p.set_pos(10);
        p.dispose();

        let out = term.output();
        let last = out.rsplit("\x1b[1d\r").next().unwrap();
        let line = last.split("\x1b[K").next().unwrap();
        assert!(line.starts_with("100%|"), "{line:?}");
        assert!(line.contains("|10/10 [00:00s<00:00s, "), "{line:?}");
    }

    /// Escape Output
    /// Ticks are bracketed by save/restore cursor sequences.
    #[test]
    fn test_escape_batches() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);
        let p = bar(&sched, 10).start().unwrap();
        assert!(sched.capabilities().escape);

        term.clear_output();
        p.set_state(crate::State::Paused);
        assert!(wait_for(&term, "\x1b8"));
        let out = term.output();
        assert!(out.starts_with("\x1b7\x1b[1d\r"), "{out:?}");
    }

    /// Legacy Fallback
    /// Failing activation switches to console calls for good.
    #[test]
    fn test_activation_failure_falls_back() {
        let term = MemoryTerminal::new(80, 24).failing_activation();
        let sched = scheduler(&term);
        assert!(sched.capabilities().escape);

        let p = bar(&sched, 10).start().unwrap();
        assert!(!sched.capabilities().escape);
        p.set_pos(5);
        assert!(wait_for(&term, " 50%|"));
        p.dispose();

        assert!(!term.output().contains('\x1b'));
        assert!(term.recording().cursor_visible);
        assert!(!sched.capabilities().escape);
    }

    /// Redirected Output
    /// No repaint thread; kept indicators print their last line once.
    #[test]
    fn test_redirected_prints_final_line() {
        let term = MemoryTerminal::new(80, 24).redirected();
        let sched = scheduler(&term);

        let p = ProgressBuilder::new(4)
            .scheduler(&sched)
            .description("load")
            .leave(true)
            .start()
            .unwrap();
        assert!(!sched.is_running());
        assert!(term.output().is_empty());

        p.set_pos(4);
        p.dispose();
        let out = term.output();
        assert!(out.starts_with("load: 100%|"), "{out:?}");
        assert!(out.ends_with("]\n"));
        assert_eq!(out.matches('\n').count(), 1);

        let gone = bar(&sched, 4).start().unwrap();
        gone.dispose();
        assert_eq!(term.output(), out);
    }

    /// Passthrough Accounting
    #[test]
    fn test_lines_below_counted_and_reset() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);
        sched.write_line("before").unwrap();
        assert_eq!(sched.lines_below(), 0, "nothing reserved yet");

        let p = bar(&sched, 10).start().unwrap();
        sched.write_line("a").unwrap();
        sched.write("b\nc\n").unwrap();
        writeln!(sched.writer(), "d").unwrap();
        assert_eq!(sched.lines_below(), 4);

        p.dispose();
        assert_eq!(sched.lines_below(), 0);
        assert!(term.output().contains("b\nc\n"));
    }

    /// Split Characters
    /// A multibyte character cut across two writes reaches the terminal whole.
    #[test]
    fn test_writer_joins_split_characters() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);
        let bytes = "héllo\n".as_bytes();

        let mut writer = sched.writer();
        writer.write_all(&bytes[..2]).unwrap();
        assert_eq!(term.output(), "h");
        writer.write_all(&bytes[2..]).unwrap();
        assert_eq!(term.output(), "héllo\n");

        writer.write_all(&[b'x', 0xC3]).unwrap();
        writer.flush().unwrap();
        assert_eq!(term.output(), "héllo\nx\u{FFFD}");
    }

    #[test]
    fn test_complete_prefix() {
        assert_eq!(super::complete_prefix("hé".as_bytes()), 3);
        assert_eq!(super::complete_prefix(&"hé".as_bytes()[..2]), 1);
        assert_eq!(super::complete_prefix(&[0xFF, b'a', 0xE2, 0x82]), 2);
    }

    /// Pinned Layouts
    /// A bottom-pinned indicator shrinks the scroll region until it is gone.
    #[test]
    fn test_fix_to_bottom_region() {
        let term = MemoryTerminal::new(80, 10);
        let sched = scheduler(&term);

        let p = bar(&sched, 10).layout(Layout::FixToBottom).start().unwrap();
        assert_eq!(p.slot(), 9);
        assert_eq!(term.recording().scroll_region, Some((1, 9)));

        assert!(matches!(
            bar(&sched, 10).layout(Layout::FixToBottom).start(),
            Err(Error::SlotOccupied(9))
        ));

        p.dispose();
        assert_eq!(term.recording().scroll_region, None);
        assert!(term.recording().cursor_visible);
    }

    #[test]
    fn test_clear_and_align_to_top() {
        let term = MemoryTerminal::new(80, 10);
        let sched = scheduler(&term);
        let p = bar(&sched, 10).layout(Layout::ClearAndAlignToTop).start().unwrap();
        assert_eq!(p.slot(), 0);
        assert_eq!(term.recording().scroll_region, Some((1, 10)));
    }

    /// Occupied Slots
    /// A taken row is an error and leaves the registry untouched.
    #[test]
    fn test_explicit_slot_conflict() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);

        let _p = bar(&sched, 10).vertical_position(1).start().unwrap();
        assert_eq!(sched.reserved_rows(), 2);

        let err = bar(&sched, 10).vertical_position(1).start().unwrap_err();
        assert!(matches!(err, Error::SlotOccupied(1)));
        assert_eq!(sched.occupied_slots(), vec![1]);

        let settings = Settings {
            smoothing: 2.0,
            ..Settings::default()
        };
        assert!(matches!(
            bar(&sched, 10).settings(settings).start(),
            Err(Error::InvalidConfiguration(_))
        ));
        assert_eq!(sched.occupied_slots(), vec![1]);
    }

    #[test]
    fn test_clear_screen_needs_escapes() {
        let term = MemoryTerminal::new(80, 24);
        scheduler(&term).clear_screen().unwrap();
        assert_eq!(term.output(), "\x1b[2J");

        let legacy = MemoryTerminal::new(80, 24).legacy();
        scheduler(&legacy).clear_screen().unwrap();
        assert!(legacy.output().is_empty());
    }

    /// Log Routing
    /// Formatted events arrive through the passthrough.
    #[test]
    fn test_tracing_writer() {
        let term = MemoryTerminal::new(80, 24);
        let sched = scheduler(&term);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sched.make_writer())
            .without_time()
            .with_target(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let p = bar(&sched, 10).start().unwrap();
            tracing::info!("copied file");
            assert_eq!(sched.lines_below(), 1);
            p.dispose();
        });

        assert!(term.output().contains("copied file\n"));
    }
}
