//! The progress indicator entity.
//!
//! State is split the same way throughout:
//!
//! * **Hot data:** progress, run state and the forced-repaint flag live in atomics.
//!   Worker threads update them without taking any lock; the repaint thread reads
//!   them opportunistically, so a change becomes visible within one tick.
//! * **Meter data:** the clock, rate estimator and repaint bookkeeping are guarded by
//!   a [`Mutex`](parking_lot::Mutex) that is only taken while repainting or
//!   evaluating the dirty predicate, both of which happen under the scheduler lock.
//!
//! A live indicator is owned by a [`Progress`] guard. Dropping or
//! [disposing](Progress::dispose) the guard removes it from the screen. Other
//! threads update it through cloneable [`ProgressHandle`]s.

use std::{
    fmt,
    ops::Deref,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use web_time::Instant;

use crate::{
    builder::ProgressBuilder,
    context,
    error::Result,
    rate::{self, RateEstimator},
    render::{Frame, Renderer},
    scheduler::Scheduler,
    settings::Settings,
    style::State,
};

const HOUR: Duration = Duration::from_secs(3600);

/// State shared between the owning guard, handles and the scheduler.
pub(crate) struct Shared {
    total: u64,
    progress: AtomicU64,
    state: AtomicU8,
    force_repaint: AtomicBool,
    disposed: AtomicBool,
    slot: AtomicUsize,
    pub(crate) settings: Settings,
    renderer: Renderer,
    increment: f64,
    parent: Weak<Shared>,
    child: Mutex<Weak<Shared>>,
    meter: Mutex<Meter>,
}

/// Derived values recomputed on every repaint.
struct Meter {
    start: Instant,
    estimator: RateEstimator,
    total_time: Option<Duration>,
    next_repaint: f64,
    last_repaint: Option<Duration>,
}

impl Shared {
    pub(crate) fn new(
        total: u64,
        initial: u64,
        settings: Settings,
        viewport_width: usize,
        unicode: bool,
        parent: Weak<Self>,
    ) -> Result<Self> {
        let renderer = Renderer::new(total, &settings, viewport_width, unicode)?;
        let increment = renderer.repaint_increment();
        let next_repaint = ((initial as f64 / increment).floor() + 1.0) * increment;

        Ok(Self {
            total,
            progress: AtomicU64::new(initial),
            state: AtomicU8::new(State::Running as u8),
            // The first tick after creation always repaints.
            force_repaint: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            slot: AtomicUsize::new(0),
            meter: Mutex::new(Meter {
                start: Instant::now(),
                estimator: RateEstimator::new(settings.smoothing, initial),
                total_time: None,
                next_repaint,
                last_repaint: None,
            }),
            settings,
            renderer,
            increment,
            parent,
            child: Mutex::new(Weak::new()),
        })
    }

    pub(crate) fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.slot.store(slot, Ordering::Relaxed);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Records `child` as the most recently nested indicator.
    pub(crate) fn adopt(&self, child: &Arc<Self>) {
        *self.child.lock() = Arc::downgrade(child);
    }

    /// The child's effective fraction, expressed in units of one of our items.
    fn nested(&self) -> f64 {
        let Some(child) = self.child.lock().upgrade() else {
            return 0.0;
        };
        if child.is_disposed() || child.total == 0 {
            return 0.0;
        }
        let fraction = (child.progress() as f64 + child.nested()) / child.total as f64;
        fraction.clamp(0.0, 1.0)
    }

    fn elapsed(&self) -> Duration {
        self.meter.lock().start.elapsed()
    }

    /// Dirty predicate, evaluated once per tick by the repaint thread.
    pub(crate) fn is_dirty(&self, refresh: Duration, long_refresh: Duration) -> bool {
        let elapsed = self.elapsed();
        self.is_dirty_at(elapsed, refresh, long_refresh)
    }

    /// Dirty predicate at a given elapsed time.
    ///
    /// Dirty when a repaint was forced, when the refresh span passed since the last
    /// repaint, or when the effective progress crossed the next glyph threshold.
    /// The refresh span coarsens to `long_refresh` once the job runs, or is
    /// predicted to run, for an hour or more.
    pub(crate) fn is_dirty_at(&self, elapsed: Duration, refresh: Duration, long_refresh: Duration) -> bool {
        if self.is_disposed() {
            return false;
        }
        if self.force_repaint.swap(false, Ordering::AcqRel) {
            return true;
        }

        let effective = self.progress() as f64 + self.nested();
        let mut meter = self.meter.lock();

        let span = if elapsed >= HOUR || meter.total_time.is_some_and(|t| t >= HOUR) {
            long_refresh
        } else {
            refresh
        };
        if meter.last_repaint.is_none_or(|last| elapsed >= last + span) {
            return true;
        }

        if effective >= meter.next_repaint {
            meter.next_repaint = ((effective / self.increment).floor() + 1.0) * self.increment;
            return true;
        }
        false
    }

    /// Samples the indicator and updates the meter, as a repaint does.
    pub(crate) fn frame_at(&self, elapsed: Duration) -> Frame {
        let progress = self.progress();
        let nested = self.nested();
        let mut meter = self.meter.lock();

        let rate = meter.estimator.sample(progress, elapsed);
        meter.total_time = rate::predict_total(self.total, rate);
        meter.last_repaint = Some(elapsed);

        Frame {
            progress,
            nested,
            elapsed,
            total_time: meter.total_time,
            rate,
            state: State::from_u8(self.state.load(Ordering::Relaxed)),
        }
    }

    /// Renders the current line into `out`.
    pub(crate) fn render(&self, colored: bool, out: &mut String) {
        let frame = self.frame_at(self.elapsed());
        self.renderer.render(&frame, colored, out);
    }
}

/// A cloneable, thread-safe handle to a live indicator.
///
/// Updates are plain atomic stores; they show up on screen within one repaint tick.
#[derive(Clone)]
pub struct ProgressHandle {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("progress", &self.get_pos())
            .field("total", &self.get_total())
            .field("slot", &self.slot())
            .finish_non_exhaustive()
    }
}

impl ProgressHandle {
    /// Increments the progress count.
    pub fn inc(&self, amount: u64) {
        self.shared.progress.fetch_add(amount, Ordering::Relaxed);
    }

    /// Sets the absolute progress count.
    pub fn set_pos(&self, pos: u64) {
        self.shared.progress.store(pos, Ordering::Relaxed);
    }

    /// Current progress count.
    #[must_use]
    pub fn get_pos(&self) -> u64 {
        self.shared.progress()
    }

    /// The total this indicator counts up to; `0` when unknown.
    #[must_use]
    pub fn get_total(&self) -> u64 {
        self.shared.total
    }

    /// Changes the run state. A change forces a repaint on the next tick.
    pub fn set_state(&self, state: State) {
        let previous = self.shared.state.swap(state as u8, Ordering::Relaxed);
        if previous != state as u8 {
            self.shared.force_repaint.store(true, Ordering::Release);
        }
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> State {
        State::from_u8(self.shared.state.load(Ordering::Relaxed))
    }

    /// The screen slot assigned by the scheduler.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.shared.slot()
    }

    /// The settings this indicator was created with.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Time since creation, or since the last [`restart_clock`](Self::restart_clock).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.shared.elapsed()
    }

    /// Predicted total duration as of the last repaint; `None` when unknown.
    #[must_use]
    pub fn total_time(&self) -> Option<Duration> {
        self.shared.meter.lock().total_time
    }

    /// Rate estimate as of the last repaint, in items per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.shared.meter.lock().estimator.rate()
    }

    /// The parent indicator this one is nested under, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.shared.parent.upgrade().map(|shared| Self { shared })
    }

    /// `true` once the owning [`Progress`] has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Restarts the elapsed clock and the rate estimate.
    pub fn restart_clock(&self) {
        let mut meter = self.shared.meter.lock();
        meter.start = Instant::now();
        meter.estimator = RateEstimator::new(self.shared.settings.smoothing, self.get_pos());
        meter.total_time = None;
        meter.last_repaint = None;
    }

    /// Renders the line as the repaint thread would, without colors.
    ///
    /// This samples the rate estimator, exactly like a repaint.
    #[must_use]
    pub fn render_line(&self) -> String {
        let mut out = String::new();
        self.shared.render(false, &mut out);
        out
    }
}

/// Owning guard of a live indicator.
///
/// Dereferences to [`ProgressHandle`] for updates. The indicator leaves the screen
/// when the guard is [disposed](Self::dispose) or dropped: its final state stays
/// visible when [`Settings::leave`] is set, otherwise its line is erased.
pub struct Progress {
    handle: ProgressHandle,
    scheduler: Scheduler,
    live: bool,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("handle", &self.handle)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl Deref for Progress {
    type Target = ProgressHandle;

    fn deref(&self) -> &ProgressHandle {
        &self.handle
    }
}

impl Progress {
    /// Creates an indicator with default settings on the process-wide scheduler.
    ///
    /// # Errors
    ///
    /// See [`ProgressBuilder::start`].
    pub fn new(total: u64) -> Result<Self> {
        ProgressBuilder::new(total).start()
    }

    /// Starts a [`ProgressBuilder`] for an indicator counting up to `total`.
    #[must_use]
    pub fn builder(total: u64) -> ProgressBuilder {
        ProgressBuilder::new(total)
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, scheduler: Scheduler) -> Self {
        Self {
            handle: ProgressHandle { shared },
            scheduler,
            live: true,
        }
    }

    /// A cloneable handle for updating this indicator from other threads.
    #[must_use]
    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    /// Removes the indicator from the screen.
    ///
    /// Blocks until the repaint thread has exited when this was the last live
    /// indicator of its scheduler.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        context::remove(&self.handle.shared);
        self.scheduler.deregister(&self.handle.shared);
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.release();
    }
}
