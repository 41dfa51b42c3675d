//! Fluent interface for constructing [`Progress`] instances.
//!
//! [`Progress::new`] covers the common case. The [`ProgressBuilder`] exposes every
//! [`Settings`] field plus the two pieces of context an indicator is created in:
//!
//! * **Scheduler:** which terminal the indicator is drawn on. Defaults to
//!   [`Scheduler::global`].
//! * **Parent:** the indicator whose line this one's progress feeds into. Defaults to
//!   the innermost indicator still open on the creating thread, so nested loops nest
//!   their bars without any wiring.

use std::sync::{Arc, Weak};

use compact_str::CompactString;

use crate::{
    context,
    error::Result,
    progress::{Progress, ProgressHandle, Shared},
    scheduler::Scheduler,
    settings::{Elements, Layout, Settings},
    style::{BarStyle, ColorScheme},
};

/// Where the parent of a new indicator comes from.
#[derive(Default)]
enum Parent {
    /// Innermost open indicator of the creating thread.
    #[default]
    Inferred,
    Explicit(Weak<Shared>),
    /// No parent at all.
    Detached,
}

/// A builder pattern for constructing [`Progress`] instances.
#[derive(Default)]
#[must_use]
pub struct ProgressBuilder {
    total: Option<u64>,
    initial: u64,
    settings: Settings,
    parent: Parent,
    scheduler: Option<Scheduler>,
}

impl ProgressBuilder {
    /// Starts building an indicator counting up to `total`.
    pub fn new(total: u64) -> Self {
        Self {
            total: Some(total),
            ..Self::default()
        }
    }

    /// Sets the total. `0` means unknown: no percentage and no bar.
    pub const fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Total if one was set; used by adapters that can guess one otherwise.
    pub(crate) const fn total_or(&self, fallback: u64) -> u64 {
        match self.total {
            Some(total) => total,
            None => fallback,
        }
    }

    /// Count the indicator starts from.
    pub const fn initial(mut self, initial: u64) -> Self {
        self.initial = initial;
        self
    }

    /// Label shown before the percentage.
    pub fn description(mut self, description: impl Into<CompactString>) -> Self {
        self.settings.description = description.into();
        self
    }

    /// Unit appended to the rate, e.g. `"B"` for `12.5kB/s`.
    pub fn unit(mut self, unit: impl Into<CompactString>) -> Self {
        self.settings.unit = unit.into();
        self
    }

    /// Glyph ramp of the bar.
    pub const fn style(mut self, style: BarStyle) -> Self {
        self.settings.style = style;
        self
    }

    /// Draws the bar with `#` regardless of terminal support.
    pub const fn ascii(mut self, ascii: bool) -> Self {
        self.settings.ascii = ascii;
        self
    }

    /// Caps the whole line at `width` columns.
    pub const fn width(mut self, width: usize) -> Self {
        self.settings.width = Some(width);
        self
    }

    /// Pins a flowing indicator to a specific row.
    pub const fn vertical_position(mut self, row: usize) -> Self {
        self.settings.vertical_position = Some(row);
        self
    }

    /// Where the indicator is placed on screen.
    pub const fn layout(mut self, layout: Layout) -> Self {
        self.settings.layout = layout;
        self
    }

    /// Selects which elements of the line are drawn.
    pub const fn elements(mut self, elements: Elements) -> Self {
        self.settings.elements = elements;
        self
    }

    /// Colors of the line elements. [`ColorScheme::NONE`] by default.
    pub const fn colors(mut self, colors: ColorScheme) -> Self {
        self.settings.colors = colors;
        self
    }

    /// Abbreviates counts and rates: `12k/1M`.
    pub const fn metric_abbreviations(mut self, enabled: bool) -> Self {
        self.settings.metric_abbreviations = enabled;
        self
    }

    /// Rate smoothing factor in `[0, 1]`; `0` averages over the whole run.
    pub const fn smoothing(mut self, smoothing: f64) -> Self {
        self.settings.smoothing = smoothing;
        self
    }

    /// Keep the final line on screen after disposal instead of erasing it.
    pub const fn leave(mut self, leave: bool) -> Self {
        self.settings.leave = leave;
        self
    }

    /// Hide the cursor while repainting on consoles without escape sequences.
    pub const fn hide_cursor(mut self, hide: bool) -> Self {
        self.settings.hide_cursor = hide;
        self
    }

    /// Replaces all settings at once.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Nests the new indicator under `parent` instead of the inferred one.
    pub fn parent(mut self, parent: &ProgressHandle) -> Self {
        self.parent = Parent::Explicit(Arc::downgrade(&parent.shared));
        self
    }

    /// Creates a top-level indicator even when another one is open on this thread.
    pub fn detached(mut self) -> Self {
        self.parent = Parent::Detached;
        self
    }

    /// Draws on `scheduler` instead of the global one.
    pub fn scheduler(mut self, scheduler: &Scheduler) -> Self {
        self.scheduler = Some(scheduler.clone());
        self
    }

    /// Validates the settings, registers the indicator and returns its guard.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration) for
    ///   invalid settings, or an explicit width that leaves no room for the bar.
    /// * [`Error::SlotOccupied`](crate::Error::SlotOccupied) when the requested row
    ///   is taken.
    /// * [`Error::Io`](crate::Error::Io) when the terminal cannot be written to.
    ///
    /// Nothing is registered when an error is returned.
    pub fn start(self) -> Result<Progress> {
        let scheduler = self.scheduler.unwrap_or_else(Scheduler::global);
        let parent = match self.parent {
            Parent::Inferred => context::current(),
            Parent::Explicit(parent) => parent,
            Parent::Detached => Weak::new(),
        };

        let (width, unicode) = scheduler.viewport();
        let shared = Arc::new(Shared::new(
            self.total.unwrap_or_default(),
            self.initial,
            self.settings,
            width,
            unicode,
            parent.clone(),
        )?);

        scheduler.register(&shared)?;
        if let Some(parent) = parent.upgrade() {
            parent.adopt(&shared);
        }
        context::push(&shared);

        Ok(Progress::from_parts(shared, scheduler))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ProgressBuilder;
    use crate::{
        Error,
        scheduler::{Scheduler, SchedulerConfig},
        terminal::MemoryTerminal,
    };

    fn scheduler() -> Scheduler {
        Scheduler::with_config(
            MemoryTerminal::new(100, 30),
            SchedulerConfig {
                tick: Duration::from_millis(5),
                interrupt_handler: false,
                ..SchedulerConfig::default()
            },
        )
    }

    /// Parent Inference
    /// An indicator created while another is open on the same thread nests under it.
    #[test]
    fn test_inferred_parent() {
        let sched = scheduler();
        let outer = ProgressBuilder::new(10).scheduler(&sched).start().unwrap();
        let inner = ProgressBuilder::new(4).scheduler(&sched).start().unwrap();

        assert_eq!(inner.parent().unwrap().slot(), outer.slot());
        inner.dispose();

        // The disposed child is off the stack; the next one nests under `outer` again.
        let next = ProgressBuilder::new(4).scheduler(&sched).start().unwrap();
        assert_eq!(next.parent().unwrap().slot(), outer.slot());
    }

    /// Explicit parents win over inference, across threads too
    #[test]
    fn test_explicit_and_detached_parent() {
        let sched = scheduler();
        let root = ProgressBuilder::new(10).scheduler(&sched).start().unwrap();
        let other = ProgressBuilder::new(10).scheduler(&sched).detached().start().unwrap();
        assert!(other.parent().is_none());

        let handle = root.handle();
        let sched2 = sched.clone();
        std::thread::spawn(move || {
            let child = ProgressBuilder::new(2)
                .scheduler(&sched2)
                .parent(&handle)
                .start()
                .unwrap();
            child.set_pos(1);
            assert_eq!(child.parent().unwrap().slot(), handle.slot());
            assert!(handle.render_line().contains("  5%"));
        })
        .join()
        .unwrap();
    }

    /// Builder Defaults
    #[test]
    fn test_builder_carries_settings() {
        let sched = scheduler();
        let p = ProgressBuilder::default()
            .scheduler(&sched)
            .total(50)
            .initial(20)
            .description("fetch")
            .unit("B")
            .leave(false)
            .start()
            .unwrap();

        assert_eq!(p.get_total(), 50);
        assert_eq!(p.get_pos(), 20);
        assert_eq!(p.settings().description, "fetch");
        assert!(!p.settings().leave);
    }

    /// Failures register nothing
    #[test]
    fn test_invalid_settings_rejected() {
        let sched = scheduler();
        let err = ProgressBuilder::new(10)
            .scheduler(&sched)
            .width(0)
            .start()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert!(sched.occupied_slots().is_empty());
        assert!(!sched.is_running());
    }
}
