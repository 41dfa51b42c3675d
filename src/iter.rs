//! Iterator adapters for automatic progress tracking.
//!
//! This module provides the [`ProgressIteratorExt`] trait, which adds helper methods
//! to any Rust [`Iterator`]. This allows you to attach a progress bar to a loop with
//! a single method call.
//!
//! # Heuristics
//!
//! * If [`Iterator::size_hint`] is exact, it becomes the total; otherwise the total
//!   is unknown (`0`) unless the builder passed to
//!   [`progress_with`](ProgressIteratorExt::progress_with) sets one.
//! * The clock starts when iteration starts, not when the adapter is created.
//! * An item is counted once the loop body is done with it, i.e. when the next item
//!   is requested. The bar reaches 100% on exhaustion and is then disposed.
//!
//! # Example
//!
//! ```no_run
//! use slotbar::ProgressIteratorExt;
//!
//! # fn main() -> slotbar::Result<()> {
//! for _file in ["a.txt", "b.txt"].iter().progress()? {
//!     // A loop inside this one gets a bar nested under the outer bar.
//!     for _chunk in (0..64).progress()? {}
//! }
//! # Ok(())
//! # }
//! ```

use std::iter::FusedIterator;

use crate::{
    builder::ProgressBuilder,
    error::Result,
    progress::{Progress, ProgressHandle},
    scheduler::Scheduler,
};

/// An iterator adapter that wraps an underlying iterator and tracks progress.
pub struct ProgressIter<I> {
    iter: I,
    progress: Option<Progress>,
    started: bool,
    pending: bool,
}

impl<I> ProgressIter<I> {
    /// Wraps `iter`, counting into `progress`.
    ///
    /// Note: This is usually constructed via [`ProgressIteratorExt`] methods.
    pub const fn new(iter: I, progress: Progress) -> Self {
        Self {
            iter,
            progress: Some(progress),
            started: false,
            pending: false,
        }
    }

    /// Handle to the indicator; `None` once the iterator is exhausted.
    #[must_use]
    pub fn handle(&self) -> Option<ProgressHandle> {
        self.progress.as_ref().map(Progress::handle)
    }
}

impl<I: Iterator> Iterator for ProgressIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(progress) = &self.progress else {
            return None;
        };

        if !self.started {
            self.started = true;
            progress.restart_clock();
        }
        if self.pending {
            progress.inc(1);
        }

        let item = self.iter.next();
        self.pending = item.is_some();
        if item.is_none() {
            if let Some(progress) = self.progress.take() {
                progress.dispose();
            }
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.progress.is_none() {
            return (0, Some(0));
        }
        self.iter.size_hint()
    }
}

impl<I: Iterator> FusedIterator for ProgressIter<I> {}

/// Extension trait to easily attach progress tracking to any Iterator.
pub trait ProgressIteratorExt: Iterator + Sized {
    /// Wraps the iterator in an indicator on the global scheduler.
    ///
    /// # Errors
    ///
    /// See [`ProgressBuilder::start`].
    fn progress(self) -> Result<ProgressIter<Self>> {
        self.progress_with(ProgressBuilder::default())
    }

    /// Wraps the iterator in an indicator on `scheduler`.
    ///
    /// # Errors
    ///
    /// See [`ProgressBuilder::start`].
    fn progress_in(self, scheduler: &Scheduler) -> Result<ProgressIter<Self>> {
        self.progress_with(ProgressBuilder::default().scheduler(scheduler))
    }

    /// Wraps the iterator in an indicator built from `builder`.
    ///
    /// The total comes from `size_hint` when the builder does not set one.
    ///
    /// # Errors
    ///
    /// See [`ProgressBuilder::start`].
    fn progress_with(self, builder: ProgressBuilder) -> Result<ProgressIter<Self>> {
        let total = builder.total_or(exact_len(&self));
        let progress = builder.total(total).start()?;
        Ok(ProgressIter::new(self, progress))
    }
}

impl<I: Iterator> ProgressIteratorExt for I {}

fn exact_len(iter: &impl Iterator) -> u64 {
    match iter.size_hint() {
        (lower, Some(upper)) if lower == upper => upper as u64,
        _ => 0,
    }
}
