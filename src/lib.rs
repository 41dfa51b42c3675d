//! # `slotbar`
//!
//! Concurrent, multi-line terminal progress bars.
//!
//! Any number of indicators, created and updated from any number of threads, share
//! one terminal. Each one owns a line (a *slot*); a single background thread
//! repaints only the lines whose visible output changed, in one batched write per
//! tick. `slotbar` is designed to be:
//!
//! * **Cheap to update**: [`ProgressHandle::inc`] is one atomic addition. Rendering
//!   cost is paid by the repaint thread, and only when a glyph would change.
//! * **Nesting-aware**: a bar created inside another bar's loop feeds its fractional
//!   progress into the outer line.
//! * **Terminal-aware**: escape sequences where available, plain console calls where
//!   not, and a quiet final-line-only mode when output is redirected.
//!
//! ## Modules
//!
//! * [`builder`]: Fluent interface for constructing [`Progress`] instances.
//! * [`progress`]: The indicator guard and its cloneable [`ProgressHandle`].
//! * [`scheduler`]: Slot assignment, the repaint thread and the log passthrough.
//! * [`render`]: Pure line rendering.
//! * [`rate`]: Smoothed throughput and time-to-completion estimates.
//! * [`settings`] and [`style`]: Everything that controls how a line looks.
//! * [`terminal`]: The terminal abstraction, over `crossterm` or in memory.
//! * [`io`]: Wrappers for [`std::io::Read`] and [`std::io::Write`] that track progress automatically.
//! * [`iter`]: Extension traits for tracking progress on Iterators.
//!
//! ## Example
//!
//! ```no_run
//! use std::thread;
//!
//! use slotbar::ProgressBuilder;
//!
//! # fn main() -> slotbar::Result<()> {
//! let workers: Vec<_> = (0..4)
//!     .map(|n| {
//!         thread::spawn(move || -> slotbar::Result<()> {
//!             let bar = ProgressBuilder::new(1_000).description(format!("worker {n}")).start()?;
//!             for _ in 0..1_000 {
//!                 bar.inc(1);
//!             }
//!             Ok(())
//!         })
//!     })
//!     .collect();
//! for worker in workers {
//!     worker.join().expect("worker panicked")?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
pub mod builder;
mod context;
mod error;
mod interrupt;
pub mod io;
pub mod iter;
pub mod progress;
pub mod rate;
pub mod render;
pub mod scheduler;
pub mod settings;
pub mod style;
pub mod terminal;

pub use builder::ProgressBuilder;
pub use error::{Error, Result};
pub use io::{ProgressReader, ProgressWriter};
pub use iter::{ProgressIter, ProgressIteratorExt};
pub use progress::{Progress, ProgressHandle};
pub use rate::RateEstimator;
pub use render::{Frame, Renderer};
pub use scheduler::{Capabilities, LogWriter, Scheduler, SchedulerConfig, SchedulerWriter};
pub use settings::{Elements, Layout, Settings};
pub use style::{BarStyle, ColorScheme, State};
pub use terminal::{CrosstermTerminal, MemoryTerminal, Recording, Terminal};
