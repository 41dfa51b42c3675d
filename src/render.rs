//! Pure line rendering.
//!
//! A [`Renderer`] is computed once per indicator, when it is created, from its
//! [`Settings`] and the viewport width. Every repaint then turns a [`Frame`] (an
//! immutable sample of the indicator) into characters appended to a buffer. Nothing
//! in this module performs I/O or reads a clock.
//!
//! The line layout is fixed:
//!
//! ```text
//! description:  42%|██████████████▌                   | 42/100 [00:04s<00:10s, 9.87it/s]
//! ```
//!
//! Any element can be turned off through [`Elements`](crate::Elements).

use std::{fmt::Write as _, time::Duration};

use compact_str::CompactString;
use crossterm::{
    Command as _,
    style::{Color, ResetColor, SetForegroundColor},
};
use unicode_width::UnicodeWidthStr;

use crate::{
    error::{Error, Result},
    settings::{Elements, Settings},
    style::{ASCII_GLYPHS, ColorScheme, State},
};

const TOLERANCE: f64 = 1e-6;
const METRIC_SUFFIXES: [&str; 7] = ["", "k", "M", "G", "T", "P", "E"];
const UNKNOWN_TIME: &str = "--:--?";
const HOUR: u64 = 3600;

/// Immutable sample of an indicator taken at repaint time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frame {
    /// Raw progress count.
    pub progress: u64,
    /// Fractional contribution of nested children, in units of one progress item.
    pub nested: f64,
    /// Time since the indicator started.
    pub elapsed: Duration,
    /// Predicted total duration, `None` when unknown.
    pub total_time: Option<Duration>,
    /// Items per second.
    pub rate: f64,
    /// Run state, selects the bar color.
    pub state: State,
}

/// Static rendering parameters of one indicator.
#[derive(Clone, Debug)]
pub struct Renderer {
    total: u64,
    glyphs: &'static [char],
    bar_width: usize,
    total_digits: usize,
    elements: Elements,
    description: Option<CompactString>,
    unit: CompactString,
    colors: ColorScheme,
    metric: bool,
}

impl Renderer {
    /// Budgets the line for a viewport `viewport_width` columns wide.
    ///
    /// The bar receives whatever the other enabled elements leave over. When the
    /// caller fixed a width that leaves no room for the bar, this fails; a narrow
    /// terminal on its own only shrinks the bar to a single cell.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] when the settings are invalid or an explicit
    /// width is too small.
    pub fn new(total: u64, settings: &Settings, viewport_width: usize, unicode: bool) -> Result<Self> {
        settings.validate()?;

        let glyphs = if settings.ascii || !unicode {
            ASCII_GLYPHS
        } else {
            settings.style.glyphs()
        };

        let mut renderer = Self {
            total,
            glyphs,
            bar_width: 0,
            total_digits: count_digits(total),
            elements: settings.elements,
            description: settings.shown_description().map(CompactString::from),
            unit: settings.unit.clone(),
            colors: settings.colors,
            metric: settings.metric_abbreviations,
        };

        if renderer.has_bar() {
            let mut captured = viewport_width.saturating_sub(2);
            if let Some(width) = settings.width {
                captured = captured.min(width);
            }
            let reserved = renderer.prologue_width() + renderer.epilogue_width();
            renderer.bar_width = match captured.checked_sub(reserved) {
                Some(width) if width > 0 => width,
                _ if settings.width.is_some() => {
                    return Err(Error::config(format!(
                        "width {captured} leaves no room for the bar ({reserved} columns reserved)"
                    )));
                }
                _ => 1,
            };
        }

        Ok(renderer)
    }

    /// The bar budget in cells; `0` when no bar is drawn.
    #[must_use]
    pub const fn bar_width(&self) -> usize {
        self.bar_width
    }

    /// Amount of progress that corresponds to one visible glyph step.
    ///
    /// Used to space out progress-driven repaints.
    #[must_use]
    pub fn repaint_increment(&self) -> f64 {
        let steps = if self.bar_width > 0 {
            self.bar_width * self.glyphs.len()
        } else {
            100
        };
        let increment = self.total as f64 / steps as f64;
        if increment.abs() < TOLERANCE {
            1.0
        } else {
            increment
        }
    }

    const fn has_bar(&self) -> bool {
        self.elements.bar && self.total > 0
    }

    fn prologue_width(&self) -> usize {
        let mut width = 0;
        if let Some(desc) = &self.description {
            width += desc.width() + 2;
        }
        if self.elements.percent && self.total > 0 {
            width += "100%".len();
        }
        if self.has_bar() {
            width += 1;
        }
        width
    }

    fn epilogue_width(&self) -> usize {
        let mut width = 0;
        if self.has_bar() {
            width += 1;
        }
        if self.elements.count {
            width += if self.metric {
                "123k/999k".len()
            } else {
                self.total_digits * 2 + 1
            };
        }
        if self.elements.time || self.elements.rate {
            width += " []".len();
        }
        if self.elements.time {
            width += "11:22s<33:44s".len();
        }
        if self.elements.time && self.elements.rate {
            width += ", ".len();
        }
        if self.elements.rate {
            width += "123.45/s".len() + self.unit.width();
        }
        width
    }

    /// Appends the line for `frame` to `out`.
    ///
    /// Color escapes are only emitted when `colored` is set.
    pub fn render(&self, frame: &Frame, colored: bool, out: &mut String) {
        let known = self.total > 0;

        if let Some(desc) = &self.description {
            out.push_str(desc);
            out.push_str(": ");
        }

        if self.elements.percent && known {
            paint(out, colored, self.colors.percent, |out| {
                let _ = write!(out, "{:>3}%", percent(frame.progress, frame.nested, self.total));
            });
        }

        if self.has_bar() {
            out.push('|');
            let mut drawn = 0;
            paint(out, colored, self.colors.bar_for(frame.state), |out| {
                drawn = self.push_bar(frame, out);
            });
            push_repeated(out, ' ', self.bar_width.saturating_sub(drawn));
            out.push('|');
        }

        if self.elements.count {
            paint(out, colored, self.colors.count, |out| self.push_count(frame.progress, out));
        }

        if self.elements.time || self.elements.rate {
            out.push_str(" [");
            if self.elements.time {
                paint(out, colored, self.colors.time, |out| {
                    if known {
                        push_times(out, frame.elapsed, frame.total_time);
                    } else {
                        push_elapsed(out, frame.elapsed);
                    }
                });
            }
            if self.elements.time && self.elements.rate {
                out.push_str(", ");
            }
            if self.elements.rate {
                paint(out, colored, self.colors.rate, |out| self.push_rate(frame.rate, out));
            }
            out.push(']');
        }
    }

    fn push_bar(&self, frame: &Frame, out: &mut String) -> usize {
        if self.glyphs.len() == 1 {
            let count = simple_glyph_count(frame.progress, self.total, self.bar_width);
            push_repeated(out, self.glyphs[0], count);
            return count;
        }

        let ramp = self.glyphs.len();
        let blocks = ramp_blocks(frame.progress, frame.nested, self.total, self.bar_width, ramp);
        let complete = blocks / ramp;
        let edge = blocks % ramp;
        push_repeated(out, self.glyphs[ramp - 1], complete);
        if edge == 0 {
            return complete;
        }
        out.push(self.glyphs[edge]);
        complete + 1
    }

    fn push_count(&self, progress: u64, out: &mut String) {
        let known = self.total > 0;
        match (self.metric, known) {
            (true, true) => {
                let (total, total_suffix) = metric_u64(self.total);
                let (value, suffix) = metric_u64(progress);
                let _ = write!(out, "{value:>3}{suffix}/{total}{total_suffix}");
            }
            (true, false) => {
                let (value, suffix) = metric_u64(progress);
                let _ = write!(out, "{value}{suffix}");
            }
            (false, true) => {
                let _ = write!(out, "{progress:>width$}/{}", self.total, width = self.total_digits);
            }
            (false, false) => {
                let _ = write!(out, "{progress}");
            }
        }
    }

    fn push_rate(&self, rate: f64, out: &mut String) {
        let unit = &self.unit;
        if !rate.is_finite() {
            let _ = write!(out, "?{unit}/s");
            return;
        }
        let (value, suffix) = if self.metric { metric_f64(rate) } else { (rate, "") };
        if value < 100.0 {
            let _ = write!(out, "{value:.2}{suffix}{unit}/s");
        } else {
            let _ = write!(out, "{}{suffix}{unit}/s", value as u64);
        }
    }
}

fn paint(out: &mut String, colored: bool, color: Option<Color>, body: impl FnOnce(&mut String)) {
    let color = color.filter(|_| colored);
    if let Some(color) = color {
        let _ = SetForegroundColor(color).write_ansi(out);
    }
    body(out);
    if color.is_some() {
        let _ = ResetColor.write_ansi(out);
    }
}

fn push_repeated(out: &mut String, c: char, n: usize) {
    out.extend(std::iter::repeat_n(c, n));
}

/// Whole percent of `progress + nested` over `total`, clamped to `[0, 100]`.
#[must_use]
pub fn percent(progress: u64, nested: f64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    if nested <= 0.0 {
        let pct = u128::from(progress) * 100 / u128::from(total);
        return pct.min(100) as u64;
    }
    let pct = ((progress as f64 + nested) * 100.0 / total as f64).floor();
    pct.clamp(0.0, 100.0) as u64
}

/// Number of fill glyphs of a single-glyph bar: `floor(progress * width / total)`.
#[must_use]
pub fn simple_glyph_count(progress: u64, total: u64, width: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let progress = progress.min(total);
    (u128::from(progress) * width as u128 / u128::from(total)) as usize
}

/// Position within `width * ramp_len` sub-cell steps reached by the effective
/// progress, truncated.
#[must_use]
pub fn ramp_blocks(progress: u64, nested: f64, total: u64, width: usize, ramp_len: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let steps = width * ramp_len;
    let blocks = (progress as f64 + nested) * steps as f64 / total as f64;
    (blocks.max(0.0) as usize).min(steps)
}

/// Appends `elapsed<total`, switching to `hh:mm` once either side reaches an hour.
pub fn push_times(out: &mut String, elapsed: Duration, total: Option<Duration>) {
    let hours_scale = elapsed.as_secs() >= HOUR || total.is_some_and(|t| t.as_secs() >= HOUR);
    push_time(out, Some(elapsed), hours_scale);
    out.push('<');
    push_time(out, total, hours_scale);
}

fn push_elapsed(out: &mut String, elapsed: Duration) {
    push_time(out, Some(elapsed), elapsed.as_secs() >= HOUR);
}

fn push_time(out: &mut String, time: Option<Duration>, hours_scale: bool) {
    let Some(time) = time else {
        out.push_str(UNKNOWN_TIME);
        return;
    };
    let secs = time.as_secs();
    let _ = if hours_scale {
        write!(out, "{:02}:{:02}m", secs / HOUR, secs / 60 % 60)
    } else {
        write!(out, "{:02}:{:02}s", secs / 60, secs % 60)
    };
}

fn metric_u64(mut value: u64) -> (u64, &'static str) {
    let mut idx = 0;
    while value >= 1000 && idx < METRIC_SUFFIXES.len() - 1 {
        value /= 1000;
        idx += 1;
    }
    (value, METRIC_SUFFIXES[idx])
}

fn metric_f64(mut value: f64) -> (f64, &'static str) {
    let mut idx = 0;
    while value >= 1000.0 && idx < METRIC_SUFFIXES.len() - 1 {
        value /= 1000.0;
        idx += 1;
    }
    (value, METRIC_SUFFIXES[idx])
}

const fn count_digits(mut n: u64) -> usize {
    let mut digits = 0;
    while n != 0 {
        n /= 10;
        digits += 1;
    }
    digits
}
