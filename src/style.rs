//! Visual vocabulary: bar glyph ramps, run states and color schemes.
//!
//! Everything in here is plain data. Selection logic (which ramp, which color for
//! which state) lives next to the data so the renderer only ever asks questions like
//! "what color is the bar while paused?".

use crossterm::style::Color;

/// The ASCII fallback ramp, used when Unicode output is unavailable or disabled.
pub(crate) const ASCII_GLYPHS: &[char] = &['#'];

/// Glyph ramp used to draw the bar element.
///
/// Ramps are ordered from "least filled" to "fully filled". Multi-glyph ramps allow
/// the leading edge of the bar to show sub-character progress.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BarStyle {
    /// `▏▎▍▌▋▊▉█`
    #[default]
    BarHorizontal,
    /// `▁▂▃▄▅▆▇█`
    BarVertical,
    /// `⣀⣄⣤⣦⣶⣷⣿`
    DotsHorizontal,
    /// `⣀⣄⣆⣇⣧⣷⣿`
    DotsVertical,
    /// `○◔◐◕⬤`
    Clock,
    /// `□◱◧▣■`
    Squares1,
    /// `□◱▨▩■`
    Squares2,
    /// `□◱▥▦■`
    Squares3,
    /// `⬜⬛`
    ShortSquares,
    /// `░▒▓█`
    LongMesh,
    /// `░█`
    ShortMesh,
    /// `▱▰`
    Parallelogram,
    /// `▭◼`
    Rectangles1,
    /// `▯▮`
    Rectangles2,
    /// `◯⬤`
    Circles1,
    /// `⚪⚫`
    Circles2,
}

impl BarStyle {
    /// Every style, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::BarHorizontal,
        Self::BarVertical,
        Self::DotsHorizontal,
        Self::DotsVertical,
        Self::Clock,
        Self::Squares1,
        Self::Squares2,
        Self::Squares3,
        Self::ShortSquares,
        Self::LongMesh,
        Self::ShortMesh,
        Self::Parallelogram,
        Self::Rectangles1,
        Self::Rectangles2,
        Self::Circles1,
        Self::Circles2,
    ];

    /// The ordered glyph ramp for this style.
    #[must_use]
    pub const fn glyphs(self) -> &'static [char] {
        match self {
            Self::BarHorizontal => &['▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'],
            Self::BarVertical => &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'],
            Self::DotsHorizontal => &['⣀', '⣄', '⣤', '⣦', '⣶', '⣷', '⣿'],
            Self::DotsVertical => &['⣀', '⣄', '⣆', '⣇', '⣧', '⣷', '⣿'],
            Self::Clock => &['○', '◔', '◐', '◕', '⬤'],
            Self::Squares1 => &['□', '◱', '◧', '▣', '■'],
            Self::Squares2 => &['□', '◱', '▨', '▩', '■'],
            Self::Squares3 => &['□', '◱', '▥', '▦', '■'],
            Self::ShortSquares => &['⬜', '⬛'],
            Self::LongMesh => &['░', '▒', '▓', '█'],
            Self::ShortMesh => &['░', '█'],
            Self::Parallelogram => &['▱', '▰'],
            Self::Rectangles1 => &['▭', '◼'],
            Self::Rectangles2 => &['▯', '▮'],
            Self::Circles1 => &['◯', '⬤'],
            Self::Circles2 => &['⚪', '⚫'],
        }
    }
}

/// Run state of an indicator. Only affects the bar color.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum State {
    /// Work is progressing normally.
    #[default]
    Running = 0,
    /// Work was deliberately paused.
    Paused = 1,
    /// Work is blocked on something outside the caller's control.
    Stalled = 2,
}

impl State {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Paused,
            2 => Self::Stalled,
            _ => Self::Running,
        }
    }
}

/// Per-element colors. `None` leaves an element uncolored.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorScheme {
    /// Bar color while [`State::Running`].
    pub bar: Option<Color>,
    /// Bar color while [`State::Paused`].
    pub bar_paused: Option<Color>,
    /// Bar color while [`State::Stalled`].
    pub bar_stalled: Option<Color>,
    /// Percentage element.
    pub percent: Option<Color>,
    /// Progress count element.
    pub count: Option<Color>,
    /// Rate element.
    pub rate: Option<Color>,
    /// Elapsed / total time element.
    pub time: Option<Color>,
}

impl ColorScheme {
    /// No colors at all.
    pub const NONE: Self = Self {
        bar: None,
        bar_paused: None,
        bar_stalled: None,
        percent: None,
        count: None,
        rate: None,
        time: None,
    };

    /// High-intensity palette for dark backgrounds.
    pub const BRIGHT: Self = Self {
        bar: Some(Color::Green),
        bar_paused: Some(Color::Yellow),
        bar_stalled: Some(Color::DarkRed),
        percent: Some(Color::Yellow),
        count: Some(Color::Magenta),
        rate: Some(Color::Cyan),
        time: Some(Color::Green),
    };

    /// Normal-intensity palette.
    pub const DARK: Self = Self {
        bar: Some(Color::DarkGreen),
        bar_paused: Some(Color::DarkYellow),
        bar_stalled: Some(Color::DarkRed),
        percent: Some(Color::DarkYellow),
        count: Some(Color::DarkMagenta),
        rate: Some(Color::DarkCyan),
        time: Some(Color::DarkGreen),
    };

    /// Bar color for the given run state.
    #[must_use]
    pub const fn bar_for(&self, state: State) -> Option<Color> {
        match state {
            State::Running => self.bar,
            State::Paused => self.bar_paused,
            State::Stalled => self.bar_stalled,
        }
    }
}
