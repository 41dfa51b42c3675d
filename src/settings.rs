//! Immutable per-indicator configuration.
//!
//! [`Settings`] is a plain struct with sensible defaults; most callers never touch it
//! directly and go through [`ProgressBuilder`](crate::ProgressBuilder) instead.

use compact_str::CompactString;

use crate::{
    error::{Error, Result},
    style::{BarStyle, ColorScheme},
};

/// How an indicator is placed on screen.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Layout {
    /// Stack indicators from the top of the screen, reusing the first free row.
    #[default]
    FlowAndSnapToTop,
    /// Make the whole viewport scrollable and always draw on the first row.
    ClearAndAlignToTop,
    /// Exclude the last row from scrolling and pin the indicator there.
    FixToBottom,
}

/// Which parts of the progress line are drawn.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Elements {
    /// `description: `
    pub description: bool,
    /// ` 42%`
    pub percent: bool,
    /// `|████▌     |`
    pub bar: bool,
    /// `42/100`
    pub count: bool,
    /// `00:12s<00:30s`
    pub time: bool,
    /// `3.50/s`
    pub rate: bool,
}

impl Elements {
    /// Everything enabled.
    pub const ALL: Self = Self {
        description: true,
        percent: true,
        bar: true,
        count: true,
        time: true,
        rate: true,
    };

    /// Everything disabled.
    pub const NONE: Self = Self {
        description: false,
        percent: false,
        bar: false,
        count: false,
        time: false,
        rate: false,
    };
}

impl Default for Elements {
    fn default() -> Self {
        Self::ALL
    }
}

/// Visual and behavioral settings of a single indicator.
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Label drawn before the percentage.
    pub description: CompactString,
    /// Unit appended to the rate, e.g. `B` for `12.00B/s`.
    pub unit: CompactString,
    /// Glyph ramp of the bar.
    pub style: BarStyle,
    /// Force the `#` bar regardless of terminal capabilities.
    pub ascii: bool,
    /// Upper bound on the line width, in columns.
    pub width: Option<usize>,
    /// Pin a [`Layout::FlowAndSnapToTop`] indicator to this slot.
    pub vertical_position: Option<usize>,
    /// Placement policy.
    pub layout: Layout,
    /// Enabled line elements.
    pub elements: Elements,
    /// Colors of the line elements.
    pub colors: ColorScheme,
    /// Abbreviate counts and rates with `k`, `M`, `G`...
    pub metric_abbreviations: bool,
    /// EMA factor in `[0, 1]`; `0` means "average since start".
    pub smoothing: f64,
    /// Keep the final line on screen after disposal instead of erasing it.
    pub leave: bool,
    /// Hide the cursor while repainting on consoles without escape sequences.
    pub hide_cursor: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            description: CompactString::default(),
            unit: CompactString::default(),
            style: BarStyle::default(),
            ascii: false,
            width: None,
            vertical_position: None,
            layout: Layout::default(),
            elements: Elements::default(),
            colors: ColorScheme::NONE,
            metric_abbreviations: false,
            smoothing: 0.3,
            leave: true,
            hide_cursor: true,
        }
    }
}

impl Settings {
    /// Checks the settings that can be judged without a terminal.
    ///
    /// Width budgeting against the actual viewport happens later, in
    /// [`Renderer::new`](crate::render::Renderer::new).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] when a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::config(format!(
                "smoothing factor must lie in [0, 1], got {}",
                self.smoothing
            )));
        }
        if self.width == Some(0) {
            return Err(Error::config("width must be positive"));
        }
        if self.vertical_position.is_some() && self.layout != Layout::FlowAndSnapToTop {
            return Err(Error::config(
                "an explicit vertical position requires the flow layout",
            ));
        }
        Ok(())
    }

    /// The description, if it should be drawn at all.
    pub(crate) fn shown_description(&self) -> Option<&str> {
        let text = self.description.trim();
        (self.elements.description && !text.is_empty()).then_some(self.description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{Layout, Settings};
    use crate::Error;

    /// Defaults Validate
    #[test]
    fn test_default_settings_are_valid() {
        Settings::default().validate().unwrap();
    }

    /// Range Checks
    /// Smoothing outside [0, 1] (including NaN) and zero width are rejected.
    #[test]
    fn test_out_of_range_fields_rejected() {
        for smoothing in [-0.1, 1.5, f64::NAN] {
            let settings = Settings {
                smoothing,
                ..Settings::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(Error::InvalidConfiguration(_))
            ));
        }

        let settings = Settings {
            width: Some(0),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_pinned_row_requires_flow_layout() {
        let settings = Settings {
            vertical_position: Some(3),
            layout: Layout::FixToBottom,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_blank_description_hidden() {
        let settings = Settings {
            description: "   ".into(),
            ..Settings::default()
        };
        assert_eq!(settings.shown_description(), None);
    }
}
