//! How indicator lines reach the terminal.
//!
//! The scheduler picks one [`Backend`] when its first indicator is registered and
//! keeps it for its lifetime:
//!
//! * [`AnsiBackend`]: every tick becomes one write of the form
//!   `save-cursor (row-seek line erase-rest)* restore-cursor`.
//! * [`LegacyBackend`]: for consoles without escape sequences. The cursor is read,
//!   moved with console calls, and put back after each line.
//! * [`PlainBackend`]: output redirected to a file or pipe. Nothing is painted
//!   live; indicators that stay on screen print their final line once.

use std::{io, sync::Arc};

use crossterm::{
    Command as _,
    cursor::{MoveToRow, RestorePosition, SavePosition},
    terminal::{Clear, ClearType},
};

use crate::{progress::Shared, settings::Layout, terminal::Terminal};

/// Screen bookkeeping a backend needs to locate a slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Screen {
    /// One past the highest flow-layout slot in use.
    pub reserved_rows: usize,
    /// Lines written through the passthrough since the indicators were placed.
    pub lines_below: usize,
}

pub(crate) trait Backend: Send {
    /// Whether indicators are repainted by the background thread.
    fn is_live(&self) -> bool {
        true
    }

    /// Paints `indicators` and flushes once.
    fn paint(
        &self,
        terminal: &mut dyn Terminal,
        screen: Screen,
        indicators: &[Arc<Shared>],
        buf: &mut String,
    ) -> io::Result<()>;

    /// Blanks the line `indicator` occupies.
    fn erase(
        &self,
        terminal: &mut dyn Terminal,
        screen: Screen,
        indicator: &Shared,
    ) -> io::Result<()>;

    /// Takes an indicator off the screen for good.
    fn retire(
        &self,
        terminal: &mut dyn Terminal,
        screen: Screen,
        indicator: &Arc<Shared>,
        buf: &mut String,
    ) -> io::Result<()> {
        if indicator.settings.leave {
            self.paint(terminal, screen, std::slice::from_ref(indicator), buf)
        } else {
            self.erase(terminal, screen, indicator)
        }
    }
}

/// Rows are zero-based here and one-based on the wire; crossterm converts.
fn row(slot: usize) -> u16 {
    u16::try_from(slot).unwrap_or(u16::MAX)
}

pub(crate) struct AnsiBackend;

impl Backend for AnsiBackend {
    fn paint(
        &self,
        terminal: &mut dyn Terminal,
        _screen: Screen,
        indicators: &[Arc<Shared>],
        buf: &mut String,
    ) -> io::Result<()> {
        if indicators.is_empty() {
            return Ok(());
        }
        buf.clear();
        SavePosition.write_ansi(buf).map_err(io::Error::other)?;
        for indicator in indicators {
            MoveToRow(row(indicator.slot())).write_ansi(buf).map_err(io::Error::other)?;
            buf.push('\r');
            indicator.render(true, buf);
            Clear(ClearType::UntilNewLine).write_ansi(buf).map_err(io::Error::other)?;
        }
        RestorePosition.write_ansi(buf).map_err(io::Error::other)?;
        terminal.write_raw(buf)?;
        terminal.flush()
    }

    fn erase(
        &self,
        terminal: &mut dyn Terminal,
        _screen: Screen,
        indicator: &Shared,
    ) -> io::Result<()> {
        let mut buf = String::new();
        SavePosition.write_ansi(&mut buf).map_err(io::Error::other)?;
        MoveToRow(row(indicator.slot())).write_ansi(&mut buf).map_err(io::Error::other)?;
        Clear(ClearType::CurrentLine).write_ansi(&mut buf).map_err(io::Error::other)?;
        RestorePosition.write_ansi(&mut buf).map_err(io::Error::other)?;
        terminal.write_raw(&buf)?;
        terminal.flush()
    }
}

pub(crate) struct LegacyBackend;

impl LegacyBackend {
    /// Row of `slot`, measured back from the cursor for flowing indicators.
    ///
    /// Only approximate: the console may have scrolled since the slot was reserved.
    fn target_row(screen: Screen, indicator: &Shared, cursor_row: u16) -> u16 {
        match indicator.settings.layout {
            Layout::FlowAndSnapToTop => {
                let back = screen.reserved_rows.saturating_sub(indicator.slot()) + screen.lines_below;
                cursor_row.saturating_sub(row(back))
            }
            Layout::ClearAndAlignToTop | Layout::FixToBottom => row(indicator.slot()),
        }
    }

    fn blank(width: u16, line: &mut String) {
        let target = usize::from(width).saturating_sub(1);
        let used = unicode_width::UnicodeWidthStr::width(line.as_str());
        line.extend(std::iter::repeat_n(' ', target.saturating_sub(used)));
    }
}

impl Backend for LegacyBackend {
    fn paint(
        &self,
        terminal: &mut dyn Terminal,
        screen: Screen,
        indicators: &[Arc<Shared>],
        buf: &mut String,
    ) -> io::Result<()> {
        if indicators.is_empty() {
            return Ok(());
        }
        let (cursor_row, cursor_col) = terminal.cursor_position()?;
        let hide = indicators.iter().any(|i| i.settings.hide_cursor);
        if hide {
            terminal.set_cursor_visible(false)?;
        }

        let (width, _) = terminal.size();
        for indicator in indicators {
            terminal.move_cursor_to(Self::target_row(screen, indicator, cursor_row), 0)?;
            buf.clear();
            indicator.render(false, buf);
            Self::blank(width, buf);
            terminal.write_raw(buf)?;
        }

        terminal.move_cursor_to(cursor_row, cursor_col)?;
        if hide {
            terminal.set_cursor_visible(true)?;
        }
        terminal.flush()
    }

    fn erase(
        &self,
        terminal: &mut dyn Terminal,
        screen: Screen,
        indicator: &Shared,
    ) -> io::Result<()> {
        let (cursor_row, cursor_col) = terminal.cursor_position()?;
        terminal.move_cursor_to(Self::target_row(screen, indicator, cursor_row), 0)?;
        let mut line = String::new();
        Self::blank(terminal.size().0, &mut line);
        terminal.write_raw(&line)?;
        terminal.move_cursor_to(cursor_row, cursor_col)?;
        terminal.flush()
    }
}

pub(crate) struct PlainBackend;

impl Backend for PlainBackend {
    fn is_live(&self) -> bool {
        false
    }

    fn paint(
        &self,
        _terminal: &mut dyn Terminal,
        _screen: Screen,
        _indicators: &[Arc<Shared>],
        _buf: &mut String,
    ) -> io::Result<()> {
        Ok(())
    }

    fn erase(
        &self,
        _terminal: &mut dyn Terminal,
        _screen: Screen,
        _indicator: &Shared,
    ) -> io::Result<()> {
        Ok(())
    }

    fn retire(
        &self,
        terminal: &mut dyn Terminal,
        _screen: Screen,
        indicator: &Arc<Shared>,
        buf: &mut String,
    ) -> io::Result<()> {
        if !indicator.settings.leave {
            return Ok(());
        }
        buf.clear();
        indicator.render(false, buf);
        buf.push('\n');
        terminal.write_raw(buf)?;
        terminal.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Weak};

    use super::{AnsiBackend, Backend, LegacyBackend, PlainBackend, Screen};
    use crate::{
        progress::Shared,
        settings::{Elements, Layout, Settings},
        terminal::{MemoryTerminal, Terminal},
    };

    fn indicator(slot: usize, leave: bool) -> Arc<Shared> {
        placed(slot, leave, Layout::FlowAndSnapToTop)
    }

    fn placed(slot: usize, leave: bool, layout: Layout) -> Arc<Shared> {
        let settings = Settings {
            elements: Elements {
                count: true,
                ..Elements::NONE
            },
            leave,
            layout,
            ..Settings::default()
        };
        let shared = Arc::new(Shared::new(10, 3, settings, 40, true, Weak::new()).unwrap());
        shared.set_slot(slot);
        shared
    }

    /// Escape Batch
    /// One tick is a single save/seek/restore write followed by one flush.
    #[test]
    fn test_ansi_batch_layout() {
        let probe = MemoryTerminal::new(40, 10);
        let mut term = probe.clone();
        let mut buf = String::new();
        AnsiBackend
            .paint(&mut term, Screen::default(), &[indicator(0, true), indicator(2, true)], &mut buf)
            .unwrap();

        let rec = probe.recording();
        assert_eq!(rec.flushes, 1);
        assert_eq!(rec.output, "\x1b7\x1b[1d\r 3/10\x1b[K\x1b[3d\r 3/10\x1b[K\x1b8");
    }

    #[test]
    fn test_ansi_erase() {
        let probe = MemoryTerminal::new(40, 10);
        let mut term = probe.clone();
        AnsiBackend.erase(&mut term, Screen::default(), &indicator(4, false)).unwrap();
        assert_eq!(probe.output(), "\x1b7\x1b[5d\x1b[2K\x1b8");
    }

    /// Legacy Positioning
    /// Lines are padded to the viewport and the cursor is put back afterwards.
    #[test]
    fn test_legacy_restores_cursor() {
        let probe = MemoryTerminal::new(20, 10).legacy();
        let mut term = probe.clone();
        term.move_cursor_to(5, 3).unwrap();

        let screen = Screen {
            reserved_rows: 2,
            lines_below: 1,
        };
        let mut buf = String::new();
        LegacyBackend.paint(&mut term, screen, &[indicator(1, true)], &mut buf).unwrap();

        let rec = probe.recording();
        assert_eq!(rec.cursor, (5, 3));
        assert!(rec.cursor_visible);
        assert_eq!(rec.output, format!(" 3/10{}", " ".repeat(14)));
        // 5 - (2 - 1 + 1)
        assert_eq!(rec.moves[1], (3, 0));
    }

    /// Pinned rows are erased where they are, not relative to the cursor
    #[test]
    fn test_legacy_erase_pinned_row() {
        let probe = MemoryTerminal::new(80, 10).legacy();
        let mut term = probe.clone();
        term.move_cursor_to(3, 0).unwrap();

        let screen = Screen {
            reserved_rows: 0,
            lines_below: 0,
        };
        let mut buf = String::new();
        let bar = placed(9, false, Layout::FixToBottom);
        LegacyBackend.retire(&mut term, screen, &bar, &mut buf).unwrap();

        let rec = probe.recording();
        assert_eq!(rec.moves, vec![(3, 0), (9, 0), (3, 0)]);
        assert_eq!(rec.cursor, (3, 0));
        assert_eq!(rec.output, " ".repeat(79));
    }

    /// Redirected Output
    #[test]
    fn test_plain_prints_kept_lines_only() {
        let probe = MemoryTerminal::new(40, 10).redirected();
        let mut term = probe.clone();
        let mut buf = String::new();

        PlainBackend.paint(&mut term, Screen::default(), &[indicator(0, true)], &mut buf).unwrap();
        PlainBackend.retire(&mut term, Screen::default(), &indicator(1, false), &mut buf).unwrap();
        assert!(probe.output().is_empty());

        PlainBackend.retire(&mut term, Screen::default(), &indicator(0, true), &mut buf).unwrap();
        assert_eq!(probe.output(), " 3/10\n");
    }
}
