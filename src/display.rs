//! Screen model capability and a headless implementation.
//!
//! Text itself always goes to the interpreter's output sink; the screen only
//! receives window, cursor and style changes.

use crate::error::VmError;
use log::debug;

/// Contents of the version 3 status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub location: String,
    /// Score and turns, or hours and minutes when `time_game` is set
    pub left: i16,
    pub right: i16,
    pub time_game: bool,
}

/// Window and style operations used by the display opcodes
pub trait Screen {
    /// Split the screen so the upper window has `lines` lines
    fn split_window(&mut self, lines: u16) -> Result<(), VmError>;

    /// Set the current window (0 = lower/main, 1 = upper)
    fn set_window(&mut self, window: u16) -> Result<(), VmError>;

    /// Erase a window (-1 = unsplit and clear, -2 = clear all, 0 = lower, 1 = upper)
    fn erase_window(&mut self, window: i16) -> Result<(), VmError>;

    /// Erase from cursor to end of line when `value` is 1
    fn erase_line(&mut self, value: u16) -> Result<(), VmError>;

    /// Set cursor position (1-based coordinates)
    fn set_cursor(&mut self, line: i16, column: u16) -> Result<(), VmError>;

    /// Returns (line, column) with 1-based indexing
    fn cursor(&self) -> (u16, u16);

    /// Set text style (0 = normal, 1 = reverse, 2 = bold, 4 = italic, 8 = fixed)
    fn set_text_style(&mut self, style: u16) -> Result<(), VmError>;

    fn set_buffer_mode(&mut self, buffered: bool) -> Result<(), VmError>;

    fn set_colour(&mut self, foreground: u16, background: u16) -> Result<(), VmError>;

    /// Select a font, returning the previous one, or 0 if unavailable
    fn set_font(&mut self, font: u16) -> Result<u16, VmError>;

    /// Redraw the version 3 status line
    fn show_status(&mut self, status: &StatusLine) -> Result<(), VmError>;
}

/// Screen that tracks state without drawing anything
#[derive(Debug, Clone)]
pub struct HeadlessScreen {
    pub upper_window_lines: u16,
    pub current_window: u16,
    cursor: (u16, u16),
    pub text_style: u16,
    pub buffered: bool,
    pub colours: (u16, u16),
    pub font: u16,
    pub last_status: Option<StatusLine>,
}

impl HeadlessScreen {
    pub fn new() -> Self {
        HeadlessScreen {
            upper_window_lines: 0,
            current_window: 0,
            cursor: (1, 1),
            text_style: 0,
            buffered: true,
            colours: (1, 1),
            font: 1,
            last_status: None,
        }
    }
}

impl Default for HeadlessScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen for HeadlessScreen {
    fn split_window(&mut self, lines: u16) -> Result<(), VmError> {
        debug!("Headless: split_window({})", lines);
        self.upper_window_lines = lines;
        Ok(())
    }

    fn set_window(&mut self, window: u16) -> Result<(), VmError> {
        debug!("Headless: set_window({})", window);
        self.current_window = window;
        if window == 1 {
            self.cursor = (1, 1);
        }
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> Result<(), VmError> {
        debug!("Headless: erase_window({})", window);
        if window == -1 {
            self.upper_window_lines = 0;
            self.current_window = 0;
        }
        self.cursor = (1, 1);
        Ok(())
    }

    fn erase_line(&mut self, value: u16) -> Result<(), VmError> {
        debug!("Headless: erase_line({})", value);
        Ok(())
    }

    fn set_cursor(&mut self, line: i16, column: u16) -> Result<(), VmError> {
        debug!("Headless: set_cursor({}, {})", line, column);
        // Negative lines switch the cursor on or off
        if line > 0 {
            self.cursor = (line as u16, column);
        }
        Ok(())
    }

    fn cursor(&self) -> (u16, u16) {
        self.cursor
    }

    fn set_text_style(&mut self, style: u16) -> Result<(), VmError> {
        self.text_style = if style == 0 { 0 } else { self.text_style | style };
        Ok(())
    }

    fn set_buffer_mode(&mut self, buffered: bool) -> Result<(), VmError> {
        self.buffered = buffered;
        Ok(())
    }

    fn set_colour(&mut self, foreground: u16, background: u16) -> Result<(), VmError> {
        // 0 keeps the current colour
        if foreground != 0 {
            self.colours.0 = foreground;
        }
        if background != 0 {
            self.colours.1 = background;
        }
        Ok(())
    }

    fn set_font(&mut self, font: u16) -> Result<u16, VmError> {
        match font {
            0 => Ok(self.font),
            1 | 4 => Ok(std::mem::replace(&mut self.font, font)),
            _ => Ok(0),
        }
    }

    fn show_status(&mut self, status: &StatusLine) -> Result<(), VmError> {
        debug!("Headless: status {:?}", status);
        self.last_status = Some(status.clone());
        Ok(())
    }
}
