//! # Console Line Editing
//!
//! Turns raw serial bytes into operator lines, independent of any UART.
//! The board adapter feeds bytes in one at a time and performs the echo
//! each [`Edit`] asks for.
//!
//! Line endings: `\r`, `\n` and `\r\n` each end exactly one line. The `\n`
//! of a `\r\n` pair is swallowed even when it arrives after the line was
//! handed out, so one editor should be kept across consecutive prompts.
//!
//! Backspace (`0x08`) and delete (`0x7f`) erase the last character.

use heapless::String;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// What the terminal should see after one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edit {
    /// Nothing to echo.
    Ignored,
    /// The byte was appended; echo it.
    Echo(u8),
    /// The last character was removed; erase it on screen.
    Erase,
    /// The line is complete and readable through [`LineEditor::line`].
    Done,
}

/// Assembles one line at a time, up to `N` ASCII characters.
///
/// Characters beyond `N` are dropped, as are non-ASCII bytes and control
/// bytes other than line endings and erase keys.
#[derive(Debug, Clone, Default)]
pub struct LineEditor<const N: usize> {
    line: String<N>,
    after_cr: bool,
}

impl<const N: usize> LineEditor<N> {
    pub const fn new() -> Self {
        Self {
            line: String::new(),
            after_cr: false,
        }
    }

    /// Take one received byte.
    ///
    /// After [`Edit::Done`] the finished line stays in place; call
    /// [`LineEditor::clear`] before assembling the next one.
    pub fn feed(&mut self, byte: u8) -> Edit {
        let after_cr = core::mem::replace(&mut self.after_cr, false);
        match byte {
            b'\n' if after_cr => Edit::Ignored,
            b'\r' | b'\n' => {
                self.after_cr = byte == b'\r';
                Edit::Done
            }
            BACKSPACE | DELETE => match self.line.pop() {
                Some(_) => Edit::Erase,
                None => Edit::Ignored,
            },
            b if b.is_ascii() && !b.is_ascii_control() => match self.line.push(char::from(b)) {
                Ok(()) => Edit::Echo(b),
                Err(_) => Edit::Ignored,
            },
            _ => Edit::Ignored,
        }
    }

    /// The line being assembled, or the last finished one.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Start over with an empty line.
    pub fn clear(&mut self) {
        self.line.clear();
    }
}
