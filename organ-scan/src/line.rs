//! Digital line seam between the scan engine and the hardware.
//!
//! Lines are active low: a strobe selects its column by pulling the line
//! LOW, and a closed switch pulls its sense line LOW against the pull-up.

use core::fmt;

/// Identifier of one digital I/O terminal (an Arduino pin number on the
/// reference console).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId(pub u8);

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Logic level of a line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Level that selects a strobe and signals a closed switch.
    pub const ACTIVE: Level = Level::Low;
    /// Idle level of strobes and open sense lines.
    pub const INACTIVE: Level = Level::High;

    pub fn is_active(self) -> bool {
        self == Level::ACTIVE
    }
}

/// Access to the digital lines of the board.
///
/// Implemented by the firmware over the MCU ports and by
/// [`SimulatedLines`](crate::sim::SimulatedLines) for host-side runs.
pub trait LineIo {
    /// Make `line` an output. The scanner drives it inactive right after.
    fn configure_output(&mut self, line: LineId);

    /// Make `line` an input with its pull-up enabled.
    fn configure_input_pullup(&mut self, line: LineId);

    fn drive(&mut self, line: LineId, level: Level);

    fn read(&mut self, line: LineId) -> Level;

    /// Busy-wait while a freshly driven strobe settles.
    fn settle(&mut self, micros: u16);
}

impl<T: LineIo + ?Sized> LineIo for &mut T {
    fn configure_output(&mut self, line: LineId) {
        (**self).configure_output(line)
    }

    fn configure_input_pullup(&mut self, line: LineId) {
        (**self).configure_input_pullup(line)
    }

    fn drive(&mut self, line: LineId, level: Level) {
        (**self).drive(line, level)
    }

    fn read(&mut self, line: LineId) -> Level {
        (**self).read(line)
    }

    fn settle(&mut self, micros: u16) {
        (**self).settle(micros)
    }
}
