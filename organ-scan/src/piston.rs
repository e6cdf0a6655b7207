//! Transpose buttons of the piston bank.
//!
//! The two transpose buttons are ordinary momentary keys (20 and 21 on the
//! piston channel), except that holding both at once is a reset chord. The
//! chord is checked whenever the 800ms guard is open; a detected chord closes
//! the guard again, and while it is closed neither button is sampled, so the
//! chord never leaks out as two button presses.

use log::info;

use crate::debounce::{DebounceCell, Transition};
use crate::keymap::LogicalKey;
use crate::line::{LineId, LineIo};
use crate::registry::DeviceId;
use crate::scanner::{EdgeEvent, EventSink};

/// Time after a reset chord during which the buttons are ignored.
pub const GESTURE_WINDOW_MS: u32 = 800;

/// Logical key of the transpose-up button.
pub const TRANSPOSE_UP_KEY: LogicalKey = 20;
/// Logical key of the transpose-down button.
pub const TRANSPOSE_DOWN_KEY: LogicalKey = 21;

/// SysEx command byte of the host's transpose report.
const TRANSPOSE_REPORT: u8 = 0x01;

/// Outcome of a gesture poll that is not an individual button edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Gesture {
    /// Both buttons held: return the host's transpose to zero.
    Reset,
}

pub struct TransposeGesture {
    device: DeviceId,
    up: LineId,
    down: LineId,
    cells: [DebounceCell; 2],
    last_reset: Option<u32>,
}

impl TransposeGesture {
    /// Buttons on `up` and `down`; their edges are reported as keys of
    /// `device` so they share its channel.
    pub fn new(device: DeviceId, up: LineId, down: LineId) -> Self {
        Self {
            device,
            up,
            down,
            cells: [DebounceCell::new(); 2],
            last_reset: None,
        }
    }

    pub fn lines(&self) -> [LineId; 2] {
        [self.up, self.down]
    }

    pub fn configure<IO: LineIo + ?Sized>(&self, io: &mut IO) {
        io.configure_input_pullup(self.up);
        io.configure_input_pullup(self.down);
    }

    /// Sample both buttons at time `now_ms` (a wrapping millisecond clock).
    /// Individual edges go to `sink`; a reset chord is returned instead.
    pub fn poll<IO, S>(&mut self, now_ms: u32, io: &mut IO, sink: &mut S) -> Option<Gesture>
    where
        IO: LineIo + ?Sized,
        S: EventSink + ?Sized,
    {
        if let Some(last) = self.last_reset {
            if now_ms.wrapping_sub(last) < GESTURE_WINDOW_MS {
                return None;
            }
            self.last_reset = None;
        }

        let up = io.read(self.up).is_active();
        let down = io.read(self.down).is_active();
        if up && down {
            info!("transpose reset chord at {}ms", now_ms);
            self.last_reset = Some(now_ms);
            return Some(Gesture::Reset);
        }

        let buttons = [(up, TRANSPOSE_UP_KEY), (down, TRANSPOSE_DOWN_KEY)];
        for (i, (closed, key)) in buttons.into_iter().enumerate() {
            if let Some(transition) = self.cells[i].sample(closed) {
                sink.on_edge(EdgeEvent {
                    device: self.device,
                    key,
                    transition,
                });
            }
        }
        None
    }
}

/// Key presses that undo a host transpose of `transpose` semitones: one
/// press/release pair per semitone, on key 20 for a positive transpose and
/// key 21 otherwise.
pub fn reset_sequence(transpose: i16) -> impl Iterator<Item = (LogicalKey, Transition)> {
    let key = if transpose > 0 {
        TRANSPOSE_UP_KEY
    } else {
        TRANSPOSE_DOWN_KEY
    };
    (0..transpose.unsigned_abs())
        .flat_map(move |_| [(key, Transition::Pressed), (key, Transition::Released)])
}

/// Parse the host's transpose report: a SysEx message (starting with `0xF0`)
/// whose byte 3 is `0x01` followed by up to three bytes of signed ASCII
/// decimal. Parsing stops at the first non-digit; no digits reads as zero.
pub fn parse_transpose_report(sysex: &[u8]) -> Option<i16> {
    if sysex.get(3) != Some(&TRANSPOSE_REPORT) {
        return None;
    }
    let field = &sysex[4..sysex.len().min(7)];
    let mut digits = field.iter().skip_while(|b| **b == b' ').peekable();
    let negative = match digits.peek() {
        Some(b'-') => {
            digits.next();
            true
        }
        Some(b'+') => {
            digits.next();
            false
        }
        _ => false,
    };
    let magnitude = digits
        .take_while(|b| b.is_ascii_digit())
        .fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0'));
    Some(if negative { -magnitude } else { magnitude })
}
