//! Console panel: messages from the host and the expression pedal.
//!
//! The host talks back over MIDI. Notes 20 to 22 light the three panel
//! lamps, and while note 20 is held the pedalboard is not scanned (the host
//! plays the pedal from a coupler instead). A SysEx report carries the
//! current transpose, whose sign is shown on the two transpose lamps.
//!
//! The expression pedal is a potentiometer read by the ADC; every move is
//! sent as controller 11 on the piston channel.

use log::{debug, trace};

use crate::line::{Level, LineId, LineIo};
use crate::organ::{ChannelMap, Division};
use crate::piston::parse_transpose_report;
use crate::registry::DeviceId;
use crate::scanner::{EventSink, Scanner};

/// Host note that switches the pedalboard off while it is held.
pub const PEDAL_OFF_NOTE: u8 = 20;
/// Host note shown on the first panel lamp; the next lamps follow.
pub const FIRST_LAMP_NOTE: u8 = 20;
/// Number of host-driven panel lamps.
pub const LAMP_COUNT: usize = 3;

pub const EXPRESSION_CHANNEL: u8 = 5;
/// MIDI controller number of the expression pedal.
pub const EXPRESSION_CONTROL: u8 = 11;
/// How often the pedal is read.
pub const EXPRESSION_PERIOD_MS: u32 = 400;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
/// Longest SysEx message kept; longer ones are dropped.
const SYSEX_CAPACITY: usize = 16;

/// A message from the host that the console acts on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HostMessage {
    NoteOn { channel: u8, note: u8 },
    NoteOff { channel: u8, note: u8 },
    Transpose(i16),
}

/// Byte-at-a-time decoder of the host's MIDI stream.
///
/// Note on/off (with running status) and the transpose SysEx are decoded;
/// every other message is skipped. A note on with velocity 0 is a note off.
#[derive(Clone, Debug)]
pub struct MidiDecoder {
    /// Running status; 0 when there is none.
    status: u8,
    data: [u8; 2],
    data_len: usize,
    sysex: [u8; SYSEX_CAPACITY],
    sysex_len: usize,
    in_sysex: bool,
}

impl MidiDecoder {
    pub const fn new() -> Self {
        Self {
            status: 0,
            data: [0; 2],
            data_len: 0,
            sysex: [0; SYSEX_CAPACITY],
            sysex_len: 0,
            in_sysex: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<HostMessage> {
        match byte {
            // Realtime bytes may interleave with anything.
            0xF8..=0xFF => None,
            SYSEX_START => {
                self.status = 0;
                self.in_sysex = true;
                self.sysex[0] = byte;
                self.sysex_len = 1;
                None
            }
            SYSEX_END => {
                if !self.in_sysex {
                    return None;
                }
                self.in_sysex = false;
                parse_transpose_report(&self.sysex[..self.sysex_len]).map(HostMessage::Transpose)
            }
            0xF1..=0xF6 => {
                self.status = 0;
                self.in_sysex = false;
                None
            }
            0x80..=0xEF => {
                self.status = byte;
                self.data_len = 0;
                self.in_sysex = false;
                None
            }
            _ if self.in_sysex => {
                if self.sysex_len < SYSEX_CAPACITY {
                    self.sysex[self.sysex_len] = byte;
                    self.sysex_len += 1;
                } else {
                    self.in_sysex = false;
                }
                None
            }
            _ => self.push_data(byte),
        }
    }

    fn push_data(&mut self, byte: u8) -> Option<HostMessage> {
        if self.status == 0 {
            return None;
        }
        self.data[self.data_len] = byte;
        self.data_len += 1;

        let kind = self.status & 0xF0;
        let needed = if matches!(kind, 0xC0 | 0xD0) { 1 } else { 2 };
        if self.data_len < needed {
            return None;
        }
        self.data_len = 0;

        let channel = (self.status & 0x0F) + 1;
        let note = self.data[0];
        match kind {
            0x90 if self.data[1] > 0 => Some(HostMessage::NoteOn { channel, note }),
            0x80 | 0x90 => Some(HostMessage::NoteOff { channel, note }),
            _ => None,
        }
    }
}

impl Default for MidiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// What the host has told the console so far.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HostState {
    transpose: i16,
    pedal_off: bool,
    lamps: [bool; LAMP_COUNT],
}

impl HostState {
    pub const fn new() -> Self {
        Self {
            transpose: 0,
            pedal_off: false,
            lamps: [false; LAMP_COUNT],
        }
    }

    pub fn apply(&mut self, message: HostMessage) {
        trace!("host: {:?}", message);
        match message {
            HostMessage::NoteOn { note, .. } => self.set_note(note, true),
            HostMessage::NoteOff { note, .. } => self.set_note(note, false),
            HostMessage::Transpose(transpose) => {
                debug!("host transpose {}", transpose);
                self.transpose = transpose;
            }
        }
    }

    fn set_note(&mut self, note: u8, on: bool) {
        if let Some(lamp) = note.checked_sub(FIRST_LAMP_NOTE) {
            if let Some(lit) = self.lamps.get_mut(lamp as usize) {
                *lit = on;
            }
        }
        if note == PEDAL_OFF_NOTE && self.pedal_off != on {
            debug!("pedalboard {}", if on { "off" } else { "on" });
            self.pedal_off = on;
        }
    }

    /// Transpose last reported by the host, in semitones.
    pub fn transpose(&self) -> i16 {
        self.transpose
    }

    pub fn pedal_enabled(&self) -> bool {
        !self.pedal_off
    }

    pub fn lamp(&self, index: usize) -> bool {
        self.lamps.get(index).copied().unwrap_or(false)
    }
}

/// Up/down lamp states for a transpose: lit on the side of its sign.
pub fn transpose_lamps(transpose: i16) -> (bool, bool) {
    (transpose > 0, transpose < 0)
}

fn lamp_level(lit: bool) -> Level {
    if lit {
        Level::High
    } else {
        Level::Low
    }
}

/// Lamp outputs of the panel. Lamps are lit by driving their line high.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Panel {
    pub up_lamp: LineId,
    pub down_lamp: LineId,
    pub host_lamps: [LineId; LAMP_COUNT],
}

impl Panel {
    pub fn lines(&self) -> impl Iterator<Item = LineId> {
        [self.up_lamp, self.down_lamp].into_iter().chain(self.host_lamps)
    }

    /// Make every lamp an output, switched off.
    pub fn configure<IO: LineIo + ?Sized>(&self, io: &mut IO) {
        for line in self.lines() {
            io.configure_output(line);
            io.drive(line, Level::Low);
        }
    }

    pub fn show<IO: LineIo + ?Sized>(&self, host: &HostState, io: &mut IO) {
        let (up, down) = transpose_lamps(host.transpose());
        io.drive(self.up_lamp, lamp_level(up));
        io.drive(self.down_lamp, lamp_level(down));
        for (i, &line) in self.host_lamps.iter().enumerate() {
            io.drive(line, lamp_level(host.lamp(i)));
        }
    }
}

/// Change detector for the expression pedal.
#[derive(Copy, Clone, Debug, Default)]
pub struct ExpressionPedal {
    position: u8,
}

impl ExpressionPedal {
    pub const fn new() -> Self {
        Self { position: 0 }
    }

    /// Feed a 10-bit ADC reading. Returns the controller value to send when
    /// the 7-bit position changed.
    pub fn update(&mut self, raw: u16) -> Option<u8> {
        let position = (raw.min(0x3FF) >> 3) as u8;
        if position == self.position {
            return None;
        }
        self.position = position;
        Some(expression_value(position))
    }
}

/// Controller value of a pedal position. The swell shades never close
/// fully, so positions 0..=127 map onto 35..=127.
pub fn expression_value(position: u8) -> u8 {
    let scaled = (i32::from(position) - 1) * (127 - 35) / (127 - 1) + 35;
    scaled.clamp(0, 127) as u8
}

/// Scan every device, leaving out the pedalboard while the host has it
/// switched off.
pub fn scan_enabled<IO, S, const D: usize, const K: usize>(
    scanner: &mut Scanner<'_, D, K>,
    channels: &ChannelMap<D>,
    host: &HostState,
    io: &mut IO,
    sink: &mut S,
) -> usize
where
    IO: LineIo + ?Sized,
    S: EventSink + ?Sized,
{
    if host.pedal_enabled() {
        return scanner.scan_all(io, sink);
    }
    let mut emitted = 0;
    for i in 0..scanner.len() {
        let id = DeviceId(i as u8);
        if channels.division(id) != Some(Division::Pedal) {
            emitted += scanner.scan(id, io, sink);
        }
    }
    emitted
}
