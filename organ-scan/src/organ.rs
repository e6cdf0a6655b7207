//! Reference console: an Allen MDC 20 organ rewired to an Arduino Mega.
//!
//! Two 61-note manuals (Great, Swell) share their eleven sense lines, the
//! 32-note pedalboard has its own seven, and the piston bank is split into a
//! direct-wired row, a 3×4 matrix and three auxiliary buttons. Each division
//! is a fixed MIDI channel.
//!
//! The manual keys are numbered from the lowest note: the bottom key is the
//! only switch on sense 0 and sits on the last strobe, so the manuals use
//! offset -5 with [`bottom_key_mask`].

use core::fmt;

use crate::keymap::{bottom_key_mask, LogicalKey, SenseMask};
use crate::line::LineId;
use crate::panel::{Panel, LAMP_COUNT};
use crate::piston::TransposeGesture;
use crate::registry::{ConfigError, DeviceConfig, DeviceId, DeviceRegistry};
use crate::scanner::{EdgeEvent, EventSink};

/// Number of devices on the reference console.
pub const DEVICES: usize = 6;
/// Debounce cells per device.
pub const KEYS: usize = 70;

/// Top-level scan period of the control loop.
pub const SCAN_PERIOD_MS: u32 = 4;

pub type ConsoleRegistry = DeviceRegistry<'static, DEVICES, KEYS>;

/// Division of the console, one MIDI channel each.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Division {
    Pedal,
    Great,
    Swell,
    Pistons,
}

impl Division {
    pub const ALL: [Division; 4] = [
        Division::Pedal,
        Division::Great,
        Division::Swell,
        Division::Pistons,
    ];

    /// MIDI channel (1-based) the host expects this division on.
    pub const fn channel(self) -> u8 {
        match self {
            Division::Pedal => 1,
            Division::Great => 2,
            Division::Swell => 3,
            Division::Pistons => 5,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Division::Pedal => "pedal",
            Division::Great => "great",
            Division::Swell => "swell",
            Division::Pistons => "pistons",
        }
    }

    pub fn from_name(name: &str) -> Option<Division> {
        Self::ALL.into_iter().find(|d| d.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Note-level consumer of key events, e.g. a MIDI output.
pub trait NoteSink {
    fn on_key_event(&mut self, channel: u8, key: LogicalKey, pressed: bool);

    /// Continuous controller, sent for the expression pedal.
    fn on_control_change(&mut self, _channel: u8, _control: u8, _value: u8) {}
}

/// Division of every registered device, indexed by [`DeviceId`].
#[derive(Copy, Clone, Debug)]
pub struct ChannelMap<const D: usize> {
    divisions: [Option<Division>; D],
}

impl<const D: usize> ChannelMap<D> {
    pub const fn new() -> Self {
        Self { divisions: [None; D] }
    }

    pub fn assign(&mut self, id: DeviceId, division: Division) {
        if let Some(slot) = self.divisions.get_mut(id.index()) {
            *slot = Some(division);
        }
    }

    pub fn division(&self, id: DeviceId) -> Option<Division> {
        self.divisions.get(id.index()).copied().flatten()
    }

    pub fn channel(&self, id: DeviceId) -> Option<u8> {
        self.division(id).map(Division::channel)
    }
}

impl<const D: usize> Default for ChannelMap<D> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts device edge events to channel-tagged note events.
/// Events from devices without a division are dropped.
pub struct ChannelSink<'m, N: ?Sized, const D: usize> {
    map: &'m ChannelMap<D>,
    notes: &'m mut N,
}

impl<'m, N: NoteSink + ?Sized, const D: usize> ChannelSink<'m, N, D> {
    pub fn new(map: &'m ChannelMap<D>, notes: &'m mut N) -> Self {
        Self { map, notes }
    }
}

impl<N: NoteSink + ?Sized, const D: usize> EventSink for ChannelSink<'_, N, D> {
    fn on_edge(&mut self, event: EdgeEvent) {
        if let Some(channel) = self.map.channel(event.device) {
            self.notes.on_key_event(channel, event.key, event.is_pressed());
        }
    }
}

/// One device of the reference wiring.
#[derive(Copy, Clone, Debug)]
pub struct WiredDevice {
    pub name: &'static str,
    pub division: Division,
    pub config: DeviceConfig<'static>,
}

const fn lines<const N: usize>(first: u8) -> [LineId; N] {
    let mut out = [LineId(0); N];
    let mut i = 0;
    while i < N {
        out[i] = LineId(first + i as u8);
        i += 1;
    }
    out
}

const SWELL_OUT: [LineId; 6] = lines(22);
const GREAT_OUT: [LineId; 6] = lines(28);
const PEDAL_OUT: [LineId; 6] = lines(14);
const MANUAL_IN: [LineId; 11] = lines(36);
const PEDAL_IN: [LineId; 7] = lines(47);
const MANUAL_MASK: [u16; 6] = bottom_key_mask(11);
const PEDAL_MASK: [u16; 6] = bottom_key_mask(7);

// D0/D1 carry the MIDI shield's UART, so pistons 0 and 1 sit on A12/A13.
const PISTON_DIRECT: [LineId; 6] = [
    LineId(66),
    LineId(67),
    LineId(2),
    LineId(3),
    LineId(4),
    LineId(5),
];
const PISTON_OUT: [LineId; 3] = lines(59);
const PISTON_IN: [LineId; 4] = lines(62);
const PISTON_AUX: [LineId; 3] = lines(56);

/// Transpose-up button line.
pub const TRANSPOSE_UP: LineId = LineId(6);
/// Transpose-down button line.
pub const TRANSPOSE_DOWN: LineId = LineId(7);
/// On-board LED (D13): lit while scanning, blinking after a wiring error.
pub const STATUS_LED: LineId = LineId(13);
/// Lamp lit while the host reports a positive transpose.
pub const TRANSPOSE_UP_LAMP: LineId = LineId(8);
/// Lamp lit while the host reports a negative transpose.
pub const TRANSPOSE_DOWN_LAMP: LineId = LineId(9);
/// Lamps mirroring host notes 20, 21 and 22.
pub const HOST_LAMPS: [LineId; LAMP_COUNT] = [LineId(10), LineId(11), LineId(12)];
/// Expression pedal wiper, analog input A1.
pub const EXPRESSION_INPUT: LineId = LineId(55);

/// Lines used outside the scanned devices, apart from the transpose
/// buttons.
pub const PANEL_LINES: [LineId; 7] = [
    STATUS_LED,
    TRANSPOSE_UP_LAMP,
    TRANSPOSE_DOWN_LAMP,
    HOST_LAMPS[0],
    HOST_LAMPS[1],
    HOST_LAMPS[2],
    EXPRESSION_INPUT,
];

/// Every line of the reference console that no device may use.
pub const RESERVED_LINES: [LineId; 9] = [
    TRANSPOSE_UP,
    TRANSPOSE_DOWN,
    STATUS_LED,
    TRANSPOSE_UP_LAMP,
    TRANSPOSE_DOWN_LAMP,
    HOST_LAMPS[0],
    HOST_LAMPS[1],
    HOST_LAMPS[2],
    EXPRESSION_INPUT,
];

/// Wiring of the reference console, in registration order.
pub static REFERENCE_WIRING: [WiredDevice; DEVICES] = [
    WiredDevice {
        name: "pedal",
        division: Division::Pedal,
        config: DeviceConfig::matrix(&PEDAL_OUT, &PEDAL_IN, -5, 6)
            .with_mask(SenseMask::PerStrobe(&PEDAL_MASK)),
    },
    WiredDevice {
        name: "great",
        division: Division::Great,
        config: DeviceConfig::matrix(&GREAT_OUT, &MANUAL_IN, -5, 6)
            .with_mask(SenseMask::PerStrobe(&MANUAL_MASK)),
    },
    WiredDevice {
        name: "swell",
        division: Division::Swell,
        config: DeviceConfig::matrix(&SWELL_OUT, &MANUAL_IN, -5, 6)
            .with_mask(SenseMask::PerStrobe(&MANUAL_MASK)),
    },
    WiredDevice {
        name: "pistons",
        division: Division::Pistons,
        config: DeviceConfig::direct(&PISTON_DIRECT, 0),
    },
    WiredDevice {
        name: "piston-matrix",
        division: Division::Pistons,
        config: DeviceConfig::matrix(&PISTON_OUT, &PISTON_IN, 6, 1).with_strobe_step(4),
    },
    WiredDevice {
        name: "piston-aux",
        division: Division::Pistons,
        config: DeviceConfig::direct(&PISTON_AUX, 56),
    },
];

/// Register every device of `wiring` and record its division.
pub fn register<'a, const D: usize, const K: usize>(
    registry: &mut DeviceRegistry<'a, D, K>,
    channels: &mut ChannelMap<D>,
    wiring: &[WiredDevice],
) -> Result<(), ConfigError> {
    for device in wiring {
        let id = registry.register_device(device.config)?;
        channels.assign(id, device.division);
    }
    Ok(())
}

/// Check that no device of `wiring` uses one of the `reserved` lines.
pub fn check_free_lines(wiring: &[WiredDevice], reserved: &[LineId]) -> Result<(), ConfigError> {
    for (i, device) in wiring.iter().enumerate() {
        let config = &device.config;
        let mut lines = config.strobes.iter().chain(config.senses);
        if let Some(&line) = lines.find(|line| reserved.contains(line)) {
            return Err(ConfigError::ReservedLine {
                line,
                device: DeviceId(i as u8),
            });
        }
    }
    Ok(())
}

/// Transpose gesture of the reference console, reporting on the direct
/// piston row (device 3).
pub fn transpose_gesture() -> TransposeGesture {
    TransposeGesture::new(DeviceId(3), TRANSPOSE_UP, TRANSPOSE_DOWN)
}

/// Panel lamps of the reference console.
pub fn panel() -> Panel {
    Panel {
        up_lamp: TRANSPOSE_UP_LAMP,
        down_lamp: TRANSPOSE_DOWN_LAMP,
        host_lamps: HOST_LAMPS,
    }
}
