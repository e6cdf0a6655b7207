//! Matrix scanning.
//!
//! One call to [`Scanner::scan`] walks a single device: each strobe line is
//! driven low on its own, the sense lines are read after the settle time and
//! every reading goes through the key's debounce cell. Only edges leave the
//! scanner, so a keyboard held in a steady state produces no events at all.
//!
//! Scan time is strobes × (settle + senses × read); ~100us for a manual.

use log::{trace, warn};

use crate::debounce::{DebounceCell, Transition};
use crate::keymap::LogicalKey;
use crate::line::{Level, LineIo};
use crate::registry::{Device, DeviceConfig, DeviceId};

/// A debounced key transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeEvent {
    pub device: DeviceId,
    pub key: LogicalKey,
    pub transition: Transition,
}

impl EdgeEvent {
    pub fn is_pressed(&self) -> bool {
        self.transition.is_pressed()
    }
}

/// Consumer of edge events. Any `FnMut(EdgeEvent)` closure is a sink.
pub trait EventSink {
    fn on_edge(&mut self, event: EdgeEvent);
}

impl<F: FnMut(EdgeEvent)> EventSink for F {
    fn on_edge(&mut self, event: EdgeEvent) {
        self(event)
    }
}

impl<const KEYS: usize> Device<'_, KEYS> {
    fn scan<IO, S>(&mut self, id: DeviceId, io: &mut IO, sink: &mut S) -> usize
    where
        IO: LineIo + ?Sized,
        S: EventSink + ?Sized,
    {
        let config = self.config;
        let mut emitted = 0;

        for s in 0..config.passes() {
            let strobe = config.strobes.get(s).copied();
            if let Some(line) = strobe {
                io.drive(line, Level::ACTIVE);
                io.settle(config.settle_us);
            }

            for (j, &sense) in config.senses.iter().enumerate() {
                if !config.mask.is_valid(s, j) {
                    continue;
                }
                let closed = io.read(sense).is_active();
                // In range: every wired cell was checked at registration.
                let key = config.keymap.key(s, j) as LogicalKey;
                let cell = &mut self.cells[key as usize];
                if let Some(transition) = cell.sample_with_count(closed, config.debounce) {
                    trace!("device {} key {} {:?}", id, key, transition);
                    sink.on_edge(EdgeEvent {
                        device: id,
                        key,
                        transition,
                    });
                    emitted += 1;
                }
            }

            // Release before the next strobe; overlapping strobes cross-talk.
            if let Some(line) = strobe {
                io.drive(line, Level::INACTIVE);
            }
        }

        emitted
    }
}

/// Running scan engine, obtained from
/// [`DeviceRegistry::begin`](crate::registry::DeviceRegistry::begin).
/// The device set is frozen once scanning starts.
pub struct Scanner<'a, const DEVICES: usize, const KEYS: usize> {
    devices: [Option<Device<'a, KEYS>>; DEVICES],
    len: usize,
}

impl<'a, const DEVICES: usize, const KEYS: usize> Scanner<'a, DEVICES, KEYS> {
    pub(crate) fn from_devices(devices: [Option<Device<'a, KEYS>>; DEVICES], len: usize) -> Self {
        Self { devices, len }
    }

    /// Scan one device and report its edges to `sink`. Returns the number of
    /// events emitted; an id from another registry yields none.
    pub fn scan<IO, S>(&mut self, id: DeviceId, io: &mut IO, sink: &mut S) -> usize
    where
        IO: LineIo + ?Sized,
        S: EventSink + ?Sized,
    {
        match self.devices.get_mut(id.index()).and_then(Option::as_mut) {
            Some(device) => device.scan(id, io, sink),
            None => {
                warn!("scan of unknown device {}", id);
                0
            }
        }
    }

    /// Scan every device once, in registration order.
    pub fn scan_all<IO, S>(&mut self, io: &mut IO, sink: &mut S) -> usize
    where
        IO: LineIo + ?Sized,
        S: EventSink + ?Sized,
    {
        let mut emitted = 0;
        for (i, device) in self.devices[..self.len].iter_mut().enumerate() {
            if let Some(device) = device {
                emitted += device.scan(DeviceId(i as u8), io, sink);
            }
        }
        emitted
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = DeviceId> {
        (0..self.len).map(|i| DeviceId(i as u8))
    }

    pub fn config(&self, id: DeviceId) -> Option<&DeviceConfig<'a>> {
        self.devices.get(id.index())?.as_ref().map(Device::config)
    }

    pub fn cells(&self, id: DeviceId) -> Option<&[DebounceCell; KEYS]> {
        self.devices.get(id.index())?.as_ref().map(Device::cells)
    }

    pub fn is_pressed(&self, id: DeviceId, key: LogicalKey) -> bool {
        self.cells(id)
            .and_then(|cells| cells.get(key as usize))
            .is_some_and(DebounceCell::is_pressed)
    }

    /// Keys of `id` currently considered down, in ascending order.
    pub fn pressed_keys(&self, id: DeviceId) -> impl Iterator<Item = LogicalKey> + '_ {
        self.cells(id)
            .into_iter()
            .flat_map(|cells| cells.iter().enumerate())
            .filter(|(_, cell)| cell.is_pressed())
            .map(|(key, _)| key as LogicalKey)
    }
}
