//! Simulated switch matrix for host-side runs and tests.
//!
//! Switches are modelled as connections between a strobe line (or ground,
//! for direct-wired buttons) and a sense line. A sense line reads LOW while
//! any switch connects it to ground or to a strobe currently driven LOW.
//! Time does not pass: settle delays are only totalled.

use std::collections::{BTreeMap, BTreeSet};

use crate::line::{Level, LineId, LineIo};

#[derive(Debug, Default)]
pub struct SimulatedLines {
    outputs: BTreeMap<LineId, Level>,
    pullups: BTreeSet<LineId>,
    closed: BTreeSet<(Option<LineId>, LineId)>,
    reads: usize,
    settled_micros: u64,
    max_active_strobes: usize,
}

impl SimulatedLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close or open the switch between `strobe` (`None` = ground) and
    /// `sense`.
    pub fn set_switch(&mut self, strobe: Option<LineId>, sense: LineId, closed: bool) {
        if closed {
            self.closed.insert((strobe, sense));
        } else {
            self.closed.remove(&(strobe, sense));
        }
    }

    pub fn close(&mut self, strobe: Option<LineId>, sense: LineId) {
        self.set_switch(strobe, sense, true);
    }

    pub fn open(&mut self, strobe: Option<LineId>, sense: LineId) {
        self.set_switch(strobe, sense, false);
    }

    pub fn is_closed(&self, strobe: Option<LineId>, sense: LineId) -> bool {
        self.closed.contains(&(strobe, sense))
    }

    pub fn is_output(&self, line: LineId) -> bool {
        self.outputs.contains_key(&line)
    }

    pub fn is_pullup(&self, line: LineId) -> bool {
        self.pullups.contains(&line)
    }

    /// Level last driven on an output line.
    pub fn level(&self, line: LineId) -> Option<Level> {
        self.outputs.get(&line).copied()
    }

    /// Number of line reads so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Total settle time requested so far.
    pub fn settled_micros(&self) -> u64 {
        self.settled_micros
    }

    /// Largest number of outputs that were active at the same time.
    pub fn max_active_strobes(&self) -> usize {
        self.max_active_strobes
    }
}

impl LineIo for SimulatedLines {
    fn configure_output(&mut self, line: LineId) {
        self.pullups.remove(&line);
        self.outputs.entry(line).or_insert(Level::Low);
    }

    fn configure_input_pullup(&mut self, line: LineId) {
        self.outputs.remove(&line);
        self.pullups.insert(line);
    }

    fn drive(&mut self, line: LineId, level: Level) {
        if let Some(current) = self.outputs.get_mut(&line) {
            *current = level;
        }
        let active = self.outputs.values().filter(|l| l.is_active()).count();
        self.max_active_strobes = self.max_active_strobes.max(active);
    }

    fn read(&mut self, line: LineId) -> Level {
        self.reads += 1;
        let pulled_low = self.closed.iter().any(|&(strobe, sense)| {
            sense == line
                && match strobe {
                    None => true,
                    Some(strobe) => self.level(strobe).is_some_and(Level::is_active),
                }
        });
        if pulled_low {
            Level::Low
        } else {
            Level::High
        }
    }

    fn settle(&mut self, micros: u16) {
        self.settled_micros += u64::from(micros);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strobed_switch_reads_low_only_while_selected() {
        let mut io = SimulatedLines::new();
        io.configure_output(LineId(22));
        io.configure_input_pullup(LineId(36));
        io.drive(LineId(22), Level::High);
        io.close(Some(LineId(22)), LineId(36));

        assert_eq!(io.read(LineId(36)), Level::High);
        io.drive(LineId(22), Level::Low);
        assert_eq!(io.read(LineId(36)), Level::Low);
        io.open(Some(LineId(22)), LineId(36));
        assert_eq!(io.read(LineId(36)), Level::High);
        assert_eq!(io.reads(), 3);
    }

    #[test]
    fn test_grounded_switch() {
        let mut io = SimulatedLines::new();
        io.configure_input_pullup(LineId(6));
        assert_eq!(io.read(LineId(6)), Level::High);
        io.close(None, LineId(6));
        assert_eq!(io.read(LineId(6)), Level::Low);
    }

    #[test]
    fn test_tracks_overlapping_strobes() {
        let mut io = SimulatedLines::new();
        io.configure_output(LineId(22));
        io.configure_output(LineId(23));
        io.drive(LineId(22), Level::High);
        io.drive(LineId(23), Level::High);
        io.drive(LineId(22), Level::Low);
        assert_eq!(io.max_active_strobes(), 1);
        io.drive(LineId(23), Level::Low);
        assert_eq!(io.max_active_strobes(), 2);
    }
}
