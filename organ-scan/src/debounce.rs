//! Per-key debounce logic.
//!
//! Each key has a counter that is loaded with the debounce count on the first
//! closed sample and then counts down one step per open sample. A key is
//! reported pressed immediately and released only after `count` consecutive
//! open samples, which absorbs contact bounce in both directions.

/// Number of open scans required before a release is reported.
/// At the 4ms scan period this gives ~12ms of release hysteresis.
pub const DEBOUNCE_COUNT: u8 = 3;

/// Edge reported by a [`DebounceCell`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Pressed,
    Released,
}

impl Transition {
    pub fn is_pressed(self) -> bool {
        self == Transition::Pressed
    }
}

/// Hysteresis counter for one logical key.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DebounceCell {
    counter: u8,
}

impl DebounceCell {
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Feed one raw sample (`true` = switch closed). Returns the edge, if
    /// this sample produced one.
    pub fn sample(&mut self, raw_closed: bool) -> Option<Transition> {
        self.sample_with_count(raw_closed, DEBOUNCE_COUNT)
    }

    /// [`sample`](Self::sample) for a device configured with its own
    /// debounce count. The count lives in the device config rather than in
    /// every cell.
    pub fn sample_with_count(&mut self, raw_closed: bool, count: u8) -> Option<Transition> {
        match (raw_closed, self.counter) {
            (true, 0) => {
                self.counter = count;
                Some(Transition::Pressed)
            }
            // Already pressed; a close while counting down does not reload.
            (true, _) => None,
            (false, 0) => None,
            (false, 1) => {
                self.counter = 0;
                Some(Transition::Released)
            }
            (false, _) => {
                self.counter -= 1;
                None
            }
        }
    }

    /// Whether the key is currently considered down.
    pub fn is_pressed(&self) -> bool {
        self.counter > 0
    }

    pub fn counter(&self) -> u8 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(cell: &mut DebounceCell, samples: &[bool], count: u8) -> std::vec::Vec<Transition> {
        samples
            .iter()
            .filter_map(|&raw| cell.sample_with_count(raw, count))
            .collect()
    }

    #[test]
    fn test_press_is_immediate() {
        let mut cell = DebounceCell::new();
        assert_eq!(cell.sample(true), Some(Transition::Pressed));
        assert_eq!(cell.counter(), DEBOUNCE_COUNT);
        assert!(cell.is_pressed());
    }

    #[test]
    fn test_release_after_count_open_samples() {
        let mut cell = DebounceCell::new();
        cell.sample(true);
        assert_eq!(cell.sample(false), None);
        assert_eq!(cell.sample(false), None);
        assert_eq!(cell.sample(false), Some(Transition::Released));
        assert_eq!(cell.counter(), 0);
        assert_eq!(cell.sample(false), None);
    }

    #[test]
    fn test_single_bounce_is_absorbed() {
        let mut cell = DebounceCell::new();
        assert_eq!(cell.sample_with_count(true, 3), Some(Transition::Pressed));
        assert_eq!(run(&mut cell, &[false, true], 3), vec![]);
        assert!(cell.is_pressed());
    }

    #[test]
    fn test_close_during_countdown_does_not_reload() {
        let mut cell = DebounceCell::new();
        cell.sample_with_count(true, 3);
        cell.sample_with_count(false, 3);
        cell.sample_with_count(true, 3);
        assert_eq!(cell.counter(), 2);
        assert_eq!(run(&mut cell, &[false, false], 3), vec![Transition::Released]);
    }

    #[test]
    fn test_default_count_matches_explicit_count() {
        let samples = [true, false, true, false, false, false, true, false];
        let mut implicit = DebounceCell::new();
        let mut explicit = DebounceCell::new();
        for raw in samples {
            assert_eq!(
                implicit.sample(raw),
                explicit.sample_with_count(raw, DEBOUNCE_COUNT)
            );
            assert_eq!(implicit, explicit);
        }
    }

    #[test]
    fn test_count_of_one_releases_on_first_open() {
        let mut cell = DebounceCell::new();
        assert_eq!(
            run(&mut cell, &[true, true, false], 1),
            vec![Transition::Pressed, Transition::Released]
        );
    }

    proptest! {
        #[test]
        fn test_hold_then_release_emits_one_edge_each(k in 1usize..64, count in 1u8..8) {
            let mut cell = DebounceCell::new();
            let mut samples = std::vec![true; k];
            samples.extend(std::iter::repeat(false).take(count as usize));
            prop_assert_eq!(
                run(&mut cell, &samples, count),
                std::vec![Transition::Pressed, Transition::Released]
            );
        }

        #[test]
        fn test_bounce_between_closes_is_silent(
            before in 1usize..16,
            after in 1usize..16,
            count in 2u8..8,
        ) {
            let mut cell = DebounceCell::new();
            cell.sample_with_count(true, count);
            let mut samples = std::vec![true; before];
            samples.push(false);
            samples.extend(std::iter::repeat(true).take(after));
            prop_assert!(run(&mut cell, &samples, count).is_empty());
        }

        #[test]
        fn test_presses_and_releases_alternate(
            samples in proptest::collection::vec(any::<bool>(), 0..200),
            count in 1u8..6,
        ) {
            let mut cell = DebounceCell::new();
            let edges = run(&mut cell, &samples, count);
            for pair in edges.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
            if let Some(first) = edges.first() {
                prop_assert_eq!(*first, Transition::Pressed);
            }
        }
    }
}
