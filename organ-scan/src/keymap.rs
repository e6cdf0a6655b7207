//! Mapping from matrix wiring positions to logical key numbers.
//!
//! Each strobe line selects one scan column (a fixed pitch class across all
//! bands) and each sense line covers a band of `stride` keys, so on the
//! manuals the key under (strobe `s`, sense `j`) is `offset + s + 6 * j`.

/// Maximum number of strobe or sense lines per device.
pub const MAX_LINES: usize = 16;

/// Logical key number within a device.
pub type LogicalKey = u8;

/// Logical key of (`strobe_index`, `sense_index`) for a device whose first
/// cell is `offset` and whose sense lines are `stride` keys apart.
pub fn key(offset: i16, stride: u8, strobe_index: usize, sense_index: usize) -> i32 {
    KeyMap::new(offset, stride).key(strobe_index, sense_index)
}

/// Offset/stride numbering scheme of one device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyMap {
    /// Logical key of sense 0 at strobe 0. May be negative when that cell is
    /// masked out.
    pub offset: i16,
    /// Logical distance between successive sense lines.
    pub stride: u8,
    /// Logical distance between successive strobe lines (1 on the manuals).
    pub strobe_step: u8,
}

impl KeyMap {
    pub const fn new(offset: i16, stride: u8) -> Self {
        Self {
            offset,
            stride,
            strobe_step: 1,
        }
    }

    pub const fn with_strobe_step(self, strobe_step: u8) -> Self {
        Self {
            strobe_step,
            ..self
        }
    }

    /// Unchecked key number; the registry validates the range once at setup.
    pub fn key(&self, strobe_index: usize, sense_index: usize) -> i32 {
        self.offset as i32
            + strobe_index as i32 * self.strobe_step as i32
            + sense_index as i32 * self.stride as i32
    }
}

/// Which (strobe, sense) cells of a device carry a switch.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SenseMask<'a> {
    /// Every sense line is wired on every strobe.
    Full,
    /// Bit `j` of entry `s` is set when sense `j` is wired on strobe `s`.
    /// Needs one entry per strobe (one entry for direct-wired banks).
    PerStrobe(&'a [u16]),
}

impl SenseMask<'_> {
    pub fn is_valid(&self, strobe_index: usize, sense_index: usize) -> bool {
        match self {
            SenseMask::Full => true,
            SenseMask::PerStrobe(rows) => rows
                .get(strobe_index)
                .is_some_and(|bits| sense_index < MAX_LINES && bits & (1 << sense_index) != 0),
        }
    }

    /// Number of per-strobe entries, if the mask is explicit.
    pub fn len(&self) -> Option<usize> {
        match self {
            SenseMask::Full => None,
            SenseMask::PerStrobe(rows) => Some(rows.len()),
        }
    }
}

/// Bits for the first `senses` sense lines.
pub const fn all_senses(senses: usize) -> u16 {
    if senses >= MAX_LINES {
        u16::MAX
    } else {
        ((1u32 << senses) - 1) as u16
    }
}

/// Mask of a manual whose lowest key sits alone on sense 0 of the last
/// strobe; sense 0 is unwired on every other strobe.
pub const fn bottom_key_mask<const STROBES: usize>(senses: usize) -> [u16; STROBES] {
    let full = all_senses(senses);
    let mut mask = [full & !1; STROBES];
    if STROBES > 0 {
        mask[STROBES - 1] = full;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_manual_layout() {
        assert_eq!(key(0, 6, 0, 0), 0);
        assert_eq!(key(0, 6, 0, 1), 6);
        assert_eq!(key(0, 6, 5, 10), 65);
        assert_eq!(key(36, 6, 2, 3), 56);
    }

    #[test]
    fn test_piston_layout() {
        let map = KeyMap::new(6, 1).with_strobe_step(4);
        assert_eq!(map.key(0, 0), 6);
        assert_eq!(map.key(0, 3), 9);
        assert_eq!(map.key(1, 0), 10);
        assert_eq!(map.key(2, 3), 17);
    }

    #[test]
    fn test_bottom_key_mask() {
        let mask: [u16; 6] = bottom_key_mask(11);
        assert_eq!(mask[0], 0b111_1111_1110);
        assert_eq!(mask[5], 0b111_1111_1111);

        let mask = SenseMask::PerStrobe(&mask);
        assert!(!mask.is_valid(0, 0));
        assert!(!mask.is_valid(4, 0));
        assert!(mask.is_valid(5, 0));
        assert!(mask.is_valid(0, 1));
        assert!(!mask.is_valid(0, 11));
        assert!(!mask.is_valid(6, 1));
    }

    #[test]
    fn test_bottom_key_numbering() {
        // With offset -5 the lone cell maps to key 0 and the first full band
        // starts at key 1.
        let map = KeyMap::new(-5, 6);
        assert_eq!(map.key(5, 0), 0);
        assert_eq!(map.key(0, 1), 1);
        assert_eq!(map.key(5, 10), 60);
    }

    #[test]
    fn test_all_senses() {
        assert_eq!(all_senses(0), 0);
        assert_eq!(all_senses(4), 0b1111);
        assert_eq!(all_senses(16), u16::MAX);
    }

    proptest! {
        #[test]
        fn test_key_map_is_injective(
            offset in -8i16..64,
            strobes in 1usize..=8,
            senses in 1usize..=MAX_LINES,
            extra in 0u8..4,
        ) {
            let map = KeyMap::new(offset, strobes as u8 + extra);
            let mut seen = std::collections::HashSet::new();
            for s in 0..strobes {
                for j in 0..senses {
                    prop_assert!(seen.insert(map.key(s, j)));
                }
            }
        }
    }
}
