//! Device registration and setup-time validation.
//!
//! Every device is described once by a [`DeviceConfig`] and checked before it
//! is accepted; [`DeviceRegistry::begin`] then checks the devices against each
//! other, configures the lines and hands the devices over to a [`Scanner`].
//! A mis-wired console therefore never gets as far as its first scan.

use core::fmt;

use log::{debug, info, warn};

use crate::debounce::{DebounceCell, DEBOUNCE_COUNT};
use crate::keymap::{KeyMap, LogicalKey, SenseMask, MAX_LINES};
use crate::line::{Level, LineId, LineIo};
use crate::scanner::Scanner;

/// Settle time after driving a strobe on the reference hardware.
pub const DEFAULT_SETTLE_US: u16 = 17;

/// Handle returned by [`DeviceRegistry::register_device`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub(crate) u8);

impl DeviceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Wiring problems detected at setup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("device registry is full ({capacity} devices)")]
    RegistryFull { capacity: usize },
    #[error("device has no sense lines")]
    NoSenseLines,
    #[error("{count} {kind} lines exceed the limit of {max}", max = MAX_LINES)]
    TooManyLines { kind: &'static str, count: usize },
    #[error("sense mask has {mask} entries for {passes} strobe passes")]
    MaskLength { mask: usize, passes: usize },
    #[error("line {line} is listed twice")]
    DuplicateLine { line: LineId },
    #[error("line {line} is used as both strobe and sense")]
    LineDirectionConflict { line: LineId },
    #[error("line {line} is a strobe of device {strobe_of} and a sense line of device {sense_of}")]
    SharedLineConflict {
        line: LineId,
        strobe_of: DeviceId,
        sense_of: DeviceId,
    },
    #[error("strobe {strobe}, sense {sense} maps to key {key}, outside 0..{capacity}")]
    KeyOutOfRange {
        strobe: usize,
        sense: usize,
        key: i32,
        capacity: usize,
    },
    #[error("strobe {strobe}, sense {sense} maps to key {key}, which is already taken")]
    KeyCollision {
        strobe: usize,
        sense: usize,
        key: LogicalKey,
    },
    #[error("debounce count must be at least 1")]
    ZeroDebounce,
    #[error("line {line} of device {device} is reserved for the console panel")]
    ReservedLine { line: LineId, device: DeviceId },
}

/// Wiring of one switch matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig<'a> {
    /// Output lines, driven active one at a time. Empty for a bank of
    /// switches wired directly to ground.
    pub strobes: &'a [LineId],
    /// Input lines read while a strobe is active.
    pub senses: &'a [LineId],
    pub keymap: KeyMap,
    pub mask: SenseMask<'a>,
    pub settle_us: u16,
    pub debounce: u8,
}

impl<'a> DeviceConfig<'a> {
    /// Strobed matrix numbered `offset + strobe + sense * stride`.
    pub const fn matrix(
        strobes: &'a [LineId],
        senses: &'a [LineId],
        offset: i16,
        stride: u8,
    ) -> Self {
        Self {
            strobes,
            senses,
            keymap: KeyMap::new(offset, stride),
            mask: SenseMask::Full,
            settle_us: DEFAULT_SETTLE_US,
            debounce: DEBOUNCE_COUNT,
        }
    }

    /// Switches wired straight to ground, numbered `offset + sense`.
    pub const fn direct(senses: &'a [LineId], offset: i16) -> Self {
        Self {
            strobes: &[],
            senses,
            keymap: KeyMap::new(offset, 1),
            mask: SenseMask::Full,
            settle_us: 0,
            debounce: DEBOUNCE_COUNT,
        }
    }

    pub const fn with_mask(self, mask: SenseMask<'a>) -> Self {
        Self { mask, ..self }
    }

    pub const fn with_strobe_step(self, strobe_step: u8) -> Self {
        Self {
            keymap: self.keymap.with_strobe_step(strobe_step),
            ..self
        }
    }

    pub const fn with_settle_us(self, settle_us: u16) -> Self {
        Self { settle_us, ..self }
    }

    pub const fn with_debounce(self, debounce: u8) -> Self {
        Self { debounce, ..self }
    }

    /// Strobe passes per scan; a direct bank is read in a single pass.
    pub fn passes(&self) -> usize {
        self.strobes.len().max(1)
    }

    /// Wired (strobe, sense) cells in scan order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.passes()).flat_map(move |s| {
            (0..self.senses.len())
                .filter(move |&j| self.mask.is_valid(s, j))
                .map(move |j| (s, j))
        })
    }

    /// Check this device on its own against a key space of `capacity` keys.
    pub fn validate(&self, capacity: usize) -> Result<(), ConfigError> {
        let capacity = capacity.min(LogicalKey::MAX as usize + 1);
        if self.senses.is_empty() {
            return Err(ConfigError::NoSenseLines);
        }
        if self.strobes.len() > MAX_LINES {
            return Err(ConfigError::TooManyLines {
                kind: "strobe",
                count: self.strobes.len(),
            });
        }
        if self.senses.len() > MAX_LINES {
            return Err(ConfigError::TooManyLines {
                kind: "sense",
                count: self.senses.len(),
            });
        }
        if let Some(mask) = self.mask.len() {
            if mask != self.passes() {
                return Err(ConfigError::MaskLength {
                    mask,
                    passes: self.passes(),
                });
            }
        }
        if self.debounce == 0 {
            return Err(ConfigError::ZeroDebounce);
        }

        for (i, line) in self.strobes.iter().enumerate() {
            if self.strobes[..i].contains(line) {
                return Err(ConfigError::DuplicateLine { line: *line });
            }
            if self.senses.contains(line) {
                return Err(ConfigError::LineDirectionConflict { line: *line });
            }
        }
        for (i, line) in self.senses.iter().enumerate() {
            if self.senses[..i].contains(line) {
                return Err(ConfigError::DuplicateLine { line: *line });
            }
        }

        // One bit per logical key; LogicalKey is a u8 so 256 bits cover it.
        let mut taken = [0u32; 8];
        for (strobe, sense) in self.cells() {
            let key = self.keymap.key(strobe, sense);
            if key < 0 || key as usize >= capacity {
                return Err(ConfigError::KeyOutOfRange {
                    strobe,
                    sense,
                    key,
                    capacity,
                });
            }
            let (word, bit) = (key as usize / 32, key as usize % 32);
            if taken[word] & (1 << bit) != 0 {
                return Err(ConfigError::KeyCollision {
                    strobe,
                    sense,
                    key: key as LogicalKey,
                });
            }
            taken[word] |= 1 << bit;
        }

        Ok(())
    }
}

/// One registered matrix: immutable wiring plus its own debounce cells.
#[derive(Copy, Clone, Debug)]
pub struct Device<'a, const KEYS: usize> {
    pub(crate) config: DeviceConfig<'a>,
    pub(crate) cells: [DebounceCell; KEYS],
}

impl<'a, const KEYS: usize> Device<'a, KEYS> {
    pub fn config(&self) -> &DeviceConfig<'a> {
        &self.config
    }

    pub fn cells(&self) -> &[DebounceCell; KEYS] {
        &self.cells
    }
}

/// Setup-time collection of up to `DEVICES` devices, each with a key space
/// of `KEYS` debounce cells.
pub struct DeviceRegistry<'a, const DEVICES: usize, const KEYS: usize> {
    devices: [Option<Device<'a, KEYS>>; DEVICES],
    len: usize,
    /// First rejected registration; `begin` refuses to start after one.
    error: Option<ConfigError>,
}

impl<'a, const DEVICES: usize, const KEYS: usize> DeviceRegistry<'a, DEVICES, KEYS> {
    const KEY_SPACE_FITS: () = assert!(KEYS <= 256, "logical keys are u8");

    pub fn new() -> Self {
        let () = Self::KEY_SPACE_FITS;
        Self {
            devices: [None; DEVICES],
            len: 0,
            error: None,
        }
    }

    /// Validate `config` and take ownership of a fresh cell array for it.
    /// A rejected device also makes the later [`begin`](Self::begin) fail.
    pub fn register_device(&mut self, config: DeviceConfig<'a>) -> Result<DeviceId, ConfigError> {
        if self.len == DEVICES {
            warn!("rejecting device: registry holds {} devices already", DEVICES);
            return Err(self.reject(ConfigError::RegistryFull { capacity: DEVICES }));
        }
        if let Err(err) = config.validate(KEYS) {
            warn!("rejecting device {}: {}", self.len, err);
            return Err(self.reject(err));
        }

        let id = DeviceId(self.len as u8);
        self.devices[self.len] = Some(Device {
            config,
            cells: [DebounceCell::new(); KEYS],
        });
        self.len += 1;
        debug!(
            "registered device {}: {} strobes x {} senses, offset {}, stride {}",
            id,
            config.strobes.len(),
            config.senses.len(),
            config.keymap.offset,
            config.keymap.stride
        );
        Ok(id)
    }

    fn reject(&mut self, err: ConfigError) -> ConfigError {
        self.error.get_or_insert(err);
        err
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First registration error, if any device was rejected.
    pub fn error(&self) -> Option<ConfigError> {
        self.error
    }

    pub fn config(&self, id: DeviceId) -> Option<&DeviceConfig<'a>> {
        self.devices.get(id.index())?.as_ref().map(Device::config)
    }

    /// Check the devices against each other, configure every line and start
    /// scanning. Strobes become outputs driven inactive; sense lines become
    /// inputs with pull-up. Devices may share sense lines but a line can
    /// never be a strobe of one device and a sense line of another.
    pub fn begin<IO: LineIo + ?Sized>(
        self,
        io: &mut IO,
    ) -> Result<Scanner<'a, DEVICES, KEYS>, ConfigError> {
        if let Some(err) = self.error {
            warn!("begin aborted: a device was rejected: {}", err);
            return Err(err);
        }

        let registered = &self.devices[..self.len];
        for (a, strobe_dev) in registered.iter().flatten().enumerate() {
            for (b, sense_dev) in registered.iter().flatten().enumerate() {
                if let Some(line) = strobe_dev
                    .config
                    .strobes
                    .iter()
                    .find(|line| sense_dev.config.senses.contains(line))
                {
                    let err = ConfigError::SharedLineConflict {
                        line: *line,
                        strobe_of: DeviceId(a as u8),
                        sense_of: DeviceId(b as u8),
                    };
                    warn!("begin aborted: {}", err);
                    return Err(err);
                }
            }
        }

        for device in registered.iter().flatten() {
            for &line in device.config.strobes {
                io.configure_output(line);
                io.drive(line, Level::INACTIVE);
            }
            for &line in device.config.senses {
                io.configure_input_pullup(line);
            }
        }

        info!("scanning {} devices", self.len);
        Ok(Scanner::from_devices(self.devices, self.len))
    }
}

impl<const DEVICES: usize, const KEYS: usize> Default for DeviceRegistry<'_, DEVICES, KEYS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::bottom_key_mask;
    use crate::sim::SimulatedLines;

    const STROBES: [LineId; 6] = [
        LineId(28),
        LineId(29),
        LineId(30),
        LineId(31),
        LineId(32),
        LineId(33),
    ];
    const SENSES: [LineId; 11] = [
        LineId(36),
        LineId(37),
        LineId(38),
        LineId(39),
        LineId(40),
        LineId(41),
        LineId(42),
        LineId(43),
        LineId(44),
        LineId(45),
        LineId(46),
    ];
    static MASK: [u16; 6] = bottom_key_mask(11);

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = DeviceRegistry::<2, 70>::new();
        let a = registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)).unwrap();
        let b = registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_full() {
        let mut registry = DeviceRegistry::<1, 70>::new();
        registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)).unwrap();
        assert_eq!(
            registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)),
            Err(ConfigError::RegistryFull { capacity: 1 })
        );
    }

    #[test]
    fn test_key_overflow_is_rejected() {
        let mut registry = DeviceRegistry::<1, 64>::new();
        // Cells run up to 0 + 5 + 10 * 6 = 65; 4 + 10 * 6 is the first to spill.
        assert_eq!(
            registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)),
            Err(ConfigError::KeyOutOfRange {
                strobe: 4,
                sense: 10,
                key: 64,
                capacity: 64
            })
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_negative_key_needs_mask() {
        let mut registry = DeviceRegistry::<2, 70>::new();
        assert!(matches!(
            registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, -5, 6)),
            Err(ConfigError::KeyOutOfRange { strobe: 0, sense: 0, key: -5, .. })
        ));
        let masked =
            DeviceConfig::matrix(&STROBES, &SENSES, -5, 6).with_mask(SenseMask::PerStrobe(&MASK));
        assert!(registry.register_device(masked).is_ok());
    }

    #[test]
    fn test_overlapping_stride_is_rejected() {
        let mut registry = DeviceRegistry::<1, 70>::new();
        assert_eq!(
            registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 5)),
            Err(ConfigError::KeyCollision {
                strobe: 5,
                sense: 0,
                key: 5
            })
        );
    }

    #[test]
    fn test_mask_length_must_match_strobes() {
        let mut registry = DeviceRegistry::<1, 70>::new();
        let short = [0x7FF; 5];
        let config =
            DeviceConfig::matrix(&STROBES, &SENSES, 0, 6).with_mask(SenseMask::PerStrobe(&short));
        assert_eq!(
            registry.register_device(config),
            Err(ConfigError::MaskLength { mask: 5, passes: 6 })
        );
    }

    #[test]
    fn test_line_errors() {
        let mut registry = DeviceRegistry::<1, 70>::new();
        assert_eq!(
            registry.register_device(DeviceConfig::matrix(&STROBES, &[], 0, 6)),
            Err(ConfigError::NoSenseLines)
        );
        let crossed = DeviceConfig::matrix(&STROBES, &[LineId(36), LineId(29)], 0, 6);
        assert_eq!(
            registry.register_device(crossed),
            Err(ConfigError::LineDirectionConflict { line: LineId(29) })
        );
        let doubled = DeviceConfig::matrix(&STROBES, &[LineId(36), LineId(36)], 0, 6);
        assert_eq!(
            registry.register_device(doubled),
            Err(ConfigError::DuplicateLine { line: LineId(36) })
        );
        let many = [LineId(0); 17];
        assert_eq!(
            registry.register_device(DeviceConfig::direct(&many, 0)),
            Err(ConfigError::TooManyLines { kind: "sense", count: 17 })
        );
        assert_eq!(
            registry.register_device(DeviceConfig::direct(&SENSES, 0).with_debounce(0)),
            Err(ConfigError::ZeroDebounce)
        );
    }

    #[test]
    fn test_begin_configures_lines() {
        let mut registry = DeviceRegistry::<2, 70>::new();
        registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)).unwrap();
        registry.register_device(DeviceConfig::direct(&[LineId(2), LineId(3)], 0)).unwrap();

        let mut io = SimulatedLines::new();
        registry.begin(&mut io).unwrap();

        for line in STROBES {
            assert!(io.is_output(line));
            assert_eq!(io.level(line), Some(Level::High));
        }
        for line in SENSES.iter().chain(&[LineId(2), LineId(3)]) {
            assert!(io.is_pullup(*line));
        }
    }

    #[test]
    fn test_begin_rejects_strobe_used_as_sense_elsewhere() {
        let mut registry = DeviceRegistry::<2, 70>::new();
        registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)).unwrap();
        registry.register_device(DeviceConfig::direct(&[LineId(2), LineId(30)], 0)).unwrap();

        let mut io = SimulatedLines::new();
        let err = registry.begin(&mut io).err();
        assert_eq!(
            err,
            Some(ConfigError::SharedLineConflict {
                line: LineId(30),
                strobe_of: DeviceId(0),
                sense_of: DeviceId(1),
            })
        );
        assert!(!io.is_output(LineId(28)));
    }

    #[test]
    fn test_shared_sense_lines_are_allowed() {
        let swell = [LineId(22), LineId(23), LineId(24), LineId(25), LineId(26), LineId(27)];
        let mut registry = DeviceRegistry::<2, 70>::new();
        registry.register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6)).unwrap();
        registry.register_device(DeviceConfig::matrix(&swell, &SENSES, 0, 6)).unwrap();
        assert!(registry.begin(&mut SimulatedLines::new()).is_ok());
    }

    #[test]
    fn test_begin_fails_after_rejected_registration() {
        let strobes = [LineId(2), LineId(3)];
        let senses = [LineId(4), LineId(5)];
        let mut registry = DeviceRegistry::<2, 8>::new();
        registry
            .register_device(DeviceConfig::matrix(&strobes, &senses, 0, 2))
            .unwrap();
        let rejected = registry
            .register_device(DeviceConfig::matrix(&strobes, &senses, 7, 2))
            .unwrap_err();
        assert_eq!(
            rejected,
            ConfigError::KeyOutOfRange {
                strobe: 0,
                sense: 1,
                key: 9,
                capacity: 8
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.error(), Some(rejected));

        let mut io = SimulatedLines::new();
        assert_eq!(registry.begin(&mut io).err(), Some(rejected));
        // Nothing was configured.
        assert!(!io.is_output(LineId(2)));
        assert!(!io.is_pullup(LineId(4)));
    }

    #[test]
    fn test_begin_reports_first_rejection() {
        let mut registry = DeviceRegistry::<1, 70>::new();
        registry
            .register_device(DeviceConfig::direct(&SENSES, 0).with_debounce(0))
            .unwrap_err();
        registry
            .register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6))
            .unwrap();
        registry
            .register_device(DeviceConfig::matrix(&STROBES, &SENSES, 0, 6))
            .unwrap_err();
        assert_eq!(
            registry.begin(&mut SimulatedLines::new()).err(),
            Some(ConfigError::ZeroDebounce)
        );
    }
}
