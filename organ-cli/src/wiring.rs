//! Console wiring read from a TOML file.
//!
//! ```toml
//! [[device]]
//! name = "great"
//! division = "great"
//! strobes = [28, 29, 30, 31, 32, 33]
//! senses = [36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46]
//! offset = -5
//! stride = 6
//! mask = "bottom-key"
//!
//! [transpose]
//! device = "pistons"
//! up = 6
//! down = 7
//! ```
//!
//! A device without `strobes` is a bank of buttons wired to ground. `mask` is
//! either `"bottom-key"` or one bit pattern per strobe. The panel lamps,
//! status LED and expression input keep their fixed lines, which no device
//! may use.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use serde::Deserialize;

use organ_scan::keymap::all_senses;
use organ_scan::organ::{
    self, ChannelMap, ConsoleRegistry, Division, WiredDevice, DEVICES, KEYS, PANEL_LINES,
    REFERENCE_WIRING, TRANSPOSE_DOWN, TRANSPOSE_UP,
};
use organ_scan::panel::Panel;
use organ_scan::piston::TransposeGesture;
use organ_scan::{ConfigError, DeviceConfig, DeviceId, LineId, LineIo, Scanner, SenseMask};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WiringFile {
    #[serde(rename = "device")]
    devices: Vec<DeviceEntry>,
    transpose: Option<TransposeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceEntry {
    name: String,
    division: String,
    #[serde(default)]
    strobes: Vec<u8>,
    senses: Vec<u8>,
    #[serde(default)]
    offset: i16,
    #[serde(default = "default_stride")]
    stride: u8,
    strobe_step: Option<u8>,
    settle_us: Option<u16>,
    debounce: Option<u8>,
    mask: Option<MaskEntry>,
}

fn default_stride() -> u8 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaskEntry {
    Named(String),
    Rows(Vec<u16>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransposeEntry {
    device: Option<String>,
    up: u8,
    down: u8,
}

/// Lines of the transpose buttons and the device whose channel they use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransposeWiring {
    /// Index into [`Wiring::devices`].
    pub device: usize,
    pub up: LineId,
    pub down: LineId,
}

/// A whole console: its devices in registration order plus the optional
/// transpose buttons.
#[derive(Clone, Debug)]
pub struct Wiring {
    pub devices: Vec<WiredDevice>,
    pub transpose: Option<TransposeWiring>,
}

/// A wiring after [`Wiring::begin`]: ready to scan.
pub struct Console {
    pub scanner: Scanner<'static, DEVICES, KEYS>,
    pub channels: ChannelMap<DEVICES>,
    pub gesture: Option<(DeviceId, TransposeGesture)>,
    pub panel: Panel,
}

impl Wiring {
    /// The wiring the firmware is built with.
    pub fn reference() -> Self {
        Self {
            devices: REFERENCE_WIRING.to_vec(),
            transpose: Some(TransposeWiring {
                device: 3,
                up: TRANSPOSE_UP,
                down: TRANSPOSE_DOWN,
            }),
        }
    }

    /// Load `path`, or the reference wiring when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!(target: "wiring", "using reference wiring");
            return Ok(Self::reference());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parsing wiring {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: WiringFile = toml::from_str(contents).context("invalid TOML")?;
        if file.devices.is_empty() {
            bail!("no [[device]] entries");
        }

        let devices = file
            .devices
            .into_iter()
            .map(|entry| {
                let name = entry.name.clone();
                convert_device(entry).with_context(|| format!("device `{}`", name))
            })
            .collect::<Result<Vec<_>>>()?;

        let transpose = match file.transpose {
            Some(entry) => Some(convert_transpose(entry, &devices)?),
            None => None,
        };

        debug!(target: "wiring", "loaded {} devices", devices.len());
        Ok(Self { devices, transpose })
    }

    /// Register every device, check the set and configure its lines on `io`.
    pub fn begin<IO: LineIo + ?Sized>(&self, io: &mut IO) -> Result<Console> {
        organ::check_free_lines(&self.devices, &PANEL_LINES)
            .map_err(|err| name_device(&self.devices, err))
            .context("panel lines")?;

        let mut registry = ConsoleRegistry::new();
        let mut channels = ChannelMap::new();
        let mut ids = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            let id = registry
                .register_device(device.config)
                .with_context(|| format!("device `{}`", device.name))?;
            channels.assign(id, device.division);
            ids.push(id);
        }
        let scanner = registry.begin(io).context("conflicting devices")?;

        let gesture = self.transpose.map(|t| {
            let id = ids[t.device];
            let gesture = TransposeGesture::new(id, t.up, t.down);
            gesture.configure(io);
            (id, gesture)
        });

        let panel = organ::panel();
        panel.configure(io);

        Ok(Console {
            scanner,
            channels,
            gesture,
            panel,
        })
    }

    /// Index of the device called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.name == name)
    }
}

fn convert_device(entry: DeviceEntry) -> Result<WiredDevice> {
    let Some(division) = Division::from_name(&entry.division) else {
        bail!("unknown division `{}`", entry.division);
    };

    let strobe_count = entry.strobes.len();
    let sense_count = entry.senses.len();
    let strobes = leak_lines(entry.strobes);
    let senses = leak_lines(entry.senses);

    let mut config = if strobes.is_empty() {
        DeviceConfig::direct(senses, entry.offset)
    } else {
        DeviceConfig::matrix(strobes, senses, entry.offset, entry.stride)
    };
    if let Some(step) = entry.strobe_step {
        config = config.with_strobe_step(step);
    }
    if let Some(settle_us) = entry.settle_us {
        config = config.with_settle_us(settle_us);
    }
    if let Some(debounce) = entry.debounce {
        config = config.with_debounce(debounce);
    }
    if let Some(mask) = entry.mask {
        let rows = match mask {
            MaskEntry::Named(name) if name == "bottom-key" => {
                bottom_key_rows(strobe_count, sense_count)
            }
            MaskEntry::Named(name) => bail!("unknown mask `{}`", name),
            MaskEntry::Rows(rows) => rows,
        };
        config = config.with_mask(SenseMask::PerStrobe(rows.leak()));
    }

    // Each device is checked alone here so the error names it; `begin`
    // repeats this and adds the cross-device checks.
    config.validate(KEYS)?;

    Ok(WiredDevice {
        name: entry.name.leak(),
        division,
        config,
    })
}

fn convert_transpose(entry: TransposeEntry, devices: &[WiredDevice]) -> Result<TransposeWiring> {
    let device = match &entry.device {
        Some(name) => match devices.iter().position(|d| d.name == name.as_str()) {
            Some(index) => index,
            None => bail!("transpose device `{}` is not defined", name),
        },
        None => match devices.iter().position(|d| d.division == Division::Pistons) {
            Some(index) => index,
            None => bail!("transpose buttons need a pistons device"),
        },
    };

    let (up, down) = (LineId(entry.up), LineId(entry.down));
    if up == down {
        bail!("transpose buttons share line {}", up);
    }
    if let Some(line) = [up, down].into_iter().find(|line| PANEL_LINES.contains(line)) {
        bail!("transpose line {} is a panel line", line);
    }
    organ::check_free_lines(devices, &[up, down])
        .map_err(|err| name_device(devices, err))
        .context("transpose buttons")?;

    Ok(TransposeWiring { device, up, down })
}

/// Turn a reserved-line error into one that names the device.
fn name_device(devices: &[WiredDevice], err: ConfigError) -> anyhow::Error {
    match err {
        ConfigError::ReservedLine { line, device } => match devices.get(device.index()) {
            Some(used) => anyhow!("line {} is already used by device `{}`", line, used.name),
            None => err.into(),
        },
        other => other.into(),
    }
}

/// The wiring lives as long as the process; scanning borrows it.
fn leak_lines(lines: Vec<u8>) -> &'static [LineId] {
    lines.into_iter().map(LineId).collect::<Vec<_>>().leak()
}

/// Every sense on every strobe, except sense 0 which only exists on the last.
fn bottom_key_rows(strobes: usize, senses: usize) -> Vec<u16> {
    let full = all_senses(senses);
    (0..strobes.max(1))
        .map(|s| if s + 1 == strobes.max(1) { full } else { full & !1 })
        .collect()
}
