//! Text rendering of the key numbering of every device.
//! One row per strobe line, one column per sense line; unwired cells show
//! as `--`.

use std::fmt::Write;

use organ_scan::DeviceConfig;

use crate::wiring::Wiring;

/// Width of one cell, line labels included ("D36").
const CELL: usize = 4;

/// Render the grid of one device.
pub fn render_device(name: &str, division: &str, channel: u8, config: &DeviceConfig<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({}, channel {})", name, division, channel);

    let _ = write!(out, "{:>width$}", "", width = CELL);
    for sense in config.senses {
        let _ = write!(out, "{:>width$}", sense.to_string(), width = CELL);
    }
    out.push('\n');

    for pass in 0..config.passes() {
        let label = match config.strobes.get(pass) {
            Some(line) => line.to_string(),
            None => "GND".to_string(),
        };
        let _ = write!(out, "{:>width$}", label, width = CELL);
        for sense in 0..config.senses.len() {
            if config.mask.is_valid(pass, sense) {
                let _ = write!(out, "{:>width$}", config.keymap.key(pass, sense), width = CELL);
            } else {
                let _ = write!(out, "{:>width$}", "--", width = CELL);
            }
        }
        out.push('\n');
    }
    out
}

/// Render every device of `wiring`, or only the one called `only`.
pub fn render(wiring: &Wiring, only: Option<&str>) -> String {
    let mut out = String::new();
    for device in wiring.devices.iter().filter(|d| only.map_or(true, |name| d.name == name)) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&render_device(
            device.name,
            device.division.name(),
            device.division.channel(),
            &device.config,
        ));
    }
    if let Some(t) = wiring.transpose.filter(|_| only.is_none()) {
        let _ = write!(
            out,
            "\ntranspose: up {} (key 20), down {} (key 21) on `{}`\n",
            t.up, t.down, wiring.devices[t.device].name
        );
    }
    out
}
