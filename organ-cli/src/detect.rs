use anyhow::{Context, Result};

/// USB vendor IDs of Arduino boards (arduino.cc and arduino.org).
const ARDUINO_VIDS: [u16; 2] = [0x2341, 0x2A03];

/// Product IDs of the Mega 2560 (original and R3).
const MEGA_PIDS: [u16; 2] = [0x0010, 0x0042];

/// A connected board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Board {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

pub fn is_mega(vendor_id: u16, product_id: u16) -> bool {
    ARDUINO_VIDS.contains(&vendor_id) && MEGA_PIDS.contains(&product_id)
}

/// List every Arduino Mega 2560 on the USB bus.
pub fn find_boards() -> Result<Vec<Board>> {
    let devices = rusb::devices().context("failed to enumerate USB devices")?;
    let mut boards = Vec::new();
    for device in devices.iter() {
        let desc = device
            .device_descriptor()
            .context("failed to read device descriptor")?;
        if is_mega(desc.vendor_id(), desc.product_id()) {
            boards.push(Board {
                bus: device.bus_number(),
                address: device.address(),
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            });
        }
    }
    Ok(boards)
}
