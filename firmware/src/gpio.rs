//! Digital line access for the Arduino Mega 2560.
//!
//! Arduino pin numbers (D0-D69) are the line ids of the console wiring. Each
//! maps to one bit of an ATmega2560 port; the table below follows the Mega
//! schematic. Strobes and sense lines are all plain port bits, so a strobe
//! is driven by clearing its PORTx bit and a sense line read from PINx.

use avr_device::atmega2560::Peripherals;
use organ_scan::{Level, LineId, LineIo};

#[derive(Copy, Clone)]
enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    J,
    K,
    L,
}

/// Port and bit of every Arduino pin, indexed by pin number.
const PIN_MAP: [(Port, u8); 70] = [
    (Port::E, 0), // D0  RX0
    (Port::E, 1), // D1  TX0
    (Port::E, 4),
    (Port::E, 5),
    (Port::G, 5),
    (Port::E, 3),
    (Port::H, 3),
    (Port::H, 4),
    (Port::H, 5),
    (Port::H, 6),
    (Port::B, 4), // D10
    (Port::B, 5),
    (Port::B, 6),
    (Port::B, 7), // D13 LED
    (Port::J, 1),
    (Port::J, 0),
    (Port::H, 1),
    (Port::H, 0),
    (Port::D, 3),
    (Port::D, 2),
    (Port::D, 1), // D20
    (Port::D, 0),
    (Port::A, 0),
    (Port::A, 1),
    (Port::A, 2),
    (Port::A, 3),
    (Port::A, 4),
    (Port::A, 5),
    (Port::A, 6),
    (Port::A, 7),
    (Port::C, 7), // D30
    (Port::C, 6),
    (Port::C, 5),
    (Port::C, 4),
    (Port::C, 3),
    (Port::C, 2),
    (Port::C, 1),
    (Port::C, 0),
    (Port::D, 7),
    (Port::G, 2),
    (Port::G, 1), // D40
    (Port::G, 0),
    (Port::L, 7),
    (Port::L, 6),
    (Port::L, 5),
    (Port::L, 4),
    (Port::L, 3),
    (Port::L, 2),
    (Port::L, 1),
    (Port::L, 0),
    (Port::B, 3), // D50
    (Port::B, 2),
    (Port::B, 1),
    (Port::B, 0),
    (Port::F, 0), // D54 A0
    (Port::F, 1),
    (Port::F, 2),
    (Port::F, 3),
    (Port::F, 4),
    (Port::F, 5),
    (Port::F, 6), // D60
    (Port::F, 7),
    (Port::K, 0), // D62 A8
    (Port::K, 1),
    (Port::K, 2),
    (Port::K, 3),
    (Port::K, 4),
    (Port::K, 5),
    (Port::K, 6),
    (Port::K, 7),
];

/// Expands `$body` once per port with `$ddr`, `$out` and `$pin` bound to
/// that port's DDRx, PORTx and PINx registers.
macro_rules! with_port {
    ($dp:expr, $port:expr, |$ddr:ident, $out:ident, $pin:ident| $body:expr) => {
        match $port {
            Port::A => {
                let ($ddr, $out, $pin) = (&$dp.PORTA.ddra, &$dp.PORTA.porta, &$dp.PORTA.pina);
                $body
            }
            Port::B => {
                let ($ddr, $out, $pin) = (&$dp.PORTB.ddrb, &$dp.PORTB.portb, &$dp.PORTB.pinb);
                $body
            }
            Port::C => {
                let ($ddr, $out, $pin) = (&$dp.PORTC.ddrc, &$dp.PORTC.portc, &$dp.PORTC.pinc);
                $body
            }
            Port::D => {
                let ($ddr, $out, $pin) = (&$dp.PORTD.ddrd, &$dp.PORTD.portd, &$dp.PORTD.pind);
                $body
            }
            Port::E => {
                let ($ddr, $out, $pin) = (&$dp.PORTE.ddre, &$dp.PORTE.porte, &$dp.PORTE.pine);
                $body
            }
            Port::F => {
                let ($ddr, $out, $pin) = (&$dp.PORTF.ddrf, &$dp.PORTF.portf, &$dp.PORTF.pinf);
                $body
            }
            Port::G => {
                let ($ddr, $out, $pin) = (&$dp.PORTG.ddrg, &$dp.PORTG.portg, &$dp.PORTG.ping);
                $body
            }
            Port::H => {
                let ($ddr, $out, $pin) = (&$dp.PORTH.ddrh, &$dp.PORTH.porth, &$dp.PORTH.pinh);
                $body
            }
            Port::J => {
                let ($ddr, $out, $pin) = (&$dp.PORTJ.ddrj, &$dp.PORTJ.portj, &$dp.PORTJ.pinj);
                $body
            }
            Port::K => {
                let ($ddr, $out, $pin) = (&$dp.PORTK.ddrk, &$dp.PORTK.portk, &$dp.PORTK.pink);
                $body
            }
            Port::L => {
                let ($ddr, $out, $pin) = (&$dp.PORTL.ddrl, &$dp.PORTL.portl, &$dp.PORTL.pinl);
                $body
            }
        }
    };
}

/// GPIO backend of the scan engine.
pub struct MegaLines<'a> {
    dp: &'a Peripherals,
}

impl<'a> MegaLines<'a> {
    pub fn new(dp: &'a Peripherals) -> Self {
        Self { dp }
    }
}

fn locate(line: LineId) -> Option<(Port, u8)> {
    PIN_MAP.get(line.0 as usize).map(|&(port, bit)| (port, 1 << bit))
}

impl LineIo for MegaLines<'_> {
    fn configure_output(&mut self, line: LineId) {
        if let Some((port, mask)) = locate(line) {
            with_port!(self.dp, port, |ddr, _out, _pin| {
                ddr.modify(|r, w| unsafe { w.bits(r.bits() | mask) })
            });
        }
    }

    fn configure_input_pullup(&mut self, line: LineId) {
        if let Some((port, mask)) = locate(line) {
            with_port!(self.dp, port, |ddr, out, _pin| {
                ddr.modify(|r, w| unsafe { w.bits(r.bits() & !mask) });
                out.modify(|r, w| unsafe { w.bits(r.bits() | mask) })
            });
        }
    }

    fn drive(&mut self, line: LineId, level: Level) {
        if let Some((port, mask)) = locate(line) {
            with_port!(self.dp, port, |_ddr, out, _pin| match level {
                Level::Low => out.modify(|r, w| unsafe { w.bits(r.bits() & !mask) }),
                Level::High => out.modify(|r, w| unsafe { w.bits(r.bits() | mask) }),
            });
        }
    }

    fn read(&mut self, line: LineId) -> Level {
        // Unmapped lines read as an open switch.
        let Some((port, mask)) = locate(line) else {
            return Level::High;
        };
        let bits = with_port!(self.dp, port, |_ddr, _out, pin| pin.read().bits());
        if bits & mask != 0 {
            Level::High
        } else {
            Level::Low
        }
    }

    fn settle(&mut self, micros: u16) {
        delay_us(micros);
    }
}

/// Busy-wait delay in microseconds (approximate, at 16MHz).
#[inline(always)]
pub fn delay_us(us: u16) {
    for _ in 0..us {
        // 16 cycles per microsecond, ~4 cycles per iteration
        for _ in 0..4u8 {
            unsafe { core::arch::asm!("nop") };
        }
    }
}

/// Busy-wait delay in milliseconds (approximate, at 16MHz).
pub fn delay_ms(ms: u16) {
    for _ in 0..ms {
        delay_us(1000);
    }
}
