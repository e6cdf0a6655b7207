//! Serial MIDI on USART0 (the MIDI shield on D0/D1).
//!
//! Outgoing: note on/off for every key event and the expression controller.
//! Incoming bytes are handed to the caller one at a time.

use avr_device::atmega2560::USART0;
use organ_scan::organ::NoteSink;
use organ_scan::LogicalKey;

/// UBRR for 31250 baud at 16MHz: 16_000_000 / (16 * 31250) - 1
const UBRR_MIDI: u16 = 31;

// UCSR0A / UCSR0B / UCSR0C bits
const RXC0: u8 = 1 << 7;
const UDRE0: u8 = 1 << 5;
const RXEN0: u8 = 1 << 4;
const TXEN0: u8 = 1 << 3;
const UCSZ_8BIT: u8 = 0b11 << 1;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

pub struct SerialMidi<'a> {
    usart: &'a USART0,
}

impl<'a> SerialMidi<'a> {
    pub const fn new(usart: &'a USART0) -> Self {
        Self { usart }
    }

    /// Configure USART0 for 31250 baud, 8N1, RX and TX enabled.
    pub fn init(&mut self) {
        self.usart.ubrr0.write(|w| unsafe { w.bits(UBRR_MIDI) });
        self.usart.ucsr0a.write(|w| unsafe { w.bits(0) });
        self.usart.ucsr0c.write(|w| unsafe { w.bits(UCSZ_8BIT) });
        self.usart.ucsr0b.write(|w| unsafe { w.bits(RXEN0 | TXEN0) });
    }

    fn write_byte(&self, byte: u8) {
        while self.usart.ucsr0a.read().bits() & UDRE0 == 0 {}
        self.usart.udr0.write(|w| unsafe { w.bits(byte) });
    }

    fn send(&self, status: u8, channel: u8, data1: u8, data2: u8) {
        // Channel numbers are 1-based; the status nibble is not.
        self.write_byte(status | (channel.wrapping_sub(1) & 0x0F));
        self.write_byte(data1 & 0x7F);
        self.write_byte(data2 & 0x7F);
    }

    /// Next received byte, if one is waiting.
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.usart.ucsr0a.read().bits() & RXC0 == 0 {
            return None;
        }
        Some(self.usart.udr0.read().bits())
    }
}

impl NoteSink for SerialMidi<'_> {
    fn on_key_event(&mut self, channel: u8, key: LogicalKey, pressed: bool) {
        if pressed {
            self.send(NOTE_ON, channel, key, 127);
        } else {
            self.send(NOTE_OFF, channel, key, 0);
        }
    }

    fn on_control_change(&mut self, channel: u8, control: u8, value: u8) {
        self.send(CONTROL_CHANGE, channel, control, value);
    }
}
