//! Single-conversion reads of the analog inputs.

use avr_device::atmega2560::ADC;

/// AVcc reference.
const REFS_AVCC: u8 = 1 << 6;
const ADEN: u8 = 1 << 7;
const ADSC: u8 = 1 << 6;
/// Prescaler 128: 125kHz ADC clock at 16MHz.
const ADPS_128: u8 = 0b111;
/// MUX5 in ADCSRB selects channels 8-15.
const MUX5: u8 = 1 << 3;

pub struct Analog<'a> {
    adc: &'a ADC,
}

impl<'a> Analog<'a> {
    pub fn new(adc: &'a ADC) -> Self {
        adc.adcsra.write(|w| unsafe { w.bits(ADEN | ADPS_128) });
        Self { adc }
    }

    /// Convert analog input `channel` (0 for A0, up to 15 for A15).
    /// Blocks for one conversion, about 104us.
    pub fn read(&mut self, channel: u8) -> u16 {
        let channel = channel & 0x0F;
        self.adc
            .admux
            .write(|w| unsafe { w.bits(REFS_AVCC | (channel & 0x07)) });
        let high_bank = if channel >= 8 { MUX5 } else { 0 };
        self.adc.adcsrb.write(|w| unsafe { w.bits(high_bank) });

        self.adc
            .adcsra
            .modify(|r, w| unsafe { w.bits(r.bits() | ADSC) });
        while self.adc.adcsra.read().bits() & ADSC != 0 {}
        self.adc.adc.read().bits()
    }
}
