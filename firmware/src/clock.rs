//! Millisecond clock on Timer/Counter 1.
//!
//! TC1 free-runs at 16MHz / 1024 (one tick every 64us) and is polled from
//! the main loop, so no interrupt is needed. The 16-bit counter wraps every
//! ~4.2s; the loop polls far more often than that.

use avr_device::atmega2560::TC1;

/// Microseconds per TC1 tick at prescaler 1024.
const TICK_US: u32 = 64;

pub struct Clock<'a> {
    tc1: &'a TC1,
    last_count: u16,
    micros: u32,
    millis: u32,
}

impl<'a> Clock<'a> {
    pub fn new(tc1: &'a TC1) -> Self {
        // Normal mode, clock select = clk/1024
        tc1.tccr1a.write(|w| unsafe { w.bits(0) });
        tc1.tccr1b.write(|w| unsafe { w.bits(0x05) });
        Self {
            tc1,
            last_count: tc1.tcnt1.read().bits(),
            micros: 0,
            millis: 0,
        }
    }

    /// Milliseconds since start, wrapping.
    pub fn now_ms(&mut self) -> u32 {
        let count = self.tc1.tcnt1.read().bits();
        let elapsed = count.wrapping_sub(self.last_count);
        self.last_count = count;

        self.micros += elapsed as u32 * TICK_US;
        self.millis = self.millis.wrapping_add(self.micros / 1000);
        self.micros %= 1000;
        self.millis
    }
}
