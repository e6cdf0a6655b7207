//! Organ console firmware for the ATmega2560 (Arduino Mega + MIDI shield).
//!
//! One cooperative loop handles the whole console:
//! - scanning the pedalboard, Great, Swell and piston matrices
//! - debouncing every key
//! - the transpose buttons and their reset chord
//! - host notes and the transpose report, shown on the panel lamps
//! - the expression pedal
//!
//! Every division goes out as serial MIDI on its own channel.

#![no_std]
#![no_main]
#![feature(asm_experimental_arch)]

mod adc;
mod clock;
mod gpio;
mod midi;

use avr_device::atmega2560::Peripherals;
use organ_scan::organ::{self, ChannelMap, ChannelSink, ConsoleRegistry, Division, NoteSink};
use organ_scan::panel::{self, ExpressionPedal, HostState, MidiDecoder};
use organ_scan::piston::{reset_sequence, Gesture};
use organ_scan::{Level, LineIo};

use adc::Analog;
use clock::Clock;
use gpio::MegaLines;
use midi::SerialMidi;

/// A0 is Arduino pin 54.
const FIRST_ANALOG_PIN: u8 = 54;

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[no_mangle]
pub extern "C" fn main() -> ! {
    let dp = unsafe { Peripherals::steal() };

    let mut lines = MegaLines::new(&dp);
    let mut midi = SerialMidi::new(&dp.USART0);
    midi.init();
    let mut clock = Clock::new(&dp.TC1);
    let mut analog = Analog::new(&dp.ADC);

    // A bad wiring table halts here, before any line is driven
    if organ::check_free_lines(&organ::REFERENCE_WIRING, &organ::RESERVED_LINES).is_err() {
        halt(&mut lines);
    }
    let mut registry = ConsoleRegistry::new();
    let mut channels = ChannelMap::new();
    if organ::register(&mut registry, &mut channels, &organ::REFERENCE_WIRING).is_err() {
        halt(&mut lines);
    }
    let mut scanner = match registry.begin(&mut lines) {
        Ok(scanner) => scanner,
        Err(_) => halt(&mut lines),
    };

    let mut gesture = organ::transpose_gesture();
    gesture.configure(&mut lines);
    let lamps = organ::panel();
    lamps.configure(&mut lines);

    // Steady D13: scanning
    lines.configure_output(organ::STATUS_LED);
    lines.drive(organ::STATUS_LED, Level::High);

    let mut decoder = MidiDecoder::new();
    let mut host = HostState::new();
    let mut pedal = ExpressionPedal::new();
    let expression_adc = organ::EXPRESSION_INPUT.0 - FIRST_ANALOG_PIN;

    let mut last_scan = clock.now_ms();
    let mut last_expression = last_scan;

    loop {
        while let Some(byte) = midi.read_byte() {
            if let Some(message) = decoder.push(byte) {
                host.apply(message);
                lamps.show(&host, &mut lines);
            }
        }

        let now = clock.now_ms();

        if now.wrapping_sub(last_expression) >= panel::EXPRESSION_PERIOD_MS {
            last_expression = now;
            if let Some(value) = pedal.update(analog.read(expression_adc)) {
                midi.on_control_change(
                    panel::EXPRESSION_CHANNEL,
                    panel::EXPRESSION_CONTROL,
                    value,
                );
            }
        }

        if now.wrapping_sub(last_scan) < organ::SCAN_PERIOD_MS {
            continue;
        }
        last_scan = now;

        panel::scan_enabled(
            &mut scanner,
            &channels,
            &host,
            &mut lines,
            &mut ChannelSink::new(&channels, &mut midi),
        );

        let chord = gesture.poll(now, &mut lines, &mut ChannelSink::new(&channels, &mut midi));
        if chord == Some(Gesture::Reset) {
            for (key, transition) in reset_sequence(host.transpose()) {
                midi.on_key_event(Division::Pistons.channel(), key, transition.is_pressed());
                gpio::delay_ms(2);
            }
        }
    }
}

/// Stop on a wiring error, blinking the status LED.
fn halt(lines: &mut MegaLines) -> ! {
    lines.configure_output(organ::STATUS_LED);
    loop {
        lines.drive(organ::STATUS_LED, Level::High);
        gpio::delay_ms(250);
        lines.drive(organ::STATUS_LED, Level::Low);
        gpio::delay_ms(250);
    }
}
