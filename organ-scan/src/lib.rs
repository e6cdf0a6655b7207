//! Switch-matrix scanning and debouncing for an organ console.
//!
//! This crate is `no_std` and allocation-free so it can be used by both the
//! AVR firmware and the native CLI tool. Enable the `std` feature for the
//! simulated line backend.
//!
//! Setup happens once: every keyboard, pedalboard or button bank is
//! registered with its wiring, then [`DeviceRegistry::begin`] validates the
//! lot, configures the lines and returns the [`Scanner`]. The control loop
//! calls [`Scanner::scan`] per device at its own cadence and receives
//! debounced [`EdgeEvent`]s through an [`EventSink`].

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod debounce;
pub mod keymap;
pub mod line;
pub mod organ;
pub mod panel;
pub mod piston;
pub mod registry;
pub mod scanner;
#[cfg(any(test, feature = "std"))]
pub mod sim;

pub use debounce::{DebounceCell, Transition, DEBOUNCE_COUNT};
pub use keymap::{KeyMap, LogicalKey, SenseMask, MAX_LINES};
pub use line::{Level, LineId, LineIo};
pub use registry::{ConfigError, DeviceConfig, DeviceId, DeviceRegistry};
pub use scanner::{EdgeEvent, EventSink, Scanner};
