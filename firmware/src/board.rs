//! Board wiring for the sensor node.
//!
//! The peripheral rail is switched by a P-MOSFET on `PA3`, so the rail is on
//! while that line is low. Every other managed line is parked low with the
//! rail so no current leaks into the unpowered circuits.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use node_core::power::{IoLines, LineLevel, PowerPolarity};

/// Lines driven by the power sequencer, the rail switch included.
pub const MANAGED_LINE_COUNT: usize = 14;
/// Index of the rail switch within [`LINE_LABELS`].
pub const POWER_LINE_INDEX: usize = 3;
pub const POWER_POLARITY: PowerPolarity = PowerPolarity::ActiveLow;
/// Sensor bus clock.
pub const I2C_FREQUENCY_HZ: u32 = 100_000;

/// Pin names in sequencer order. `PB8`/`PB9` carry the bus and are not managed.
pub const LINE_LABELS: [&str; MANAGED_LINE_COUNT] = [
    "PA0", "PA1", "PA2", "PA3", "PA4", "PA5", "PA6", "PA7", "PB0", "PB1", "PB2", "PB3", "PB4",
    "PB5",
];

/// Level a line is configured with before the sequencer first drives it.
pub const fn initial_level(index: usize) -> LineLevel {
    if index == POWER_LINE_INDEX {
        POWER_POLARITY.off_level()
    } else {
        LineLevel::Low
    }
}

/// [`IoLines`] wrapper that logs every rail transition.
pub struct TracedLines<L> {
    inner: L,
    polarity: PowerPolarity,
    rail_transitions: u32,
}

impl<L: IoLines> TracedLines<L> {
    pub const fn new(inner: L, polarity: PowerPolarity) -> Self {
        Self {
            inner,
            polarity,
            rail_transitions: 0,
        }
    }

    pub const fn rail_transitions(&self) -> u32 {
        self.rail_transitions
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: IoLines> IoLines for TracedLines<L> {
    fn line_count(&self) -> usize {
        self.inner.line_count()
    }

    fn power_line(&self) -> usize {
        self.inner.power_line()
    }

    fn drive(&mut self, index: usize, level: LineLevel) {
        self.inner.drive(index, level);
        if index == self.inner.power_line() {
            self.rail_transitions = self.rail_transitions.wrapping_add(1);
            let label = LINE_LABELS.get(index).copied().unwrap_or("?");
            log_rail(label, level == self.polarity.on_level());
        }
    }
}

#[cfg(target_os = "none")]
fn log_rail(label: &'static str, on: bool) {
    if on {
        defmt::info!("power: rail on ({})", label);
    } else {
        defmt::info!("power: rail off, lines parked ({})", label);
    }
}

#[cfg(not(target_os = "none"))]
fn log_rail(label: &'static str, on: bool) {
    if on {
        println!("power: rail on ({label})");
    } else {
        println!("power: rail off, lines parked ({label})");
    }
}
