//! Peripheral power sequencing.
//!
//! The sensor circuits hang off a switched rail. Between duty cycles the node
//! cuts that rail and parks every managed I/O line low so nothing leaks
//! current into the unpowered circuits. [`IoLines`] abstracts the board's
//! line set; [`HalLines`] backs it with `embedded-hal` output pins.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

/// Logic level driven onto a line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineLevel {
    Low,
    High,
}

/// Level that switches the peripheral rail on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerPolarity {
    /// Rail is on while the control line is low (P-MOSFET high-side switch).
    ActiveLow,
    /// Rail is on while the control line is high.
    ActiveHigh,
}

impl PowerPolarity {
    #[must_use]
    pub const fn on_level(self) -> LineLevel {
        match self {
            PowerPolarity::ActiveLow => LineLevel::Low,
            PowerPolarity::ActiveHigh => LineLevel::High,
        }
    }

    #[must_use]
    pub const fn off_level(self) -> LineLevel {
        match self {
            PowerPolarity::ActiveLow => LineLevel::High,
            PowerPolarity::ActiveHigh => LineLevel::Low,
        }
    }
}

/// Last state the sequencer drove the lines into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerState {
    /// Nothing has been driven yet.
    Unknown,
    /// Rail on, other lines left alone.
    Active,
    /// Rail off, every other managed line low.
    SafeIdle,
}

/// The board's set of managed I/O lines.
///
/// Lines are addressed by index in `0..line_count()`. One of them is the
/// power-control line.
pub trait IoLines {
    /// Number of managed lines, the power-control line included.
    fn line_count(&self) -> usize;

    /// Index of the power-control line.
    fn power_line(&self) -> usize;

    /// Configures line `index` as an output and drives it to `level`.
    fn drive(&mut self, index: usize, level: LineLevel);
}

impl<L: IoLines + ?Sized> IoLines for &mut L {
    fn line_count(&self) -> usize {
        L::line_count(self)
    }

    fn power_line(&self) -> usize {
        L::power_line(self)
    }

    fn drive(&mut self, index: usize, level: LineLevel) {
        L::drive(self, index, level);
    }
}

/// Switches the peripheral rail and parks the lines between cycles.
pub struct PowerSequencer<L> {
    lines: L,
    polarity: PowerPolarity,
    state: PowerState,
}

impl<L: IoLines> PowerSequencer<L> {
    pub const fn new(lines: L, polarity: PowerPolarity) -> Self {
        Self {
            lines,
            polarity,
            state: PowerState::Unknown,
        }
    }

    /// Drives the power-control line to its ON level. No other line is touched.
    pub fn power_on(&mut self) {
        let power = self.lines.power_line();
        self.lines.drive(power, self.polarity.on_level());
        self.state = PowerState::Active;
    }

    /// Drives every managed line low, then the power-control line to its OFF level.
    ///
    /// The power-control line is skipped by the sweep so it never passes
    /// through the ON level on an active-low board.
    pub fn power_off(&mut self) {
        let power = self.lines.power_line();
        for index in (0..self.lines.line_count()).filter(|&index| index != power) {
            self.lines.drive(index, LineLevel::Low);
        }
        self.lines.drive(power, self.polarity.off_level());
        self.state = PowerState::SafeIdle;
    }

    pub const fn state(&self) -> PowerState {
        self.state
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }
}

/// [`IoLines`] over a fixed array of `embedded-hal` output pins.
pub struct HalLines<P, const N: usize> {
    pins: [P; N],
    power_line: usize,
}

impl<P, const N: usize> HalLines<P, N> {
    /// Returns `None` when `power_line` is not an index into `pins`.
    pub fn new(pins: [P; N], power_line: usize) -> Option<Self> {
        (power_line < N).then_some(Self { pins, power_line })
    }

    pub fn pins(&self) -> &[P; N] {
        &self.pins
    }
}

impl<P, const N: usize> IoLines for HalLines<P, N>
where
    P: OutputPin<Error = Infallible>,
{
    fn line_count(&self) -> usize {
        N
    }

    fn power_line(&self) -> usize {
        self.power_line
    }

    fn drive(&mut self, index: usize, level: LineLevel) {
        let Some(pin) = self.pins.get_mut(index) else {
            return;
        };
        let Ok(()) = match level {
            LineLevel::Low => pin.set_low(),
            LineLevel::High => pin.set_high(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use embedded_hal::digital::ErrorType;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    struct MockPin {
        level: Option<LineLevel>,
        writes: u8,
    }

    impl ErrorType for MockPin {
        type Error = Infallible;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.level = Some(LineLevel::Low);
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.level = Some(LineLevel::High);
            self.writes += 1;
            Ok(())
        }
    }

    const LINES: usize = 14;
    const POWER: usize = 3;

    fn sequencer(polarity: PowerPolarity) -> PowerSequencer<HalLines<MockPin, LINES>> {
        let lines = HalLines::new([MockPin::default(); LINES], POWER).unwrap();
        PowerSequencer::new(lines, polarity)
    }

    fn levels(sequencer: &PowerSequencer<HalLines<MockPin, LINES>>) -> [Option<LineLevel>; LINES] {
        let pins = *sequencer.lines().pins();
        pins.map(|pin| pin.level)
    }

    #[test]
    fn power_on_touches_only_the_control_line() {
        let mut sequencer = sequencer(PowerPolarity::ActiveLow);
        sequencer.power_on();

        for (index, level) in levels(&sequencer).into_iter().enumerate() {
            if index == POWER {
                assert_eq!(level, Some(LineLevel::Low));
            } else {
                assert_eq!(level, None, "line {index} should be untouched");
            }
        }
        assert_eq!(sequencer.state(), PowerState::Active);
    }

    #[test]
    fn power_off_parks_lines_low_and_rail_off() {
        let mut sequencer = sequencer(PowerPolarity::ActiveLow);
        sequencer.power_on();
        sequencer.power_off();

        for (index, level) in levels(&sequencer).into_iter().enumerate() {
            let expected = if index == POWER {
                LineLevel::High
            } else {
                LineLevel::Low
            };
            assert_eq!(level, Some(expected), "line {index}");
        }
        // on + off, never swept through low on the way down
        assert_eq!(sequencer.lines().pins()[POWER].writes, 2);
        assert_eq!(sequencer.state(), PowerState::SafeIdle);
    }

    #[test]
    fn power_off_is_idempotent() {
        let mut once = sequencer(PowerPolarity::ActiveLow);
        once.power_off();

        let mut twice = sequencer(PowerPolarity::ActiveLow);
        twice.power_off();
        twice.power_off();

        assert_eq!(levels(&once), levels(&twice));
        assert_eq!(once.state(), twice.state());
    }

    #[test]
    fn power_on_is_idempotent() {
        let mut once = sequencer(PowerPolarity::ActiveLow);
        once.power_on();

        let mut twice = sequencer(PowerPolarity::ActiveLow);
        twice.power_on();
        twice.power_on();

        assert_eq!(levels(&once), levels(&twice));
        for (index, pin) in twice.lines().pins().iter().enumerate() {
            if index != POWER {
                assert_eq!(pin.writes, 0, "line {index} should be untouched");
            }
        }
        assert_eq!(twice.state(), PowerState::Active);
    }

    #[test]
    fn active_high_polarity_inverts_control_levels() {
        let mut sequencer = sequencer(PowerPolarity::ActiveHigh);
        sequencer.power_on();
        assert_eq!(levels(&sequencer)[POWER], Some(LineLevel::High));

        sequencer.power_off();
        assert_eq!(levels(&sequencer)[POWER], Some(LineLevel::Low));
    }

    #[test]
    fn hal_lines_rejects_out_of_range_power_index() {
        assert!(HalLines::new([MockPin::default(); 4], 4).is_none());
    }
}
