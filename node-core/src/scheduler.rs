//! Duty-cycle scheduler.
//!
//! One cycle powers the peripheral rail, waits for it to settle, polls every
//! channel in list order, parks the lines, and idles. Outcomes never steer the
//! loop: every channel is reported every cycle and failing channels simply
//! get another chance on the next one.

use core::fmt;
use core::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::bus::{BusFault, BusPoller, BusTransport, COMMAND_SETTLE, ReadBuffer};
use crate::channels::{Channel, ChannelList};
use crate::power::{IoLines, PowerSequencer};
use crate::response::{Outcome, SensorReading, classify_response};
use crate::telemetry::CycleStats;

/// Wait after switching the rail on before the first command.
pub const POWER_SETTLE: Duration = Duration::from_secs(2);
/// Wait between cycles with the rail off.
pub const IDLE_INTERVAL: Duration = Duration::from_secs(15);
/// Rail-on hold used by the boot-time power cycle.
pub const BOOT_HOLD: Duration = Duration::from_secs(1);

/// Blocks on `delay` for `duration`, at microsecond resolution.
pub(crate) fn wait<D: DelayNs>(delay: &mut D, duration: Duration) {
    let millis = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
    delay.delay_ms(millis);

    let micros = duration.subsec_micros() % 1_000;
    if micros != 0 {
        delay.delay_us(micros);
    }
}

/// Fixed delays of the duty cycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DutyCycleConfig {
    pub power_settle: Duration,
    pub command_settle: Duration,
    pub idle: Duration,
    pub boot_hold: Duration,
}

impl DutyCycleConfig {
    /// Delays matching the circuits' datasheet timing.
    #[must_use]
    pub const fn stock() -> Self {
        Self {
            power_settle: POWER_SETTLE,
            command_settle: COMMAND_SETTLE,
            idle: IDLE_INTERVAL,
            boot_hold: BOOT_HOLD,
        }
    }

    /// Wall-clock length of one cycle polling `channel_count` channels,
    /// excluding time spent on the bus itself.
    #[must_use]
    pub fn cycle_period(&self, channel_count: usize) -> Duration {
        let polling = self
            .command_settle
            .saturating_mul(u32::try_from(channel_count).unwrap_or(u32::MAX));
        self.power_settle
            .saturating_add(polling)
            .saturating_add(self.idle)
    }
}

impl Default for DutyCycleConfig {
    fn default() -> Self {
        Self::stock()
    }
}

/// One line of output: a channel's classified reading for a given cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReportRecord<'a> {
    /// Zero-based cycle counter.
    pub cycle: u32,
    pub reading: SensorReading<'a>,
    /// Set when the poll never produced a status byte.
    pub bus_fault: Option<BusFault>,
}

impl<'a> ReportRecord<'a> {
    #[must_use]
    pub const fn new(cycle: u32, reading: SensorReading<'a>, bus_fault: Option<BusFault>) -> Self {
        Self {
            cycle,
            reading,
            bus_fault,
        }
    }

    #[must_use]
    pub const fn channel(&self) -> &Channel<'a> {
        &self.reading.channel
    }

    #[must_use]
    pub const fn channel_name(&self) -> &'a str {
        self.reading.channel.name
    }

    /// Outcome rendered through `Display` gives the report message.
    #[must_use]
    pub const fn message(&self) -> &Outcome {
        &self.reading.outcome
    }
}

impl fmt::Display for ReportRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_name(), self.reading.outcome)
    }
}

/// Consumer of report records; logging and storage live behind it.
pub trait ReportSink<'a> {
    /// Receives one record per channel per cycle, in channel order.
    fn report(&mut self, record: &ReportRecord<'a>);

    /// Called once after the last record of a cycle, before the idle wait.
    fn cycle_complete(&mut self, _cycle: u32, _stats: &CycleStats) {}
}

impl<'a, S: ReportSink<'a> + ?Sized> ReportSink<'a> for &mut S {
    fn report(&mut self, record: &ReportRecord<'a>) {
        S::report(self, record);
    }

    fn cycle_complete(&mut self, cycle: u32, stats: &CycleStats) {
        S::cycle_complete(self, cycle, stats);
    }
}

/// Drives the power-on, settle, poll, power-off, idle loop.
pub struct DutyCycleScheduler<'a, L, T, D> {
    channels: ChannelList<'a>,
    power: PowerSequencer<L>,
    poller: BusPoller<T>,
    delay: D,
    config: DutyCycleConfig,
    totals: CycleStats,
    cycle: u32,
}

impl<'a, L, T, D> DutyCycleScheduler<'a, L, T, D>
where
    L: IoLines,
    T: BusTransport,
    D: DelayNs,
{
    pub fn new(
        channels: ChannelList<'a>,
        power: PowerSequencer<L>,
        transport: T,
        delay: D,
        config: DutyCycleConfig,
    ) -> Self {
        Self {
            channels,
            power,
            poller: BusPoller::with_settle(transport, config.command_settle),
            delay,
            config,
            totals: CycleStats::new(),
            cycle: 0,
        }
    }

    /// Boot-time power cycle: rail on, hold, then safe idle.
    ///
    /// Leaves the circuits in a known unpowered state before the first cycle.
    pub fn prime(&mut self) {
        self.power.power_on();
        wait(&mut self.delay, self.config.boot_hold);
        self.power.power_off();
    }

    /// Runs one full duty cycle and returns its statistics.
    pub fn run_cycle<S>(&mut self, sink: &mut S) -> CycleStats
    where
        S: ReportSink<'a> + ?Sized,
    {
        let mut stats = CycleStats::new();
        let mut buffer = ReadBuffer::new();

        self.power.power_on();
        wait(&mut self.delay, self.config.power_settle);

        for channel in &self.channels {
            let response = self.poller.poll(channel, &mut buffer, &mut self.delay);
            let outcome = classify_response(response, &buffer);
            let record = ReportRecord::new(
                self.cycle,
                SensorReading::new(*channel, outcome),
                response.err(),
            );
            stats.record(&record);
            sink.report(&record);
        }

        self.power.power_off();

        stats.cycles = 1;
        self.totals.merge(&stats);
        sink.cycle_complete(self.cycle, &stats);
        self.cycle = self.cycle.wrapping_add(1);

        wait(&mut self.delay, self.config.idle);
        stats
    }

    /// Runs duty cycles forever.
    pub fn run<S>(&mut self, sink: &mut S) -> !
    where
        S: ReportSink<'a> + ?Sized,
    {
        loop {
            self.run_cycle(sink);
        }
    }

    pub fn channels(&self) -> &ChannelList<'a> {
        &self.channels
    }

    pub const fn config(&self) -> &DutyCycleConfig {
        &self.config
    }

    /// Statistics accumulated over every completed cycle.
    pub const fn totals(&self) -> &CycleStats {
        &self.totals
    }

    /// Number of cycles completed so far.
    pub const fn cycles_completed(&self) -> u32 {
        self.cycle
    }

    pub fn power(&self) -> &PowerSequencer<L> {
        &self.power
    }

    pub fn transport(&self) -> &T {
        self.poller.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.poller.transport_mut()
    }
}
