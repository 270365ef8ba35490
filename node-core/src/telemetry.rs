//! Poll statistics and report history.
//!
//! [`CycleStats`] is the tally the scheduler keeps per cycle and over its
//! lifetime; sinks receive it at the end of every cycle. [`ReportHistory`]
//! keeps the most recent records for front-ends that want to show them
//! after the fact.

use heapless::{HistoryBuf, OldestOrdered};

use crate::response::Outcome;
use crate::scheduler::ReportRecord;

/// Number of report records retained by [`ReportHistory`] by default.
pub const REPORT_HISTORY_CAPACITY: usize = 32;

/// Counters for one cycle, or accumulated over many.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleStats {
    pub cycles: u32,
    pub records: u32,
    pub success: u32,
    pub truncated: u32,
    pub command_failed: u32,
    pub not_ready: u32,
    pub no_data: u32,
    pub unknown: u32,
    pub malformed: u32,
    /// Polls that produced no status byte. Also counted under `no_data`.
    pub bus_faults: u32,
}

impl CycleStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cycles: 0,
            records: 0,
            success: 0,
            truncated: 0,
            command_failed: 0,
            not_ready: 0,
            no_data: 0,
            unknown: 0,
            malformed: 0,
            bus_faults: 0,
        }
    }

    /// Counts one emitted report record.
    pub fn record(&mut self, record: &ReportRecord<'_>) {
        self.records = self.records.saturating_add(1);
        if record.bus_fault.is_some() {
            self.bus_faults = self.bus_faults.saturating_add(1);
        }

        let counter = match &record.reading.outcome {
            Outcome::Success { truncated, .. } => {
                if *truncated {
                    self.truncated = self.truncated.saturating_add(1);
                }
                &mut self.success
            }
            Outcome::CommandFailed => &mut self.command_failed,
            Outcome::CircuitNotReady => &mut self.not_ready,
            Outcome::NoData => &mut self.no_data,
            Outcome::Unknown(_) => &mut self.unknown,
            Outcome::Malformed => &mut self.malformed,
        };
        *counter = counter.saturating_add(1);
    }

    /// Adds another tally into this one.
    pub fn merge(&mut self, other: &CycleStats) {
        self.cycles = self.cycles.saturating_add(other.cycles);
        self.records = self.records.saturating_add(other.records);
        self.success = self.success.saturating_add(other.success);
        self.truncated = self.truncated.saturating_add(other.truncated);
        self.command_failed = self.command_failed.saturating_add(other.command_failed);
        self.not_ready = self.not_ready.saturating_add(other.not_ready);
        self.no_data = self.no_data.saturating_add(other.no_data);
        self.unknown = self.unknown.saturating_add(other.unknown);
        self.malformed = self.malformed.saturating_add(other.malformed);
        self.bus_faults = self.bus_faults.saturating_add(other.bus_faults);
    }

    /// Records that did not carry a reading.
    #[must_use]
    pub const fn errors(&self) -> u32 {
        self.records.saturating_sub(self.success)
    }
}

/// Ring of the most recent report records.
pub struct ReportHistory<'a, const N: usize = REPORT_HISTORY_CAPACITY> {
    ring: HistoryBuf<ReportRecord<'a>, N>,
}

impl<'a, const N: usize> ReportHistory<'a, N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
        }
    }

    /// Stores a copy of `record`, evicting the oldest entry when full.
    pub fn push(&mut self, record: &ReportRecord<'a>) {
        self.ring.write(record.clone());
    }

    /// Records in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, ReportRecord<'a>> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&ReportRecord<'a>> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<const N: usize> Default for ReportHistory<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bus::BusFault;
    use crate::channels::DEFAULT_CHANNELS;
    use crate::response::{SensorReading, classify};

    fn record(cycle: u32, status: u8, raw: &[u8]) -> ReportRecord<'static> {
        ReportRecord::new(
            cycle,
            SensorReading::new(DEFAULT_CHANNELS[0], classify(status, raw)),
            None,
        )
    }

    #[test]
    fn stats_count_each_outcome_class() {
        let mut stats = CycleStats::new();
        stats.record(&record(0, 1, b"1.0\0"));
        stats.record(&record(0, 1, &[b'4'; 31]));
        stats.record(&record(0, 2, b""));
        stats.record(&record(0, 254, b""));
        stats.record(&record(0, 255, b""));
        stats.record(&record(0, 9, b""));
        stats.record(&record(0, 1, &[0xFF]));

        assert_eq!(stats.records, 7);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.truncated, 1);
        assert_eq!(stats.command_failed, 1);
        assert_eq!(stats.not_ready, 1);
        assert_eq!(stats.no_data, 1);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.errors(), 5);
    }

    #[test]
    fn bus_faults_count_as_no_data_too() {
        let mut stats = CycleStats::new();
        let faulted = ReportRecord::new(
            0,
            SensorReading::new(DEFAULT_CHANNELS[1], Outcome::NoData),
            Some(BusFault::Read),
        );
        stats.record(&faulted);

        assert_eq!(stats.bus_faults, 1);
        assert_eq!(stats.no_data, 1);
    }

    #[test]
    fn merge_accumulates_totals() {
        let mut cycle = CycleStats::new();
        cycle.cycles = 1;
        cycle.record(&record(0, 1, b"7.0\0"));

        let mut totals = CycleStats::new();
        totals.merge(&cycle);
        totals.merge(&cycle);

        assert_eq!(totals.cycles, 2);
        assert_eq!(totals.records, 2);
        assert_eq!(totals.success, 2);
    }

    #[test]
    fn history_keeps_most_recent_records() {
        let mut history: ReportHistory<'static, 2> = ReportHistory::new();
        history.push(&record(0, 1, b"1\0"));
        history.push(&record(1, 1, b"2\0"));
        history.push(&record(2, 1, b"3\0"));

        assert_eq!(history.len(), 2);
        let mut cycles = history.oldest_first().map(|record| record.cycle);
        assert_eq!(cycles.next(), Some(1));
        assert_eq!(cycles.next(), Some(2));
        assert_eq!(cycles.next(), None);
        assert_eq!(history.latest().map(|record| record.cycle), Some(2));
    }
}
