//! Report output for the firmware target.
//!
//! Every record goes to the log as `NAME:message`, with a warning on top for
//! polls that went wrong on the bus or came back with a status the node does
//! not know. Host builds print the same lines to stdout.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use node_core::bus::BusFault;
use node_core::response::Outcome;
use node_core::scheduler::{ReportRecord, ReportSink};
use node_core::telemetry::{CycleStats, ReportHistory};

/// [`ReportSink`] that logs records and keeps the most recent ones.
pub struct LogSink {
    history: ReportHistory<'static>,
}

impl LogSink {
    pub const fn new() -> Self {
        Self {
            history: ReportHistory::new(),
        }
    }

    pub fn history(&self) -> &ReportHistory<'static> {
        &self.history
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink<'static> for LogSink {
    fn report(&mut self, record: &ReportRecord<'static>) {
        emit_record(record);

        if let Some(fault) = record.bus_fault {
            emit_bus_fault(record.channel_name(), record.channel().address.raw(), fault);
        } else if let Outcome::Unknown(code) = record.message() {
            emit_unknown_status(record.channel_name(), *code);
        } else if let Outcome::Success {
            truncated: true, ..
        } = record.message()
        {
            emit_truncated(record.channel_name());
        }

        self.history.push(record);
    }

    fn cycle_complete(&mut self, cycle: u32, stats: &CycleStats) {
        emit_cycle_summary(cycle, stats);
    }
}

#[cfg(target_os = "none")]
fn emit_record(record: &ReportRecord<'static>) {
    defmt::info!(
        "report {}:{}",
        record.channel_name(),
        defmt::Display2Format(record.message())
    );
}

#[cfg(not(target_os = "none"))]
fn emit_record(record: &ReportRecord<'static>) {
    println!("report {record}");
}

#[cfg(target_os = "none")]
fn emit_bus_fault(name: &str, address: u8, fault: BusFault) {
    defmt::warn!(
        "bus: {} at {=u8:#x}: {}",
        name,
        address,
        defmt::Display2Format(&fault)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_bus_fault(name: &str, address: u8, fault: BusFault) {
    println!("bus: {name} at {address:#04x}: {fault}");
}

#[cfg(target_os = "none")]
fn emit_unknown_status(name: &str, code: u8) {
    defmt::warn!("bus: {} answered with unmapped status {=u8}", name, code);
}

#[cfg(not(target_os = "none"))]
fn emit_unknown_status(name: &str, code: u8) {
    println!("bus: {name} answered with unmapped status {code}");
}

#[cfg(target_os = "none")]
fn emit_truncated(name: &str) {
    defmt::warn!("bus: {} reading truncated", name);
}

#[cfg(not(target_os = "none"))]
fn emit_truncated(name: &str) {
    println!("bus: {name} reading truncated");
}

#[cfg(target_os = "none")]
fn emit_cycle_summary(cycle: u32, stats: &CycleStats) {
    defmt::info!(
        "cycle {=u32}: {=u32} readings, {=u32} errors, {=u32} bus faults",
        cycle,
        stats.success,
        stats.errors(),
        stats.bus_faults
    );
}

#[cfg(not(target_os = "none"))]
fn emit_cycle_summary(cycle: u32, stats: &CycleStats) {
    println!(
        "cycle {cycle}: {} readings, {} errors, {} bus faults",
        stats.success,
        stats.errors(),
        stats.bus_faults
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use node_core::channels::{DEFAULT_CHANNELS, EC_CHANNEL, TEMP_CHANNEL};
    use node_core::response::{SensorReading, classify};

    #[test]
    fn sink_keeps_records_in_report_order() {
        let mut sink = LogSink::new();
        sink.report(&ReportRecord::new(
            0,
            SensorReading::new(EC_CHANNEL, classify(1, b"1413.0\0")),
            None,
        ));
        sink.report(&ReportRecord::new(
            0,
            SensorReading::new(TEMP_CHANNEL, Outcome::NoData),
            Some(BusFault::Write),
        ));
        sink.cycle_complete(0, &CycleStats::new());

        let names: Vec<&str> = sink
            .history()
            .oldest_first()
            .map(ReportRecord::channel_name)
            .collect();
        assert_eq!(names, ["EC", "TEMP"]);
        assert_eq!(
            sink.history().latest().map(|record| record.bus_fault),
            Some(Some(BusFault::Write))
        );
    }

    #[test]
    fn unknown_and_truncated_records_are_retained() {
        let mut sink = LogSink::default();
        for (status, payload) in [(7, &b""[..]), (1, &[b'2'; 40][..])] {
            sink.report(&ReportRecord::new(
                1,
                SensorReading::new(DEFAULT_CHANNELS[0], classify(status, payload)),
                None,
            ));
        }

        assert_eq!(sink.history().len(), 2);
        assert_eq!(
            sink.history().oldest_first().next().map(|record| record.message().clone()),
            Some(Outcome::Unknown(7))
        );
    }
}
