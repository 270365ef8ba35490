use std::time::Duration;

use node_core::channels::{BusAddress, ChannelList};
use node_core::power::{LineLevel, PowerSequencer};
use node_core::response::{Outcome, StatusCode};
use node_core::scheduler::{DutyCycleConfig, DutyCycleScheduler, ReportRecord, ReportSink};
use node_core::telemetry::{CycleStats, ReportHistory};

use crate::circuits::{
    Frame, HostLines, POLARITY, POWER_LINE, Profile, Rail, SimulatedBus, VirtualClock,
};
use crate::console::{self, Command};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("run", "run [n]                          - run n duty cycles (default 1)"),
    ("status", "status                           - show totals, rail, and circuits"),
    ("history", "history                          - list the most recent reports"),
    ("channels", "channels                         - list the polled channels"),
    (
        "respond",
        "respond <addr> <status> [payload] - script the next response of a circuit",
    ),
    ("unplug", "unplug <addr>                    - detach a circuit from the bus"),
    ("plug", "plug <addr>                      - reattach a circuit"),
    ("help", "help [topic]                     - show help for a command"),
];

/// How a console line should be rendered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tone {
    Plain,
    Reading,
    Warning,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsoleLine {
    pub tone: Tone,
    pub text: String,
}

impl ConsoleLine {
    fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }

    fn plain(text: impl Into<String>) -> Self {
        Self::new(Tone::Plain, text)
    }
}

type HostScheduler<'a> = DutyCycleScheduler<'a, HostLines, SimulatedBus, VirtualClock>;

pub struct Session<'a> {
    scheduler: HostScheduler<'a>,
    history: ReportHistory<'a>,
    clock: VirtualClock,
    rail: Rail,
}

impl<'a> Session<'a> {
    /// Builds the emulated node with one simulated circuit per channel, and
    /// runs the boot power cycle.
    pub fn new(channels: ChannelList<'a>, profile: Profile) -> Self {
        let rail = Rail::default();
        let clock = VirtualClock::default();

        let mut bus = SimulatedBus::new(rail.clone());
        for (index, channel) in channels.iter().enumerate() {
            bus.attach(channel.address.raw(), profile.circuit(index));
        }

        let power = PowerSequencer::new(HostLines::new(rail.clone()), POLARITY);
        let mut scheduler = DutyCycleScheduler::new(
            channels,
            power,
            bus,
            clock.clone(),
            DutyCycleConfig::default(),
        );
        scheduler.prime();

        Self {
            scheduler,
            history: ReportHistory::new(),
            clock,
            rail,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<ConsoleLine> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        match console::parse(trimmed) {
            Ok(Command::Run { cycles }) => self.run(cycles),
            Ok(Command::Status) => self.status(),
            Ok(Command::History) => self.history(),
            Ok(Command::Channels) => self.channels(),
            Ok(Command::Respond {
                address,
                status,
                payload,
            }) => self.respond(address, status, payload),
            Ok(Command::Unplug(address)) => self.set_attached(address, false),
            Ok(Command::Plug(address)) => self.set_attached(address, true),
            Ok(Command::Help(topic)) => help(topic),
            Err(err) => vec![ConsoleLine::new(
                Tone::Error,
                format!("ERR syntax {err} (try `help`)"),
            )],
        }
    }

    /// Runs `cycles` duty cycles and returns the report lines.
    pub fn run(&mut self, cycles: u32) -> Vec<ConsoleLine> {
        let mut sink = ConsoleSink {
            history: &mut self.history,
            clock: &self.clock,
            lines: Vec::new(),
        };
        for _ in 0..cycles {
            self.scheduler.run_cycle(&mut sink);
        }
        sink.lines
    }

    pub fn totals(&self) -> &CycleStats {
        self.scheduler.totals()
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now()
    }

    fn status(&self) -> Vec<ConsoleLine> {
        let totals = self.scheduler.totals();
        let config = self.scheduler.config();
        let mut lines = vec![
            ConsoleLine::plain(format!(
                "cycles={} elapsed={} period={} rail={}",
                totals.cycles,
                format_duration_short(self.clock.now()),
                format_duration_short(config.cycle_period(self.scheduler.channels().len())),
                if self.rail.is_on() { "on" } else { "off" },
            )),
            ConsoleLine::plain(format!(
                "records={} readings={} truncated={} failed={} not-ready={} no-data={} unknown={} malformed={} bus-faults={}",
                totals.records,
                totals.success,
                totals.truncated,
                totals.command_failed,
                totals.not_ready,
                totals.no_data,
                totals.unknown,
                totals.malformed,
                totals.bus_faults,
            )),
            ConsoleLine::plain(format!(
                "lines {}",
                describe_lines(self.scheduler.power().lines().levels())
            )),
        ];

        for channel in self.scheduler.channels() {
            let circuit = self.scheduler.transport().circuit(channel.address.raw());
            let state = match circuit {
                Some(circuit) if circuit.is_attached() => {
                    format!("attached scripted={}", circuit.pending())
                }
                Some(_) => "unplugged".to_string(),
                None => "absent".to_string(),
            };
            lines.push(ConsoleLine::plain(format!(
                "  {} @ {} {state}",
                channel.name, channel.address
            )));
        }
        lines
    }

    fn history(&self) -> Vec<ConsoleLine> {
        if self.history.is_empty() {
            return vec![ConsoleLine::plain("no reports yet")];
        }
        self.history
            .oldest_first()
            .map(|record| ConsoleLine::new(tone_for(record), format!("[cycle {}] {record}", record.cycle)))
            .collect()
    }

    fn channels(&self) -> Vec<ConsoleLine> {
        self.scheduler
            .channels()
            .iter()
            .map(|channel| ConsoleLine::plain(format!("{} @ {}", channel.name, channel.address)))
            .collect()
    }

    fn respond(&mut self, address: u8, status: u8, payload: &str) -> Vec<ConsoleLine> {
        let Some(address) = BusAddress::new(address) else {
            return vec![ConsoleLine::new(
                Tone::Error,
                format!("ERR address {address} is not a 7-bit bus address"),
            )];
        };
        let frame = Frame::new(status, payload.as_bytes());
        if self.scheduler.transport_mut().script(address.raw(), frame) {
            vec![ConsoleLine::plain(format!(
                "OK next response from {address}: {:?} {payload:?}",
                StatusCode::from_raw(status)
            ))]
        } else {
            vec![ConsoleLine::new(
                Tone::Error,
                format!("ERR no circuit at {address}"),
            )]
        }
    }

    fn set_attached(&mut self, address: u8, attached: bool) -> Vec<ConsoleLine> {
        if self.scheduler.transport_mut().set_attached(address, attached) {
            let verb = if attached { "plugged" } else { "unplugged" };
            vec![ConsoleLine::plain(format!("OK {verb} {address:#04x}"))]
        } else {
            vec![ConsoleLine::new(
                Tone::Error,
                format!("ERR no circuit at {address:#04x}"),
            )]
        }
    }
}

/// Collects report lines for one `run` and files records into the history.
struct ConsoleSink<'s, 'a> {
    history: &'s mut ReportHistory<'a>,
    clock: &'s VirtualClock,
    lines: Vec<ConsoleLine>,
}

impl<'a> ReportSink<'a> for ConsoleSink<'_, 'a> {
    fn report(&mut self, record: &ReportRecord<'a>) {
        self.history.push(record);
        self.lines.push(ConsoleLine::new(
            tone_for(record),
            format!("[+{:>9} ms] {record}", self.clock.now().as_millis()),
        ));
        if let Some(fault) = record.bus_fault {
            self.lines.push(ConsoleLine::new(
                Tone::Warning,
                format!("             bus fault on {}: {fault}", record.channel().address),
            ));
        }
    }

    fn cycle_complete(&mut self, cycle: u32, stats: &CycleStats) {
        self.lines.push(ConsoleLine::plain(format!(
            "cycle {cycle}: {} readings, {} errors, {} bus faults",
            stats.success,
            stats.errors(),
            stats.bus_faults
        )));
    }
}

fn tone_for(record: &ReportRecord<'_>) -> Tone {
    match record.message() {
        Outcome::Success {
            truncated: false, ..
        } => Tone::Reading,
        Outcome::Success { truncated: true, .. } | Outcome::CircuitNotReady => Tone::Warning,
        _ => Tone::Error,
    }
}

fn help(topic: Option<&str>) -> Vec<ConsoleLine> {
    match topic {
        Some(target) => match HELP_TOPICS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(target))
        {
            Some((_, detail)) => vec![ConsoleLine::plain(*detail)],
            None => vec![
                ConsoleLine::plain(format!("No help available for `{target}`.")),
                ConsoleLine::plain(format!("Available topics: {}", help_topic_list())),
            ],
        },
        None => {
            let mut lines = vec![ConsoleLine::plain("Available commands:")];
            lines.extend(
                HELP_TOPICS
                    .iter()
                    .map(|(_, detail)| ConsoleLine::plain(format!("  {detail}"))),
            );
            lines.push(ConsoleLine::plain(
                "Type `help <topic>` for a specific command.",
            ));
            lines
        }
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_lines(levels: &[Option<LineLevel>]) -> String {
    levels
        .iter()
        .enumerate()
        .map(|(index, level)| {
            let glyph = match level {
                Some(LineLevel::High) => 'H',
                Some(LineLevel::Low) => 'L',
                None => '-',
            };
            if index == POWER_LINE {
                format!("[{glyph}]")
            } else {
                glyph.to_string()
            }
        })
        .collect()
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
