//! Simulated sensor circuits, rail, and clock for the host emulator.
//!
//! The rail is shared between [`HostLines`] and [`SimulatedBus`]: circuits
//! only answer while the power sequencer holds the rail on, the same way the
//! real circuits drop off the bus when their supply is cut.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use node_core::bus::BusTransport;
use node_core::channels::BusAddress;
use node_core::power::{IoLines, LineLevel, PowerPolarity};
use node_core::response::{STATUS_COMMAND_FAILED, STATUS_NOT_READY, STATUS_SUCCESS};

pub const LINE_COUNT: usize = 14;
pub const POWER_LINE: usize = 3;
pub const POLARITY: PowerPolarity = PowerPolarity::ActiveLow;

/// Why a simulated transfer was refused.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SimFault {
    /// No circuit at the address, or the circuit is unplugged.
    Nack,
    /// The rail is off, so nothing on the bus answers.
    Unpowered,
}

/// One scripted response: status byte followed by payload text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub status: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(status: u8, payload: &[u8]) -> Self {
        Self {
            status,
            payload: payload.to_vec(),
        }
    }

    pub fn reading(text: &str) -> Self {
        Self::new(STATUS_SUCCESS, text.as_bytes())
    }

    /// Bytes as they appear on the wire, NUL-terminated.
    fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.payload.len() + 2);
        bytes.push(self.status);
        bytes.extend_from_slice(&self.payload);
        bytes.push(0);
        bytes
    }
}

/// Behaviour of one circuit when nothing is scripted for it.
#[derive(Clone, Debug)]
enum Idle {
    /// Reading that drifts by `step` each time it is sampled.
    Drifting { base: f64, step: f64, precision: usize },
    /// Cycles through fixed frames.
    Rotating(Vec<Frame>),
}

#[derive(Clone, Debug)]
pub struct SimCircuit {
    idle: Idle,
    scripted: VecDeque<Frame>,
    attached: bool,
    armed: bool,
    samples: u32,
}

impl SimCircuit {
    pub fn drifting(base: f64, step: f64, precision: usize) -> Self {
        Self::with_idle(Idle::Drifting {
            base,
            step,
            precision,
        })
    }

    pub fn rotating(frames: Vec<Frame>) -> Self {
        Self::with_idle(Idle::Rotating(frames))
    }

    fn with_idle(idle: Idle) -> Self {
        Self {
            idle,
            scripted: VecDeque::new(),
            attached: true,
            armed: false,
            samples: 0,
        }
    }

    fn next_frame(&mut self) -> Frame {
        let sample = self.samples;
        self.samples = self.samples.wrapping_add(1);

        if let Some(frame) = self.scripted.pop_front() {
            return frame;
        }
        match &self.idle {
            Idle::Drifting {
                base,
                step,
                precision,
            } => {
                let value = base + step * f64::from(sample % 8);
                Frame::reading(&format!("{value:.precision$}"))
            }
            Idle::Rotating(frames) if !frames.is_empty() => {
                let index = usize::try_from(sample).unwrap_or(0) % frames.len();
                frames[index].clone()
            }
            Idle::Rotating(_) => Frame::new(node_core::response::STATUS_NO_DATA, b""),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn pending(&self) -> usize {
        self.scripted.len()
    }
}

/// Stock circuits for a named profile.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Profile {
    /// Every circuit answers with a reading.
    Nominal,
    /// Circuits answer with the whole range of error statuses.
    Faulty,
}

impl Profile {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("nominal") {
            Ok(Self::Nominal)
        } else if tag.eq_ignore_ascii_case("faulty") {
            Ok(Self::Faulty)
        } else {
            Err(format!("Unknown circuit profile `{tag}`"))
        }
    }

    /// Circuit placed behind the `index`-th configured channel.
    pub fn circuit(self, index: usize) -> SimCircuit {
        match (self, index % 2) {
            (Profile::Nominal, 0) => SimCircuit::drifting(1413.0, 1.5, 1),
            (Profile::Nominal, _) => SimCircuit::drifting(21.875, 0.125, 3),
            (Profile::Faulty, 0) => SimCircuit::rotating(vec![
                Frame::new(STATUS_NOT_READY, b""),
                Frame::reading("1409.2"),
                Frame::new(STATUS_COMMAND_FAILED, b""),
                Frame::new(7, b""),
            ]),
            (Profile::Faulty, _) => SimCircuit::rotating(vec![
                Frame::reading("22.000"),
                Frame::reading(&"9".repeat(40)),
                Frame::new(STATUS_SUCCESS, &[0xB0, b'C']),
            ]),
        }
    }
}

/// Shared view of the switched rail.
#[derive(Clone, Debug, Default)]
pub struct Rail(Rc<Cell<bool>>);

impl Rail {
    pub fn is_on(&self) -> bool {
        self.0.get()
    }

    fn set(&self, on: bool) {
        self.0.set(on);
    }
}

/// Managed lines of the emulated board.
pub struct HostLines {
    levels: [Option<LineLevel>; LINE_COUNT],
    rail: Rail,
}

impl HostLines {
    pub fn new(rail: Rail) -> Self {
        Self {
            levels: [None; LINE_COUNT],
            rail,
        }
    }

    pub fn levels(&self) -> &[Option<LineLevel>; LINE_COUNT] {
        &self.levels
    }
}

impl IoLines for HostLines {
    fn line_count(&self) -> usize {
        LINE_COUNT
    }

    fn power_line(&self) -> usize {
        POWER_LINE
    }

    fn drive(&mut self, index: usize, level: LineLevel) {
        if let Some(slot) = self.levels.get_mut(index) {
            *slot = Some(level);
        }
        if index == POWER_LINE {
            self.rail.set(level == POLARITY.on_level());
        }
    }
}

/// Bus of simulated circuits keyed by address.
pub struct SimulatedBus {
    circuits: BTreeMap<u8, SimCircuit>,
    rail: Rail,
}

impl SimulatedBus {
    pub fn new(rail: Rail) -> Self {
        Self {
            circuits: BTreeMap::new(),
            rail,
        }
    }

    pub fn attach(&mut self, address: u8, circuit: SimCircuit) {
        self.circuits.insert(address, circuit);
    }

    /// Queues `frame` as the next response from `address`.
    pub fn script(&mut self, address: u8, frame: Frame) -> bool {
        self.circuits
            .get_mut(&address)
            .map(|circuit| circuit.scripted.push_back(frame))
            .is_some()
    }

    pub fn set_attached(&mut self, address: u8, attached: bool) -> bool {
        self.circuits
            .get_mut(&address)
            .map(|circuit| circuit.attached = attached)
            .is_some()
    }

    pub fn circuit(&self, address: u8) -> Option<&SimCircuit> {
        self.circuits.get(&address)
    }

    fn reachable(&mut self, address: BusAddress) -> Result<&mut SimCircuit, SimFault> {
        if !self.rail.is_on() {
            return Err(SimFault::Unpowered);
        }
        match self.circuits.get_mut(&address.raw()) {
            Some(circuit) if circuit.attached => Ok(circuit),
            _ => Err(SimFault::Nack),
        }
    }
}

impl BusTransport for SimulatedBus {
    type Error = SimFault;

    fn write(&mut self, address: BusAddress, _bytes: &[u8]) -> Result<(), SimFault> {
        let circuit = self.reachable(address)?;
        circuit.armed = true;
        Ok(())
    }

    fn read(&mut self, address: BusAddress, buffer: &mut [u8]) -> Result<usize, SimFault> {
        let circuit = self.reachable(address)?;
        if !std::mem::take(&mut circuit.armed) {
            return Ok(0);
        }

        // A real master clocks out the whole request; the tail reads as NUL.
        buffer.fill(0);
        let wire = circuit.next_frame().wire_bytes();
        let count = wire.len().min(buffer.len());
        buffer[..count].copy_from_slice(&wire[..count]);
        Ok(buffer.len())
    }
}

/// Delay that advances a virtual clock instead of sleeping.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock(Rc<Cell<Duration>>);

impl VirtualClock {
    pub fn now(&self) -> Duration {
        self.0.get()
    }

    fn advance(&self, by: Duration) {
        self.0.set(self.0.get().saturating_add(by));
    }
}

impl DelayNs for VirtualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(Duration::from_micros(u64::from(us)));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(raw: u8) -> BusAddress {
        BusAddress::new(raw).unwrap()
    }

    fn powered_bus() -> (SimulatedBus, HostLines) {
        let rail = Rail::default();
        let mut lines = HostLines::new(rail.clone());
        lines.drive(POWER_LINE, POLARITY.on_level());
        (SimulatedBus::new(rail), lines)
    }

    #[test]
    fn circuits_only_answer_while_the_rail_is_on() {
        let (mut bus, mut lines) = powered_bus();
        bus.attach(100, SimCircuit::drifting(1.0, 0.0, 1));
        assert_eq!(bus.write(address(100), b"r"), Ok(()));

        lines.drive(POWER_LINE, POLARITY.off_level());
        assert_eq!(bus.write(address(100), b"r"), Err(SimFault::Unpowered));
    }

    #[test]
    fn scripted_frames_take_priority_and_are_nul_terminated() {
        let (mut bus, _lines) = powered_bus();
        bus.attach(102, SimCircuit::drifting(20.0, 0.0, 2));
        assert!(bus.script(102, Frame::new(STATUS_NOT_READY, b"")));

        let mut frame = [0xAA; 8];
        bus.write(address(102), b"r").unwrap();
        assert_eq!(bus.read(address(102), &mut frame), Ok(8));
        assert_eq!(frame[..2], [STATUS_NOT_READY, 0]);

        bus.write(address(102), b"r").unwrap();
        bus.read(address(102), &mut frame).unwrap();
        assert_eq!(&frame[..7], b"\x0120.00\0");
        assert_eq!(bus.circuit(102).map(SimCircuit::pending), Some(0));
    }

    #[test]
    fn read_without_command_supplies_nothing() {
        let (mut bus, _lines) = powered_bus();
        bus.attach(100, SimCircuit::drifting(1.0, 0.0, 1));
        let mut frame = [0u8; 4];
        assert_eq!(bus.read(address(100), &mut frame), Ok(0));
    }

    #[test]
    fn unplugged_circuit_nacks() {
        let (mut bus, _lines) = powered_bus();
        bus.attach(100, SimCircuit::drifting(1.0, 0.0, 1));
        assert!(bus.set_attached(100, false));
        assert_eq!(bus.write(address(100), b"r"), Err(SimFault::Nack));
        assert_eq!(bus.write(address(101), b"r"), Err(SimFault::Nack));
        assert!(!bus.set_attached(101, false));
    }

    #[test]
    fn virtual_clock_accumulates_delays() {
        let clock = VirtualClock::default();
        let mut delay = clock.clone();
        delay.delay_ms(1_500);
        delay.delay_us(250);
        assert_eq!(clock.now(), Duration::from_micros(1_500_250));
    }

    #[test]
    fn profiles_parse_case_insensitively() {
        assert_eq!(Profile::from_tag("Faulty"), Ok(Profile::Faulty));
        assert!(Profile::from_tag("broken").is_err());
    }
}
