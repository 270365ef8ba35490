//! Bus transport seam and the per-channel poll transaction.
//!
//! [`BusTransport`] is the only thing the poller knows about the wire. The
//! firmware backs it with the blocking Embassy I2C driver through
//! [`I2cTransport`]; the emulator and the tests back it with scripted fakes.

use core::fmt;
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use heapless::Vec;

use crate::channels::{BusAddress, Channel};
use crate::scheduler::wait;

/// Command byte asking a circuit to take a single reading.
pub const READ_COMMAND: u8 = b'r';
/// Bytes requested from a circuit per read. Larger than the usable payload on purpose.
pub const RESPONSE_BYTE_BUDGET: usize = 48;
/// Usable payload bytes retained per response.
pub const READ_BUFFER_CAPACITY: usize = 30;
/// Time a circuit needs between the read command and a valid response.
pub const COMMAND_SETTLE: Duration = Duration::from_secs(1);

const PAYLOAD_TERMINATOR: u8 = 0x00;

/// Addressed byte transport shared by every channel on the bus.
pub trait BusTransport {
    /// Transport-specific failure.
    type Error;

    /// Writes `bytes` to the device at `address`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the device does not acknowledge.
    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Requests up to `buffer.len()` bytes from `address`.
    ///
    /// Returns how many bytes the device actually supplied; the remainder of
    /// `buffer` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the transport's error when the device does not acknowledge.
    fn read(&mut self, address: BusAddress, buffer: &mut [u8]) -> Result<usize, Self::Error>;
}

impl<T: BusTransport + ?Sized> BusTransport for &mut T {
    type Error = T::Error;

    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write(self, address, bytes)
    }

    fn read(&mut self, address: BusAddress, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        T::read(self, address, buffer)
    }
}

/// [`BusTransport`] over any blocking `embedded-hal` I2C master.
///
/// An I2C master clocks out every byte it asks for, so reads always report
/// the full request; circuits pad the tail with NUL bytes.
pub struct I2cTransport<I> {
    i2c: I,
}

impl<I> I2cTransport<I> {
    pub const fn new(i2c: I) -> Self {
        Self { i2c }
    }
}

impl<I: I2c> BusTransport for I2cTransport<I> {
    type Error = I::Error;

    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.i2c.write(address.raw(), bytes)
    }

    fn read(&mut self, address: BusAddress, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        self.i2c.read(address.raw(), buffer)?;
        Ok(buffer.len())
    }
}

/// Phase of a poll transaction that failed on the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusFault {
    /// The read command was not acknowledged.
    Write,
    /// The response request was not acknowledged.
    Read,
    /// The circuit acknowledged but supplied no status byte.
    Empty,
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusFault::Write => f.write_str("command write failed"),
            BusFault::Read => f.write_str("response read failed"),
            BusFault::Empty => f.write_str("empty response"),
        }
    }
}

/// Payload scratch space for one poll.
///
/// Holds at most [`READ_BUFFER_CAPACITY`] bytes. Bytes beyond the capacity
/// are dropped, never written, and the buffer remembers that it overflowed so
/// the truncation can be reported.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadBuffer {
    bytes: Vec<u8, READ_BUFFER_CAPACITY>,
    overflowed: bool,
}

impl ReadBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            overflowed: false,
        }
    }

    /// Empties the buffer and clears the overflow flag.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.overflowed = false;
    }

    /// Appends payload bytes up to the first NUL terminator.
    ///
    /// Returns the number of bytes stored. The terminator and anything after
    /// it are discarded.
    pub fn load(&mut self, payload: &[u8]) -> usize {
        let before = self.bytes.len();
        for &byte in payload {
            if byte == PAYLOAD_TERMINATOR {
                break;
            }
            if self.bytes.push(byte).is_err() {
                self.overflowed = true;
                break;
            }
        }
        self.bytes.len() - before
    }

    /// Builds a buffer from a raw payload in one step.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut buffer = Self::new();
        buffer.load(payload);
        buffer
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` when payload bytes were dropped for lack of space.
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }
}

/// Issues the read command to one channel and collects its response.
pub struct BusPoller<T> {
    transport: T,
    command_settle: Duration,
}

impl<T: BusTransport> BusPoller<T> {
    /// Creates a poller using the standard [`COMMAND_SETTLE`] delay.
    pub const fn new(transport: T) -> Self {
        Self::with_settle(transport, COMMAND_SETTLE)
    }

    pub const fn with_settle(transport: T, command_settle: Duration) -> Self {
        Self {
            transport,
            command_settle,
        }
    }

    /// Polls `channel`, leaving its payload in `buffer`.
    ///
    /// The buffer is cleared first. On success the status byte is returned
    /// and `buffer` holds the payload up to the terminator. The command-settle
    /// delay is always observed, even when the command write fails, so every
    /// channel costs the same time per cycle.
    ///
    /// # Errors
    ///
    /// Returns the [`BusFault`] naming the phase that failed: the command
    /// write, the response read, or a read that produced no status byte.
    pub fn poll<D: DelayNs>(
        &mut self,
        channel: &Channel<'_>,
        buffer: &mut ReadBuffer,
        delay: &mut D,
    ) -> Result<u8, BusFault> {
        buffer.clear();

        let written = self.transport.write(channel.address, &[READ_COMMAND]);
        wait(delay, self.command_settle);
        written.map_err(|_| BusFault::Write)?;

        let mut frame = [0u8; RESPONSE_BYTE_BUDGET];
        let received = self
            .transport
            .read(channel.address, &mut frame)
            .map_err(|_| BusFault::Read)?
            .min(RESPONSE_BYTE_BUDGET);

        let Some((&status, payload)) = frame[..received].split_first() else {
            return Err(BusFault::Empty);
        };
        buffer.load(payload);
        Ok(status)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
