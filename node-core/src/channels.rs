//! Channel catalog shared by firmware and host targets.
//!
//! A channel is one sensor circuit hanging off the shared I2C bus. The list is
//! validated once at startup and then stays immutable; its order drives both
//! the polling order and the report order of every duty cycle.

use core::fmt;

use heapless::Vec;

/// Largest number of circuits a single node polls.
pub const MAX_CHANNELS: usize = 8;

/// Highest valid 7-bit I2C address.
const MAX_BUS_ADDRESS: u8 = 0x7F;

/// 7-bit bus address of a sensor circuit.
///
/// The general-call address (`0x00`) and anything that does not fit in seven
/// bits are rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusAddress(u8);

impl BusAddress {
    /// Validates a raw address.
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if raw == 0 || raw > MAX_BUS_ADDRESS {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Returns the raw 7-bit address.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// One addressed sensor circuit and its display label.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel<'a> {
    pub address: BusAddress,
    pub name: &'a str,
}

impl<'a> Channel<'a> {
    #[must_use]
    pub const fn new(address: BusAddress, name: &'a str) -> Self {
        Self { address, name }
    }
}

const fn stock_channel(raw: u8, name: &'static str) -> Channel<'static> {
    match BusAddress::new(raw) {
        Some(address) => Channel::new(address, name),
        None => panic!("stock channel address out of range"),
    }
}

/// Conductivity circuit on the stock Tentacle wiring.
pub const EC_CHANNEL: Channel<'static> = stock_channel(100, "EC");
/// Temperature circuit on the stock Tentacle wiring.
pub const TEMP_CHANNEL: Channel<'static> = stock_channel(102, "TEMP");

/// Compile-time catalog matching the stock board wiring.
pub const DEFAULT_CHANNELS: [Channel<'static>; 2] = [EC_CHANNEL, TEMP_CHANNEL];

/// Reasons a channel list is refused at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelListError {
    /// No channels were supplied.
    Empty,
    /// More than [`MAX_CHANNELS`] channels were supplied.
    TooMany { count: usize },
    /// Two entries share the same bus address.
    DuplicateAddress(BusAddress),
    /// The entry at `index` has an empty display name.
    EmptyName { index: usize },
    /// A raw address could not be used as a 7-bit bus address.
    InvalidAddress(u8),
}

impl fmt::Display for ChannelListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelListError::Empty => f.write_str("at least one channel is required"),
            ChannelListError::TooMany { count } => {
                write!(f, "{count} channels configured, at most {MAX_CHANNELS} supported")
            }
            ChannelListError::DuplicateAddress(address) => {
                write!(f, "bus address {address} is used by more than one channel")
            }
            ChannelListError::EmptyName { index } => {
                write!(f, "channel #{index} has an empty name")
            }
            ChannelListError::InvalidAddress(raw) => {
                write!(f, "{raw} is not a valid 7-bit bus address")
            }
        }
    }
}

/// Validated, ordered list of 1 to [`MAX_CHANNELS`] channels.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelList<'a> {
    channels: Vec<Channel<'a>, MAX_CHANNELS>,
}

impl<'a> ChannelList<'a> {
    /// Validates `channels` and captures them in order.
    ///
    /// # Errors
    ///
    /// Fails when the list is empty or longer than [`MAX_CHANNELS`], when an
    /// entry has no name, or when two entries share a bus address.
    pub fn new(channels: &[Channel<'a>]) -> Result<Self, ChannelListError> {
        if channels.is_empty() {
            return Err(ChannelListError::Empty);
        }
        if channels.len() > MAX_CHANNELS {
            return Err(ChannelListError::TooMany {
                count: channels.len(),
            });
        }

        let mut list: Vec<Channel<'a>, MAX_CHANNELS> = Vec::new();
        for (index, channel) in channels.iter().enumerate() {
            if channel.name.is_empty() {
                return Err(ChannelListError::EmptyName { index });
            }
            if list.iter().any(|existing| existing.address == channel.address) {
                return Err(ChannelListError::DuplicateAddress(channel.address));
            }
            // Length was checked against the capacity above.
            let _ = list.push(*channel);
        }

        Ok(Self { channels: list })
    }

    /// Builds a list from raw `(address, name)` pairs.
    ///
    /// # Errors
    ///
    /// Fails with [`ChannelListError::InvalidAddress`] for a raw address that
    /// is not a 7-bit bus address, and otherwise as [`ChannelList::new`] does.
    pub fn from_pairs(pairs: &[(u8, &'a str)]) -> Result<Self, ChannelListError> {
        if pairs.len() > MAX_CHANNELS {
            return Err(ChannelListError::TooMany { count: pairs.len() });
        }

        let mut channels: Vec<Channel<'a>, MAX_CHANNELS> = Vec::new();
        for &(raw, name) in pairs {
            let address = BusAddress::new(raw).ok_or(ChannelListError::InvalidAddress(raw))?;
            let _ = channels.push(Channel::new(address, name));
        }

        Self::new(&channels)
    }

    /// The stock two-circuit configuration.
    #[must_use]
    pub fn stock() -> ChannelList<'static> {
        ChannelList {
            channels: Vec::from_iter(DEFAULT_CHANNELS),
        }
    }

    /// Channels in polling order.
    pub fn iter(&self) -> core::slice::Iter<'_, Channel<'a>> {
        self.channels.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Channel<'a>] {
        &self.channels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always `false`; an empty list never passes validation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Looks up the channel registered at `address`.
    #[must_use]
    pub fn find(&self, address: BusAddress) -> Option<&Channel<'a>> {
        self.channels
            .iter()
            .find(|channel| channel.address == address)
    }
}

impl<'l, 'a> IntoIterator for &'l ChannelList<'a> {
    type Item = &'l Channel<'a>;
    type IntoIter = core::slice::Iter<'l, Channel<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(raw: u8) -> BusAddress {
        BusAddress::new(raw).unwrap()
    }

    #[test]
    fn stock_catalog_matches_board_wiring() {
        let stock = ChannelList::stock();
        assert_eq!(stock.len(), 2);
        assert_eq!(stock.as_slice()[0].name, "EC");
        assert_eq!(stock.as_slice()[0].address.raw(), 100);
        assert_eq!(stock.as_slice()[1].name, "TEMP");
        assert_eq!(stock.as_slice()[1].address.raw(), 102);
    }

    #[test]
    fn bus_address_rejects_general_call_and_eight_bit_values() {
        assert!(BusAddress::new(0).is_none());
        assert!(BusAddress::new(0x80).is_none());
        assert_eq!(BusAddress::new(0x7F).map(BusAddress::raw), Some(0x7F));
    }

    #[test]
    fn list_preserves_configured_order() {
        let list = ChannelList::from_pairs(&[(3, "C"), (1, "A"), (2, "B")]).unwrap();
        let mut names = list.iter().map(|channel| channel.name);
        assert_eq!(names.next(), Some("C"));
        assert_eq!(names.next(), Some("A"));
        assert_eq!(names.next(), Some("B"));
        assert_eq!(names.next(), None);
    }

    #[test]
    fn list_rejects_empty_and_oversized_input() {
        assert_eq!(ChannelList::new(&[]), Err(ChannelListError::Empty));

        let nine = [Channel::new(address(1), "X"); 9];
        assert_eq!(
            ChannelList::new(&nine),
            Err(ChannelListError::TooMany { count: 9 })
        );
    }

    #[test]
    fn list_rejects_duplicate_addresses() {
        let result = ChannelList::from_pairs(&[(10, "PH"), (11, "ORP"), (10, "DO")]);
        assert_eq!(result, Err(ChannelListError::DuplicateAddress(address(10))));
    }

    #[test]
    fn list_rejects_unnamed_channels() {
        let result = ChannelList::from_pairs(&[(10, "PH"), (11, "")]);
        assert_eq!(result, Err(ChannelListError::EmptyName { index: 1 }));
    }

    #[test]
    fn list_rejects_out_of_range_addresses() {
        let result = ChannelList::from_pairs(&[(200, "PH")]);
        assert_eq!(result, Err(ChannelListError::InvalidAddress(200)));
    }

    #[test]
    fn full_list_of_eight_is_accepted() {
        let pairs = [
            (1, "A"),
            (2, "B"),
            (3, "C"),
            (4, "D"),
            (5, "E"),
            (6, "F"),
            (7, "G"),
            (8, "H"),
        ];
        let list = ChannelList::from_pairs(&pairs).unwrap();
        assert_eq!(list.len(), MAX_CHANNELS);
        assert_eq!(list.find(address(5)).map(|channel| channel.name), Some("E"));
        assert!(list.find(address(9)).is_none());
    }
}
