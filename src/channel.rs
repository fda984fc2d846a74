use std::fmt;

use serde::Deserialize;

/// One measured quantity of the SEN44, in the order its fields appear in a
/// measurement frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Channel {
    #[serde(rename = "pm_1_0")]
    Pm1_0,
    #[serde(rename = "pm_2_5")]
    Pm2_5,
    #[serde(rename = "pm_4_0")]
    Pm4_0,
    #[serde(rename = "pm_10_0")]
    Pm10_0,
    #[serde(rename = "voc")]
    Voc,
    #[serde(rename = "humidity")]
    Humidity,
    #[serde(rename = "temperature")]
    Temperature,
}

pub const CHANNEL_COUNT: usize = 7;

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Pm1_0,
        Channel::Pm2_5,
        Channel::Pm4_0,
        Channel::Pm10_0,
        Channel::Voc,
        Channel::Humidity,
        Channel::Temperature,
    ];

    pub fn index(self) -> usize {
        match self {
            Channel::Pm1_0 => 0,
            Channel::Pm2_5 => 1,
            Channel::Pm4_0 => 2,
            Channel::Pm10_0 => 3,
            Channel::Voc => 4,
            Channel::Humidity => 5,
            Channel::Temperature => 6,
        }
    }

    /// Multiplier applied to the raw 16-bit field to obtain the value in
    /// `unit()`.
    pub fn scale(self) -> f32 {
        match self {
            Channel::Pm1_0 | Channel::Pm2_5 | Channel::Pm4_0 | Channel::Pm10_0 => 0.01,
            Channel::Voc => 0.1,
            Channel::Humidity => 0.01,
            Channel::Temperature => 0.005,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Channel::Pm1_0 | Channel::Pm2_5 | Channel::Pm4_0 | Channel::Pm10_0 => "µg/m³",
            Channel::Voc => "VOC index",
            Channel::Humidity => "%RH",
            Channel::Temperature => "°C",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Pm1_0 => "pm_1_0",
            Channel::Pm2_5 => "pm_2_5",
            Channel::Pm4_0 => "pm_4_0",
            Channel::Pm10_0 => "pm_10_0",
            Channel::Voc => "voc",
            Channel::Humidity => "humidity",
            Channel::Temperature => "temperature",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of enabled channels, one bit per `Channel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSet(u8);

impl ChannelSet {
    pub fn new() -> ChannelSet {
        ChannelSet(0)
    }

    pub fn all() -> ChannelSet {
        Channel::ALL.iter().copied().collect()
    }

    pub fn insert(&mut self, channel: Channel) {
        self.0 |= 1 << channel.index();
    }

    pub fn contains(self, channel: Channel) -> bool {
        self.0 & (1 << channel.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL
            .into_iter()
            .filter(move |channel| self.contains(*channel))
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> ChannelSet {
        let mut set = ChannelSet::new();
        for channel in iter {
            set.insert(channel);
        }
        set
    }
}
