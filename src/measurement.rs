use chrono::{DateTime, Local};

use crate::channel::Channel;

/// One poll cycle's decoded values. A field is `Some` only if the channel is
/// enabled and the validated frame carried it.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub timestamp: DateTime<Local>,
    pub pm_1_0: Option<f32>,
    pub pm_2_5: Option<f32>,
    pub pm_4_0: Option<f32>,
    pub pm_10_0: Option<f32>,
    pub voc: Option<f32>,
    pub humidity: Option<f32>,
    pub temperature: Option<f32>,
}

impl Measurement {
    pub fn empty(timestamp: DateTime<Local>) -> Measurement {
        Measurement {
            timestamp,
            pm_1_0: None,
            pm_2_5: None,
            pm_4_0: None,
            pm_10_0: None,
            voc: None,
            humidity: None,
            temperature: None,
        }
    }

    pub fn get(&self, channel: Channel) -> Option<f32> {
        match channel {
            Channel::Pm1_0 => self.pm_1_0,
            Channel::Pm2_5 => self.pm_2_5,
            Channel::Pm4_0 => self.pm_4_0,
            Channel::Pm10_0 => self.pm_10_0,
            Channel::Voc => self.voc,
            Channel::Humidity => self.humidity,
            Channel::Temperature => self.temperature,
        }
    }

    pub fn set(&mut self, channel: Channel, value: f32) {
        let field = match channel {
            Channel::Pm1_0 => &mut self.pm_1_0,
            Channel::Pm2_5 => &mut self.pm_2_5,
            Channel::Pm4_0 => &mut self.pm_4_0,
            Channel::Pm10_0 => &mut self.pm_10_0,
            Channel::Voc => &mut self.voc,
            Channel::Humidity => &mut self.humidity,
            Channel::Temperature => &mut self.temperature,
        };
        *field = Some(value);
    }
}
