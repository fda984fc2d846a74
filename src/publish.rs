use crate::channel::{CHANNEL_COUNT, Channel};
use crate::measurement::Measurement;

/// Consumer of one channel's values; identity and lifetime belong to the
/// caller that registers it.
pub trait Listener: Send {
    fn publish(&mut self, value: f32);
}

/// Per-channel listener slots, indexed by `Channel`. A channel holds zero or
/// one listener; channels without one are decoded but never published.
pub struct MeasurementPublisher {
    slots: [Option<Box<dyn Listener>>; CHANNEL_COUNT],
}

impl Default for MeasurementPublisher {
    fn default() -> MeasurementPublisher {
        MeasurementPublisher::new()
    }
}

impl MeasurementPublisher {
    pub fn new() -> MeasurementPublisher {
        MeasurementPublisher {
            slots: Default::default(),
        }
    }

    /// Installs the listener for `channel`, replacing any previous one.
    pub fn bind(&mut self, channel: Channel, listener: Box<dyn Listener>) {
        self.slots[channel.index()] = Some(listener);
    }

    /// Forwards every decoded value in `measurement` to its bound listener.
    pub fn publish(&mut self, measurement: &Measurement) {
        for channel in Channel::ALL {
            if let (Some(listener), Some(value)) =
                (&mut self.slots[channel.index()], measurement.get(channel))
            {
                listener.publish(value);
            }
        }
    }
}
