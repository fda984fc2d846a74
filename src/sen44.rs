use std::time::Instant;

use chrono::Local;

use crate::config::SensorConfig;
use crate::frame::{self, Advance, FrameDecoder, READ_MEASUREMENT};
use crate::measurement::Measurement;
use crate::publish::MeasurementPublisher;
use crate::uart::UartPort;

/// Reported health of the sensor link. Flips to `Unavailable` after the
/// configured number of consecutive poll failures and back on the next
/// successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
}

/// SEN44 driver. One cooperative [`Sen44::service`] call drains the UART,
/// advances the frame decoder, publishes decoded records, and handles the
/// poll and timeout deadlines. The caller supplies the clock and is the
/// only context advancing the driver.
pub struct Sen44<U> {
    uart: U,
    config: SensorConfig,
    decoder: FrameDecoder,
    publisher: MeasurementPublisher,
    next_poll: Instant,
    response_deadline: Option<Instant>,
    partial_since: Option<Instant>,
    consecutive_failures: u32,
    availability: Availability,
}

impl<U: UartPort> Sen44<U> {
    pub fn new(
        uart: U,
        config: SensorConfig,
        publisher: MeasurementPublisher,
        now: Instant,
    ) -> Sen44<U> {
        Sen44 {
            uart,
            config,
            decoder: FrameDecoder::new(),
            publisher,
            next_poll: now,
            response_deadline: None,
            partial_since: None,
            consecutive_failures: 0,
            availability: Availability::Available,
        }
    }

    pub fn availability(&self) -> Availability {
        self.availability
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Runs one cooperative cycle. Returns the measurement decoded during
    /// this call, if any.
    pub fn service(&mut self, now: Instant) -> Result<Option<Measurement>, anyhow::Error> {
        // A partial frame may survive across calls, but not past one poll
        // period. Expired partials are dropped before new bytes arrive so
        // late data cannot resurrect them.
        if let Some(since) = self.partial_since {
            if now.duration_since(since) >= self.config.poll_interval {
                log::debug!("Abandoning stale partial frame");
                self.decoder.reset();
                self.partial_since = None;
            }
        }

        self.drain_uart()?;

        let mut measurement = None;
        loop {
            match self.decoder.advance() {
                Advance::Frame(payload) => {
                    let record =
                        frame::decode_measurement(Local::now(), &payload, self.config.channels);
                    self.publisher.publish(&record);
                    self.note_success();
                    measurement = Some(record);
                }
                Advance::Rejected(err) => {
                    log::debug!("Dropped frame: {err}");
                }
                Advance::NeedMoreData => break,
            }
        }

        if self.decoder.mid_frame() {
            if self.partial_since.is_none() {
                self.partial_since = Some(now);
            }
        } else {
            self.partial_since = None;
        }

        // A suspended frame is still a response in progress; the deadline
        // only fires once the decoder is back at header search.
        if let Some(deadline) = self.response_deadline {
            if now >= deadline && !self.decoder.mid_frame() {
                self.response_deadline = None;
                self.note_failure();
            }
        }

        if now >= self.next_poll {
            self.tick(now)?;
        }

        Ok(measurement)
    }

    fn drain_uart(&mut self) -> Result<(), anyhow::Error> {
        let mut buf = [0u8; 64];
        while self.uart.available()? > 0 {
            let n = self.uart.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.decoder.extend(&buf[..n]);
        }
        Ok(())
    }

    fn tick(&mut self, now: Instant) -> Result<(), anyhow::Error> {
        while self.next_poll <= now {
            self.next_poll += self.config.poll_interval;
        }

        if self.decoder.mid_frame() {
            return Ok(());
        }

        self.uart.write(&READ_MEASUREMENT)?;
        self.response_deadline = Some(now + self.config.response_timeout);
        Ok(())
    }

    fn note_success(&mut self) {
        self.consecutive_failures = 0;
        self.response_deadline = None;
        self.availability = Availability::Available;
    }

    fn note_failure(&mut self) {
        self.consecutive_failures += 1;
        log::warn!(
            "No valid response from SEN44 ({} consecutive failures)",
            self.consecutive_failures
        );
        if self.consecutive_failures >= self.config.failure_threshold {
            self.availability = Availability::Unavailable;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::channel::{Channel, ChannelSet};
    use crate::frame::{FRAME_HEADER, checksum};
    use crate::publish::Listener;

    #[derive(Default)]
    struct FakeUartState {
        rx: VecDeque<u8>,
        tx: Vec<Vec<u8>>,
    }

    #[derive(Clone, Default)]
    struct FakeUart {
        state: Arc<Mutex<FakeUartState>>,
    }

    impl FakeUart {
        fn push_rx(&self, bytes: &[u8]) {
            self.state
                .lock()
                .expect("fake uart mutex poisoned")
                .rx
                .extend(bytes.iter().copied());
        }

        fn tx(&self) -> Vec<Vec<u8>> {
            self.state
                .lock()
                .expect("fake uart mutex poisoned")
                .tx
                .clone()
        }
    }

    impl UartPort for FakeUart {
        fn available(&mut self) -> Result<usize, anyhow::Error> {
            Ok(self.state.lock().expect("fake uart mutex poisoned").rx.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, anyhow::Error> {
            let mut state = self.state.lock().expect("fake uart mutex poisoned");
            let mut n = 0;
            while n < buf.len() {
                match state.rx.pop_front() {
                    Some(byte) => {
                        buf[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error> {
            self.state
                .lock()
                .expect("fake uart mutex poisoned")
                .tx
                .push(bytes.to_vec());
            Ok(())
        }
    }

    struct Recorder {
        channel: Channel,
        values: Arc<Mutex<Vec<(Channel, f32)>>>,
    }

    impl Listener for Recorder {
        fn publish(&mut self, value: f32) {
            self.values
                .lock()
                .expect("recorder mutex poisoned")
                .push((self.channel, value));
        }
    }

    fn encode_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![FRAME_HEADER, payload.len() as u8];
        frame.extend_from_slice(payload);
        frame.push(checksum(&frame));
        frame
    }

    fn test_config(channels: ChannelSet) -> SensorConfig {
        SensorConfig {
            uart_device: "/dev/serial0".to_string(),
            poll_interval: Duration::from_secs(60),
            response_timeout: Duration::from_millis(300),
            failure_threshold: 3,
            channels,
        }
    }

    struct Harness {
        driver: Sen44<FakeUart>,
        uart: FakeUart,
        published: Arc<Mutex<Vec<(Channel, f32)>>>,
        t0: Instant,
    }

    fn harness(bound: &[Channel]) -> Harness {
        let uart = FakeUart::default();
        let published = Arc::new(Mutex::new(Vec::new()));
        let mut publisher = MeasurementPublisher::new();
        for channel in bound {
            publisher.bind(
                *channel,
                Box::new(Recorder {
                    channel: *channel,
                    values: Arc::clone(&published),
                }),
            );
        }
        let t0 = Instant::now();
        let driver = Sen44::new(
            uart.clone(),
            test_config(ChannelSet::all()),
            publisher,
            t0,
        );
        Harness {
            driver,
            uart,
            published,
            t0,
        }
    }

    fn at(h: &Harness, offset: Duration) -> Instant {
        h.t0 + offset
    }

    const PAYLOAD: [u8; 8] = [0x00, 0x64, 0x00, 0xC8, 0x01, 0x2C, 0x01, 0x90];

    #[test]
    fn test_first_service_sends_request() {
        let mut h = harness(&[]);
        let measurement = h.driver.service(h.t0).unwrap();
        assert_eq!(measurement, None);
        assert_eq!(h.uart.tx(), vec![READ_MEASUREMENT.to_vec()]);
    }

    #[test]
    fn test_response_is_decoded_and_published() {
        let mut h = harness(&[Channel::Pm1_0, Channel::Pm2_5]);
        h.driver.service(h.t0).unwrap();

        h.uart.push_rx(&encode_frame(&PAYLOAD));
        let measurement = h
            .driver
            .service(at(&h, Duration::from_millis(50)))
            .unwrap()
            .expect("frame should decode");

        assert_eq!(measurement.pm_1_0, Some(1.0));
        assert_eq!(measurement.pm_2_5, Some(2.0));
        assert_eq!(measurement.voc, None);

        let published = h.published.lock().expect("recorder mutex poisoned").clone();
        assert_eq!(
            published,
            vec![(Channel::Pm1_0, 1.0), (Channel::Pm2_5, 2.0)]
        );
        assert_eq!(h.driver.availability(), Availability::Available);
    }

    #[test]
    fn test_noise_before_frame_still_decodes() {
        let mut h = harness(&[]);
        h.driver.service(h.t0).unwrap();

        let mut bytes = vec![0x13, 0x37, FRAME_HEADER];
        bytes.extend_from_slice(&encode_frame(&PAYLOAD));
        h.uart.push_rx(&bytes);

        let measurement = h.driver.service(at(&h, Duration::from_millis(50))).unwrap();
        assert!(measurement.is_some());
    }

    #[test]
    fn test_split_response_decodes_across_services() {
        let mut h = harness(&[]);
        h.driver.service(h.t0).unwrap();

        let frame = encode_frame(&PAYLOAD);
        let (first, second) = frame.split_at(5);

        h.uart.push_rx(first);
        assert_eq!(
            h.driver.service(at(&h, Duration::from_millis(50))).unwrap(),
            None
        );

        h.uart.push_rx(second);
        let measurement = h
            .driver
            .service(at(&h, Duration::from_millis(100)))
            .unwrap()
            .expect("suspended frame should resume");
        assert_eq!(measurement.pm_1_0, Some(1.0));
        assert_eq!(h.driver.consecutive_failures(), 0);
    }

    #[test]
    fn test_request_not_resent_while_frame_suspended() {
        let mut h = harness(&[]);
        h.driver.service(h.t0).unwrap();

        let frame = encode_frame(&PAYLOAD);
        h.uart.push_rx(&frame[..5]);
        h.driver
            .service(at(&h, Duration::from_millis(50)))
            .unwrap();

        // Poll tick fires with the frame still suspended within its
        // staleness bound: no second request.
        h.driver.service(at(&h, Duration::from_secs(60))).unwrap();
        assert_eq!(h.uart.tx().len(), 1);
    }

    #[test]
    fn test_stale_partial_is_abandoned_and_next_frame_decodes() {
        let mut h = harness(&[]);
        h.driver.service(h.t0).unwrap();

        let frame = encode_frame(&PAYLOAD);
        h.uart.push_rx(&frame[..5]);
        h.driver
            .service(at(&h, Duration::from_millis(50)))
            .unwrap();

        // One poll period after the partial appeared it is dropped, and the
        // pending response deadline finally counts as a failure.
        h.driver.service(at(&h, Duration::from_secs(61))).unwrap();
        assert_eq!(h.driver.consecutive_failures(), 1);

        // The late remainder is noise now; a complete fresh frame decodes.
        h.uart.push_rx(&frame[5..]);
        h.uart.push_rx(&encode_frame(&PAYLOAD));
        let measurement = h
            .driver
            .service(at(&h, Duration::from_secs(62)))
            .unwrap();
        assert!(measurement.is_some());
        assert_eq!(h.driver.consecutive_failures(), 0);
    }

    #[test]
    fn test_consecutive_timeouts_flip_availability() {
        let mut h = harness(&[]);

        for cycle in 0..3u64 {
            let tick = Duration::from_secs(cycle * 60);
            h.driver.service(at(&h, tick)).unwrap();
            h.driver
                .service(at(&h, tick + Duration::from_millis(400)))
                .unwrap();
            assert_eq!(h.driver.consecutive_failures(), cycle as u32 + 1);
        }
        assert_eq!(h.driver.availability(), Availability::Unavailable);
        assert_eq!(h.uart.tx().len(), 3);

        // A successful decode recovers immediately.
        h.driver.service(at(&h, Duration::from_secs(180))).unwrap();
        h.uart.push_rx(&encode_frame(&PAYLOAD));
        let measurement = h
            .driver
            .service(at(&h, Duration::from_secs(181)))
            .unwrap();
        assert!(measurement.is_some());
        assert_eq!(h.driver.availability(), Availability::Available);
        assert_eq!(h.driver.consecutive_failures(), 0);
    }

    #[test]
    fn test_corrupt_response_counts_via_deadline() {
        let mut h = harness(&[]);
        h.driver.service(h.t0).unwrap();

        let mut corrupted = encode_frame(&PAYLOAD);
        corrupted[3] ^= 0x01;
        h.uart.push_rx(&corrupted);

        let measurement = h
            .driver
            .service(at(&h, Duration::from_millis(400)))
            .unwrap();
        assert_eq!(measurement, None);
        assert_eq!(h.driver.consecutive_failures(), 1);
    }
}
