use std::collections::VecDeque;
use std::mem;

use chrono::{DateTime, Local};
use thiserror::Error;

use crate::channel::{Channel, ChannelSet};
use crate::measurement::Measurement;

pub const FRAME_HEADER: u8 = 0x42;

/// A measurement response carries up to seven big-endian u16 fields.
pub const MAX_PAYLOAD_LEN: usize = 14;

/// Read-measurement command: header, payload length, command byte, checksum.
pub const READ_MEASUREMENT: [u8; 4] = [FRAME_HEADER, 0x01, 0x01, 0x44];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid payload length {0}")]
    BadLength(usize),
    #[error("checksum mismatch: expected {expected:#04x}, got {got:#04x}")]
    Checksum { expected: u8, got: u8 },
}

/// Wrapping byte sum over header, length byte, and payload.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

#[derive(Debug, Clone, Copy)]
enum State {
    SeekHeader,
    ReadLength,
    ReadBody { payload_len: usize },
}

#[derive(Debug, PartialEq, Eq)]
pub enum Advance {
    /// Input exhausted; a partially collected frame stays suspended until
    /// more bytes arrive.
    NeedMoreData,
    /// A checksum-validated payload.
    Frame(Vec<u8>),
    /// A frame was dropped; scanning resumes on the byte after its header.
    Rejected(FrameError),
}

/// Incremental frame scanner. Bytes handed to [`FrameDecoder::extend`] are
/// consumed by [`FrameDecoder::advance`], which walks header search, length
/// check, body accumulation, and checksum validation. The decoder owns all
/// buffering needed to rescan after a false header, since the serial link
/// cannot un-read bytes.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    frame: Vec<u8>,
    pending: VecDeque<u8>,
}

impl Default for FrameDecoder {
    fn default() -> FrameDecoder {
        FrameDecoder::new()
    }
}

impl FrameDecoder {
    pub fn new() -> FrameDecoder {
        FrameDecoder {
            state: State::SeekHeader,
            frame: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }

    /// True once a header has been accepted and the frame is not complete.
    pub fn mid_frame(&self) -> bool {
        !self.frame.is_empty()
    }

    /// Abandon the frame in progress and return to header search. Buffered
    /// input that has not been consumed yet is kept.
    pub fn reset(&mut self) {
        self.frame.clear();
        self.state = State::SeekHeader;
    }

    pub fn advance(&mut self) -> Advance {
        while let Some(byte) = self.pending.pop_front() {
            match self.state {
                State::SeekHeader => {
                    if byte == FRAME_HEADER {
                        self.frame.push(byte);
                        self.state = State::ReadLength;
                    }
                }
                State::ReadLength => {
                    self.frame.push(byte);
                    let payload_len = byte as usize;
                    if payload_len == 0 || payload_len % 2 != 0 || payload_len > MAX_PAYLOAD_LEN {
                        return Advance::Rejected(self.reject(FrameError::BadLength(payload_len)));
                    }
                    self.state = State::ReadBody { payload_len };
                }
                State::ReadBody { payload_len } => {
                    self.frame.push(byte);
                    if self.frame.len() < 2 + payload_len + 1 {
                        continue;
                    }

                    let expected = checksum(&self.frame[..self.frame.len() - 1]);
                    let got = self.frame[self.frame.len() - 1];
                    if expected != got {
                        return Advance::Rejected(self.reject(FrameError::Checksum { expected, got }));
                    }

                    let payload = self.frame[2..2 + payload_len].to_vec();
                    self.frame.clear();
                    self.state = State::SeekHeader;
                    return Advance::Frame(payload);
                }
            }
        }

        Advance::NeedMoreData
    }

    /// Drop the false header and queue everything collected after it for
    /// rescanning, so a genuine frame overlapping the rejected one is still
    /// found.
    fn reject(&mut self, err: FrameError) -> FrameError {
        let collected = mem::take(&mut self.frame);
        for byte in collected[1..].iter().rev() {
            self.pending.push_front(*byte);
        }
        self.state = State::SeekHeader;
        err
    }
}

/// Decode a validated payload into per-channel values. The payload carries a
/// prefix of the full field order; channels beyond the prefix, or not
/// enabled, stay unset.
pub fn decode_measurement(
    timestamp: DateTime<Local>,
    payload: &[u8],
    enabled: ChannelSet,
) -> Measurement {
    let mut measurement = Measurement::empty(timestamp);
    for channel in Channel::ALL {
        let offset = channel.index() * 2;
        if offset + 2 > payload.len() {
            break;
        }
        if !enabled.contains(channel) {
            continue;
        }
        let raw = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        measurement.set(channel, raw as f32 * channel.scale());
    }
    measurement
}
