use std::time::Duration;

use anyhow::Context;
use rppal::uart::{Parity, Uart};

pub const BAUD_RATE: u32 = 115_200;
pub const PARITY: Parity = Parity::None;
pub const DATA_BITS: u8 = 8;
pub const STOP_BITS: u8 = 1;

/// Byte-oriented duplex serial link. Reads never block; bytes once read are
/// consumed, so any reassembly buffering belongs to the caller.
pub trait UartPort {
    /// Number of bytes waiting in the receive queue.
    fn available(&mut self) -> Result<usize, anyhow::Error>;

    /// Reads up to `buf.len()` bytes, returning how many were actually read.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, anyhow::Error>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error>;
}

#[derive(Debug)]
pub struct RppalUart {
    uart: Uart,
}

impl RppalUart {
    pub fn open(device: &str) -> Result<RppalUart, anyhow::Error> {
        let mut uart = Uart::with_path(device, BAUD_RATE, PARITY, DATA_BITS, STOP_BITS)
            .with_context(|| format!("Failed to open UART device {device}"))?;

        uart.set_read_mode(0, Duration::ZERO)
            .context("Failed to set non-blocking read mode")?;

        Ok(RppalUart { uart })
    }
}

impl UartPort for RppalUart {
    fn available(&mut self) -> Result<usize, anyhow::Error> {
        self.uart
            .input_len()
            .context("Failed to query UART input queue")
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, anyhow::Error> {
        self.uart.read(buf).context("Failed to read from UART")
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), anyhow::Error> {
        let written = self
            .uart
            .write(bytes)
            .context("Failed to write command to UART")?;
        if written != bytes.len() {
            return Err(anyhow::anyhow!(
                "Short UART write: {written} of {} bytes",
                bytes.len()
            ));
        }

        Ok(())
    }
}
