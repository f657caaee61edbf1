//! Sensorimotor serial bootloader and addressing client.
//!
//! Boards share a half-duplex serial bus and are selected by a 7-bit board id.
//! Two protocols run over the bus:
//!
//! - the bootloader protocol, length-prefixed packets used to identify and
//!   re-flash a board one page at a time ([`bootloader`]).
//! - the addressing protocol, fixed length sequences understood by the
//!   application firmware for discovery and id reassignment ([`addressing`]).
//!
//! Both share sync bytes and a two's complement checksum ([`codec`]).

use core::marker::PhantomData;

#[macro_use]
extern crate log;

#[macro_use(block)]
extern crate nb;

extern crate embedded_hal;
use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

#[cfg(feature = "structopt")]
extern crate structopt;

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

pub mod addressing;
pub mod bootloader;
pub mod codec;
pub mod device;
pub mod firmware;
pub mod paging;
pub mod protocol;
pub mod transaction;

#[cfg(test)]
mod mock;

pub use device::DeviceProfile;
pub use protocol::{BoardId, Command, MAX_PAGE_SIZE};
pub use transaction::Reply;

/// Serial port abstraction, any non-blocking embedded-hal byte port
pub trait SerialPort<E>: Write<u8, Error = E> + Read<u8, Error = E> {}

impl<T, E> SerialPort<E> for T where T: Write<u8, Error = E> + Read<u8, Error = E> {}

/// Coarse mode of the board being programmed
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum State {
    /// Running (or assumed to be running) the application firmware
    Application,
    /// Bootloader started and accepting commands
    Bootloader,
}

/// Failures that are detected before or outside of a device round trip
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("invalid board id '{0}', expected 0..127")]
    InvalidBoardId(String),

    #[error("device '{0}' is not supported, supported devices: {}", device::supported().join(", "))]
    UnknownDevice(String),

    #[error("unable to read firmware file '{path}': {kind:?}")]
    Firmware {
        path: String,
        kind: std::io::ErrorKind,
    },

    #[error("failed to convert ELF file '{0}' to binary")]
    Conversion(String),

    #[error("firmware image is empty")]
    EmptyImage,

    #[error("page size of {0} bytes is not supported, expected 1..={}", MAX_PAGE_SIZE)]
    InvalidPageSize(usize),

    #[error("board id {0} is already in use")]
    IdInUse(BoardId),
}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum Error<SerialError> {
    #[error("serial error: {0:?}")]
    Serial(SerialError),

    /// No valid frame within the receive budget
    #[error("no valid response (timeout)")]
    ResponseTimeout,

    /// Frame did not match, absorbed by resynchronisation
    #[error("invalid frame")]
    InvalidFrame,

    #[error("request rejected by device")]
    Rejected,

    #[error("unknown response: {0:02x?}")]
    UnknownReply(Vec<u8>),

    #[error("payload of {0} bytes exceeds packet limit")]
    PayloadTooLarge(usize),

    /// Flashing stopped part way, the device holds a mix of old and new pages
    #[error("flashing aborted after {written} of {total} bytes: {cause:?}")]
    PartialFlash {
        written: usize,
        total: usize,
        cause: Box<Error<SerialError>>,
    },

    #[error("{0}")]
    Precondition(PreconditionError),
}

impl<SerialError> From<SerialError> for Error<SerialError> {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}

impl<SerialError> Error<SerialError> {
    /// Whether the failure was detected without the device being at fault
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition(_))
    }
}

#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Timeout to wait for each byte of a bootloader response
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1000"))]
    pub response_timeout_ms: u32,

    /// Timeout to wait for each byte of an addressing response
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "100"))]
    pub ping_timeout_ms: u32,

    /// Period to poll for incoming bytes
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "1"))]
    pub poll_delay_ms: u32,

    /// Period to wait for the bootloader to settle once started
    #[cfg_attr(feature = "structopt", structopt(long, default_value = "100"))]
    pub start_delay_ms: u32,

    /// Log raw frames sent and received
    #[cfg_attr(feature = "structopt", structopt(long))]
    pub log_frames: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            response_timeout_ms: 1000,
            ping_timeout_ms: 100,
            poll_delay_ms: 1,
            start_delay_ms: 100,
            log_frames: false,
        }
    }
}

pub struct Programmer<P, D, E> {
    state: State,
    options: Options,
    port: P,
    delay: D,
    _err: PhantomData<E>,
}

impl<P, D, E> Programmer<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Create a new programmer instance
    pub fn new(port: P, delay: D, options: Options) -> Self {
        Self {
            state: State::Application,
            options,
            port,
            delay,
            _err: PhantomData,
        }
    }

    /// Fetch the programmer state
    pub fn state(&self) -> State {
        self.state
    }

    /// Fetch the programmer options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Release the underlying port and delay
    pub fn free(self) -> (P, D) {
        (self.port, self.delay)
    }

    /// Read a single byte, waiting at most `timeout_ms`
    pub fn read_byte(&mut self, timeout_ms: u32) -> Result<u8, Error<E>> {
        let poll = self.options.poll_delay_ms.max(1);
        let mut t = 0;

        loop {
            match self.port.read() {
                Err(nb::Error::WouldBlock) => (),
                Err(nb::Error::Other(e)) => return Err(e.into()),
                Ok(v) => return Ok(v),
            };

            if t >= timeout_ms {
                trace!("Byte read timeout");
                return Err(Error::ResponseTimeout);
            }

            // Wait for delay period, never past the deadline
            let wait = poll.min(timeout_ms - t);
            self.delay.delay_ms(wait);
            t += wait;
        }
    }

    /// Discard any bytes already waiting on the port, returning the count
    pub fn drain(&mut self) -> Result<usize, Error<E>> {
        let mut n = 0;

        loop {
            match self.port.read() {
                Ok(_) => n += 1,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => return Err(e.into()),
            }
        }

        if n > 0 {
            debug!("Discarded {} stale bytes", n);
        }

        Ok(n)
    }

    /// Write a complete frame to the port
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), Error<E>> {
        if self.options.log_frames {
            debug!("TX: {:02x?}", frame);
        }

        for b in frame {
            block!(self.port.write(*b))?;
        }
        block!(self.port.flush())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CountingDelay, MockPort};

    fn programmer(poll_delay_ms: u32) -> Programmer<MockPort, CountingDelay, core::convert::Infallible> {
        let options = Options {
            poll_delay_ms,
            ..Options::default()
        };
        Programmer::new(MockPort::silent(), CountingDelay::default(), options)
    }

    #[test]
    fn read_timeout_never_overshoots() {
        for poll in &[1, 3, 4, 7, 10, 25] {
            for timeout in &[0, 1, 5, 10, 99, 100] {
                let mut p = programmer(*poll);
                assert_eq!(p.read_byte(*timeout), Err(Error::ResponseTimeout));

                let (_, delay) = p.free();
                assert_eq!(
                    delay.total_ms, *timeout,
                    "poll {} ms waited {} ms for timeout {} ms",
                    poll, delay.total_ms, timeout
                );
            }
        }
    }

    #[test]
    fn read_returns_queued_byte() {
        let mut port = MockPort::silent();
        port.queue(&[0x42]);

        let mut p = Programmer::new(port, CountingDelay::default(), Options::default());
        assert_eq!(p.read_byte(0), Ok(0x42));

        let (_, delay) = p.free();
        assert_eq!(delay.total_ms, 0);
    }
}
