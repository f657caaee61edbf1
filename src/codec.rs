//! Frame encoding and decoding.
//!
//! Every frame opens with [`SYNC`] and closes with a checksum byte chosen so
//! the sum of all frame bytes is zero mod 256. Bootloader [`Packet`]s carry a
//! direction marker, board id and length prefix, addressing [`Sequence`]s are
//! a fixed byte string known to both ends.
//!
//! Decoding consumes the byte source one byte at a time and gives up at the
//! first byte that does not match. Consumed bytes are not pushed back,
//! [`resync`] simply starts a fresh attempt on the continuing stream.

use core::marker::PhantomData;

use crate::protocol::{BoardId, DEVICE_MARKER, HOST_MARKER, SYNC};
use crate::Error;

/// Two's complement checksum of `data`
pub fn checksum(data: &[u8]) -> u8 {
    sum(data).wrapping_neg()
}

/// Sum of `data` mod 256, zero for a valid frame
pub fn sum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |a, b| a.wrapping_add(*b))
}

/// Byte reader tracking the running sum of a frame under decode
pub struct FrameReader<F, E> {
    next: F,
    sum: u8,
    _err: PhantomData<E>,
}

impl<F, E> FrameReader<F, E>
where
    F: FnMut() -> Result<u8, Error<E>>,
{
    pub fn new(next: F) -> Self {
        Self {
            next,
            sum: 0,
            _err: PhantomData,
        }
    }

    /// Read the next byte
    pub fn byte(&mut self) -> Result<u8, Error<E>> {
        let v = (self.next)()?;
        self.sum = self.sum.wrapping_add(v);
        Ok(v)
    }

    /// Read the next byte, failing if it is not `expected`
    pub fn expect(&mut self, expected: u8) -> Result<(), Error<E>> {
        match self.byte()? {
            v if v == expected => Ok(()),
            v => {
                trace!("Expected 0x{:02x}, received 0x{:02x}", expected, v);
                Err(Error::InvalidFrame)
            }
        }
    }

    /// Read the checksum byte and validate the frame sum
    pub fn finish(&mut self) -> Result<(), Error<E>> {
        self.byte()?;

        match self.sum {
            0 => Ok(()),
            s => {
                debug!("Frame checksum mismatch (sum 0x{:02x})", s);
                Err(Error::InvalidFrame)
            }
        }
    }
}

/// Frame layout shared by both protocols
pub trait FrameCodec {
    /// Value recovered by a successful decode
    type Output;

    /// Frame bytes between the sync bytes and the checksum
    fn body(&self) -> Vec<u8>;

    /// Consume the frame body from `reader`, `self` acting as the template
    fn read_body<F, E>(&self, reader: &mut FrameReader<F, E>) -> Result<Self::Output, Error<E>>
    where
        F: FnMut() -> Result<u8, Error<E>>;

    /// Encode a complete frame
    fn encode(&self) -> Vec<u8> {
        let mut frame = SYNC.to_vec();
        frame.extend(self.body());
        frame.push(checksum(&frame));
        frame
    }

    /// Make a single decode attempt against the byte source `next`
    fn decode<F, E>(&self, next: F) -> Result<Self::Output, Error<E>>
    where
        F: FnMut() -> Result<u8, Error<E>>,
    {
        let mut reader = FrameReader::new(next);

        for s in SYNC.iter() {
            reader.expect(*s)?;
        }
        let output = self.read_body(&mut reader)?;
        reader.finish()?;

        Ok(output)
    }
}

/// Length-prefixed bootloader packet
#[derive(Clone, Debug, PartialEq)]
pub struct Packet<'a> {
    pub marker: u8,
    pub board: BoardId,
    /// Payload to encode, ignored when decoding
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Packet sent from the host to a board
    pub fn request(board: BoardId, payload: &'a [u8]) -> Self {
        Self {
            marker: HOST_MARKER,
            board,
            payload,
        }
    }

    /// Packet sent from a board back to the host
    pub fn reply(board: BoardId, payload: &'a [u8]) -> Self {
        Self {
            marker: DEVICE_MARKER,
            board,
            payload,
        }
    }
}

impl FrameCodec for Packet<'_> {
    type Output = Vec<u8>;

    fn body(&self) -> Vec<u8> {
        // Callers bound payloads to MAX_PAYLOAD before encoding
        let mut body = vec![self.marker, self.board.into(), self.payload.len() as u8];
        body.extend_from_slice(self.payload);
        body
    }

    fn read_body<F, E>(&self, reader: &mut FrameReader<F, E>) -> Result<Vec<u8>, Error<E>>
    where
        F: FnMut() -> Result<u8, Error<E>>,
    {
        reader.expect(self.marker)?;
        reader.expect(self.board.into())?;

        let len = reader.byte()? as usize;
        let mut payload = Vec::with_capacity(len);
        for _ in 0..len {
            payload.push(reader.byte()?);
        }

        Ok(payload)
    }
}

/// Fixed byte sequence of the addressing protocol
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence<'a>(pub &'a [u8]);

impl FrameCodec for Sequence<'_> {
    type Output = ();

    fn body(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn read_body<F, E>(&self, reader: &mut FrameReader<F, E>) -> Result<(), Error<E>>
    where
        F: FnMut() -> Result<u8, Error<E>>,
    {
        for b in self.0 {
            reader.expect(*b)?;
        }
        Ok(())
    }
}

/// Repeat a decode `attempt` until it succeeds or `attempts` are used up.
///
/// Invalid frames and timeouts are absorbed, transport errors are returned
/// immediately. Exhausting the budget reports [`Error::ResponseTimeout`].
pub fn resync<T, E, A>(attempts: usize, mut attempt: A) -> Result<T, Error<E>>
where
    A: FnMut() -> Result<T, Error<E>>,
{
    for n in 1..=attempts {
        match attempt() {
            Ok(v) => return Ok(v),
            Err(Error::InvalidFrame) | Err(Error::ResponseTimeout) => {
                debug!("No valid frame (attempt {}/{})", n, attempts);
            }
            Err(e) => return Err(e),
        }
    }

    error!("Receive timeout");
    Err(Error::ResponseTimeout)
}
