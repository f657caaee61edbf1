//! Request / reply round trips with the bootloader.
//!
//! A command is written as a single [`Packet`], then the reply is located
//! with [`resync`] and classified. Only an acceptance completes the command;
//! rejection, unknown replies and timeouts are returned to the caller, which
//! decides whether to carry on. Nothing is retried at this level.

use embedded_hal::blocking::delay::DelayMs;

use crate::codec::{resync, FrameCodec, Packet};
use crate::protocol::{BoardId, Command, MAX_PAYLOAD, RECV_ATTEMPTS, REPLY_ACCEPT, REPLY_REJECT};
use crate::{Error, Programmer, SerialPort};

/// Classified bootloader reply
#[derive(Clone, PartialEq, Debug)]
pub enum Reply {
    Accepted,
    Rejected,
    Unknown(Vec<u8>),
}

impl From<Vec<u8>> for Reply {
    fn from(payload: Vec<u8>) -> Self {
        match payload.as_slice() {
            [REPLY_ACCEPT] => Reply::Accepted,
            [REPLY_REJECT] => Reply::Rejected,
            _ => Reply::Unknown(payload),
        }
    }
}

impl Reply {
    pub fn into_result<E>(self) -> Result<(), Error<E>> {
        match self {
            Reply::Accepted => Ok(()),
            Reply::Rejected => Err(Error::Rejected),
            Reply::Unknown(p) => Err(Error::UnknownReply(p)),
        }
    }
}

impl<P, D, E> Programmer<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Send a command without waiting for any reply
    pub fn send(&mut self, board: BoardId, command: Command, data: &[u8]) -> Result<(), Error<E>> {
        if data.len() + 1 > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge(data.len() + 1));
        }

        let mut payload = Vec::with_capacity(data.len() + 1);
        payload.push(command as u8);
        payload.extend_from_slice(data);

        trace!("Sending {:?} ({} bytes) to board {}", command, payload.len(), board);

        let frame = Packet::request(board, &payload).encode();
        self.write_frame(&frame)
    }

    /// Await a reply packet from `board`, resynchronising on invalid frames
    pub fn receive(&mut self, board: BoardId) -> Result<Vec<u8>, Error<E>> {
        let timeout = self.options.response_timeout_ms;
        let template = Packet::reply(board, &[]);

        let payload = resync(RECV_ATTEMPTS, || {
            template.decode(|| self.read_byte(timeout))
        })?;

        if self.options.log_frames {
            debug!("RX: {:02x?}", payload);
        }

        Ok(payload)
    }

    /// Send a command and wait for it to be accepted
    pub fn transact(&mut self, board: BoardId, command: Command, data: &[u8]) -> Result<(), Error<E>> {
        self.send(board, command, data)?;

        let reply = Reply::from(self.receive(board)?);
        match &reply {
            Reply::Accepted => trace!("{:?} accepted", command),
            Reply::Rejected => error!("{:?} rejected by device", command),
            Reply::Unknown(p) => warn!("Unknown response to {:?}: {:02x?}", command, p),
        }

        reply.into_result()
    }
}
