//! Board discovery and id assignment through the application firmware.
//!
//! Each exchange is one fixed sequence out and one expected sequence back,
//! tried exactly once. A board that does not answer in time is treated as
//! absent.

use embedded_hal::blocking::delay::DelayMs;

use crate::codec::{FrameCodec, Sequence};
use crate::protocol::{AddressCommand, BoardId};
use crate::{Error, PreconditionError, Programmer, SerialPort};

impl<P, D, E> Programmer<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Send `request` and wait once for `expected`.
    ///
    /// Returns false when no matching sequence arrives, transport errors are
    /// still propagated.
    fn exchange(&mut self, request: &[u8], expected: &[u8]) -> Result<bool, Error<E>> {
        self.drain()?;
        self.write_frame(&Sequence(request).encode())?;

        let timeout = self.options.ping_timeout_ms;
        match Sequence(expected).decode(|| self.read_byte(timeout)) {
            Ok(()) => Ok(true),
            Err(Error::InvalidFrame) | Err(Error::ResponseTimeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check whether a board answers on `board`
    pub fn ping(&mut self, board: BoardId) -> Result<bool, Error<E>> {
        let present = self.exchange(
            &[AddressCommand::Ping as u8, board.into()],
            &[AddressCommand::Pong as u8, board.into()],
        )?;

        trace!("Ping {}: {}", board, if present { "pong" } else { "no response" });

        Ok(present)
    }

    /// Ping every board id in ascending order, returning those that respond.
    ///
    /// `found` is called for each id as it is probed, so results are reported
    /// as they arrive even if the sweep is interrupted.
    pub fn discover<F>(&mut self, mut found: F) -> Result<Vec<BoardId>, Error<E>>
    where
        F: FnMut(BoardId, bool),
    {
        let mut boards = vec![];

        for board in BoardId::all() {
            let present = self.ping(board)?;
            if present {
                info!("Board {} responded", board);
                boards.push(board);
            }
            found(board, present);
        }

        info!("{} boards detected", boards.len());

        Ok(boards)
    }

    /// Reassign `board` to `new_id`.
    ///
    /// Fails with [`PreconditionError::IdInUse`] without touching `board` if
    /// `new_id` already answers a ping. The check and the reassignment are
    /// separate round trips.
    pub fn set_id(&mut self, board: BoardId, new_id: BoardId) -> Result<(), Error<E>> {
        if self.ping(new_id)? {
            error!("Board id {} already in use", new_id);
            return Err(Error::Precondition(PreconditionError::IdInUse(new_id)));
        }

        info!("Setting board id {} to {}", board, new_id);

        let ok = self.exchange(
            &[AddressCommand::SetId as u8, board.into(), new_id.into()],
            &[AddressCommand::SetIdAck as u8, new_id.into()],
        )?;

        if !ok {
            error!("No acknowledgement of new id {}", new_id);
            return Err(Error::ResponseTimeout);
        }

        Ok(())
    }
}
