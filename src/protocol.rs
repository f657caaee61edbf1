use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;

use crate::PreconditionError;

/// Synchronisation bytes opening every frame
pub const SYNC: [u8; 2] = [0xFF, 0xFF];

/// Direction marker for host to device packets
pub const HOST_MARKER: u8 = 0x55;
/// Direction marker for device to host packets
pub const DEVICE_MARKER: u8 = 0x56;

pub const REPLY_ACCEPT: u8 = b'Y';
pub const REPLY_REJECT: u8 = b'N';

/// Receive attempts before a bootloader reply is considered lost
pub const RECV_ATTEMPTS: usize = 3;

/// Maximum payload carried by one bootloader packet
pub const MAX_PAYLOAD: usize = 255;

/// Largest flash page fitting in one write, after the command and checksum bytes
pub const MAX_PAGE_SIZE: usize = MAX_PAYLOAD - 3;

pub const MAX_BOARD_ID: u8 = 127;

/// Commands understood by the sensorimotor bootloader
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    /// Leave the application and enter the bootloader
    StartBootloader = b'S' as isize,

    /// Compare the attached MCU signature against the one supplied
    Identify = b'I' as isize,

    /// Write one flash page, prefixed by its 16-bit page checksum
    WritePage = b'W' as isize,

    /// Reset the device, starting the application. No reply is sent.
    Reset = b'R' as isize,
}

/// Commands of the addressing protocol spoken by the application firmware
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AddressCommand {
    Ping = 0xE0,
    Pong = 0xE1,
    SetId = 0x70,
    SetIdAck = 0x71,
}

/// Logical address of a board on the bus, 0..=127
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoardId(u8);

impl BoardId {
    /// Iterate over every valid board id in ascending order
    pub fn all() -> impl Iterator<Item = BoardId> {
        (0..=MAX_BOARD_ID).map(BoardId)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BoardId {
    type Error = PreconditionError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        if v > MAX_BOARD_ID {
            return Err(PreconditionError::InvalidBoardId(v.to_string()));
        }
        Ok(BoardId(v))
    }
}

impl FromStr for BoardId {
    type Err = PreconditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u8>() {
            Ok(v) => BoardId::try_from(v),
            Err(_) => Err(PreconditionError::InvalidBoardId(s.to_string())),
        }
    }
}

impl From<BoardId> for u8 {
    fn from(id: BoardId) -> u8 {
        id.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
