//! Bootloader commands: entering the bootloader, signature verification,
//! page-by-page flashing and reset.

use embedded_hal::blocking::delay::DelayMs;

use crate::device::DeviceProfile;
use crate::paging::{padded_size, page_checksum, Pages};
use crate::protocol::{BoardId, Command, MAX_PAGE_SIZE};
use crate::{Error, PreconditionError, Programmer, SerialPort, State};

/// Reject images and devices that cannot be flashed before anything is sent
fn check_flashable<E>(device: &DeviceProfile, image: &[u8]) -> Result<(), Error<E>> {
    if device.page_size == 0 || device.page_size > MAX_PAGE_SIZE {
        return Err(Error::Precondition(PreconditionError::InvalidPageSize(device.page_size)));
    }
    if image.is_empty() {
        return Err(Error::Precondition(PreconditionError::EmptyImage));
    }
    Ok(())
}

impl<P, D, E> Programmer<P, D, E>
where
    P: SerialPort<E>,
    D: DelayMs<u32>,
    E: core::fmt::Debug,
{
    /// Ask the application on `board` to hand over to its bootloader
    pub fn start_bootloader(&mut self, board: BoardId) -> Result<(), Error<E>> {
        info!("Starting bootloader of board {}", board);

        self.transact(board, Command::StartBootloader, &[])?;
        self.state = State::Bootloader;

        // Give the bootloader time to settle
        self.delay.delay_ms(self.options.start_delay_ms);

        Ok(())
    }

    /// Check the attached MCU matches the signature of `device`
    pub fn verify_signature(&mut self, board: BoardId, device: &DeviceProfile) -> Result<(), Error<E>> {
        info!(
            "Verifying device signature (mcu: {}, id: {:02x?})",
            device.mcu_name, device.signature
        );

        self.transact(board, Command::Identify, &device.signature)
    }

    /// Write `image` to the flash of `board`, one page per transaction.
    ///
    /// `progress` is called after each page with the bytes written so far and
    /// the padded image size. Returns the number of bytes written.
    ///
    /// Any page failure stops flashing and is reported as
    /// [`Error::PartialFlash`]; pages already written are not rolled back.
    pub fn flash<F>(
        &mut self,
        board: BoardId,
        device: &DeviceProfile,
        image: &[u8],
        mut progress: F,
    ) -> Result<usize, Error<E>>
    where
        F: FnMut(usize, usize),
    {
        check_flashable::<E>(device, image)?;

        let total = padded_size(image.len(), device.page_size);
        let mut written = 0;

        info!(
            "Flashing {} bytes ({} pages of {} bytes)",
            image.len(),
            total / device.page_size,
            device.page_size
        );

        for page in Pages::new(image, device.page_size) {
            let mut data = Vec::with_capacity(page.len() + 2);
            data.extend_from_slice(&page_checksum(&page));
            data.extend_from_slice(&page);

            debug!("Writing page at offset 0x{:04x}", written);

            if let Err(e) = self.transact(board, Command::WritePage, &data) {
                error!("Flashing aborted at offset 0x{:04x}: {}", written, e);
                return Err(Error::PartialFlash {
                    written,
                    total,
                    cause: Box::new(e),
                });
            }

            written += page.len();
            progress(written, total);
        }

        info!("Flashing done");

        Ok(written)
    }

    /// Reset `board`, no reply is expected
    pub fn reset(&mut self, board: BoardId) -> Result<(), Error<E>> {
        info!("Resetting board {}", board);

        self.send(board, Command::Reset, &[])?;
        self.state = State::Application;

        Ok(())
    }

    /// Full update sequence: start, verify, flash and reset
    pub fn update<F>(
        &mut self,
        board: BoardId,
        device: &DeviceProfile,
        image: &[u8],
        progress: F,
    ) -> Result<usize, Error<E>>
    where
        F: FnMut(usize, usize),
    {
        check_flashable::<E>(device, image)?;

        self.start_bootloader(board)?;
        self.verify_signature(board, device)?;
        let n = self.flash(board, device, image, progress)?;
        self.reset(board)?;

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::TryFrom;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::codec::{FrameCodec, Packet};
    use crate::mock::{programmer, MockPort};

    fn board(id: u8) -> BoardId {
        BoardId::try_from(id).unwrap()
    }

    fn rev1_1() -> DeviceProfile {
        "sensorimotor_rev1.1".parse().unwrap()
    }

    /// Payload of a host request frame
    fn payload(frame: &[u8]) -> &[u8] {
        &frame[5..frame.len() - 1]
    }

    #[test]
    fn verify_encodes_signature() {
        let port = MockPort::new(|tx| {
            assert_eq!(payload(tx), &[b'I', 0x1E, 0x95, 0x0F]);
            Packet::reply(board(2), b"Y").encode()
        });
        let mut p = programmer(port);

        assert_eq!(p.verify_signature(board(2), &rev1_1()), Ok(()));
    }

    #[test]
    fn verify_fails_on_rejection() {
        let port = MockPort::new(|_| Packet::reply(board(2), b"N").encode());
        let mut p = programmer(port);

        assert_eq!(p.verify_signature(board(2), &rev1_1()), Err(Error::Rejected));
    }

    #[test]
    fn start_then_reset_tracks_state() {
        let port = MockPort::new(|_| Packet::reply(board(2), b"Y").encode());
        let mut p = programmer(port);

        assert_eq!(p.state(), State::Application);
        p.start_bootloader(board(2)).unwrap();
        assert_eq!(p.state(), State::Bootloader);
        p.reset(board(2)).unwrap();
        assert_eq!(p.state(), State::Application);

        let (port, _) = p.free();
        let frames = port.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(payload(&frames[1]), b"R");
    }

    #[test]
    fn flash_pages_with_progress() {
        let pages = Rc::new(RefCell::new(Vec::new()));
        let seen = pages.clone();

        let port = MockPort::new(move |tx| {
            seen.borrow_mut().push(payload(tx).to_vec());
            Packet::reply(board(7), b"Y").encode()
        });
        let mut p = programmer(port);

        let image: Vec<u8> = (0..200u32).map(|v| v as u8).collect();
        let mut reports = vec![];
        let n = p
            .flash(board(7), &rev1_1(), &image, |w, t| reports.push((w, t)))
            .unwrap();

        assert_eq!(n, 256);
        assert_eq!(reports, vec![(128, 256), (256, 256)]);

        let pages = pages.borrow();
        assert_eq!(pages.len(), 2);
        for page in pages.iter() {
            assert_eq!(page.len(), 1 + 2 + 128);
            assert_eq!(page[0], b'W');
            assert_eq!(&page[1..3], &page_checksum(&page[3..]));
        }
        assert_eq!(&pages[0][3..], &image[..128]);
        assert_eq!(&pages[1][3..75], &image[128..]);
        assert!(pages[1][75..].iter().all(|b| *b == 0));
    }

    #[test]
    fn flash_aborts_on_failed_page() {
        let mut count = 0;
        let port = MockPort::new(move |_| {
            count += 1;
            let reply: &[u8] = if count == 2 { b"N" } else { b"Y" };
            Packet::reply(board(7), reply).encode()
        });
        let mut p = programmer(port);

        let image = [0xAAu8; 300];
        let r = p.flash(board(7), &rev1_1(), &image, |_, _| ());

        assert_eq!(
            r,
            Err(Error::PartialFlash {
                written: 128,
                total: 384,
                cause: Box::new(Error::Rejected),
            })
        );

        // Nothing is sent after the failing page
        let (port, _) = p.free();
        assert_eq!(port.frames().len(), 2);
    }

    #[test]
    fn flash_rejects_unsupported_page_size() {
        for page_size in &[0, MAX_PAGE_SIZE + 1, 256] {
            let device = DeviceProfile {
                page_size: *page_size,
                ..rev1_1()
            };
            let mut p = programmer(MockPort::silent());

            assert_eq!(
                p.flash(board(7), &device, &[1, 2, 3], |_, _| ()),
                Err(Error::Precondition(PreconditionError::InvalidPageSize(*page_size)))
            );
            assert_eq!(
                p.update(board(7), &device, &[1, 2, 3], |_, _| ()),
                Err(Error::Precondition(PreconditionError::InvalidPageSize(*page_size)))
            );

            let (port, _) = p.free();
            assert!(port.frames().is_empty());
        }
    }

    #[test]
    fn flash_largest_page() {
        let port = MockPort::new(|_| Packet::reply(board(7), b"Y").encode());
        let mut p = programmer(port);

        let device = DeviceProfile {
            page_size: MAX_PAGE_SIZE,
            ..rev1_1()
        };
        assert_eq!(p.flash(board(7), &device, &[0x11; 300], |_, _| ()), Ok(2 * MAX_PAGE_SIZE));
    }

    #[test]
    fn flash_rejects_empty_image() {
        let mut p = programmer(MockPort::silent());
        assert_eq!(
            p.flash(board(7), &rev1_1(), &[], |_, _| ()),
            Err(Error::Precondition(PreconditionError::EmptyImage))
        );

        let (port, _) = p.free();
        assert!(port.frames().is_empty());
    }
}
