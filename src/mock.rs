//! In-memory serial port and delay for unit tests

use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::serial::{Read, Write};

use crate::{Options, Programmer};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8>>;

/// Serial port whose replies are produced by a responder closure.
///
/// Written bytes accumulate until the next read finds the receive queue
/// empty, at which point the responder sees everything written since its
/// last call and may queue a reply.
pub struct MockPort {
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    written: Vec<Vec<u8>>,
    responder: Responder,
}

impl MockPort {
    pub fn new<R>(responder: R) -> Self
    where
        R: FnMut(&[u8]) -> Vec<u8> + 'static,
    {
        Self {
            rx: VecDeque::new(),
            pending: Vec::new(),
            written: Vec::new(),
            responder: Box::new(responder),
        }
    }

    /// Port that never answers
    pub fn silent() -> Self {
        Self::new(|_| vec![])
    }

    /// Queue bytes for reception ahead of any reply
    pub fn queue(&mut self, data: &[u8]) {
        self.rx.extend(data);
    }

    /// Every chunk written so far, including any not yet answered
    pub fn frames(&self) -> Vec<Vec<u8>> {
        let mut frames = self.written.clone();
        if !self.pending.is_empty() {
            frames.push(self.pending.clone());
        }
        frames
    }

    fn respond(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let tx = std::mem::take(&mut self.pending);
        let reply = (self.responder)(&tx);
        self.written.push(tx);
        self.rx.extend(reply);
    }
}

impl Read<u8> for MockPort {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        if self.rx.is_empty() {
            self.respond();
        }
        self.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl Write<u8> for MockPort {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.pending.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

pub struct NoDelay;

impl DelayMs<u32> for NoDelay {
    fn delay_ms(&mut self, _ms: u32) {}
}

/// Delay recording the total time requested
#[derive(Default)]
pub struct CountingDelay {
    pub total_ms: u32,
}

impl DelayMs<u32> for CountingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
    }
}

pub type MockProgrammer = Programmer<MockPort, NoDelay, Infallible>;

pub fn programmer(port: MockPort) -> MockProgrammer {
    let options = Options {
        response_timeout_ms: 20,
        ping_timeout_ms: 5,
        ..Options::default()
    };
    Programmer::new(port, NoDelay, options)
}
