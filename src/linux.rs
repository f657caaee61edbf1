use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serial_core::{
    BaudRate, CharSize, FlowControl, Parity, SerialDevice as _, SerialPortSettings as _, StopBits,
};
use linux_embedded_hal::{Delay, Serial};

use crate::{Options, Programmer};

/// Default bus baud rate
pub const DEFAULT_BAUD: usize = 1_000_000;

impl Programmer<Serial, Delay, IoErrorKind> {
    /// Create a new linux serial port programmer instance
    pub fn linux<P: AsRef<Path>>(port: P, baud: usize, options: Options) -> anyhow::Result<Self> {
        let path = port.as_ref();

        // Open port
        let mut port = Serial::open(path)
            .with_context(|| format!("Serial device {} not found/connected", path.display()))?;

        // Apply settings
        let mut settings = port.0.read_settings()?;

        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::Stop1);
        settings
            .set_baud_rate(BaudRate::from_speed(baud))
            .with_context(|| format!("Unsupported baud rate {}", baud))?;
        settings.set_flow_control(FlowControl::FlowNone);
        settings.set_parity(Parity::ParityNone);

        port.0.write_settings(&settings)?;

        // Non-blocking reads, timeouts are tracked by the programmer
        port.0.set_timeout(Duration::from_millis(0))?;

        debug!("Opened {} at {} baud", path.display(), baud);

        // Return instance
        Ok(Self::new(port, Delay {}, options))
    }
}
