//! Transport abstraction
//!
//! The controller only needs a byte-duplex channel it can clone into a
//! dedicated reader. The physical link is a serial port; the demo
//! stimulator and the test doubles implement the same trait.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

/// A byte-duplex channel to the stimulator.
pub trait Transport: Read + Write + Send {
    /// Set the timeout for blocking reads.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard anything buffered on the inbound side.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Clone the channel; the clone shares the underlying link so one
    /// half can read while the other writes.
    fn try_clone(&self) -> io::Result<Box<dyn Transport>>;
}

/// Serial port wrapper implementing [`Transport`].
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an open serial port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        let port_clone = self
            .port
            .try_clone()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(SerialChannel::new(port_clone)))
    }
}
