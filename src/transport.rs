//! Byte transport beneath the protocol engine.
//!
//! The engine only needs three primitives from the wire: a timed read, a
//! write that returns once the bytes have left, and a flush of anything
//! buffered in either direction. [`crate::serial::SerialTransport`] provides
//! them over a real serial port and [`crate::simulator::SimulatedStation`]
//! emulates the console in memory.

use std::io;
use std::time::Duration;

pub trait Transport {
    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when the timeout expires with nothing received.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write `bytes`, pacing the line as the console requires.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Discard pending input and output.
    fn flush(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_timeout(buf, timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_timeout(buf, timeout)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}
