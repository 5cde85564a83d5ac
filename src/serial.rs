//! Serial port transport.
//!
//! The console talks 2400 baud 8N1 without flow control. It draws power from
//! the control lines, so DTR is held low and RTS high for as long as the port
//! is open. On Unix the port is also locked for exclusive use: a second
//! process interleaving bytes would desynchronise both.

use log::{debug, info};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use crate::transport::Transport;

pub const BAUD_RATE: u32 = 2400;

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    io_delay: Duration,
}

impl SerialTransport {
    /// Open and configure `path`. `io_delay` is slept after every write so
    /// the console can keep up.
    pub fn open(path: &str, io_delay: Duration) -> Result<Self, serialport::Error> {
        let builder = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(1000));

        #[cfg(unix)]
        let mut port: Box<dyn SerialPort> = {
            let mut native = builder.open_native()?;
            native.set_exclusive(true)?;
            Box::new(native)
        };
        #[cfg(not(unix))]
        let mut port = builder.open()?;

        port.write_data_terminal_ready(false)?;
        port.write_request_to_send(true)?;
        port.clear(ClearBuffer::All)?;

        info!("Opened {} at {} baud", path, BAUD_RATE);

        Ok(Self { port, io_delay })
    }
}

impl Transport for SerialTransport {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout)?;

        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.port.write_all(bytes)?;
        self.port.flush()?;

        if !self.io_delay.is_zero() {
            thread::sleep(self.io_delay);
        }

        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        debug!("Flushing serial buffers");
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }
}
