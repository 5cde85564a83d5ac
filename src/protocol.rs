//! # WS23xx Protocol Engine
//!
//! The console speaks a half-duplex, byte-at-a-time protocol. Every byte sent
//! by the host is answered by exactly one acknowledgement byte that echoes a
//! transformation of what was sent, so the host can detect desynchronisation
//! immediately.
//!
//! ## Transactions
//!
//! ```text
//! reset:    0x06                      -> ... 0x02 ...
//! address:  n*4 + 0x82  (4 times)     -> i*16 + n
//! read:     0xC2 + nbytes*4           -> 0x30 + nbytes, data..., checksum
//! write:    op + (v << 2)  (per nyb)  -> v + ack constant
//! ```
//!
//! Any mismatch leaves the console in an unknown state; the only way back is
//! a fresh reset. [`Station`] tracks this with [`SyncState`] and the retrying
//! operations ([`Station::read_block`], [`Station::write`]) reset after each
//! failed attempt.

use log::{debug, trace, warn};
use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::field::DecodeError;
use crate::nybble::{self, NybbleError};
use crate::transport::Transport;

pub const RESET: u8 = 0x06;
pub const RESET_ACK: u8 = 0x02;

/// Reset attempts before the console is declared unresponsive.
pub const MAX_RESETS: usize = 100;
/// Attempts per block read or write.
pub const MAX_RETRIES: usize = 50;
/// Largest single read transaction, in nybbles.
pub const MAX_BLOCK_NYBBLES: usize = 30;
/// Default wait for an acknowledgement or data byte.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Wait between trailing bytes when draining a reset reply.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(50);
/// Bytes read per reset attempt before giving up on a chattering line.
pub const MAX_DRAIN_BYTES: usize = 32;
const ADDRESS_BASE: u8 = 0x82;
const READ_BASE: u8 = 0xC2;
const READ_ACK_BASE: u8 = 0x30;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected acknowledgement: sent {sent:#04x}, expected {expected:#04x}, got {received:#04x}")]
    AckMismatch { sent: u8, expected: u8, received: u8 },

    #[error("no acknowledgement for {sent:#04x}")]
    AckTimeout { sent: u8 },

    #[error("timed out waiting for data")]
    DataTimeout,

    #[error("checksum mismatch: expected {expected:#04x}, got {received:#04x}")]
    Checksum { expected: u8, received: u8 },

    #[error("station not responding after {attempts} attempts")]
    DeviceUnresponsive { attempts: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Nybble(#[from] NybbleError),

    #[error("undecodable station data: {0}")]
    Decode(#[from] DecodeError),
}

impl ProtocolError {
    /// Whether a fresh reset and another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::AckMismatch { .. }
                | ProtocolError::AckTimeout { .. }
                | ProtocolError::DataTimeout
                | ProtocolError::Checksum { .. }
        )
    }
}

/// Link synchronisation as seen from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing exchanged yet
    Idle,
    /// A reset handshake is in progress
    Resetting,
    /// Last handshake or transaction completed cleanly
    Synchronized,
    /// A transaction failed; reset before trusting the link again
    Failed,
}

/// Write command family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Set bit `v` (0-3) of the addressed nybble
    SetBit,
    /// Clear bit `v` (0-3) of the addressed nybble
    ClearBit,
    /// Store nybbles at consecutive addresses
    Nybbles,
}

impl WriteOp {
    pub const fn opcode(self) -> u8 {
        match self {
            WriteOp::SetBit => 0x12,
            WriteOp::ClearBit => 0x32,
            WriteOp::Nybbles => 0x42,
        }
    }

    pub const fn ack_constant(self) -> u8 {
        match self {
            WriteOp::SetBit => 0x04,
            WriteOp::ClearBit => 0x0C,
            WriteOp::Nybbles => 0x10,
        }
    }

    /// Longest payload one transaction accepts, in nybbles.
    pub const fn max_len(self) -> usize {
        match self {
            WriteOp::SetBit | WriteOp::ClearBit => 1,
            WriteOp::Nybbles => MAX_BLOCK_NYBBLES,
        }
    }
}

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Address `delta` nybbles past `base`, if it still fits the 16-bit space.
pub(crate) fn offset_address(base: u16, delta: usize) -> Result<u16, ProtocolError> {
    usize::from(base)
        .checked_add(delta)
        .and_then(|a| u16::try_from(a).ok())
        .ok_or_else(|| {
            ProtocolError::InvalidArgument(format!("address {base:#x}+{delta} out of range"))
        })
}

/// Check that `count` nybbles starting at `address` stay inside memory.
pub(crate) fn check_span(address: u16, count: usize) -> Result<(), ProtocolError> {
    if count == 0 {
        return Err(ProtocolError::InvalidArgument(
            "empty memory span".to_string(),
        ));
    }
    offset_address(address, count - 1).map(|_| ())
}

/// A console reached through a [`Transport`].
pub struct Station<T: Transport> {
    transport: T,
    state: SyncState,
    read_timeout: Duration,
}

impl<T: Transport> Station<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SyncState::Idle,
            read_timeout: READ_TIMEOUT,
        }
    }

    /// Override how long to wait for each reply byte.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, ProtocolError> {
        let mut buf = [0u8; 1];
        let n = self.transport.read_timeout(&mut buf, timeout)?;
        Ok((n == 1).then_some(buf[0]))
    }

    /// Send one command byte and check its acknowledgement.
    fn command(&mut self, byte: u8, expected: u8) -> Result<(), ProtocolError> {
        self.transport.write(&[byte])?;

        let result = match self.read_byte(self.read_timeout)? {
            Some(received) if received == expected => Ok(()),
            Some(received) => Err(ProtocolError::AckMismatch {
                sent: byte,
                expected,
                received,
            }),
            None => Err(ProtocolError::AckTimeout { sent: byte }),
        };

        if let Err(e) = &result {
            trace!("{e}");
            self.state = SyncState::Failed;
        }
        result
    }

    /// Bring the console to a known idle state.
    ///
    /// Sends the reset byte and scans everything that comes back for the
    /// acknowledgement, ignoring noise around it. Each attempt reads at most
    /// [`MAX_DRAIN_BYTES`] bytes, and up to [`MAX_RESETS`] attempts are made.
    pub fn reset(&mut self) -> Result<(), ProtocolError> {
        self.state = SyncState::Resetting;

        for attempt in 1..=MAX_RESETS {
            self.transport.flush()?;
            self.transport.write(&[RESET])?;

            let mut acknowledged = false;
            let mut timeout = self.read_timeout;
            for _ in 0..MAX_DRAIN_BYTES {
                let Some(byte) = self.read_byte(timeout)? else {
                    break;
                };
                acknowledged |= byte == RESET_ACK;
                timeout = DRAIN_TIMEOUT;
            }

            if acknowledged {
                if attempt > 1 {
                    debug!("Station reset after {attempt} attempts");
                }
                self.state = SyncState::Synchronized;
                return Ok(());
            }
        }

        warn!("Station ignored {MAX_RESETS} reset requests");
        self.state = SyncState::Failed;
        Err(ProtocolError::DeviceUnresponsive {
            attempts: MAX_RESETS,
        })
    }

    /// Transmit a 16-bit nybble address, most significant nybble first.
    pub fn write_address(&mut self, address: u16) -> Result<(), ProtocolError> {
        for i in 0..4u8 {
            let n = ((address >> (12 - 4 * u16::from(i))) & 0x0F) as u8;
            self.command(ADDRESS_BASE + n * 4, i * 16 + n)?;
        }
        Ok(())
    }

    /// One write transaction: address, then one command per nybble.
    ///
    /// `data` holds `count` packed nybbles. Bit operations take a single
    /// nybble naming the bit (0-3).
    pub fn write_nybbles(
        &mut self,
        address: u16,
        data: &[u8],
        count: usize,
        op: WriteOp,
    ) -> Result<(), ProtocolError> {
        if count == 0 || count > op.max_len() {
            return Err(ProtocolError::InvalidArgument(format!(
                "{op:?} takes 1 to {} nybbles, got {count}",
                op.max_len()
            )));
        }
        check_span(address, count)?;

        let values = (0..count)
            .map(|i| nybble::nybble_at(data, i))
            .collect::<Result<Vec<_>, _>>()?;

        if op != WriteOp::Nybbles && values[0] > 3 {
            return Err(ProtocolError::InvalidArgument(format!(
                "bit index {} out of range",
                values[0]
            )));
        }

        self.write_address(address)?;
        for v in values {
            self.command(op.opcode() + (v << 2), v + op.ack_constant())?;
        }

        self.state = SyncState::Synchronized;
        Ok(())
    }

    /// One read transaction of 1 to [`MAX_BLOCK_NYBBLES`] nybbles.
    ///
    /// Returns the packed bytes; for odd counts the high nybble of the last
    /// byte is whatever follows in memory.
    pub fn read_nybbles(&mut self, address: u16, count: usize) -> Result<Vec<u8>, ProtocolError> {
        if count == 0 || count > MAX_BLOCK_NYBBLES {
            return Err(ProtocolError::InvalidArgument(format!(
                "read of {count} nybbles, expected 1 to {MAX_BLOCK_NYBBLES}"
            )));
        }
        check_span(address, count)?;

        self.write_address(address)?;

        let nbytes = nybble::byte_len(count) as u8;
        self.command(READ_BASE + nbytes * 4, READ_ACK_BASE + nbytes)?;

        let mut data = Vec::with_capacity(usize::from(nbytes));
        for _ in 0..nbytes {
            match self.read_byte(self.read_timeout)? {
                Some(byte) => data.push(byte),
                None => {
                    self.state = SyncState::Failed;
                    return Err(ProtocolError::DataTimeout);
                }
            }
        }

        let expected = checksum(&data);
        let received = match self.read_byte(self.read_timeout)? {
            Some(byte) => byte,
            None => {
                self.state = SyncState::Failed;
                return Err(ProtocolError::DataTimeout);
            }
        };
        if received != expected {
            self.state = SyncState::Failed;
            return Err(ProtocolError::Checksum { expected, received });
        }

        self.state = SyncState::Synchronized;
        Ok(data)
    }

    /// Run `op` until it succeeds, resetting after each retryable failure.
    fn with_retries<R>(
        &mut self,
        address: u16,
        mut op: impl FnMut(&mut Self) -> Result<R, ProtocolError>,
    ) -> Result<R, ProtocolError> {
        for attempt in 1..=MAX_RETRIES {
            match op(self) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    debug!("Transaction at {address:#05x} failed (attempt {attempt}): {e}");
                    self.reset()?;
                }
                Err(e) => return Err(e),
            }
        }

        warn!("Giving up on {address:#05x} after {MAX_RETRIES} attempts");
        Err(ProtocolError::DeviceUnresponsive {
            attempts: MAX_RETRIES,
        })
    }

    /// Read `count` nybbles of any length, split into transactions of at
    /// most [`MAX_BLOCK_NYBBLES`], each retried on failure.
    ///
    /// The link must already be synchronised; see [`Station::read`].
    pub fn read_block(&mut self, address: u16, count: usize) -> Result<Vec<u8>, ProtocolError> {
        check_span(address, count)?;

        let mut out = vec![0u8; nybble::byte_len(count)];
        for start in (0..count).step_by(MAX_BLOCK_NYBBLES) {
            let chunk = MAX_BLOCK_NYBBLES.min(count - start);
            let chunk_address = offset_address(address, start)?;

            let data = self.with_retries(chunk_address, |s| s.read_nybbles(chunk_address, chunk))?;

            let at = start / 2;
            out[at..at + data.len()].copy_from_slice(&data);
        }

        Ok(out)
    }

    /// Reset, then read `count` nybbles starting at `address`.
    pub fn read(&mut self, address: u16, count: usize) -> Result<Vec<u8>, ProtocolError> {
        check_span(address, count)?;
        self.reset()?;
        self.read_block(address, count)
    }

    /// Reset, then write with retries.
    ///
    /// Nybble writes longer than one transaction are split; bit operations
    /// take exactly one nybble.
    pub fn write(
        &mut self,
        address: u16,
        data: &[u8],
        count: usize,
        op: WriteOp,
    ) -> Result<(), ProtocolError> {
        check_span(address, count)?;
        if count > op.max_len() && op != WriteOp::Nybbles {
            return Err(ProtocolError::InvalidArgument(format!(
                "{op:?} takes a single nybble"
            )));
        }

        self.reset()?;

        for start in (0..count).step_by(op.max_len()) {
            let chunk = op.max_len().min(count - start);
            let chunk_address = offset_address(address, start)?;

            let mut part = vec![0u8; nybble::byte_len(chunk)];
            nybble::copy_nybbles(&mut part, data, chunk, start)?;

            self.with_retries(chunk_address, |s| s.write_nybbles(chunk_address, &part, chunk, op))?;
        }

        debug!("Wrote {count} nybbles at {address:#05x}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatedStation;

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[0x10, 0x20, 0x05]), 0x35);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn test_write_op_constants() {
        assert_eq!(WriteOp::SetBit.opcode() + (2 << 2), 0x1A);
        assert_eq!(WriteOp::ClearBit.ack_constant() + 1, 0x0D);
        assert_eq!(WriteOp::Nybbles.max_len(), MAX_BLOCK_NYBBLES);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProtocolError::DataTimeout.is_retryable());
        assert!(ProtocolError::Checksum {
            expected: 1,
            received: 2
        }
        .is_retryable());
        assert!(!ProtocolError::DeviceUnresponsive { attempts: 1 }.is_retryable());
        assert!(!ProtocolError::InvalidArgument(String::new()).is_retryable());
    }

    #[test]
    fn test_state_transitions() {
        let mut station = Station::new(SimulatedStation::new());
        assert_eq!(station.state(), SyncState::Idle);
        station.reset().unwrap();
        assert_eq!(station.state(), SyncState::Synchronized);

        station.transport_mut().poke_nybbles(0x20, &[1]);
        let mut station = Station::new(station.into_inner().drop_acks(1))
            .with_read_timeout(Duration::ZERO);
        assert!(matches!(
            station.read_nybbles(0x20, 1),
            Err(ProtocolError::AckTimeout { sent: 0x82 })
        ));
        assert_eq!(station.state(), SyncState::Failed);
    }

    #[test]
    fn test_read_rejects_bad_lengths() {
        let mut station = Station::new(SimulatedStation::new());
        assert!(matches!(
            station.read_nybbles(0x100, 0),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            station.read_nybbles(0x100, MAX_BLOCK_NYBBLES + 1),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            station.read(0xFFFF, 2),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert_eq!(station.transport().reads(), 0);
    }

    /// A line that never stops sending.
    struct Chatter {
        byte: u8,
        reads: usize,
    }

    impl Transport for Chatter {
        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            self.reads += 1;
            buf[0] = self.byte;
            Ok(1)
        }

        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reset_bounded_on_chattering_line() {
        let mut station = Station::new(Chatter { byte: 0x00, reads: 0 });
        assert!(matches!(
            station.reset(),
            Err(ProtocolError::DeviceUnresponsive { attempts: MAX_RESETS })
        ));
        assert_eq!(station.transport().reads, MAX_RESETS * MAX_DRAIN_BYTES);

        let mut station = Station::new(Chatter { byte: RESET_ACK, reads: 0 });
        station.reset().unwrap();
        assert_eq!(station.state(), SyncState::Synchronized);
        assert_eq!(station.transport().reads, MAX_DRAIN_BYTES);
    }

    #[test]
    fn test_bit_write_validation() {
        let mut station = Station::new(SimulatedStation::new());
        assert!(matches!(
            station.write(0x006, &[0x04], 1, WriteOp::SetBit),
            Err(ProtocolError::InvalidArgument(_))
        ));
        assert!(matches!(
            station.write(0x006, &[0x11], 2, WriteOp::SetBit),
            Err(ProtocolError::InvalidArgument(_))
        ));
    }
}
