//! In-memory console emulator.
//!
//! [`SimulatedStation`] answers the same byte protocol as a real WS23xx
//! console: reset handshake, four-nybble addressing, reads with checksum,
//! nybble writes and bit set/clear. It backs the `--simulate` command line
//! mode and the engine tests, and can inject the faults seen on real serial
//! lines (ignored resets, stray bytes, dropped acknowledgements, corrupted
//! checksums).

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{trace, warn};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::nybble::{self, NybbleError, Radix};
use crate::transport::Transport;

/// Nybbles of emulated memory; covers the whole history ring.
pub const MEMORY_NYBBLES: usize = 0x2000;

const RESET: u8 = 0x06;
const RESET_ACK: u8 = 0x02;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Addressing { received: u8, address: u16 },
    Addressed { address: u16 },
}

/// A sample record for seeding the history ring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeedRecord {
    pub temperature_indoor: f64,
    pub temperature_outdoor: f64,
    pub pressure: f64,
    pub humidity_indoor: u8,
    pub humidity_outdoor: u8,
    pub rain_ticks: u16,
    pub wind_speed_tenths: u16,
    pub wind_direction: u8,
}

pub struct SimulatedStation {
    memory: Vec<u8>,
    phase: Phase,
    output: VecDeque<u8>,
    ignore_resets: usize,
    stray_zero: bool,
    drop_acks: usize,
    corrupt_checksums: usize,
    corrupt_reply: Option<usize>,
    resets: usize,
    reads: usize,
    writes: usize,
}

impl Default for SimulatedStation {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStation {
    /// A console with all memory zeroed.
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_NYBBLES],
            phase: Phase::Idle,
            output: VecDeque::new(),
            ignore_resets: 0,
            stray_zero: false,
            drop_acks: 0,
            corrupt_checksums: 0,
            corrupt_reply: None,
            resets: 0,
            reads: 0,
            writes: 0,
        }
    }

    /// A console populated with plausible live readings and a few hours of
    /// history, for demos and tests.
    pub fn with_sample_data() -> Self {
        let mut station = Self::new();
        if let Err(e) = station.seed_sample_data() {
            warn!("Sample data incomplete: {e}");
        }
        station
    }

    fn seed_sample_data(&mut self) -> Result<(), NybbleError> {
        let last_sample = NaiveDate::from_ymd_opt(2024, 3, 14)
            .and_then(|d| d.and_hms_opt(15, 30, 0))
            .unwrap_or_default();

        let cells: &[(u16, u64, usize, Radix)] = &[
            (0x00f, 0, 1, Radix::Hex),          // wind unit m/s
            (0x016, 1, 1, Radix::Hex),          // backlight on
            (0x26b, 2, 1, Radix::Hex),          // sunny
            (0x26c, 1, 1, Radix::Hex),          // rising
            (0x346, 5150, 4, Radix::Decimal),   // 21.50 indoor
            (0x373, 3725, 4, Radix::Decimal),   // 7.25 outdoor
            (0x3a0, 3560, 4, Radix::Decimal),   // 5.60 wind chill
            (0x3ce, 3310, 4, Radix::Decimal),   // 3.10 dew point
            (0x3fb, 41, 2, Radix::Decimal),     // indoor humidity
            (0x419, 78, 2, Radix::Decimal),     // outdoor humidity
            (0x497, 120, 6, Radix::Decimal),    // 1.20 mm 24h
            (0x4b4, 20, 6, Radix::Decimal),     // 0.20 mm 1h
            (0x4d2, 48_512, 6, Radix::Decimal), // 485.12 mm total
            (0x529, 0x23, 3, Radix::Hex),       // 3.5 m/s
            (0x52c, 10, 1, Radix::Hex),         // 225 degrees
            (0x54d, 15, 1, Radix::Hex),         // wireless
            (0x54f, 0x30, 2, Radix::Hex),       // 24 s to connect
            (0x5d8, 9985, 5, Radix::Decimal),   // 998.5 hPa
            (0x5e2, 10_132, 5, Radix::Decimal), // 1013.2 hPa
        ];
        for &(address, value, width, radix) in cells {
            self.poke(address, value, width, radix)?;
        }
        self.poke_timestamp(0x23b, last_sample, true)?;

        let samples: Vec<SeedRecord> = (0..12u8)
            .map(|i| SeedRecord {
                temperature_indoor: 21.0 + f64::from(i % 3) / 10.0,
                temperature_outdoor: 4.0 + f64::from(i) / 4.0,
                pressure: 1009.0 + f64::from(i) / 2.0,
                humidity_indoor: 40 + i % 2,
                humidity_outdoor: 70 + i / 2,
                rain_ticks: 100 + u16::from(i),
                wind_speed_tenths: 10 + 2 * u16::from(i),
                wind_direction: i % 16,
            })
            .collect();
        self.seed_history(30, last_sample, &samples)
    }

    /// Number of reset requests the next attempts will silently ignore.
    pub fn ignore_resets(mut self, count: usize) -> Self {
        self.ignore_resets = count;
        self
    }

    /// Precede every reset acknowledgement with a stray 0x00 byte.
    pub fn stray_zero(mut self, enabled: bool) -> Self {
        self.stray_zero = enabled;
        self
    }

    /// Swallow the next `count` command acknowledgements.
    pub fn drop_acks(mut self, count: usize) -> Self {
        self.drop_acks = count;
        self
    }

    /// Corrupt the checksum of the next `count` read transactions.
    pub fn corrupt_checksums(mut self, count: usize) -> Self {
        self.corrupt_checksums = count;
        self
    }

    /// Flip the low bit of one byte in the next read reply. `index` counts
    /// the data bytes; `index == nbytes` hits the checksum itself.
    pub fn corrupt_reply_byte(mut self, index: usize) -> Self {
        self.corrupt_reply = Some(index);
        self
    }

    /// Reset requests received so far, including ignored ones.
    pub fn resets(&self) -> usize {
        self.resets
    }

    /// Read transactions completed.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Nybbles stored by write commands, including bit operations.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Nybble values stored at `address..address + count`.
    pub fn peek(&self, address: u16, count: usize) -> Vec<u8> {
        (0..count)
            .map(|i| self.memory[(usize::from(address) + i) % MEMORY_NYBBLES])
            .collect()
    }

    /// Store nybbles (one value per element) starting at `address`.
    pub fn poke_nybbles(&mut self, address: u16, nybbles: &[u8]) {
        for (i, value) in nybbles.iter().enumerate() {
            self.memory[(usize::from(address) + i) % MEMORY_NYBBLES] = value & 0x0F;
        }
    }

    /// Store `value` as a `width`-nybble number at `address`.
    pub fn poke(
        &mut self,
        address: u16,
        value: u64,
        width: usize,
        radix: Radix,
    ) -> Result<(), NybbleError> {
        let mut packed = vec![0u8; nybble::byte_len(width)];
        nybble::int_to_nybbles(value, width, 0, radix, &mut packed)?;

        let nybbles = (0..width)
            .map(|i| nybble::nybble_at(&packed, i))
            .collect::<Result<Vec<_>, _>>()?;
        self.poke_nybbles(address, &nybbles);

        Ok(())
    }

    /// Store a calendar stamp the way the console does, optionally with the
    /// weekday nybble (1 = Sunday).
    pub fn poke_timestamp(
        &mut self,
        address: u16,
        when: NaiveDateTime,
        weekday: bool,
    ) -> Result<(), NybbleError> {
        let mut fields = vec![(when.minute(), 2), (when.hour(), 2)];
        if weekday {
            fields.push((when.weekday().number_from_sunday(), 1));
        }
        fields.push((when.day(), 2));
        fields.push((when.month(), 2));
        fields.push((when.year().rem_euclid(100) as u32, 2));

        let mut at = address;
        for (value, width) in fields {
            self.poke(at, u64::from(value), width, Radix::Decimal)?;
            at += width as u16;
        }

        Ok(())
    }

    /// Fill the history ring with `records` (oldest first) and point the
    /// archive header at the newest one.
    pub fn seed_history(
        &mut self,
        interval_minutes: u32,
        last_sample: NaiveDateTime,
        records: &[SeedRecord],
    ) -> Result<(), NybbleError> {
        const HEADER: u16 = 0x6b2;
        const RING: u16 = 0x6c6;
        const RECORD_NYBBLES: u16 = 19;

        let count = records.len().min(175);
        let last_index = count.saturating_sub(1);

        self.poke(HEADER, u64::from(interval_minutes.saturating_sub(1)), 3, Radix::Hex)?;
        self.poke(HEADER + 3, u64::from(interval_minutes.saturating_sub(1)), 3, Radix::Hex)?;
        self.poke_timestamp(HEADER + 6, last_sample, false)?;
        self.poke(HEADER + 16, last_index as u64, 2, Radix::Hex)?;
        self.poke(HEADER + 18, count as u64, 2, Radix::Hex)?;

        for (slot, record) in records.iter().take(count).enumerate() {
            let base = RING + slot as u16 * RECORD_NYBBLES;

            let temperatures = celsius_code(record.temperature_indoor)
                + 1000 * celsius_code(record.temperature_outdoor);
            let pressure = (record.pressure * 10.0).round() as u64 % 10_000;
            let humidity_pressure = u64::from(record.humidity_indoor) * 10_000 + pressure;

            self.poke(base, temperatures, 5, Radix::Hex)?;
            self.poke(base + 5, humidity_pressure, 5, Radix::Hex)?;
            self.poke(base + 10, u64::from(record.humidity_outdoor), 2, Radix::Decimal)?;
            self.poke(base + 12, u64::from(record.rain_ticks), 3, Radix::Hex)?;
            self.poke(base + 15, u64::from(record.wind_speed_tenths), 3, Radix::Hex)?;
            self.poke(base + 18, u64::from(record.wind_direction), 1, Radix::Hex)?;
        }

        Ok(())
    }

    fn respond(&mut self, ack: u8) {
        if self.drop_acks > 0 {
            self.drop_acks -= 1;
            trace!("sim: dropping ack {ack:#04x}");
            return;
        }
        self.output.push_back(ack);
    }

    fn cell(&mut self, address: u16) -> &mut u8 {
        &mut self.memory[usize::from(address) % MEMORY_NYBBLES]
    }

    fn reset(&mut self) {
        self.resets += 1;
        self.phase = Phase::Idle;
        self.output.clear();

        if self.ignore_resets > 0 {
            self.ignore_resets -= 1;
            return;
        }
        if self.stray_zero {
            self.output.push_back(0x00);
        }
        self.output.push_back(RESET_ACK);
    }

    fn address_nybble(&mut self, byte: u8) {
        let n = (byte - 0x82) / 4;
        let (received, address) = match self.phase {
            Phase::Addressing { received, address } => (received, address),
            _ => (0, 0),
        };

        self.respond(received * 16 + n);

        let address = (address << 4) | u16::from(n);
        self.phase = if received == 3 {
            Phase::Addressed { address }
        } else {
            Phase::Addressing {
                received: received + 1,
                address,
            }
        };
    }

    fn read(&mut self, address: u16, byte: u8) {
        let nbytes = (byte - 0xC2) / 4;
        self.respond(0x30 + nbytes);

        let mut reply = Vec::with_capacity(usize::from(nbytes) + 1);
        let mut sum = 0u8;
        for k in 0..usize::from(nbytes) {
            let low = *self.cell(address.wrapping_add(2 * k as u16));
            let high = *self.cell(address.wrapping_add(2 * k as u16 + 1));
            let data = low | (high << 4);
            sum = sum.wrapping_add(data);
            reply.push(data);
        }

        if self.corrupt_checksums > 0 {
            self.corrupt_checksums -= 1;
            sum ^= 0xFF;
        }
        reply.push(sum);

        if let Some(index) = self.corrupt_reply.take() {
            if let Some(byte) = reply.get_mut(index) {
                trace!("sim: flipping reply byte {index}");
                *byte ^= 0x01;
            }
        }
        self.output.extend(reply);

        self.reads += 1;
        self.phase = Phase::Idle;
    }

    fn receive(&mut self, byte: u8) {
        if byte == RESET {
            self.reset();
            return;
        }

        let is_address = (0x82..=0xBE).contains(&byte) && (byte - 0x82) % 4 == 0;

        match self.phase {
            Phase::Idle | Phase::Addressing { .. } if is_address => self.address_nybble(byte),
            Phase::Addressed { .. } if is_address => {
                self.phase = Phase::Idle;
                self.address_nybble(byte);
            }
            Phase::Addressed { address } => match byte {
                0xC2..=0xFE if (byte - 0xC2) % 4 == 0 => self.read(address, byte),
                0x12..=0x1E if (byte - 0x12) % 4 == 0 => {
                    let bit = (byte - 0x12) / 4;
                    *self.cell(address) |= 1 << bit;
                    self.writes += 1;
                    self.respond(bit + 0x04);
                }
                0x32..=0x3E if (byte - 0x32) % 4 == 0 => {
                    let bit = (byte - 0x32) / 4;
                    *self.cell(address) &= !(1 << bit);
                    self.writes += 1;
                    self.respond(bit + 0x0C);
                }
                0x42..=0x7E if (byte - 0x42) % 4 == 0 => {
                    let value = (byte - 0x42) / 4;
                    *self.cell(address) = value;
                    self.writes += 1;
                    self.phase = Phase::Addressed {
                        address: address.wrapping_add(1),
                    };
                    self.respond(value + 0x10);
                }
                _ => {
                    trace!("sim: unexpected byte {byte:#04x} after address");
                    self.phase = Phase::Idle;
                }
            },
            _ => {
                trace!("sim: ignoring byte {byte:#04x}");
                self.phase = Phase::Idle;
            }
        }
    }
}

/// Archive temperature code: tenths of a degree above -30.
fn celsius_code(celsius: f64) -> u64 {
    ((celsius + 30.0) * 10.0).round().max(0.0) as u64
}

impl Transport for SimulatedStation {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        for &byte in bytes {
            self.receive(byte);
        }
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(sim: &mut SimulatedStation, bytes: &[u8]) -> Vec<u8> {
        sim.write(bytes).unwrap();
        let mut buf = [0u8; 64];
        let n = sim.read_timeout(&mut buf, Duration::ZERO).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_reset_handshake() {
        let mut sim = SimulatedStation::new();
        assert_eq!(exchange(&mut sim, &[RESET]), vec![RESET_ACK]);

        let mut sim = SimulatedStation::new().stray_zero(true);
        assert_eq!(exchange(&mut sim, &[RESET]), vec![0x00, RESET_ACK]);

        let mut sim = SimulatedStation::new().ignore_resets(1);
        assert!(exchange(&mut sim, &[RESET]).is_empty());
        assert_eq!(exchange(&mut sim, &[RESET]), vec![RESET_ACK]);
        assert_eq!(sim.resets(), 2);
    }

    #[test]
    fn test_address_and_read() {
        let mut sim = SimulatedStation::new();
        sim.poke_nybbles(0x346, &[0x1, 0x2, 0x3]);

        // 0x346: nybbles 0,3,4,6
        let acks = exchange(&mut sim, &[0x82, 0x8E, 0x92, 0x9A]);
        assert_eq!(acks, vec![0x00, 0x13, 0x24, 0x36]);

        // two bytes: command 0xC2 + 2*4, ack 0x32
        let reply = exchange(&mut sim, &[0xCA]);
        assert_eq!(reply, vec![0x32, 0x21, 0x03, 0x24]);
        assert_eq!(sim.reads(), 1);
    }

    #[test]
    fn test_nybble_write_advances_address() {
        let mut sim = SimulatedStation::new();
        exchange(&mut sim, &[0x82, 0x82, 0x86, 0x82]); // 0x0010
        let acks = exchange(&mut sim, &[0x42 + (5 << 2), 0x42 + (0xA << 2)]);
        assert_eq!(acks, vec![0x15, 0x1A]);
        assert_eq!(sim.peek(0x10, 2), vec![5, 0xA]);
    }

    #[test]
    fn test_bit_operations() {
        let mut sim = SimulatedStation::new();
        exchange(&mut sim, &[0x82, 0x82, 0x82, 0x9A]); // 0x0006
        assert_eq!(exchange(&mut sim, &[0x12 + (3 << 2)]), vec![0x07]);
        assert_eq!(sim.peek(0x006, 1), vec![0b1000]);
        assert_eq!(exchange(&mut sim, &[0x32 + (3 << 2)]), vec![0x0F]);
        assert_eq!(sim.peek(0x006, 1), vec![0]);
    }

    #[test]
    fn test_corrupted_checksum() {
        let mut sim = SimulatedStation::new().corrupt_checksums(1);
        exchange(&mut sim, &[0x82, 0x82, 0x82, 0x82]);
        let reply = exchange(&mut sim, &[0xC6]);
        assert_eq!(reply, vec![0x31, 0x00, 0xFF]);
    }

    #[test]
    fn test_corrupted_data_byte() {
        let mut sim = SimulatedStation::new().corrupt_reply_byte(1);
        sim.poke_nybbles(0x000, &[0x1, 0x2, 0x3, 0x4]);
        exchange(&mut sim, &[0x82, 0x82, 0x82, 0x82]);
        let reply = exchange(&mut sim, &[0xCA]);
        assert_eq!(reply, vec![0x32, 0x21, 0x42, 0x64]);

        // Only the next reply is affected
        exchange(&mut sim, &[0x82, 0x82, 0x82, 0x82]);
        assert_eq!(exchange(&mut sim, &[0xCA]), vec![0x32, 0x21, 0x43, 0x64]);
    }

    #[test]
    fn test_sample_data_seeds_cleanly() {
        let mut sim = SimulatedStation::new();
        sim.seed_sample_data().unwrap();
        assert_eq!(sim.peek(0x54d, 1), vec![15]);
        assert_eq!(sim.peek(0x6c4, 2), vec![0xC, 0x0], "twelve history records");
    }

    #[test]
    fn test_poke_timestamp_layout() {
        let mut sim = SimulatedStation::new();
        let when = NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap();
        sim.poke_timestamp(0x100, when, true).unwrap();
        // 2024-03-14 was a Thursday, weekday 5 counting from Sunday = 1
        assert_eq!(
            sim.peek(0x100, 11),
            vec![0, 3, 5, 1, 5, 4, 1, 3, 0, 4, 2]
        );
    }
}
