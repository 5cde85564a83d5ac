//! History archive.
//!
//! The console keeps a ring of 175 fixed-size records, one per save
//! interval. A 20-nybble header at 0x6b2 describes the ring:
//!
//! | offset | width | content                        |
//! |--------|-------|--------------------------------|
//! | 0      | 3     | save interval - 1, minutes     |
//! | 3      | 3     | minutes until the next sample  |
//! | 6      | 10    | time of the newest record      |
//! | 16     | 2     | ring index of the newest record|
//! | 18     | 2     | number of valid records        |
//!
//! Records carry no timestamp of their own; record `i` (0 = newest) is dated
//! `i` intervals before the header timestamp. The header timestamp is only
//! meaningful once the ring holds a record: a console whose archive was never
//! written leaves it zeroed.

use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::batch::MemoryRequest;
use crate::field::{self, DecodeError, PhysicalValue};
use crate::nybble::{self, Radix};
use crate::protocol::{ProtocolError, Station, WriteOp};
use crate::transport::Transport;

pub const HEADER_ADDRESS: u16 = 0x6b2;
pub const HEADER_NYBBLES: usize = 20;
pub const RECORD_COUNT_ADDRESS: u16 = 0x6c4;
pub const RING_ADDRESS: u16 = 0x6c6;
pub const RECORD_NYBBLES: usize = 19;
pub const CAPACITY: usize = 175;
/// Longest save interval the three-nybble field can hold.
pub const MAX_INTERVAL_MINUTES: u32 = 0x1000;

/// Position of the newest record and how to date the others.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ArchiveCursor {
    pub save_interval_minutes: u32,
    /// Time of the newest record; `None` while the ring is empty
    pub last_sample: Option<NaiveDateTime>,
    pub last_record_index: usize,
    pub record_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub address: u16,
    pub timestamp: NaiveDateTime,
    pub temperature_indoor: f64,
    pub temperature_outdoor: f64,
    pub pressure: f64,
    pub humidity_indoor: u8,
    pub humidity_outdoor: u8,
    pub rain: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
}

/// Ring slot of the `i`-th most recent record.
pub fn slot_for(i: usize, last_record_index: usize, capacity: usize) -> usize {
    if i <= last_record_index {
        last_record_index - i
    } else {
        capacity - (i - last_record_index)
    }
}

/// Memory address of ring slot `slot`.
pub fn record_address(slot: usize) -> u16 {
    RING_ADDRESS + (slot * RECORD_NYBBLES) as u16
}

impl ArchiveCursor {
    pub fn decode(header: &[u8]) -> Result<Self, DecodeError> {
        let save_interval_minutes = nybble::hex_to_int(header, 3, 0)? as u32 + 1;

        let last_record_index = nybble::hex_to_int(header, 2, 16)?;
        if last_record_index >= CAPACITY as u64 {
            return Err(DecodeError::OutOfRange {
                what: "last record index",
                value: last_record_index,
            });
        }

        let record_count = nybble::hex_to_int(header, 2, 18)?;
        if record_count > CAPACITY as u64 {
            return Err(DecodeError::OutOfRange {
                what: "record count",
                value: record_count,
            });
        }

        let last_sample = if record_count == 0 {
            None
        } else {
            match field::TIMESTAMP.decode(header, 6)? {
                PhysicalValue::Time(t) => Some(t),
                _ => return Err(DecodeError::InvalidDate),
            }
        };

        Ok(Self {
            save_interval_minutes,
            last_sample,
            last_record_index: last_record_index as usize,
            record_count: record_count as usize,
        })
    }

    /// Records to fetch for a caller limit; 0 means all of them.
    pub fn available(&self, max_records: usize) -> usize {
        if max_records == 0 || max_records > self.record_count {
            self.record_count
        } else {
            max_records
        }
    }

    /// Address of the `i`-th most recent record.
    pub fn address(&self, i: usize) -> u16 {
        record_address(slot_for(i, self.last_record_index, CAPACITY))
    }

    /// Timestamp of the `i`-th most recent record.
    pub fn timestamp(&self, i: usize) -> Option<NaiveDateTime> {
        self.last_sample
            .map(|t| t - Duration::minutes(i as i64 * i64::from(self.save_interval_minutes)))
    }
}

/// Decode one 19-nybble record.
pub fn decode_record(
    buf: &[u8],
    address: u16,
    timestamp: NaiveDateTime,
) -> Result<ArchiveRecord, DecodeError> {
    let temperatures = nybble::hex_to_int(buf, 5, 0)?;
    let indoor = temperatures % 1000;
    let outdoor = temperatures - indoor;

    let humidity_pressure = nybble::hex_to_int(buf, 5, 5)?;
    let pressure_code = humidity_pressure % 10_000;
    let humidity_indoor = (humidity_pressure - pressure_code) / 10_000;

    let mut pressure = 1000.0 + pressure_code as f64 / 10.0;
    if pressure > 1500.0 {
        pressure -= 1000.0;
    }

    Ok(ArchiveRecord {
        address,
        timestamp,
        temperature_indoor: indoor as f64 / 10.0 - 30.0,
        temperature_outdoor: outdoor as f64 / 10_000.0 - 30.0,
        pressure,
        humidity_indoor: humidity_indoor.min(u64::from(u8::MAX)) as u8,
        humidity_outdoor: nybble::bcd_to_int(buf, 2, 10)? as u8,
        rain: nybble::hex_to_int(buf, 3, 12)? as f64 * 0.518,
        wind_speed: nybble::hex_to_int(buf, 3, 15)? as f64 / 10.0,
        wind_direction: f64::from(nybble::nybble_at(buf, 18)?) * field::DEGREES_PER_POINT,
    })
}

impl<T: Transport> Station<T> {
    /// Read the archive header.
    pub fn archive_cursor(&mut self) -> Result<ArchiveCursor, ProtocolError> {
        let header = self.read(HEADER_ADDRESS, HEADER_NYBBLES)?;
        Ok(ArchiveCursor::decode(&header)?)
    }

    /// Fetch up to `max_records` history records (0 for all), oldest first.
    ///
    /// A record that fails to decode is logged and left out; the others are
    /// still returned.
    pub fn fetch_history(&mut self, max_records: usize) -> Result<Vec<ArchiveRecord>, ProtocolError> {
        let cursor = self.archive_cursor()?;
        let count = cursor.available(max_records);
        if count == 0 {
            debug!("Archive is empty");
            return Ok(Vec::new());
        }

        debug!(
            "Archive holds {} records, newest in slot {} at {:?}",
            cursor.record_count, cursor.last_record_index, cursor.last_sample
        );

        let requests: Vec<MemoryRequest> = (0..count)
            .map(|i| MemoryRequest::new(cursor.address(i), RECORD_NYBBLES))
            .collect();
        let buffers = self.read_batch(&requests)?;

        let mut records = Vec::with_capacity(count);
        for (i, (buf, request)) in buffers.iter().zip(&requests).enumerate() {
            let decoded = cursor
                .timestamp(i)
                .ok_or(DecodeError::InvalidDate)
                .and_then(|when| decode_record(buf, request.address, when));
            match decoded {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping history record at {:#05x}: {e}", request.address),
            }
        }
        records.reverse();

        Ok(records)
    }

    /// Set the save interval and the countdown to the next sample, then
    /// clear the archive.
    pub fn set_history_interval(
        &mut self,
        interval_minutes: u32,
        next_sample_minutes: u32,
    ) -> Result<(), ProtocolError> {
        for (name, minutes) in [("interval", interval_minutes), ("next sample", next_sample_minutes)] {
            if !(1..=MAX_INTERVAL_MINUTES).contains(&minutes) {
                return Err(ProtocolError::InvalidArgument(format!(
                    "history {name} {minutes} outside 1..={MAX_INTERVAL_MINUTES} minutes"
                )));
            }
        }

        let mut timer = [0u8; 3];
        nybble::int_to_nybbles(u64::from(interval_minutes - 1), 3, 0, Radix::Hex, &mut timer)?;
        nybble::int_to_nybbles(u64::from(next_sample_minutes - 1), 3, 3, Radix::Hex, &mut timer)?;
        self.write(HEADER_ADDRESS, &timer, 6, WriteOp::Nybbles)?;

        self.write(RECORD_COUNT_ADDRESS, &[0u8], 2, WriteOp::Nybbles)?;

        info!("History interval set to {interval_minutes} min, archive cleared");
        Ok(())
    }
}
