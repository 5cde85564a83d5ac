//! # Protocol Engine Tests
//!
//! Exercises reset, chunked reads, writes, retries and batching through a
//! [`SimulatedStation`], including the fault modes real serial links show.

use std::time::Duration;
use ws23xx_lib::field::PhysicalValue;
use ws23xx_lib::memory_map::{self, LIVE_MEASURES};
use ws23xx_lib::nybble::{self, Radix};
use ws23xx_lib::observation::Connection;
use ws23xx_lib::protocol::{ProtocolError, Station, SyncState, WriteOp, MAX_RETRIES};
use ws23xx_lib::simulator::SimulatedStation;
use ws23xx_lib::MemoryRequest;

fn connect(sim: SimulatedStation) -> Station<SimulatedStation> {
    Station::new(sim).with_read_timeout(Duration::ZERO)
}

/// A console that needs 99 resets before answering still synchronises.
#[test]
fn reset_succeeds_on_last_attempt() {
    let mut station = connect(SimulatedStation::new().ignore_resets(99));

    station.reset().expect("100th reset should be acknowledged");

    assert_eq!(station.state(), SyncState::Synchronized);
    assert_eq!(station.transport().resets(), 100);
}

/// After 100 ignored resets the console is declared unresponsive.
#[test]
fn reset_gives_up_after_budget() {
    let mut station = connect(SimulatedStation::new().ignore_resets(100));

    let err = station.reset().unwrap_err();

    assert!(
        matches!(err, ProtocolError::DeviceUnresponsive { attempts: 100 }),
        "unexpected error: {err}"
    );
    assert_eq!(station.state(), SyncState::Failed);
    assert_eq!(station.transport().resets(), 100);
}

/// Noise ahead of the reset acknowledgement is skipped.
#[test]
fn reset_tolerates_stray_byte() {
    let mut station = connect(SimulatedStation::new().stray_zero(true));
    station.reset().expect("0x02 after a stray 0x00 still counts");

    station.transport_mut().poke_nybbles(0x40, &[0x9, 0x1]);
    let data = station.read(0x40, 2).unwrap();
    assert_eq!(data, vec![0x19]);
}

/// Reads longer than one transaction are split and reassembled.
#[test]
fn long_read_spans_transactions() {
    let mut sim = SimulatedStation::new();
    let pattern: Vec<u8> = (0..70u8).map(|i| i.wrapping_mul(7) % 16).collect();
    sim.poke_nybbles(0x300, &pattern);

    let mut station = connect(sim);
    let data = station.read(0x300, 70).unwrap();

    assert_eq!(data.len(), 35);
    for (i, expected) in pattern.iter().enumerate() {
        assert_eq!(
            nybble::nybble_at(&data, i).unwrap(),
            *expected,
            "nybble {i} differs"
        );
    }
    assert_eq!(station.transport().reads(), 3, "30 + 30 + 10 nybbles");
}

/// A corrupted checksum is retried after a fresh reset.
#[test]
fn checksum_error_is_retried() {
    let mut sim = SimulatedStation::new().corrupt_checksums(2);
    sim.poke_nybbles(0x120, &[1, 2, 3, 4]);

    let mut station = connect(sim);
    let data = station.read(0x120, 4).unwrap();

    assert_eq!(data, vec![0x21, 0x43]);
    assert_eq!(station.transport().resets(), 3, "initial reset plus one per failure");
    assert_eq!(station.transport().reads(), 3);
}

/// A single corrupted byte anywhere in a read reply, data or checksum, fails
/// the transaction with a checksum error.
#[test]
fn any_corrupted_reply_byte_fails_checksum() {
    // 8 nybbles: 4 data bytes followed by the checksum byte
    for index in 0..=4 {
        let mut sim = SimulatedStation::new().corrupt_reply_byte(index);
        sim.poke_nybbles(0x180, &[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut station = connect(sim);
        station.reset().unwrap();
        let err = station.read_nybbles(0x180, 8).unwrap_err();

        assert!(
            matches!(err, ProtocolError::Checksum { .. }),
            "byte {index}: unexpected error {err}"
        );
        assert_eq!(station.state(), SyncState::Failed);

        station.reset().unwrap();
        assert_eq!(
            station.read_nybbles(0x180, 8).unwrap(),
            vec![0x21, 0x43, 0x65, 0x87],
            "byte {index}: clean reply after the corrupted one"
        );
    }
}

/// A lost acknowledgement is recovered the same way.
#[test]
fn dropped_ack_is_retried() {
    let mut sim = SimulatedStation::new().drop_acks(1);
    sim.poke_nybbles(0x200, &[0xA, 0xB]);

    let mut station = connect(sim);
    assert_eq!(station.read(0x200, 2).unwrap(), vec![0xBA]);
    assert_eq!(station.state(), SyncState::Synchronized);
}

/// Persistent corruption exhausts the retry budget.
#[test]
fn retry_budget_is_bounded() {
    let mut station = connect(SimulatedStation::new().corrupt_checksums(usize::MAX));

    let err = station.read(0x100, 4).unwrap_err();

    assert!(
        matches!(err, ProtocolError::DeviceUnresponsive { attempts } if attempts == MAX_RETRIES),
        "unexpected error: {err}"
    );
    assert_eq!(station.transport().reads(), MAX_RETRIES);
}

/// Nybble writes land in memory least-significant nybble first.
#[test]
fn write_then_read_back() {
    let mut data = [0u8; 3];
    nybble::int_to_nybbles(0x12345, 5, 0, Radix::Hex, &mut data).unwrap();

    let mut station = connect(SimulatedStation::new());
    station.write(0x100, &data, 5, WriteOp::Nybbles).unwrap();

    assert_eq!(station.transport().peek(0x100, 5), vec![5, 4, 3, 2, 1]);
    assert_eq!(station.transport().writes(), 5);

    let back = station.read(0x100, 5).unwrap();
    assert_eq!(nybble::hex_to_int(&back, 5, 0).unwrap(), 0x12345);
}

/// Writes longer than one transaction are split.
#[test]
fn long_write_is_chunked() {
    let values: Vec<u8> = (0..40u8).map(|i| i % 16).collect();
    let mut data = vec![0u8; nybble::byte_len(values.len())];
    for (i, v) in values.iter().enumerate() {
        nybble::set_nybble(&mut data, i, *v).unwrap();
    }

    let mut station = connect(SimulatedStation::new());
    station.write(0x400, &data, 40, WriteOp::Nybbles).unwrap();

    assert_eq!(station.transport().peek(0x400, 40), values);
}

/// Bit operations toggle a single bit of the addressed nybble.
#[test]
fn set_and_clear_bits() {
    let buzzer = memory_map::by_id("bz").unwrap();
    let mut station = connect(SimulatedStation::new());

    station.write(buzzer.address, &[3], 1, WriteOp::SetBit).unwrap();
    assert_eq!(station.transport().peek(buzzer.address, 1), vec![0b1000]);

    let reading = station.acquire(&[*buzzer]).unwrap();
    assert_eq!(reading["bz"], Ok(PhysicalValue::Flag(true)));

    station.write(buzzer.address, &[3], 1, WriteOp::ClearBit).unwrap();
    assert_eq!(station.transport().peek(buzzer.address, 1), vec![0]);
}

/// Neighbouring cells share one transaction; distant ones get their own.
#[test]
fn batch_merges_neighbours() {
    let ids = ["it", "itl", "pr"];
    let measures: Vec<_> = ids
        .iter()
        .map(|id| *memory_map::by_id(id).unwrap())
        .collect();

    let mut station = connect(SimulatedStation::with_sample_data());
    let reading = station.acquire(&measures).unwrap();

    assert_eq!(station.transport().reads(), 2, "it+itl merged, pr separate");
    assert_eq!(station.transport().resets(), 1, "one reset per batch");
    assert_eq!(reading["it"], Ok(PhysicalValue::Number(21.5)));
    assert_eq!(reading["pr"], Ok(PhysicalValue::Number(1013.2)));
}

/// Requests at odd addresses come back aligned to nybble 0.
#[test]
fn batch_realigns_odd_offsets() {
    let mut sim = SimulatedStation::new();
    sim.poke_nybbles(0x101, &[1, 2, 3, 4, 5, 6]);

    let requests = [
        MemoryRequest::new(0x104, 2),
        MemoryRequest::new(0x101, 3),
        MemoryRequest::new(0x103, 1),
    ];
    let mut station = connect(sim);
    let buffers = station.read_batch(&requests).unwrap();

    assert_eq!(buffers.len(), 3);
    assert_eq!(buffers[0], vec![0x54]);
    assert_eq!(nybble::hex_to_int(&buffers[1], 3, 0).unwrap(), 0x321);
    assert_eq!(nybble::nybble_at(&buffers[2], 0).unwrap(), 3);
    assert_eq!(station.transport().reads(), 1);
}

/// The live cycle on the sample console yields a complete observation.
#[test]
fn live_observation_from_sample_console() {
    let mut station = connect(SimulatedStation::with_sample_data());

    let observation = station.observe().unwrap();

    assert_eq!(observation.connection, Some(Connection::Wireless));
    assert_eq!(observation.temperature_indoor, Some(21.5));
    assert_eq!(observation.temperature_outdoor, Some(7.25));
    assert_eq!(observation.wind_speed, Some(3.5));
    assert_eq!(observation.wind_direction, Some(225.0));
    assert_eq!(observation.pressure, Some(1013.2));

    let reading = station.acquire(LIVE_MEASURES).unwrap();
    assert!(
        reading.values().all(|r| r.is_ok()),
        "every live cell decodes: {reading:?}"
    );
}

/// Wireless consoles are polled every 128 s, lined up after the next update.
#[test]
fn poll_schedule_follows_link() {
    let mut station = connect(SimulatedStation::with_sample_data());

    let schedule = station.poll_schedule().unwrap().expect("link is up");

    assert_eq!(schedule.interval, Duration::from_secs(128));
    assert_eq!(schedule.first, Duration::from_secs(34));
}
