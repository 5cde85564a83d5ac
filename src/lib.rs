//! # WS23xx Weather Station Library
//!
//! Host-side driver for La Crosse WS2300-series weather station consoles
//! (WS2300, WS2305, WS2310, WS2315 and relatives). The console exposes its
//! whole memory, live sensor values, min/max records, alarm settings and the
//! history ring, over a slow serial line that is read and written one nybble
//! at a time.
//!
//! ## Layers
//!
//! From the wire upwards:
//!
//! - [`transport`]: the byte-level [`transport::Transport`] trait, with a
//!   real serial port ([`serial`], behind the `hardware` feature) and an
//!   in-memory console ([`simulator`]) underneath
//! - [`protocol`]: the [`protocol::Station`] engine; reset handshake,
//!   addressing, checksummed reads, acknowledged writes and retry policy
//! - [`batch`]: merges many small reads into few block transactions
//! - [`nybble`] and [`field`]: pure codecs from packed nybbles to physical
//!   values
//! - [`memory_map`]: the catalogue of known memory cells
//! - [`archive`] and [`observation`]: history records and validated live
//!   observations built on the layers above
//! - [`report`] and [`config`]: command line rendering and settings
//!
//! ## Example
//!
//! ```
//! use ws23xx_lib::memory_map;
//! use ws23xx_lib::protocol::Station;
//! use ws23xx_lib::simulator::SimulatedStation;
//!
//! let mut station = Station::new(SimulatedStation::with_sample_data());
//! let indoor = memory_map::by_id("it").unwrap();
//! let reading = station.acquire(&[*indoor]).unwrap();
//! assert!(reading["it"].is_ok());
//! ```
//!
//! ## Concurrency
//!
//! A [`protocol::Station`] owns its transport and every operation takes
//! `&mut self`, so one link can only run one transaction at a time. The
//! console itself cannot interleave requests either.

pub mod archive;
pub mod batch;
pub mod config;
pub mod field;
pub mod memory_map;
pub mod nybble;
pub mod observation;
pub mod protocol;
pub mod report;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod simulator;
pub mod transport;

pub use archive::{ArchiveCursor, ArchiveRecord};
pub use batch::{MemoryRequest, Reading};
pub use field::{DecodeError, FieldSpec, PhysicalValue};
pub use memory_map::Measure;
pub use nybble::NybbleError;
pub use observation::Observation;
pub use protocol::{ProtocolError, Station, SyncState, WriteOp};
pub use transport::Transport;
