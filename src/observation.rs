//! Live observations.
//!
//! Turns a decoded batch of [`LIVE_MEASURES`] into an [`Observation`],
//! dropping values the console cannot vouch for: outdoor sensors while the
//! link to the outdoor unit is down, wind while the anemometer flags are
//! raised, and anything outside the sensors' physical range.

use log::{debug, warn};
use serde::Serialize;
use std::time::Duration;

use crate::batch::Reading;
use crate::memory_map::{LINK_MEASURES, LIVE_MEASURES};
use crate::protocol::{ProtocolError, Station};
use crate::transport::Transport;

/// How the console reaches its outdoor sensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Connection {
    Cable,
    Wireless,
    Lost(u8),
}

impl Connection {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Connection::Cable,
            15 => Connection::Wireless,
            other => Connection::Lost(other),
        }
    }

    pub fn is_up(self) -> bool {
        !matches!(self, Connection::Lost(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Observation {
    pub connection: Option<Connection>,
    pub temperature_indoor: Option<f64>,
    pub humidity_indoor: Option<f64>,
    pub pressure: Option<f64>,
    pub temperature_outdoor: Option<f64>,
    pub humidity_outdoor: Option<f64>,
    pub dew_point: Option<f64>,
    pub rain_total: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_chill: Option<f64>,
}

fn value(reading: &Reading, id: &str) -> Option<f64> {
    match reading.get(id) {
        Some(Ok(v)) => v.as_f64(),
        Some(Err(e)) => {
            warn!("Discarding {id}: {e}");
            None
        }
        None => None,
    }
}

fn code(reading: &Reading, id: &str) -> Option<u8> {
    match reading.get(id) {
        Some(Ok(v)) => v.as_code(),
        _ => None,
    }
}

/// Keep `value` only inside the sensor's range.
fn within(name: &str, value: Option<f64>, min: f64, max: f64) -> Option<f64> {
    match value {
        Some(v) if v < min || v > max => {
            warn!("{name} {v} outside sensor range {min}..{max}, discarded");
            None
        }
        other => other,
    }
}

impl Observation {
    pub fn from_reading(reading: &Reading) -> Self {
        let mut obs = Observation {
            temperature_indoor: within("indoor temperature", value(reading, "it"), -9.9, 59.9),
            humidity_indoor: within("indoor humidity", value(reading, "ih"), 1.0, 99.0),
            pressure: value(reading, "pr"),
            connection: code(reading, "cn").map(Connection::from_code),
            ..Default::default()
        };

        if !obs.connection.is_some_and(Connection::is_up) {
            warn!("Outdoor sensors unreachable ({:?})", obs.connection);
            return obs;
        }

        obs.temperature_outdoor =
            within("outdoor temperature", value(reading, "ot"), -29.9, 69.9);
        obs.humidity_outdoor = within("outdoor humidity", value(reading, "oh"), 10.0, 99.0);
        obs.dew_point = value(reading, "dp");
        obs.rain_total = value(reading, "rt");

        let wind_ok = code(reading, "wso") == Some(0) && code(reading, "wsv") == Some(0);
        if wind_ok {
            obs.wind_speed = within("wind speed", value(reading, "ws"), 0.0, 50.0);
            obs.wind_direction = value(reading, "w0");
            obs.wind_chill = value(reading, "wc");
        } else {
            debug!("Wind sensor flagged invalid or overflowed");
        }

        obs
    }
}

/// When to sample the console next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSchedule {
    /// Time between samples once in step with the console
    pub interval: Duration,
    /// Wait before the first sample, lined up just after the console's own
    /// sensor update
    pub first: Duration,
}

/// Derive the sampling cadence from the link type and the seconds until the
/// console next talks to its sensors.
pub fn poll_interval(connection: Connection, countdown_secs: f64) -> Option<PollSchedule> {
    let (interval, margin) = match connection {
        Connection::Cable => (8, 2.0),
        Connection::Wireless => (128, 10.0),
        Connection::Lost(_) => return None,
    };

    Some(PollSchedule {
        interval: Duration::from_secs(interval),
        first: Duration::from_secs_f64(countdown_secs.max(0.0) + margin),
    })
}

impl<T: Transport> Station<T> {
    /// Read one live observation.
    pub fn observe(&mut self) -> Result<Observation, ProtocolError> {
        let reading = self.acquire(LIVE_MEASURES)?;
        Ok(Observation::from_reading(&reading))
    }

    /// Read the link state and work out the polling cadence.
    pub fn poll_schedule(&mut self) -> Result<Option<PollSchedule>, ProtocolError> {
        let reading = self.acquire(LINK_MEASURES)?;

        let connection = code(&reading, "cn").map(Connection::from_code);
        let countdown = value(&reading, "cc").unwrap_or(0.0);

        Ok(connection.and_then(|c| poll_interval(c, countdown)))
    }
}
