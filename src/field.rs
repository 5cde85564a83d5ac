//! Physical field decoding.
//!
//! A [`FieldSpec`] describes how a run of nybbles in console memory maps to a
//! physical quantity: its encoding ([`FieldKind`]), its width in nybbles and
//! its display units. The console stores every quantity in one of a handful of
//! encodings, so the constants at the bottom of this file cover the whole
//! memory map.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::nybble::{self, NybbleError};

/// Degrees per compass step of a wind direction nybble.
pub const DEGREES_PER_POINT: f64 = 22.5;

/// Errors raised while turning raw nybbles into a [`PhysicalValue`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed field: {0}")]
    Nybble(#[from] NybbleError),

    /// A coded field holds a value outside its lookup table
    #[error("{code:x} (error)")]
    UnrecognizedCode { code: u8 },

    /// Date fields decode to an impossible calendar date
    #[error("invalid date or time")]
    InvalidDate,

    /// A decoded value lies outside the range the console can produce
    #[error("{what} value {value} out of range")]
    OutOfRange { what: &'static str, value: u64 },
}

/// Encoding of a memory field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// BCD integer, `(raw + offset) / 10^scale`
    Bcd { scale: u32, offset: i64 },
    /// Hex integer, `raw * multiplier / 10^scale`
    Hex { multiplier: u32, scale: u32 },
    /// Single nybble counting 22.5 degree compass points
    Direction,
    /// minute, hour, day, month, two-digit year (10 nybbles)
    Timestamp,
    /// minute, hour, weekday, day, month, two-digit year (11 nybbles)
    DateTime,
    /// One bit of a nybble, rendered with the given labels
    Bit {
        bit: u8,
        unset: &'static str,
        set: &'static str,
    },
    /// Nybble looked up in a code table
    Text { table: &'static [(u8, &'static str)] },
    /// Raw nybble value
    Byte,
}

/// Layout and encoding of one memory field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub width: usize,
    pub units: &'static str,
    /// Short description of the encoding, shown in measure listings
    pub name: &'static str,
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PhysicalValue {
    Number(f64),
    Time(NaiveDateTime),
    Flag(bool),
    Label(&'static str),
    Code(u8),
}

impl PhysicalValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            PhysicalValue::Number(v) => Some(v),
            PhysicalValue::Code(c) => Some(f64::from(c)),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<u8> {
        match *self {
            PhysicalValue::Code(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for PhysicalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalValue::Number(v) => write!(f, "{v}"),
            PhysicalValue::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M")),
            PhysicalValue::Flag(b) => write!(f, "{}", u8::from(*b)),
            PhysicalValue::Label(s) => f.write_str(s),
            PhysicalValue::Code(c) => write!(f, "{c}"),
        }
    }
}

impl FieldSpec {
    /// Decode this field from `buf`, starting at nybble `offset`.
    pub fn decode(&self, buf: &[u8], offset: usize) -> Result<PhysicalValue, DecodeError> {
        let value = match self.kind {
            FieldKind::Bcd { scale, offset: bias } => {
                let raw = nybble::bcd_to_int(buf, self.width, offset)? as i64;
                PhysicalValue::Number((raw + bias) as f64 / 10f64.powi(scale as i32))
            }
            FieldKind::Hex { multiplier, scale } => {
                let raw = nybble::hex_to_int(buf, self.width, offset)?;
                PhysicalValue::Number(
                    raw as f64 * f64::from(multiplier) / 10f64.powi(scale as i32),
                )
            }
            FieldKind::Direction => {
                PhysicalValue::Number(f64::from(nybble::nybble_at(buf, offset)?) * DEGREES_PER_POINT)
            }
            FieldKind::Timestamp => PhysicalValue::Time(decode_calendar(buf, offset, false)?),
            FieldKind::DateTime => PhysicalValue::Time(decode_calendar(buf, offset, true)?),
            FieldKind::Bit { bit, .. } => {
                PhysicalValue::Flag(nybble::nybble_at(buf, offset)? & (1 << bit) != 0)
            }
            FieldKind::Text { table } => {
                let code = nybble::nybble_at(buf, offset)?;
                let label = table
                    .iter()
                    .find(|(c, _)| *c == code)
                    .map(|(_, label)| *label)
                    .ok_or(DecodeError::UnrecognizedCode { code })?;
                PhysicalValue::Label(label)
            }
            FieldKind::Byte => PhysicalValue::Code(nybble::nybble_at(buf, offset)?),
        };

        Ok(value)
    }

    /// Number of decimals worth printing for numeric fields.
    pub fn precision(&self) -> usize {
        match self.kind {
            FieldKind::Bcd { scale, .. } | FieldKind::Hex { scale, .. } => scale as usize,
            FieldKind::Direction => 1,
            _ => 0,
        }
    }
}

/// Decode a calendar stamp. Years are two BCD digits past 2000; the optional
/// weekday nybble (1 = Sunday) only has to be in range.
fn decode_calendar(
    buf: &[u8],
    offset: usize,
    weekday: bool,
) -> Result<NaiveDateTime, DecodeError> {
    let field = |rel: usize, width: usize| -> Result<u32, DecodeError> {
        Ok(nybble::bcd_to_int(buf, width, offset + rel)? as u32)
    };

    let minute = field(0, 2)?;
    let hour = field(2, 2)?;

    let date_at = if weekday {
        if !(1..=7).contains(&field(4, 1)?) {
            return Err(DecodeError::InvalidDate);
        }
        5
    } else {
        4
    };

    let day = field(date_at, 2)?;
    let month = field(date_at + 2, 2)?;
    let year = field(date_at + 4, 2)?;

    NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or(DecodeError::InvalidDate)
}

const fn bcd(
    width: usize,
    scale: u32,
    offset: i64,
    units: &'static str,
    name: &'static str,
) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Bcd { scale, offset },
        width,
        units,
        name,
    }
}

const fn hex(
    width: usize,
    multiplier: u32,
    scale: u32,
    units: &'static str,
    name: &'static str,
) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Hex { multiplier, scale },
        width,
        units,
        name,
    }
}

const fn text(table: &'static [(u8, &'static str)]) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Text { table },
        width: 1,
        units: "",
        name: "code",
    }
}

const fn bit(bit: u8, unset: &'static str, set: &'static str) -> FieldSpec {
    FieldSpec {
        kind: FieldKind::Bit { bit, unset, set },
        width: 1,
        units: "",
        name: "flag",
    }
}

pub const TEMPERATURE: FieldSpec = bcd(4, 2, -3000, "°C", "temperature");
pub const PRESSURE: FieldSpec = bcd(5, 1, 0, "hPa", "pressure");
pub const HUMIDITY: FieldSpec = bcd(2, 0, 0, "%", "humidity");
pub const RAIN: FieldSpec = bcd(6, 2, 0, "mm", "rain");
pub const SPEED: FieldSpec = hex(3, 1, 1, "m/s", "speed");
pub const INTERVAL_SECONDS: FieldSpec = hex(2, 5, 1, "s", "time interval");
pub const INTERVAL_MINUTES: FieldSpec = hex(3, 1, 0, "min", "time interval");
pub const RECORD_NUMBER: FieldSpec = hex(2, 1, 0, "", "record number");
pub const CONTRAST: FieldSpec = hex(1, 1, 0, "", "contrast");

pub const WIND_DIRECTION: FieldSpec = FieldSpec {
    kind: FieldKind::Direction,
    width: 1,
    units: "deg",
    name: "wind direction, North=0 clockwise",
};

pub const TIMESTAMP: FieldSpec = FieldSpec {
    kind: FieldKind::Timestamp,
    width: 10,
    units: "",
    name: "yyyy-mm-dd hh:mm",
};

pub const DATETIME: FieldSpec = FieldSpec {
    kind: FieldKind::DateTime,
    width: 11,
    units: "",
    name: "yyyy-mm-dd hh:mm",
};

pub const CODE: FieldSpec = FieldSpec {
    kind: FieldKind::Byte,
    width: 1,
    units: "",
    name: "raw nybble",
};

pub const CONNECTION: FieldSpec = text(&[(0, "cable"), (3, "lost"), (15, "wireless")]);
pub const FORECAST: FieldSpec = text(&[(0, "rainy"), (1, "cloudy"), (2, "sunny")]);
pub const TENDENCY: FieldSpec = text(&[(0, "steady"), (1, "rising"), (2, "falling")]);
pub const SPEED_UNIT: FieldSpec = text(&[
    (0, "m/s"),
    (1, "knots"),
    (2, "beaufort"),
    (3, "km/h"),
    (4, "mph"),
]);
pub const WIND_OVERFLOW: FieldSpec = text(&[(0, "no"), (1, "overflow")]);
pub const WIND_VALIDITY: FieldSpec = text(&[(0, "ok"), (1, "invalid"), (2, "overflow")]);

pub const ALARM_SET: [FieldSpec; 4] = [
    bit(0, "off", "on"),
    bit(1, "off", "on"),
    bit(2, "off", "on"),
    bit(3, "off", "on"),
];
pub const ALARM_ACTIVE: [FieldSpec; 4] = [
    bit(0, "inactive", "active"),
    bit(1, "inactive", "active"),
    bit(2, "inactive", "active"),
    bit(3, "inactive", "active"),
];
/// The buzzer bit is set when the buzzer is silenced.
pub const BUZZER: FieldSpec = bit(3, "on", "off");
pub const BACKLIGHT: FieldSpec = bit(0, "off", "on");
