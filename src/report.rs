//! # Text Rendering
//!
//! Formats decoded values, measure listings, history records and raw memory
//! dumps for the command line. Every function returns a `String` (or lines of
//! them) so the binary decides where output goes.

use serde_json::{json, Map, Value};

use crate::archive::ArchiveRecord;
use crate::batch::Reading;
use crate::field::{DecodeError, FieldKind, FieldSpec, PhysicalValue};
use crate::memory_map::Measure;
use crate::nybble;

/// Timestamp layout used in delimited output.
pub const CSV_DATE: &str = "%Y-%m-%dT%H:%M";

/// Render a decoded value with the precision and labels of its field.
pub fn format_value(spec: &FieldSpec, value: &PhysicalValue) -> String {
    match (value, spec.kind) {
        (PhysicalValue::Number(v), _) => format!("{:.*}", spec.precision(), v),
        (PhysicalValue::Time(t), _) => t.format("%Y-%m-%d %H:%M").to_string(),
        (PhysicalValue::Flag(b), FieldKind::Bit { unset, set, .. }) => {
            (if *b { set } else { unset }).to_string()
        }
        (other, _) => other.to_string(),
    }
}

/// Render a decode result; failures show as the error text.
pub fn format_result(spec: &FieldSpec, result: &Result<PhysicalValue, DecodeError>) -> String {
    match result {
        Ok(value) => format_value(spec, value),
        Err(e) => e.to_string(),
    }
}

/// Human description of a field's encoding, listing codes and labels.
pub fn describe_spec(spec: &FieldSpec) -> String {
    match spec.kind {
        FieldKind::Bit { unset, set, .. } => format!("0={unset}, 1={set}"),
        FieldKind::Text { table } => table
            .iter()
            .map(|(code, label)| format!("{code}={label}"))
            .collect::<Vec<_>>()
            .join(", "),
        _ => spec.name.to_string(),
    }
}

/// One line per measure: id, description, address, width and encoding.
pub fn measure_table(measures: &[Measure]) -> Vec<String> {
    measures
        .iter()
        .map(|m| {
            let head = format!(
                "{:<5} {:<30} 0x{:03x}:{:<2}",
                m.id, m.description, m.address, m.spec.width
            );
            if m.spec.units.is_empty() {
                format!("{head}  {}", describe_spec(m.spec))
            } else {
                format!("{head}  {}, {}", m.spec.units, describe_spec(m.spec))
            }
        })
        .collect()
}

/// `description = value units` lines for interactive use.
pub fn measure_lines(measures: &[Measure], reading: &Reading) -> Vec<String> {
    measures
        .iter()
        .filter_map(|m| reading.get(m.id).map(|r| (m, r)))
        .map(|(m, result)| {
            let text = format_result(m.spec, result);
            if result.is_ok() && !m.spec.units.is_empty() {
                format!("{} = {} {}", m.description, text, m.spec.units)
            } else {
                format!("{} = {}", m.description, text)
            }
        })
        .collect()
}

/// All values on one line, joined by `separator`.
pub fn measure_row(measures: &[Measure], reading: &Reading, separator: &str) -> String {
    measures
        .iter()
        .filter_map(|m| reading.get(m.id).map(|r| format_result(m.spec, r)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// JSON object keyed by measure id; undecodable fields carry their error.
pub fn reading_json(measures: &[Measure], reading: &Reading) -> Value {
    let mut object = Map::new();
    for m in measures {
        let entry = match reading.get(m.id) {
            Some(Ok(value)) => serde_json::to_value(value).unwrap_or(Value::Null),
            Some(Err(e)) => json!({ "error": e.to_string() }),
            None => continue,
        };
        object.insert(m.id.to_string(), entry);
    }
    Value::Object(object)
}

/// One history record as a delimited row.
pub fn history_row(record: &ArchiveRecord, separator: char) -> String {
    let s = separator;
    format!(
        "{}{s}{:.2}{s}{:.2}{s}{:.1}{s}{}{s}{}{s}{:.2}{s}{:.1}{s}{:.1}",
        record.timestamp.format(CSV_DATE),
        record.temperature_indoor,
        record.temperature_outdoor,
        record.pressure,
        record.humidity_indoor,
        record.humidity_outdoor,
        record.rain,
        record.wind_speed,
        record.wind_direction,
    )
}

/// Dump packed memory 16 units per row, each row prefixed by its address.
///
/// With `bytes` set each unit is a whole byte and the row covers 32 nybbles.
pub fn hexdump(address: u16, buf: &[u8], nybbles: usize, bytes: bool) -> Vec<String> {
    let step = if bytes { 2 } else { 1 };
    let mut lines = Vec::new();
    let mut i = 0;

    while i < nybbles {
        let mut line = format!("{:04x}", usize::from(address) + i);
        for _ in 0..16 {
            if i >= nybbles {
                break;
            }
            let unit = if bytes {
                buf.get(i / 2).map(|b| format!(" {b:02x}"))
            } else {
                nybble::nybble_at(buf, i).ok().map(|n| format!(" {n:x}"))
            };
            line.push_str(unit.as_deref().unwrap_or(" ?"));
            i += step;
        }
        lines.push(line);
    }

    lines
}
