//! Known console memory cells.
//!
//! Each [`Measure`] ties a short identifier (as used on the command line) to
//! a nybble address and the [`FieldSpec`] that decodes it.

use crate::field::{self, FieldSpec};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measure {
    pub id: &'static str,
    pub address: u16,
    pub spec: &'static FieldSpec,
    pub description: &'static str,
}

const fn m(
    address: u16,
    id: &'static str,
    spec: &'static FieldSpec,
    description: &'static str,
) -> Measure {
    Measure {
        id,
        address,
        spec,
        description,
    }
}

pub const MEASURES: &[Measure] = &[
    m(0x006, "bz", &field::BUZZER, "buzzer"),
    m(0x00f, "wsu", &field::SPEED_UNIT, "wind speed units"),
    m(0x016, "lb", &field::BACKLIGHT, "lcd backlight"),
    m(0x019, "sss", &field::ALARM_SET[2], "storm warn alarm set"),
    m(0x019, "sts", &field::ALARM_SET[0], "station time alarm set"),
    m(0x01a, "phs", &field::ALARM_SET[3], "pressure max alarm set"),
    m(0x01a, "pls", &field::ALARM_SET[2], "pressure min alarm set"),
    m(0x01b, "oths", &field::ALARM_SET[3], "out temp max alarm set"),
    m(0x01b, "otls", &field::ALARM_SET[2], "out temp min alarm set"),
    m(0x01b, "iths", &field::ALARM_SET[1], "in temp max alarm set"),
    m(0x01b, "itls", &field::ALARM_SET[0], "in temp min alarm set"),
    m(0x01c, "dphs", &field::ALARM_SET[3], "dew point max alarm set"),
    m(0x01c, "dpls", &field::ALARM_SET[2], "dew point min alarm set"),
    m(0x01c, "wchs", &field::ALARM_SET[1], "wind chill max alarm set"),
    m(0x01c, "wcls", &field::ALARM_SET[0], "wind chill min alarm set"),
    m(0x01d, "ihhs", &field::ALARM_SET[3], "in humidity max alarm set"),
    m(0x01d, "ihls", &field::ALARM_SET[2], "in humidity min alarm set"),
    m(0x01d, "ohhs", &field::ALARM_SET[1], "out humidity max alarm set"),
    m(0x01d, "ohls", &field::ALARM_SET[0], "out humidity min alarm set"),
    m(0x01e, "rhhs", &field::ALARM_SET[1], "rain 1h alarm set"),
    m(0x01e, "rdhs", &field::ALARM_SET[0], "rain 24h alarm set"),
    m(0x01f, "wds", &field::ALARM_SET[2], "wind direction alarm set"),
    m(0x01f, "wshs", &field::ALARM_SET[1], "wind speed max alarm set"),
    m(0x01f, "wsls", &field::ALARM_SET[0], "wind speed min alarm set"),
    m(0x020, "siv", &field::ALARM_ACTIVE[2], "icon alarm active"),
    m(0x020, "stv", &field::ALARM_ACTIVE[0], "station time alarm active"),
    m(0x021, "phv", &field::ALARM_ACTIVE[3], "pressure max alarm active"),
    m(0x021, "plv", &field::ALARM_ACTIVE[2], "pressure min alarm active"),
    m(0x022, "othv", &field::ALARM_ACTIVE[3], "out temp max alarm active"),
    m(0x022, "otlv", &field::ALARM_ACTIVE[2], "out temp min alarm active"),
    m(0x022, "ithv", &field::ALARM_ACTIVE[1], "in temp max alarm active"),
    m(0x022, "itlv", &field::ALARM_ACTIVE[0], "in temp min alarm active"),
    m(0x023, "dphv", &field::ALARM_ACTIVE[3], "dew point max alarm active"),
    m(0x023, "dplv", &field::ALARM_ACTIVE[2], "dew point min alarm active"),
    m(0x023, "wchv", &field::ALARM_ACTIVE[1], "wind chill max alarm active"),
    m(0x023, "wclv", &field::ALARM_ACTIVE[0], "wind chill min alarm active"),
    m(0x024, "ihhv", &field::ALARM_ACTIVE[3], "in humidity max alarm active"),
    m(0x024, "ihlv", &field::ALARM_ACTIVE[2], "in humidity min alarm active"),
    m(0x024, "ohhv", &field::ALARM_ACTIVE[1], "out humidity max alarm active"),
    m(0x024, "ohlv", &field::ALARM_ACTIVE[0], "out humidity min alarm active"),
    m(0x025, "rhhv", &field::ALARM_ACTIVE[1], "rain 1h alarm active"),
    m(0x025, "rdhv", &field::ALARM_ACTIVE[0], "rain 24h alarm active"),
    m(0x026, "wdv", &field::ALARM_ACTIVE[2], "wind direction alarm active"),
    m(0x026, "wshv", &field::ALARM_ACTIVE[1], "wind speed max alarm active"),
    m(0x026, "wslv", &field::ALARM_ACTIVE[0], "wind speed min alarm active"),
    m(0x23b, "sw", &field::DATETIME, "station current date time"),
    m(0x266, "lc", &field::CONTRAST, "lcd contrast (ro)"),
    m(0x26b, "for", &field::FORECAST, "forecast"),
    m(0x26c, "ten", &field::TENDENCY, "tendency"),
    m(0x346, "it", &field::TEMPERATURE, "indoor temp"),
    m(0x34b, "itl", &field::TEMPERATURE, "indoor temp min"),
    m(0x350, "ith", &field::TEMPERATURE, "indoor temp max"),
    m(0x354, "itlw", &field::TIMESTAMP, "indoor temp min when"),
    m(0x35e, "ithw", &field::TIMESTAMP, "indoor temp max when"),
    m(0x369, "itla", &field::TEMPERATURE, "indoor temp low alarm"),
    m(0x36e, "itha", &field::TEMPERATURE, "indoor temp high alarm"),
    m(0x373, "ot", &field::TEMPERATURE, "outdoor temp"),
    m(0x378, "otl", &field::TEMPERATURE, "outdoor temp min"),
    m(0x37d, "oth", &field::TEMPERATURE, "outdoor temp max"),
    m(0x381, "otlw", &field::TIMESTAMP, "outdoor temp min when"),
    m(0x38b, "othw", &field::TIMESTAMP, "outdoor temp max when"),
    m(0x396, "otla", &field::TEMPERATURE, "outdoor temp low alarm"),
    m(0x39b, "otha", &field::TEMPERATURE, "outdoor temp high alarm"),
    m(0x3a0, "wc", &field::TEMPERATURE, "wind chill"),
    m(0x3a5, "wcl", &field::TEMPERATURE, "wind chill min"),
    m(0x3aa, "wch", &field::TEMPERATURE, "wind chill max"),
    m(0x3ae, "wclw", &field::TIMESTAMP, "wind chill min when"),
    m(0x3b8, "wchw", &field::TIMESTAMP, "wind chill max when"),
    m(0x3c3, "wcla", &field::TEMPERATURE, "wind chill low alarm"),
    m(0x3c8, "wcha", &field::TEMPERATURE, "wind chill high alarm"),
    m(0x3ce, "dp", &field::TEMPERATURE, "dew point"),
    m(0x3d3, "dpl", &field::TEMPERATURE, "dew point min"),
    m(0x3d8, "dph", &field::TEMPERATURE, "dew point max"),
    m(0x3dc, "dplw", &field::TIMESTAMP, "dew point min when"),
    m(0x3e6, "dphw", &field::TIMESTAMP, "dew point max when"),
    m(0x3f1, "dpla", &field::TEMPERATURE, "dew point low alarm"),
    m(0x3f6, "dpha", &field::TEMPERATURE, "dew point high alarm"),
    m(0x3fb, "ih", &field::HUMIDITY, "indoor humidity"),
    m(0x3fd, "ihl", &field::HUMIDITY, "indoor humidity min"),
    m(0x3ff, "ihh", &field::HUMIDITY, "indoor humidity max"),
    m(0x401, "ihlw", &field::TIMESTAMP, "indoor humidity min when"),
    m(0x40b, "ihhw", &field::TIMESTAMP, "indoor humidity max when"),
    m(0x415, "ihla", &field::HUMIDITY, "indoor humidity low alarm"),
    m(0x417, "ihha", &field::HUMIDITY, "indoor humidity high alarm"),
    m(0x419, "oh", &field::HUMIDITY, "outdoor humidity"),
    m(0x41b, "ohl", &field::HUMIDITY, "outdoor humidity min"),
    m(0x41d, "ohh", &field::HUMIDITY, "outdoor humidity max"),
    m(0x41f, "ohlw", &field::TIMESTAMP, "outdoor humidity min when"),
    m(0x429, "ohhw", &field::TIMESTAMP, "outdoor humidity max when"),
    m(0x433, "ohla", &field::HUMIDITY, "outdoor humidity low alarm"),
    m(0x435, "ohha", &field::HUMIDITY, "outdoor humidity high alarm"),
    m(0x497, "rd", &field::RAIN, "rain 24 hour"),
    m(0x49d, "rdh", &field::RAIN, "rain 24 hour max"),
    m(0x4a3, "rdhw", &field::TIMESTAMP, "rain 24 hour max when"),
    m(0x4ae, "rdha", &field::RAIN, "rain 24 hour alarm"),
    m(0x4b4, "rh", &field::RAIN, "rain 1 hour"),
    m(0x4ba, "rhh", &field::RAIN, "rain 1 hour max"),
    m(0x4c0, "rhhw", &field::TIMESTAMP, "rain 1 hour max when"),
    m(0x4cb, "rhha", &field::RAIN, "rain 1 hour alarm"),
    m(0x4d2, "rt", &field::RAIN, "rain total"),
    m(0x4d8, "rtrw", &field::TIMESTAMP, "rain total reset when"),
    m(0x4ee, "wsl", &field::SPEED, "wind speed min"),
    m(0x4f4, "wsh", &field::SPEED, "wind speed max"),
    m(0x4f8, "wslw", &field::TIMESTAMP, "wind speed min when"),
    m(0x502, "wshw", &field::TIMESTAMP, "wind speed max when"),
    m(0x527, "wso", &field::WIND_OVERFLOW, "wind speed overflow"),
    m(0x528, "wsv", &field::WIND_VALIDITY, "wind speed validity"),
    m(0x529, "ws", &field::SPEED, "wind speed"),
    m(0x52c, "w0", &field::WIND_DIRECTION, "wind direction"),
    m(0x52d, "w1", &field::WIND_DIRECTION, "wind direction 1"),
    m(0x52e, "w2", &field::WIND_DIRECTION, "wind direction 2"),
    m(0x52f, "w3", &field::WIND_DIRECTION, "wind direction 3"),
    m(0x530, "w4", &field::WIND_DIRECTION, "wind direction 4"),
    m(0x531, "w5", &field::WIND_DIRECTION, "wind direction 5"),
    m(0x533, "wsla", &field::SPEED, "wind speed min alarm"),
    m(0x538, "wsha", &field::SPEED, "wind speed max alarm"),
    m(0x54d, "cn", &field::CONNECTION, "connection type"),
    m(0x54f, "cc", &field::INTERVAL_SECONDS, "connection time till connect"),
    m(0x5d8, "pa", &field::PRESSURE, "pressure absolute"),
    m(0x5e2, "pr", &field::PRESSURE, "pressure relative"),
    m(0x5ec, "pc", &field::PRESSURE, "pressure correction"),
    m(0x5f6, "pal", &field::PRESSURE, "pressure absolute min"),
    m(0x600, "prl", &field::PRESSURE, "pressure relative min"),
    m(0x60a, "pah", &field::PRESSURE, "pressure absolute max"),
    m(0x614, "prh", &field::PRESSURE, "pressure relative max"),
    m(0x61e, "plw", &field::TIMESTAMP, "pressure min when"),
    m(0x628, "phw", &field::TIMESTAMP, "pressure max when"),
    m(0x63c, "pla", &field::PRESSURE, "pressure min alarm"),
    m(0x650, "pha", &field::PRESSURE, "pressure max alarm"),
    m(0x6b2, "hi", &field::INTERVAL_MINUTES, "history interval"),
    m(0x6b5, "hc", &field::INTERVAL_MINUTES, "history time till sample"),
    m(0x6b8, "hw", &field::TIMESTAMP, "history last sample when"),
    m(0x6c2, "hp", &field::RECORD_NUMBER, "history last record pointer"),
    m(0x6c4, "hn", &field::RECORD_NUMBER, "history number of records"),
];

/// Cells sampled by each live acquisition cycle. Status cells use raw codes
/// so the validity logic can compare them directly.
pub const LIVE_MEASURES: &[Measure] = &[
    m(0x346, "it", &field::TEMPERATURE, "indoor temp"),
    m(0x373, "ot", &field::TEMPERATURE, "outdoor temp"),
    m(0x3a0, "wc", &field::TEMPERATURE, "wind chill"),
    m(0x3ce, "dp", &field::TEMPERATURE, "dew point"),
    m(0x3fb, "ih", &field::HUMIDITY, "indoor humidity"),
    m(0x419, "oh", &field::HUMIDITY, "outdoor humidity"),
    m(0x4d2, "rt", &field::RAIN, "rain total"),
    m(0x527, "wso", &field::CODE, "wind speed overflow"),
    m(0x528, "wsv", &field::CODE, "wind speed validity"),
    m(0x529, "ws", &field::SPEED, "wind speed"),
    m(0x52c, "w0", &field::WIND_DIRECTION, "wind direction"),
    m(0x54d, "cn", &field::CODE, "connection type"),
    m(0x5e2, "pr", &field::PRESSURE, "pressure relative"),
];

/// Cells describing the link state, used to schedule polling.
pub const LINK_MEASURES: &[Measure] = &[
    m(0x54d, "cn", &field::CODE, "connection type"),
    m(0x54f, "cc", &field::INTERVAL_SECONDS, "connection time till connect"),
];

pub fn by_id(id: &str) -> Option<&'static Measure> {
    MEASURES.iter().find(|m| m.id == id)
}

pub fn by_address(address: u16) -> Option<&'static Measure> {
    MEASURES.iter().find(|m| m.address == address)
}
